// Pipeline domain: per-frame orchestration, the processing toggle, lifecycle.

pub mod controller;
pub mod error;
pub mod stage;
#[cfg(test)]
mod testing;
pub mod toggle;
