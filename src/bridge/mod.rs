// Processing bridge: hands packed frames to an external filter.

pub mod builtin;
pub mod error;
pub mod filter;
pub mod native;
pub mod processing;
