// Frame source domain: capture backends and the hand-off to the pipeline.

pub mod backend;
pub mod error;
pub mod mailbox;
pub mod pool;
pub mod scripted;
pub mod synthetic;
pub mod types;
#[cfg(all(target_os = "linux", feature = "v4l2"))]
pub mod v4l2;
