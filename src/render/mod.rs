// Render domain: presentation targets for finished frames.

pub mod backend;
pub mod error;
pub mod gpu;
pub mod null;
pub mod snapshot;
