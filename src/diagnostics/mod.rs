// Diagnostics domain: pipeline statistics and snapshots.

pub mod stats;
