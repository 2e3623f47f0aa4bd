// Config domain: the JSON configuration file and its persistence.

pub mod error;
pub mod store;
pub mod types;
