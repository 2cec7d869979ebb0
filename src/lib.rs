pub mod cli;
pub mod config;
pub mod error;
pub mod indexer;
pub mod logging;
pub mod model;
pub mod store;
pub mod symbol;
pub mod util;

pub use error::IndexError;
