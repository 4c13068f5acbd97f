pub mod cli;
pub mod config;
pub mod db;
pub mod embedding;
mod error;
pub mod index;
mod mediadb;
mod metrics;
pub mod query;
pub mod scan;
mod server;
pub mod tools;
pub mod utils;

pub use config::Opts;
pub use error::{Error, Result};
pub use mediadb::{MediaDB, MediaDBBuilder};
