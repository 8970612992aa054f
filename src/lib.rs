pub mod cli;
pub mod config;
pub mod db;
pub mod embedding;
mod error;
mod metrics;
pub mod pipeline;
pub mod server;
pub mod storage;
pub mod task;
pub mod utils;

pub use config::Opts;
pub use error::{Error, Result};
pub use pipeline::Pipeline;
