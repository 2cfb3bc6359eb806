pub mod cli;
pub mod codec;
pub mod config;
pub mod context;
pub mod embed;
pub mod error;
pub mod extract;
pub mod hamming;
mod metrics;
pub mod neighbor;
pub mod pipeline;
pub mod segment;
mod server;
pub mod shard;
pub mod signal;
pub mod store;
pub mod utils;
pub mod vision;

pub use config::Opts;
pub use context::{DejaView, DejaViewConfig};
pub use error::{Error, Result};
pub use pipeline::{Decision, DecisionPipeline, Status};
