mod add;
mod check;
pub mod server;
mod stats;
mod submit;

pub use add::*;
pub use check::*;
pub use server::*;
pub use stats::*;
pub use submit::*;

use crate::config::Opts;

pub trait SubCommandExtend {
    fn run(&self, opts: &Opts) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;
}
