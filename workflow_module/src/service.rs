mod config;
mod server;
mod state;
mod sweeper;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub use config::ServiceConfig;
pub use server::run_server;
