pub mod config;
pub mod database;
pub mod driver;
pub mod error;
pub mod server;

pub use config::{CatalogConfig, Config, ServerSettings};
pub use error::{ServerError, ServerResult};
pub use server::{AgentContext, AgentServer};
