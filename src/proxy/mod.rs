// proxy module - authenticating gateway in front of workforce deployments

pub mod auth;
pub mod config;
pub mod deployment;
pub mod error;
pub mod forwarder;
pub mod handlers;
pub mod middleware;
pub mod server;
pub mod upstream;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use server::{build_router, AppState, GatewayServer};
