// Upstream module - outbound calls to the platform authority
pub mod client;

pub use client::{build_http_client, AuthorityClient};
