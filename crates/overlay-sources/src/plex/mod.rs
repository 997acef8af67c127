pub mod api;
pub mod client;

pub use api::{PlexHttpClient, ServerIdentity};
pub use client::PlexServer;
