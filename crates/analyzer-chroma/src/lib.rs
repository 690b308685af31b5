//! Client handle for the Chroma vector database
//!
//! Builds connection settings from the environment and talks to a running
//! Chroma server over its REST API.

pub mod client;
pub mod config;

pub use client::{ChromaClient, ClientError, create_client};
pub use config::{ClientSettings, FASTAPI_IMPL};
