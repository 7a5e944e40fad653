//! NFT catalog integration: HTTP client and the tools exposed to the model.

pub mod client;
pub mod tools;

pub use client::{CatalogClient, CatalogError};
pub use tools::{GetNftDetailsTool, ListCollectionsTool, ListNftsTool, catalog_tools};
