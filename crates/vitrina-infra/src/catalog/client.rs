//! HTTP client for the NFT catalog service and its component renderer.
//!
//! The catalog serves JSON (`/nfts`, `/nfts/{id}`, `/collections`); the
//! renderer turns a data payload into a styled HTML component. Both live
//! behind the same marketplace backend and are configured via
//! [`CatalogSettings`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use vitrina_types::config::CatalogSettings;

/// Errors from catalog or renderer requests.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Http(String),

    #[error("catalog returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid catalog response: {0}")]
    Decode(String),
}

/// Query parameters for `/nfts`. `None` fields are omitted from the
/// request so the catalog applies its own defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NftQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blockchain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_price_eth: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_price_eth: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_rarity: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_rarity: Option<i64>,
    #[serde(default = "default_nft_sort")]
    pub sort_by: String,
    #[serde(default = "default_order")]
    pub order: String,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub skip: i64,
}

/// Query parameters for `/collections`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(default = "default_collection_sort")]
    pub sort_by: String,
    #[serde(default = "default_order")]
    pub order: String,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub skip: i64,
}

fn default_nft_sort() -> String {
    "tokenId".to_string()
}

fn default_collection_sort() -> String {
    "name".to_string()
}

fn default_order() -> String {
    "asc".to_string()
}

fn default_limit() -> i64 {
    10
}

/// A page of NFTs from the catalog.
#[derive(Debug, Deserialize)]
pub struct NftPage {
    #[serde(default)]
    pub nfts: Vec<Value>,
    #[serde(default)]
    pub total: i64,
}

/// A page of collections from the catalog.
#[derive(Debug, Deserialize)]
pub struct CollectionPage {
    #[serde(default)]
    pub collections: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RenderResponse {
    html: String,
}

/// Client for the catalog API and the component renderer.
pub struct CatalogClient {
    http: reqwest::Client,
    base_url: String,
    renderer_base_url: String,
}

impl CatalogClient {
    pub fn new(settings: &CatalogSettings) -> Result<Self, CatalogError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.http_timeout_secs))
            .build()
            .map_err(|e| CatalogError::Http(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            renderer_base_url: settings.renderer_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn list_nfts(&self, query: &NftQuery) -> Result<NftPage, CatalogError> {
        self.get_json(&format!("{}/nfts", self.base_url), query).await
    }

    /// Fetch one NFT by id. Returns `None` on 404.
    pub async fn get_nft(&self, nft_id: &str) -> Result<Option<Value>, CatalogError> {
        let url = format!("{}/nfts/{nft_id}", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| CatalogError::Http(e.to_string()))?;

        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        let response = check_status(response).await?;
        response
            .json()
            .await
            .map(Some)
            .map_err(|e| CatalogError::Decode(e.to_string()))
    }

    pub async fn list_collections(
        &self,
        query: &CollectionQuery,
    ) -> Result<CollectionPage, CatalogError> {
        self.get_json(&format!("{}/collections", self.base_url), query)
            .await
    }

    /// Render a data payload into a styled HTML component. `template` is
    /// the renderer template name (nft_grid, nft_table, collection_grid,
    /// collection_table, nft_details).
    pub async fn render(&self, template: &str, payload: &Value) -> Result<String, CatalogError> {
        let url = format!("{}/{template}", self.renderer_base_url);
        let response = self
            .http
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|e| CatalogError::Http(e.to_string()))?;

        let response = check_status(response).await?;
        let rendered: RenderResponse = response
            .json()
            .await
            .map_err(|e| CatalogError::Decode(e.to_string()))?;
        Ok(rendered.html)
    }

    async fn get_json<Q: Serialize, T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        query: &Q,
    ) -> Result<T, CatalogError> {
        let response = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| CatalogError::Http(e.to_string()))?;

        let response = check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| CatalogError::Decode(e.to_string()))
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, CatalogError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(CatalogError::Status {
            status: status.as_u16(),
            body,
        })
    }
}
