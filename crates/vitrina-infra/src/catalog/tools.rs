//! Catalog tools exposed to the model.
//!
//! Each tool fetches JSON from the catalog, has the renderer produce a
//! styled HTML component, and returns the component wrapped in markers
//! plus a `[SESSION_DATA]` line carrying a compact snapshot of what was
//! shown. The snapshot is what lets the next turn resolve "the first
//! one" without re-fetching.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::warn;

use vitrina_core::agent::parser::wrap_component;
use vitrina_core::tool::{BoxTool, CatalogTool, ToolRegistry};
use vitrina_types::error::ToolError;

use super::client::{CatalogClient, CatalogError, CollectionQuery, NftQuery};

const MAX_PAGE_SIZE: i64 = 20;

const COPY_INSTRUCTION: &str =
    "IMPORTANT: Copy the entire HTML block below (including the markers) into your response:";
const COPY_FOOTER: &str =
    "The HTML above is a complete, styled component. Do NOT create tables or summaries.";

/// Build the registry with all three catalog tools.
pub fn catalog_tools(client: Arc<CatalogClient>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(BoxTool::new(ListNftsTool::new(client.clone())));
    registry.register(BoxTool::new(ListCollectionsTool::new(client.clone())));
    registry.register(BoxTool::new(GetNftDetailsTool::new(client)));
    registry
}

fn session_data_line(payload: &Value) -> String {
    format!("\n[SESSION_DATA]{payload}[/SESSION_DATA]")
}

fn execution_error(tool: &str, e: CatalogError) -> ToolError {
    ToolError::Execution {
        tool: tool.to_string(),
        reason: e.to_string(),
    }
}

fn str_arg(args: &Value, key: &str) -> Option<String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

/// Compact per-NFT snapshot stored in session state.
fn nft_snapshot(nfts: &[Value]) -> Vec<Value> {
    nfts.iter()
        .filter(|n| n.get("id").and_then(|v| v.as_str()).is_some())
        .map(|n| {
            json!({
                "id": n["id"],
                "name": n.get("name").cloned().unwrap_or(Value::Null),
                "collection": n.get("collection").cloned().unwrap_or(json!("")),
                "price_eth": n.pointer("/price/eth").cloned().unwrap_or(Value::Null),
                "last_sale_eth": n.pointer("/lastSale/eth").cloned().unwrap_or(Value::Null),
                "owner": owner_label(n),
                "status": n.get("status").cloned().unwrap_or(json!("")),
                "rarity_rank": n.get("rarityRank").cloned().unwrap_or(Value::Null),
            })
        })
        .collect()
}

fn owner_label(nft: &Value) -> Value {
    nft.pointer("/owner/address")
        .or_else(|| nft.pointer("/owner/username"))
        .cloned()
        .unwrap_or(json!(""))
}

fn collection_snapshot(collections: &[Value]) -> Vec<Value> {
    collections
        .iter()
        .map(|c| {
            json!({
                "name": c.get("name").cloned().unwrap_or(json!("")),
                "nft_count": c.get("nft_count").cloned().unwrap_or(json!(0)),
                "blockchains": c.get("blockchains").cloned().unwrap_or(json!([])),
            })
        })
        .collect()
}

/// Full detail snapshot for one NFT, description clipped to 300 chars.
fn detail_summary(nft: &Value) -> Value {
    let description: String = nft
        .get("description")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .chars()
        .take(300)
        .collect();
    let attributes: Vec<String> = nft
        .get("attributes")
        .and_then(|v| v.as_array())
        .map(|attrs| {
            attrs
                .iter()
                .take(10)
                .map(|a| {
                    format!(
                        "{}: {}",
                        a.get("trait_type").and_then(|v| v.as_str()).unwrap_or(""),
                        a.get("value").and_then(|v| v.as_str()).unwrap_or("")
                    )
                })
                .collect()
        })
        .unwrap_or_default();

    json!({
        "id": nft.get("id").cloned().unwrap_or(Value::Null),
        "name": nft.get("name").cloned().unwrap_or(Value::Null),
        "collection": nft.get("collection").cloned().unwrap_or(json!("")),
        "description": description,
        "price_eth": nft.pointer("/price/eth").cloned().unwrap_or(Value::Null),
        "last_sale_eth": nft.pointer("/lastSale/eth").cloned().unwrap_or(Value::Null),
        "owner": owner_label(nft),
        "status": nft.get("status").cloned().unwrap_or(json!("")),
        "rarity_rank": nft.get("rarityRank").cloned().unwrap_or(Value::Null),
        "blockchain": nft.get("blockchain").cloned().unwrap_or(json!("")),
        "attributes": attributes,
    })
}

// ---------------------------------------------------------------------------
// list_nfts
// ---------------------------------------------------------------------------

pub struct ListNftsTool {
    client: Arc<CatalogClient>,
}

impl ListNftsTool {
    pub fn new(client: Arc<CatalogClient>) -> Self {
        Self { client }
    }
}

impl CatalogTool for ListNftsTool {
    fn name(&self) -> &str {
        "list_nfts"
    }

    fn description(&self) -> &str {
        "Fetch a paginated list of NFTs with optional filtering (collection, blockchain, \
         status, search, price range in ETH, rarity range), sorting (tokenId, price_eth, \
         rarityRank, likes, views), and pagination (limit 1-20, skip). Returns a styled \
         HTML component ready for display. Use view_type=table when the user asks for a \
         list or table; for 'next N' reuse the previous filters with skip = previous \
         skip + previous limit."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "collection": {"type": "string", "description": "Filter by collection name"},
                "blockchain": {"type": "string", "description": "Filter by blockchain (Ethereum, Polygon, Solana)"},
                "status": {"type": "string", "enum": ["listed", "sold", "auction", "not_for_sale"]},
                "search": {"type": "string", "description": "Search in name, description, or collection"},
                "min_price_eth": {"type": "number"},
                "max_price_eth": {"type": "number"},
                "min_rarity": {"type": "integer"},
                "max_rarity": {"type": "integer"},
                "sort_by": {"type": "string", "enum": ["tokenId", "price_eth", "rarityRank", "likes", "views"]},
                "order": {"type": "string", "enum": ["asc", "desc"]},
                "limit": {"type": "integer", "description": "Number of NFTs to return (1-20)"},
                "skip": {"type": "integer", "description": "Offset for pagination"},
                "view_type": {"type": "string", "enum": ["grid", "table"]},
                "detail_level": {"type": "string", "enum": ["minimal", "standard", "detailed", "full"]}
            }
        })
    }

    async fn invoke(&self, arguments: Value) -> Result<String, ToolError> {
        let view_type = str_arg(&arguments, "view_type").unwrap_or_else(|| "grid".to_string());
        let detail_level =
            str_arg(&arguments, "detail_level").unwrap_or_else(|| "standard".to_string());
        let mut query: NftQuery =
            serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArguments {
                tool: "list_nfts".to_string(),
                reason: e.to_string(),
            })?;
        query.limit = query.limit.clamp(1, MAX_PAGE_SIZE);
        query.skip = query.skip.max(0);

        let page = self
            .client
            .list_nfts(&query)
            .await
            .map_err(|e| execution_error("list_nfts", e))?;

        if page.nfts.is_empty() {
            return Ok(
                "No NFTs found matching your criteria. Try adjusting your filters.".to_string(),
            );
        }

        // The renderer endpoint is nft_grid/nft_table; the marker kind the
        // client sees is the plain display kind.
        let (template, display_kind) = if view_type == "table" {
            ("nft_table", "table")
        } else {
            ("nft_grid", "grid")
        };
        let html = self
            .client
            .render(template, &json!({"nfts": page.nfts, "detail_level": detail_level}))
            .await
            .map_err(|e| execution_error("list_nfts", e))?;
        let wrapped = wrap_component(&html, display_kind);

        let mut params = serde_json::to_value(&query).unwrap_or_else(|e| {
            warn!(error = %e, "Unserializable list params");
            json!({})
        });
        if let Some(map) = params.as_object_mut() {
            map.insert("view_type".to_string(), json!(view_type));
        }
        let session_payload = json!({
            "nft_list": nft_snapshot(&page.nfts),
            "last_list_params": params,
        });

        Ok(format!(
            "Found {} NFTs matching the criteria.\n\n{COPY_INSTRUCTION}\n\n{wrapped}\n\n{COPY_FOOTER}{}",
            page.total,
            session_data_line(&session_payload)
        ))
    }
}

// ---------------------------------------------------------------------------
// list_collections
// ---------------------------------------------------------------------------

pub struct ListCollectionsTool {
    client: Arc<CatalogClient>,
}

impl ListCollectionsTool {
    pub fn new(client: Arc<CatalogClient>) -> Self {
        Self { client }
    }
}

impl CatalogTool for ListCollectionsTool {
    fn name(&self) -> &str {
        "list_collections"
    }

    fn description(&self) -> &str {
        "Fetch a paginated list of NFT collections with optional name search, sorting \
         (name, nft_count, min_price_eth, max_price_eth), and pagination (limit 1-20, \
         skip). Returns a styled HTML component with name, NFT count, blockchains, and \
         price range per collection."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "search": {"type": "string", "description": "Filter by collection name (substring)"},
                "sort_by": {"type": "string", "enum": ["name", "nft_count", "min_price_eth", "max_price_eth"]},
                "order": {"type": "string", "enum": ["asc", "desc"]},
                "limit": {"type": "integer", "description": "Number of collections to return (1-20)"},
                "skip": {"type": "integer", "description": "Offset for pagination"},
                "view_type": {"type": "string", "enum": ["grid", "table"]}
            }
        })
    }

    async fn invoke(&self, arguments: Value) -> Result<String, ToolError> {
        let view_type = str_arg(&arguments, "view_type").unwrap_or_else(|| "grid".to_string());
        let mut query: CollectionQuery =
            serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArguments {
                tool: "list_collections".to_string(),
                reason: e.to_string(),
            })?;
        query.limit = query.limit.clamp(1, MAX_PAGE_SIZE);
        query.skip = query.skip.max(0);

        let page = self
            .client
            .list_collections(&query)
            .await
            .map_err(|e| execution_error("list_collections", e))?;

        if page.collections.is_empty() {
            return Ok(
                "No collections found matching your criteria. Try a different search or filters."
                    .to_string(),
            );
        }

        let template = if view_type == "table" {
            "collection_table"
        } else {
            "collection_grid"
        };
        let html = self
            .client
            .render(template, &json!({"collections": page.collections}))
            .await
            .map_err(|e| execution_error("list_collections", e))?;
        let wrapped = wrap_component(&html, template);

        let session_payload = json!({
            "collection_list": collection_snapshot(&page.collections),
        });

        Ok(format!(
            "Found **{}** collection(s).\n\n{COPY_INSTRUCTION}\n\n{wrapped}\n\n{COPY_FOOTER}{}",
            page.collections.len(),
            session_data_line(&session_payload)
        ))
    }
}

// ---------------------------------------------------------------------------
// get_nft_details
// ---------------------------------------------------------------------------

pub struct GetNftDetailsTool {
    client: Arc<CatalogClient>,
}

impl GetNftDetailsTool {
    pub fn new(client: Arc<CatalogClient>) -> Self {
        Self { client }
    }
}

impl CatalogTool for GetNftDetailsTool {
    fn name(&self) -> &str {
        "get_nft_details"
    }

    fn description(&self) -> &str {
        "Fetch complete details for a single NFT by its exact id. Use the id field from a \
         previously listed NFT when the user refers to 'the first one' or 'that NFT'; \
         never invent or guess ids. Returns a styled HTML component with image, price, \
         attributes, owner, and history."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "nft_id": {"type": "string", "description": "The NFT id, e.g. nft-001"},
                "detail_level": {"type": "string", "enum": ["standard", "detailed", "full"]}
            },
            "required": ["nft_id"]
        })
    }

    async fn invoke(&self, arguments: Value) -> Result<String, ToolError> {
        let nft_id = str_arg(&arguments, "nft_id").ok_or_else(|| ToolError::InvalidArguments {
            tool: "get_nft_details".to_string(),
            reason: "nft_id must be a string".to_string(),
        })?;
        let detail_level =
            str_arg(&arguments, "detail_level").unwrap_or_else(|| "detailed".to_string());

        let Some(nft) = self
            .client
            .get_nft(&nft_id)
            .await
            .map_err(|e| execution_error("get_nft_details", e))?
        else {
            // Not found is an answer, not an error: the model relays it.
            return Ok(format!(
                "NFT with ID '{nft_id}' was not found in our marketplace."
            ));
        };

        let html = self
            .client
            .render(
                "nft_details",
                &json!({"nft": nft, "detail_level": detail_level}),
            )
            .await
            .map_err(|e| execution_error("get_nft_details", e))?;
        let wrapped = wrap_component(&html, "details");

        let name = nft.get("name").and_then(|v| v.as_str()).unwrap_or(&nft_id);
        let session_payload = json!({
            "last_detail_id": nft.get("id").cloned().unwrap_or(json!(nft_id.clone())),
            "detail_summary": detail_summary(&nft),
        });

        Ok(format!(
            "Retrieved details for **{name}**.\n\n{COPY_INSTRUCTION}\n\n{wrapped}\n\n{COPY_FOOTER}{}",
            session_data_line(&session_payload)
        ))
    }
}
