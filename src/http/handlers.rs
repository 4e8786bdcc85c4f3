//! Axum HTTP handlers for the item service and the JSON-RPC endpoint
//!
//! Items are never stored: creation echoes the submitted item back and lookup
//! synthesizes a placeholder for any positive id.

use axum::{body::Bytes, extract::Path, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::rpc::{protocol::RpcReply, server::handle_json_rpc_body};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub name: String,
}

/// Create-item payload. Any client-supplied `id` is ignored; a missing or
/// null `name` reads as empty.
#[derive(Debug, Deserialize)]
pub struct NewItem {
    #[serde(default)]
    pub name: Option<String>,
}

impl Item {
    pub fn placeholder(id: i64) -> Self {
        Self {
            id,
            name: format!("Item {id}"),
        }
    }
}

impl From<NewItem> for Item {
    fn from(new_item: NewItem) -> Self {
        Self {
            id: 0,
            name: new_item.name.unwrap_or_default(),
        }
    }
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub async fn create_item(body: Bytes) -> Result<(StatusCode, Json<Item>), AppError> {
    let new_item: NewItem =
        serde_json::from_slice(&body).map_err(|err| AppError::bad_request(err.to_string()))?;
    let item = Item::from(new_item);

    if item.name.is_empty() {
        return Err(AppError::bad_request("name required"));
    }

    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn get_item(Path(raw_id): Path<String>) -> Result<Json<Item>, AppError> {
    let id = parse_item_id(&raw_id)?;
    Ok(Json(Item::placeholder(id)))
}

/// `/items/` with nothing after the slash.
pub async fn missing_item_id() -> AppError {
    AppError::bad_request("invalid id")
}

/// JSON-RPC errors travel in the body, so the status is always 200.
pub async fn rpc_endpoint(body: Bytes) -> Json<RpcReply> {
    Json(handle_json_rpc_body(&body))
}

pub fn parse_item_id(raw: &str) -> Result<i64, AppError> {
    match raw.trim().parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(AppError::bad_request("invalid id")),
    }
}
