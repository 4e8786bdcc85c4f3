//! JSON-RPC protocol representations and formatting utilities

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const JSONRPC_VERSION: &str = "2.0";

#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Vec<i64>,
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    pub result: i64,
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RpcErrorObject {
    pub code: i32,
    pub message: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RpcErrorResponse {
    pub jsonrpc: &'static str,
    pub error: RpcErrorObject,
    pub id: Option<i64>,
}

/// Either half of a JSON-RPC reply; serializes without a wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RpcReply {
    Result(RpcResponse),
    Error(RpcErrorResponse),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RpcError {
    #[error("Parse error")]
    ParseError,
    #[error("Invalid Request")]
    InvalidRequest,
    #[error("Method not found")]
    MethodNotFound,
    #[error("Invalid params")]
    InvalidParams,
}

impl RpcError {
    pub fn code(self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
        }
    }
}

impl RpcReply {
    pub fn result(id: i64, result: i64) -> Self {
        Self::Result(RpcResponse {
            jsonrpc: JSONRPC_VERSION,
            result,
            id,
        })
    }

    pub fn error(id: Option<i64>, err: RpcError) -> Self {
        Self::Error(RpcErrorResponse {
            jsonrpc: JSONRPC_VERSION,
            error: RpcErrorObject {
                code: err.code(),
                message: err.message(),
            },
            id,
        })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}
