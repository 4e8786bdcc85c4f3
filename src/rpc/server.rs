//! JSON-RPC request decoding and method dispatch
//!
//! Every body produces exactly one reply: malformed input is reported as a
//! JSON-RPC error object rather than dropped.

use serde_json::Value;
use tracing::info;

use crate::rpc::protocol::{RpcError, RpcReply, RpcRequest, JSONRPC_VERSION};

pub fn handle_json_rpc_body(body: &[u8]) -> RpcReply {
    match serde_json::from_slice::<Value>(body) {
        Ok(payload) => handle_json_rpc_value(payload),
        Err(_) => RpcReply::error(None, RpcError::ParseError),
    }
}

pub fn handle_json_rpc_value(payload: Value) -> RpcReply {
    if !payload.is_object() {
        return RpcReply::error(None, RpcError::InvalidRequest);
    }

    let request_id = payload.get("id").and_then(Value::as_i64);
    let request: RpcRequest = match serde_json::from_value(payload) {
        Ok(request) => request,
        Err(_) => return RpcReply::error(request_id, RpcError::InvalidRequest),
    };

    if request.jsonrpc != JSONRPC_VERSION || request.method.trim().is_empty() {
        return RpcReply::error(Some(request.id), RpcError::InvalidRequest);
    }

    let reply = match dispatch(&request.method, &request.params) {
        Ok(result) => RpcReply::result(request.id, result),
        Err(err) => RpcReply::error(Some(request.id), err),
    };

    info!(
        method = %request.method,
        id = request.id,
        params = request.params.len(),
        outcome = if reply.is_error() { "failure" } else { "success" },
        "rpc call handled"
    );

    reply
}

pub fn dispatch(method: &str, params: &[i64]) -> Result<i64, RpcError> {
    match method {
        "sum" => sum(params),
        _ => Err(RpcError::MethodNotFound),
    }
}

/// Adds the first two params. Fewer than two params yields zero.
pub fn sum(params: &[i64]) -> Result<i64, RpcError> {
    match params {
        [a, b, ..] => a.checked_add(*b).ok_or(RpcError::InvalidParams),
        _ => Ok(0),
    }
}
