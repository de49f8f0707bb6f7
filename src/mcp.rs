use crate::error::GatewayError;
use crate::types::*;
use crate::AppState;
use axum::{
    body::Bytes,
    extract::State,
    response::{
        sse::{Event, Sse},
        IntoResponse, Json,
    },
    routing::{get, post},
    Router,
};
use futures::stream;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, info_span, Instrument};

pub const JSONRPC_VERSION: &str = "2.0";
pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SEARCH_TOOL: &str = "search_products";

#[derive(Debug, Clone, Deserialize)]
pub struct RequestEnvelope {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Option<CallParams>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallParams {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub arguments: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl ResponseEnvelope {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, err: &GatewayError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(RpcError {
                code: err.code(),
                message: err.to_string(),
            }),
        }
    }

    /// The one `data:` event the response is framed as.
    pub fn to_event(&self) -> Event {
        let payload = serde_json::to_string(self).unwrap_or_else(|e| {
            json!({
                "jsonrpc": JSONRPC_VERSION,
                "id": self.id,
                "error": {"code": crate::error::INTERNAL_ERROR, "message": e.to_string()},
            })
            .to_string()
        });
        Event::default().data(payload)
    }
}

/// Id echoed when the request could not be read far enough to find its own.
pub fn placeholder_id() -> Value {
    json!(1)
}

/// Input schema of `search_products`, shared by every transport.
pub fn search_products_schema() -> serde_json::Map<String, Value> {
    let schema = json!({
        "type": "object",
        "properties": {
            "query": {
                "type": "string",
                "description": "What to search for, e.g. \"cricket bat\""
            },
            "price_max": {
                "type": "number",
                "description": "Maximum price in rupees",
                "default": DEFAULT_PRICE_MAX
            },
            "platform": {
                "type": "string",
                "enum": Platform::ALL.iter().map(Platform::as_str).collect::<Vec<_>>(),
                "description": "Store to search"
            }
        },
        "required": ["query"]
    });
    match schema {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    }
}

pub fn search_products_description() -> String {
    format!(
        "Search a shopping site for products under a price ceiling ({} results max)",
        MAX_PRODUCTS
    )
}

pub fn tools_list() -> Value {
    json!({
        "tools": [{
            "name": SEARCH_TOOL,
            "description": search_products_description(),
            "inputSchema": search_products_schema(),
        }]
    })
}

pub fn initialize_result() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {"tools": true},
        "serverInfo": {"name": env!("CARGO_PKG_NAME"), "version": env!("CARGO_PKG_VERSION")}
    })
}

/// Handles one raw request body. Never fails: every problem becomes an error envelope.
/// Everything logged while handling it, adapter logs included, carries its trace id.
pub async fn handle_body(state: &AppState, body: &[u8]) -> ResponseEnvelope {
    let trace_id = uuid::Uuid::new_v4();
    respond(state, body)
        .instrument(info_span!("mcp_call", %trace_id))
        .await
}

async fn respond(state: &AppState, body: &[u8]) -> ResponseEnvelope {
    let raw: Value = match serde_json::from_slice(body) {
        Ok(raw) => raw,
        Err(e) => {
            error!("MCP parse error: {}", e);
            return ResponseEnvelope::failure(placeholder_id(), &GatewayError::Parse(e));
        }
    };
    let id = raw
        .get("id")
        .filter(|id| !id.is_null())
        .cloned()
        .unwrap_or_else(placeholder_id);

    let request: RequestEnvelope = match serde_json::from_value(raw) {
        Ok(request) => request,
        Err(e) => {
            error!("MCP envelope error: {}", e);
            return ResponseEnvelope::failure(id, &GatewayError::Parse(e));
        }
    };

    match dispatch(state, &request).await {
        Ok(result) => ResponseEnvelope::success(id, result),
        Err(e) => {
            error!(method = %request.method, "MCP error: {}", e);
            ResponseEnvelope::failure(id, &e)
        }
    }
}

pub async fn dispatch(state: &AppState, request: &RequestEnvelope) -> Result<Value, GatewayError> {
    let params = request.params.clone().unwrap_or_default();
    info!("MCP request: {} '{}'", request.method, params.name);

    match (request.method.as_str(), params.name.as_str()) {
        ("initialize", _) => Ok(initialize_result()),
        ("tools/list", _) => Ok(tools_list()),
        ("tools/call", SEARCH_TOOL) => {
            let arguments = params.arguments.unwrap_or_else(|| json!({}));
            let search = SearchProductsArgs::from_value(arguments)?.validate(state.default_platform)?;
            let result = state
                .adapter(search.platform)
                .search(&search.query, search.price_ceiling)
                .await;
            Ok(serde_json::to_value(result)?)
        }
        (method, tool) => Err(GatewayError::UnknownMethod {
            method: method.to_string(),
            tool: tool.to_string(),
        }),
    }
}

pub async fn mcp_post(State(state): State<Arc<AppState>>, body: Bytes) -> impl IntoResponse {
    let response = handle_body(&state, &body).await;
    let event = response.to_event();
    Sse::new(stream::once(async move { Ok::<_, Infallible>(event) }))
}

pub async fn mcp_options() -> Json<Value> {
    Json(json!({}))
}

pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "max_products": MAX_PRODUCTS
    }))
}

pub fn router(state: Arc<AppState>) -> Router {
    // CorsLayer answers every OPTIONS itself, so it stays off the MCP route.
    let status = Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .layer(CorsLayer::permissive());

    Router::new()
        .route("/mcp", post(mcp_post).options(mcp_options))
        .merge(status)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
