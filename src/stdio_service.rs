use rmcp::{model::*, ServiceExt};
use std::sync::Arc;
use tracing::{error, info};

use crate::error::GatewayError;
use crate::mcp::{search_products_description, search_products_schema, SEARCH_TOOL};
use crate::types::SearchProductsArgs;
use crate::AppState;

/// `search_products` over the stdio MCP transport.
#[derive(Clone)]
pub struct McpService {
    pub state: Arc<AppState>,
}

impl McpService {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    async fn search_products(&self, arguments: Option<JsonObject>) -> Result<CallToolResult, ErrorData> {
        let arguments = arguments.ok_or_else(|| {
            ErrorData::new(ErrorCode::INVALID_PARAMS, "Missing required arguments object", None)
        })?;
        let request = SearchProductsArgs::from_value(serde_json::Value::Object(arguments))
            .and_then(|args| args.validate(self.state.default_platform))
            .map_err(|e| ErrorData::new(ErrorCode::INVALID_PARAMS, e.to_string(), None))?;

        let result = self
            .state
            .adapter(request.platform)
            .search(&request.query, request.price_ceiling)
            .await;

        let text = serde_json::to_string(&result).map_err(|e| {
            error!("Failed to serialize search result: {}", e);
            ErrorData::new(ErrorCode::INTERNAL_ERROR, GatewayError::from(e).to_string(), None)
        })?;
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }
}

impl rmcp::ServerHandler for McpService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Searches Amazon India and Flipkart for products under a price ceiling. \
                 Results are cached for a few minutes; placeholder products are returned when a site cannot be read."
                    .to_string(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _page: Option<PaginatedRequestParam>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        let tool = Tool::new(
            SEARCH_TOOL,
            search_products_description(),
            Arc::new(search_products_schema()),
        );

        Ok(ListToolsResult {
            tools: vec![tool],
            ..Default::default()
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        info!("MCP tool call: {} with args: {:?}", request.name, request.arguments);

        match request.name.as_ref() {
            SEARCH_TOOL => self.search_products(request.arguments).await,
            other => Err(ErrorData::new(
                ErrorCode::METHOD_NOT_FOUND,
                GatewayError::UnknownMethod {
                    method: "tools/call".to_string(),
                    tool: other.to_string(),
                }
                .to_string(),
                None,
            )),
        }
    }
}

pub async fn run(state: Arc<AppState>) -> anyhow::Result<()> {
    let service = McpService::new(state);
    let server = service.serve(rmcp::transport::stdio()).await?;
    info!("MCP stdio server running");
    let quit_reason = server.waiting().await?;
    info!("MCP stdio server stopped: {:?}", quit_reason);
    Ok(())
}
