use std::time::Duration;
use thiserror::Error;

/// JSON-RPC code for an unknown method or tool.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// JSON-RPC code for everything else that goes wrong during dispatch.
pub const INTERNAL_ERROR: i64 = -32603;

/// Failures of a single headless browser session.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("browser launch failed: {0}")]
    Launch(String),
    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },
    #[error("navigation to {url} timed out after {}ms", .timeout.as_millis())]
    NavigationTimeout { url: String, timeout: Duration },
    #[error("devtools protocol error: {0}")]
    Protocol(String),
}

/// Session-level scrape failures. Any of these makes the adapter fall back.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Browser(#[from] BrowserError),
    #[error("invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },
    #[error("no result items matched '{selector}' on {url}")]
    NoCandidates { selector: String, url: String },
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("malformed request: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Unknown: {method}/{tool}")]
    UnknownMethod { method: String, tool: String },
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
}

impl GatewayError {
    pub fn code(&self) -> i64 {
        match self {
            GatewayError::UnknownMethod { .. } => METHOD_NOT_FOUND,
            GatewayError::Parse(_) | GatewayError::InvalidArguments(_) => INTERNAL_ERROR,
        }
    }
}
