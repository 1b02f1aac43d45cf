//! # Request Executor Contract
//!
//! Purpose: the one trait the scenario runner depends on to actually send a
//! request. Sending HTTP itself is out of scope for this crate — a
//! collaborator supplies the implementation (a thin `reqwest` wrapper, a
//! mock for tests, a protocol other than HTTP entirely).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

/// A request template with every `{{var}}` placeholder already resolved.
#[derive(Debug, Clone)]
pub struct ResolvedRequest {
    pub name: String,
    pub method: String,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
    pub timeout: Duration,
}

/// What a `RequestExecutor` reports back for one resolved request.
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    pub latency: Duration,
    pub bytes: u64,
    /// `success = (error.is_none() && status_code < 400)`, per the external
    /// interface contract; the executor implementation is responsible for
    /// applying that rule before reporting it here.
    pub success: bool,
    pub error: Option<String>,
}

/// Executes one resolved request. Implementations bind the transport
/// (connection pooling, TLS, retries) the scenario runner knows nothing
/// about.
#[async_trait]
pub trait RequestExecutor: Send + Sync {
    async fn execute(&self, request: &ResolvedRequest) -> RequestOutcome;
}
