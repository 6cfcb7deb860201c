//! Method table and dispatch.
//!
//! Every call runs under the registry's handler timeout. Failures never
//! escape as Rust errors: unknown methods, handler errors and timeouts all
//! come back as an error [`RpcResponse`] carrying the request ID.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::{counter, histogram};
use parley_rpc::errors::{self, RpcError};
use parley_rpc::types::{RpcRequest, RpcResponse};
use serde_json::Value;
use tracing::{error, warn};

use crate::metrics::{RPC_ERRORS_TOTAL, RPC_REQUEST_DURATION_SECONDS, RPC_REQUESTS_TOTAL};
use crate::rpc::context::RpcContext;

/// Calls slower than this are logged.
const SLOW_CALL: Duration = Duration::from_secs(1);

/// One RPC method.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    /// Run the method.
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError>;
}

/// How a dispatched call ended, for metrics labels.
enum Outcome {
    Ok(Value),
    Failed(RpcError),
    TimedOut,
}

/// Method name → handler.
pub struct MethodRegistry {
    handlers: BTreeMap<&'static str, Arc<dyn MethodHandler>>,
    timeout: Duration,
}

impl MethodRegistry {
    /// Default per-call handler timeout.
    pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(30);

    /// Empty registry with the default timeout.
    pub fn new() -> Self {
        Self {
            handlers: BTreeMap::new(),
            timeout: Self::DEFAULT_HANDLER_TIMEOUT,
        }
    }

    /// Use `timeout` for every call instead of the default.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Add `handler` under `method`. A later registration of the same name
    /// wins.
    pub fn register(&mut self, method: &'static str, handler: impl MethodHandler + 'static) {
        let _ = self.handlers.insert(method, Arc::new(handler));
    }

    /// Run `request` and build its response.
    pub async fn dispatch(&self, request: RpcRequest, ctx: &RpcContext) -> RpcResponse {
        let RpcRequest { id, method, params } = request;
        counter!(RPC_REQUESTS_TOTAL, "method" => method.clone()).increment(1);

        let Some(handler) = self.handlers.get(method.as_str()) else {
            counter!(RPC_ERRORS_TOTAL, "method" => method.clone(), "error_type" => "method_not_found")
                .increment(1);
            return RpcResponse::error(id, errors::METHOD_NOT_FOUND, format!("Method '{method}' not found"));
        };

        let started = Instant::now();
        let outcome = match tokio::time::timeout(self.timeout, handler.handle(params, ctx)).await {
            Ok(Ok(value)) => Outcome::Ok(value),
            Ok(Err(err)) => Outcome::Failed(err),
            Err(_elapsed) => Outcome::TimedOut,
        };
        let elapsed = started.elapsed();
        histogram!(RPC_REQUEST_DURATION_SECONDS, "method" => method.clone()).record(elapsed.as_secs_f64());
        if elapsed >= SLOW_CALL {
            warn!(%method, elapsed_ms = elapsed.as_millis() as u64, "slow RPC call");
        }

        match outcome {
            Outcome::Ok(value) => RpcResponse::success(id, value),
            Outcome::Failed(err) => {
                counter!(RPC_ERRORS_TOTAL, "method" => method, "error_type" => err.code().to_owned())
                    .increment(1);
                RpcResponse::from_error(id, &err)
            }
            Outcome::TimedOut => {
                error!(%method, timeout = ?self.timeout, "RPC handler timed out");
                let message = format!("Handler for '{method}' timed out");
                counter!(RPC_ERRORS_TOTAL, "method" => method, "error_type" => "timeout").increment(1);
                RpcResponse::error(id, errors::INTERNAL_ERROR, message)
            }
        }
    }

    /// Registered method names, sorted.
    pub fn methods(&self) -> Vec<&'static str> {
        self.handlers.keys().copied().collect()
    }

    /// Whether `method` is registered.
    pub fn has_method(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new()
    }
}
