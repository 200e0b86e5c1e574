//! # Telemetry: Observability Decorators
//!
//! Tracing decorators for resolvers, plus a one-call subscriber bootstrap
//! for binaries and tests.

use crate::resolver::{BranchContext, Resolver, ResolverError};
use async_trait::async_trait;
use tracing::{Instrument, info_span};
use tracing_subscriber::EnvFilter;

/// A wrapper Resolver that records a span and the outcome of every decision.
#[derive(Debug, Clone)]
pub struct Traced<R> {
    inner: R,
    name: String,
}

impl<R> Traced<R> {
    pub fn new(inner: R, name: &str) -> Self {
        Self {
            inner,
            name: name.to_string(),
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

#[async_trait]
impl<R: Resolver> Resolver for Traced<R> {
    async fn resolve(&self, branch: &BranchContext) -> Result<String, ResolverError> {
        let span = info_span!(
            "Resolver",
            revir.resolver = %self.name,
            revir.node = %branch.node,
        );

        async move {
            tracing::debug!(history = ?branch.history, "Resolving branch");
            let start = std::time::Instant::now();

            let result = self.inner.resolve(branch).await;

            let duration = start.elapsed();
            match &result {
                Ok(outcome) => tracing::info!(%outcome, ?duration, "Branch resolved"),
                Err(e) => tracing::error!(error = %e, ?duration, "Branch resolution failed"),
            }
            result
        }
        .instrument(span)
        .await
    }
}

/// Install a `fmt` subscriber filtered by `RUST_LOG` (default `info`).
///
/// Safe to call more than once; only the first call installs anything.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::resolver_fn;

    #[tokio::test]
    async fn test_traced_passes_outcome_through() {
        init_tracing();
        let traced = Traced::new(
            resolver_fn(|_| async { Ok::<_, ResolverError>("Ready".to_string()) }),
            "payroll",
        );
        let branch = BranchContext {
            node: "EnterRunPayroll".into(),
            props: serde_json::Value::Null,
            history: Vec::new(),
        };
        assert_eq!(traced.resolve(&branch).await.unwrap(), "Ready");
    }
}
