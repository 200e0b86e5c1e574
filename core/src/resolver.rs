//! Resolver - Asynchronous Branch Decisions
//!
//! A node that carries a resolver is a *branch node*: instead of waiting for
//! the application to pick a transition, the flow asks the resolver which
//! transition to take.

use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use thiserror::Error;

/// What a resolver is told about the branch it decides.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchContext {
    /// Name of the branch node being resolved.
    pub node: String,
    /// Payload attached to the branch node.
    pub props: Value,
    /// Back-navigation history at the time the branch was entered.
    pub history: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("Resolver failed: {0}")]
    Failed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// The contract for a branch decision.
///
/// The returned string is a transition name looked up in the branch node's
/// transition table, exactly as if the application had requested it.
#[async_trait]
pub trait Resolver: Send + Sync + 'static {
    async fn resolve(&self, branch: &BranchContext) -> Result<String, ResolverError>;
}

/// Resolver backed by an async closure. Built with [`resolver_fn`].
#[derive(Clone)]
pub struct FnResolver<F> {
    f: F,
}

/// Wrap an async closure as a [`Resolver`].
///
/// ```rust
/// use revir_core::resolver::{ResolverError, resolver_fn};
///
/// let ready = resolver_fn(|_branch| async { Ok::<_, ResolverError>("Ready".to_string()) });
/// # let _ = ready;
/// ```
pub fn resolver_fn<F, Fut>(f: F) -> FnResolver<F>
where
    F: Fn(BranchContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<String, ResolverError>> + Send + 'static,
{
    FnResolver { f }
}

#[async_trait]
impl<F, Fut> Resolver for FnResolver<F>
where
    F: Fn(BranchContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<String, ResolverError>> + Send + 'static,
{
    async fn resolve(&self, branch: &BranchContext) -> Result<String, ResolverError> {
        (self.f)(branch.clone()).await
    }
}

impl<F> std::fmt::Debug for FnResolver<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnResolver").finish()
    }
}
