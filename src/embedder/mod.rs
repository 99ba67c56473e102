//! Embedding collaborators.
//!
//! Everything that turns text into a vector sits behind [`Embedder`], so the
//! gold builder and the candidate runner can run against the deterministic
//! [`HashEmbedder`] in tests and against a live service in production.

mod hashing;
mod http;
#[cfg(feature = "local-model")]
mod local;
mod retry;

use crate::error::EmbedError;
use async_trait::async_trait;

pub use hashing::HashEmbedder;
pub use http::HttpEmbedder;
#[cfg(feature = "local-model")]
pub use local::LocalEmbedder;
pub use retry::{RetryConfig, RetryingEmbedder};

/// Maps text to a fixed-dimension vector.
///
/// Implementations must be side-effect free: the builder issues calls
/// concurrently and in any order.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Embed `text` with the model identified by `model_id`.
    async fn embed(&self, text: &str, model_id: &str) -> Result<Vec<f32>, EmbedError>;
}

#[async_trait]
impl<E: Embedder + ?Sized> Embedder for std::sync::Arc<E> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn embed(&self, text: &str, model_id: &str) -> Result<Vec<f32>, EmbedError> {
        (**self).embed(text, model_id).await
    }
}
