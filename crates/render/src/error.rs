//! Rasterization errors.

use dom::NodeId;
use thiserror::Error;

/// Failure of a single render job.
///
/// These never abort a layer tree pass; the caller keeps the previous
/// texture and logs the error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RasterError {
    #[error("Canvas tainted by cross-origin resource: {url}")]
    Tainted { url: String },

    #[error("Failed to load resource {url}: {reason}")]
    ResourceLoad { url: String, reason: String },

    #[error("Failed to decode image {0}")]
    Decode(String),

    #[error("Resource {0} was not loaded before painting")]
    NotReady(String),

    #[error("Node {0:?} is not a renderable element")]
    NotRenderable(NodeId),

    #[error("Render target is empty")]
    EmptyBounds,
}

pub type RasterResult<T> = Result<T, RasterError>;

impl RasterError {
    pub fn load(url: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::ResourceLoad {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn tainted(url: impl Into<String>) -> Self {
        Self::Tainted { url: url.into() }
    }
}
