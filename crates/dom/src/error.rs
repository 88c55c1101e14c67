//! DOM error types.

use crate::node::NodeId;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomError {
    #[error("Node not found: {0:?}")]
    NotFound(NodeId),

    #[error("Node {0:?} is not an element")]
    NotAnElement(NodeId),

    #[error("Cannot insert {child:?} into {parent:?}: would create a cycle")]
    HierarchyRequest { parent: NodeId, child: NodeId },

    #[error("Invalid mutation observer options: {0}")]
    InvalidObserverOptions(&'static str),

    #[error("Unknown mutation observer")]
    UnknownObserver,
}

pub type DomResult<T> = Result<T, DomError>;

impl From<DomError> for common::LayerError {
    fn from(err: DomError) -> Self {
        common::LayerError::dom(err.to_string())
    }
}
