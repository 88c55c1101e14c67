//! DOM (Document Object Model) implementation.
//!
//! An arena-backed DOM tree whose mutations are recorded and delivered to
//! mutation observers, plus the geometry probe and subtree walker used by
//! the layer tree.

pub mod attributes;
pub mod element;
pub mod error;
pub mod geometry;
pub mod mutation_observer;
pub mod node;
mod selector;
pub mod tree;
pub mod walker;

pub use attributes::{AttributeMap, DataAttributes};
pub use element::{ElementData, ElementFlags, TagName};
pub use error::{DomError, DomResult};
pub use geometry::{BoxGeometry, GeometryProbe};
pub use mutation_observer::{MutationObserverId, MutationObserverInit, MutationRecord, MutationType};
pub use node::{Node, NodeData, NodeId, NodeType};
pub use tree::DomTree;
pub use walker::{traverse_child_elements, Visit};
