//! DOM-driven 3D layers.
//!
//! Elements marked with `data-layer` become textured planes in a scene
//! graph that mirrors the DOM. This crate handles:
//! - Layer discovery, identity and removal as the DOM changes
//! - Per state × hover slot texture caching
//! - Layout of planes from DOM bounds
//! - Ray interaction and hover propagation back into the DOM
//! - Queued rasterization driven by idle time or a frame budget

pub mod attributes;
pub mod config;
pub mod hit_test;
pub mod layer;
mod raster;
pub mod registry;
pub mod scheduler;
pub mod snapshot;
pub mod transition;
pub mod tree;

pub use attributes::{LayerAttributes, HOVER_CLASS, LAYER_ATTR};
pub use config::{LayerCallback, LayerConfig, LayerEvent};
pub use hit_test::{Intersection, LayerHit, Ray};
pub use layer::{LayerId, LayerKind, LayerNode, Placement, Pose, RasterStatus, StateSlot};
pub use snapshot::{LayerSnapshot, RasterStats};
pub use transition::{DefaultTransition, Transition, TransitionStrategy, HIDDEN_OPACITY};
pub use tree::LayerTree;
