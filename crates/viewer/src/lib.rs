//! Headless viewer for layer trees.
//!
//! Loads a JSON scene, drives a [`weblayer::LayerTree`] for a number of
//! frames and reports or exports the result.

pub mod app;
pub mod scene;

pub use app::{Viewer, ViewerOptions};
pub use scene::{Scene, SceneError, SceneFile, SceneNode};

/// Viewer version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
