//! Shared primitives for the layer workspace: 2D geometry in CSS pixels,
//! colors, and the layer error type.

pub mod color;
pub mod error;
pub mod geometry;

pub use color::Color;
pub use error::{LayerError, LayerResult};
pub use geometry::{PixelRect, Point, Rect, Size};
