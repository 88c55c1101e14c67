//! Rasterization for the layer tree.
//!
//! This crate handles:
//! - The backend contract turning a DOM subtree into a bitmap
//! - RGBA pixel buffers and image decoding
//! - Textures (bitmaps or live video)
//! - Resource loading and canvas taint checks
//! - A software reference backend

pub mod backend;
pub mod error;
pub mod image_data;
pub mod loader;
pub mod pixel_buffer;
pub mod software;
pub mod texture;

pub use backend::{PaintBox, RasterBackend, RenderJob, RenderOptions};
pub use error::{RasterError, RasterResult};
pub use image_data::ImageData;
pub use loader::{MemoryLoader, ResourceLoader};
pub use pixel_buffer::PixelBuffer;
pub use software::SoftwareRasterizer;
pub use texture::{Texture, TextureId, TextureSource};
