//! Rasterization backend contract.
//!
//! Rendering an element is split in three phases so that a caller can
//! mutate the DOM transiently around [`RasterBackend::prepare`], revert
//! it, and only then wait for resources:
//!
//! 1. `prepare` snapshots the element into an off-DOM [`RenderJob`];
//! 2. `ready` resolves once every resource referenced by prepared jobs
//!    has loaded;
//! 3. `paint` turns a job into pixels.

use crate::error::RasterResult;
use crate::pixel_buffer::PixelBuffer;
use async_trait::async_trait;
use common::{Color, Rect};
use dom::{DomTree, NodeId};
use serde::{Deserialize, Serialize};

/// Per-job rendering parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RenderOptions {
    /// Device pixels per CSS pixel.
    pub pixel_ratio: f32,
    /// Accept resources from other origins.
    pub allow_taint: bool,
    /// Origin of the document; resources from elsewhere taint the canvas.
    pub origin: Option<String>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            pixel_ratio: 1.0,
            allow_taint: false,
            origin: None,
        }
    }
}

/// One painted box of a job, relative to the job's top-left corner.
#[derive(Clone, Debug, PartialEq)]
pub struct PaintBox {
    pub rect: Rect,
    pub background: Option<Color>,
    /// Image resource drawn over the background.
    pub image: Option<String>,
}

/// Snapshot of an element subtree, independent of later DOM changes.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderJob {
    pub element: NodeId,
    /// Viewport bounds of the element when the job was prepared.
    pub bounds: Rect,
    pub options: RenderOptions,
    /// Boxes in paint order.
    pub boxes: Vec<PaintBox>,
}

impl RenderJob {
    pub fn new(element: NodeId, bounds: Rect, options: RenderOptions) -> Self {
        Self {
            element,
            bounds,
            options,
            boxes: Vec::new(),
        }
    }

    pub fn push(&mut self, paint_box: PaintBox) {
        self.boxes.push(paint_box);
    }

    /// Image resources the job needs.
    pub fn resources(&self) -> impl Iterator<Item = &str> {
        self.boxes.iter().filter_map(|b| b.image.as_deref())
    }

    /// Device pixel size of the output bitmap.
    pub fn pixel_size(&self) -> (u32, u32) {
        let rect = self.bounds.to_pixel_rect(self.options.pixel_ratio);
        (rect.width.max(1), rect.height.max(1))
    }
}

/// DOM-to-bitmap rasterization engine.
#[async_trait]
pub trait RasterBackend: Send {
    /// Snapshot `element` (with descendants) as laid out at `bounds`.
    fn prepare(
        &mut self,
        dom: &DomTree,
        element: NodeId,
        bounds: Rect,
        options: &RenderOptions,
    ) -> RasterResult<RenderJob>;

    /// Resolve once resources of every job prepared so far are available.
    async fn ready(&mut self) -> RasterResult<()>;

    /// Paint a prepared job.
    fn paint(&mut self, job: &RenderJob) -> RasterResult<PixelBuffer>;
}
