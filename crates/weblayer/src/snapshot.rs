//! Serializable views of a layer tree for inspection.

use crate::layer::{LayerKind, LayerNode, Placement, RasterStatus};
use common::Rect;
use render::TextureId;
use serde::Serialize;

/// Rasterization counters of one tree.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RasterStats {
    /// Layers taken from the queue and rasterized.
    pub layers_rasterized: u64,
    /// Render jobs handed to the backend.
    pub jobs_prepared: u64,
    /// Textures committed to state slots.
    pub textures_committed: u64,
    /// Jobs that failed to prepare or paint.
    pub failures: u64,
    /// Queue drains run, idle or fallback.
    pub drains: u64,
}

/// One layer and its attached children.
#[derive(Clone, Debug, Serialize)]
pub struct LayerSnapshot {
    pub id: u32,
    pub tag: String,
    pub kind: LayerKind,
    pub placement: Placement,
    pub status: RasterStatus,
    pub state: String,
    pub hover: u32,
    pub hover_depth: u32,
    pub states: Vec<String>,
    pub bounds: Rect,
    pub position: [f32; 3],
    pub content_scale: [f32; 3],
    pub opacity: f32,
    pub target_opacity: f32,
    pub needs_removal: bool,
    pub texture: Option<TextureId>,
    pub children: Vec<LayerSnapshot>,
}

impl LayerSnapshot {
    pub(crate) fn of(layer: &LayerNode, tag: String, children: Vec<LayerSnapshot>) -> Self {
        Self {
            id: layer.id(),
            tag,
            kind: layer.kind(),
            placement: layer.placement(),
            status: layer.raster_status(),
            state: layer.current_state().to_string(),
            hover: layer.hover(),
            hover_depth: layer.hover_depth(),
            states: layer.declared_states().to_vec(),
            bounds: layer.bounds(),
            position: layer.pose().position.to_array(),
            content_scale: layer.content_pose().scale.to_array(),
            opacity: layer.content_opacity(),
            target_opacity: layer.content_target_opacity(),
            needs_removal: layer.needs_removal(),
            texture: layer.current_texture().map(|t| t.id()),
            children,
        }
    }

    /// Number of layers in this snapshot, itself included.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(LayerSnapshot::count).sum::<usize>()
    }
}
