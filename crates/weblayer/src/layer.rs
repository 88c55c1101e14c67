//! Layer nodes.

use crate::attributes::{LayerAttributes, MIN_PIXEL_RATIO};
use common::Rect;
use dom::NodeId;
use glam::{Affine3A, Quat, Vec3};
use indexmap::IndexMap;
use render::Texture;
use serde::Serialize;
use slotmap::new_key_type;
use smallvec::SmallVec;

new_key_type! {
    /// Handle of a layer inside its tree.
    pub struct LayerId;
}

/// Smallest extent of a content plane, in world units.
pub const MIN_CONTENT_SCALE: f32 = 1e-5;

/// What a layer draws. Resolved once when the layer is discovered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum LayerKind {
    /// Content rasterized from the element subtree.
    Element,
    /// Live frames of a `video` element.
    Video,
}

/// How a layer's own transform is driven.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Placement {
    /// Target position follows the element's DOM box.
    Dom,
    /// The host owns the target transform.
    Free,
}

/// Position, scale and orientation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub scale: Vec3,
    pub orientation: Quat,
}

impl Pose {
    pub const IDENTITY: Pose = Pose {
        position: Vec3::ZERO,
        scale: Vec3::ONE,
        orientation: Quat::IDENTITY,
    };

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }

    pub fn matrix(&self) -> Affine3A {
        Affine3A::from_scale_rotation_translation(self.scale, self.orientation, self.position)
    }

    /// Move toward `target` by `alpha` (`0` keeps, `1` snaps).
    pub fn approach(&mut self, target: &Pose, alpha: f32) {
        self.position = self.position.lerp(target.position, alpha);
        self.scale = self.scale.lerp(target.scale, alpha);
        self.orientation = self.orientation.slerp(target.orientation, alpha);
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Cached rasterization of one state at one hover slot.
#[derive(Clone, Debug, Default)]
pub struct StateSlot {
    /// Empty until the first successful rasterization.
    pub texture: Option<Texture>,
    /// Element bounds captured when the slot was rasterized.
    pub bounds: Rect,
}

/// Slots `0..=hover_depth` of one state.
pub type HoverSlots = SmallVec<[StateSlot; 2]>;

/// Coarse rasterization status, derived from the layer's flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum RasterStatus {
    Unrasterized,
    Queued,
    Rasterized,
    Dirty,
}

/// The per-element node bridging a DOM element to a textured plane.
#[derive(Clone, Debug)]
pub struct LayerNode {
    /// Value of the element's marker attribute.
    pub(crate) id: u32,
    pub(crate) element: NodeId,
    pub(crate) kind: LayerKind,
    pub(crate) parent: Option<LayerId>,
    /// Attached children, including ones still fading out.
    pub(crate) children: Vec<LayerId>,
    /// Children found by the latest DOM traversal, in DOM order.
    pub(crate) child_layers: Vec<LayerId>,
    /// DOM depth below the parent layer's element.
    pub(crate) level: u32,

    pub(crate) attributes: LayerAttributes,
    pub(crate) states: IndexMap<String, HoverSlots>,
    pub(crate) current_state: String,
    pub(crate) current_hover: u32,
    pub(crate) bounds: Rect,

    pub(crate) placement: Placement,
    pub(crate) pose: Pose,
    pub(crate) target: Pose,
    pub(crate) content: Pose,
    pub(crate) content_target: Pose,
    pub(crate) content_opacity: f32,
    pub(crate) content_target_opacity: f32,
    pub(crate) visible: bool,
    pub(crate) laid_out: bool,

    /// Directly hit or an ancestor of a hit layer.
    pub(crate) hovered: bool,
    pub(crate) hover: u32,
    /// Local hit point while a ray rests on this layer.
    pub(crate) cursor: Option<Vec3>,

    pub(crate) needs_rasterize: bool,
    pub(crate) needs_removal: bool,
    pub(crate) queued: bool,
    pub(crate) rasterized: bool,
}

impl LayerNode {
    pub(crate) fn new(
        id: u32,
        element: NodeId,
        kind: LayerKind,
        attributes: LayerAttributes,
    ) -> Self {
        let mut layer = Self {
            id,
            element,
            kind,
            parent: None,
            children: Vec::new(),
            child_layers: Vec::new(),
            level: 0,
            attributes: LayerAttributes::default(),
            states: IndexMap::new(),
            current_state: String::new(),
            current_hover: 0,
            bounds: Rect::ZERO,
            placement: Placement::Dom,
            pose: Pose::IDENTITY,
            target: Pose::IDENTITY,
            content: Pose::IDENTITY,
            content_target: Pose::IDENTITY,
            content_opacity: 0.0,
            content_target_opacity: 0.0,
            visible: false,
            laid_out: false,
            hovered: false,
            hover: 0,
            cursor: None,
            needs_rasterize: kind == LayerKind::Element,
            needs_removal: false,
            queued: false,
            rasterized: false,
        };
        layer.apply_attributes(attributes);
        layer
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn element(&self) -> NodeId {
        self.element
    }

    pub fn kind(&self) -> LayerKind {
        self.kind
    }

    pub fn parent(&self) -> Option<LayerId> {
        self.parent
    }

    pub fn children(&self) -> &[LayerId] {
        &self.children
    }

    pub fn child_layers(&self) -> &[LayerId] {
        &self.child_layers
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    /// Declared states, default first.
    pub fn declared_states(&self) -> &[String] {
        &self.attributes.states
    }

    pub fn hover_depth(&self) -> u32 {
        self.attributes.hover_depth
    }

    /// Pixel ratio multiplier declared on the element.
    pub fn pixel_ratio(&self) -> f32 {
        self.attributes.pixel_ratio.max(MIN_PIXEL_RATIO)
    }

    pub fn current_state(&self) -> &str {
        &self.current_state
    }

    pub fn current_hover(&self) -> u32 {
        self.current_hover
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn placement(&self) -> Placement {
        self.placement
    }

    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    pub fn target(&self) -> &Pose {
        &self.target
    }

    pub fn content_pose(&self) -> &Pose {
        &self.content
    }

    pub fn content_target(&self) -> &Pose {
        &self.content_target
    }

    pub fn content_opacity(&self) -> f32 {
        self.content_opacity
    }

    pub fn content_target_opacity(&self) -> f32 {
        self.content_target_opacity
    }

    /// Whether the content mesh is drawn this frame.
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_hovered(&self) -> bool {
        self.hovered
    }

    pub fn hover(&self) -> u32 {
        self.hover
    }

    pub fn cursor(&self) -> Option<Vec3> {
        self.cursor
    }

    pub fn needs_rasterize(&self) -> bool {
        self.needs_rasterize
    }

    pub fn needs_removal(&self) -> bool {
        self.needs_removal
    }

    pub fn is_queued(&self) -> bool {
        self.queued
    }

    /// Options as last read from the element.
    pub fn attributes(&self) -> &LayerAttributes {
        &self.attributes
    }

    pub fn states(&self) -> &IndexMap<String, HoverSlots> {
        &self.states
    }

    pub fn slot(&self, state: &str, hover: u32) -> Option<&StateSlot> {
        self.states.get(state)?.get(hover as usize)
    }

    /// Texture for the current state and hover slot.
    pub fn current_texture(&self) -> Option<&Texture> {
        self.slot(&self.current_state, self.current_hover)?
            .texture
            .as_ref()
    }

    pub fn raster_status(&self) -> RasterStatus {
        if self.queued {
            RasterStatus::Queued
        } else if !self.rasterized {
            RasterStatus::Unrasterized
        } else if self.needs_rasterize {
            RasterStatus::Dirty
        } else {
            RasterStatus::Rasterized
        }
    }

    /// Host-driven target transform; switches the layer to free placement.
    pub fn set_target(&mut self, target: Pose) {
        self.placement = Placement::Free;
        self.target = target;
    }

    pub fn set_placement(&mut self, placement: Placement) {
        self.placement = placement;
    }

    /// Replace the declared options, keeping slots of states still declared.
    pub(crate) fn apply_attributes(&mut self, attributes: LayerAttributes) {
        let slot_count = attributes.hover_depth as usize + 1;
        self.states.retain(|state, _| attributes.states.contains(state));
        for state in &attributes.states {
            let slots = self.states.entry(state.clone()).or_default();
            slots.resize_with(slot_count, StateSlot::default);
        }
        // Keep declaration order.
        let position = |state: &String| attributes.states.iter().position(|s| s == state);
        self.states.sort_by(|a, _, b, _| position(a).cmp(&position(b)));
        self.attributes = attributes;
    }

    /// Mark this node as going away; content updates stop from now on.
    pub(crate) fn mark_removal(&mut self) {
        self.needs_removal = true;
        self.needs_rasterize = false;
        self.content_target_opacity = 0.0;
    }

    /// Opacity target implied by bounds, texture and removal.
    pub(crate) fn update_target_opacity(&mut self) {
        let visible =
            !self.bounds.is_empty() && !self.needs_removal && self.current_texture().is_some();
        self.content_target_opacity = if visible { 1.0 } else { 0.0 };
    }

    /// Drop every cached texture.
    pub(crate) fn release_textures(&mut self) {
        for slots in self.states.values_mut() {
            for slot in slots.iter_mut() {
                slot.texture = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use render::PixelBuffer;
    use slotmap::SlotMap;

    fn node_id() -> NodeId {
        let mut keys: SlotMap<NodeId, ()> = SlotMap::with_key();
        keys.insert(())
    }

    fn bitmap() -> Texture {
        Texture::bitmap(PixelBuffer::new(1, 1))
    }

    fn attributes(states: &[&str], hover_depth: u32) -> LayerAttributes {
        let mut all = vec![String::new()];
        all.extend(states.iter().map(|s| s.to_string()));
        LayerAttributes {
            states: all,
            hover_depth,
            pixel_ratio: 1.0,
        }
    }

    #[test]
    fn test_slots_follow_declaration() {
        let layer = LayerNode::new(1, node_id(), LayerKind::Element, attributes(&["open"], 2));
        assert_eq!(layer.states().len(), 2);
        assert_eq!(layer.states()["open"].len(), 3);
        assert!(layer.needs_rasterize());
        assert_eq!(layer.raster_status(), RasterStatus::Unrasterized);
    }

    #[test]
    fn test_prune_undeclared_states() {
        let mut layer =
            LayerNode::new(1, node_id(), LayerKind::Element, attributes(&["a", "b"], 0));
        layer.states.get_mut("b").unwrap()[0].texture = Some(bitmap());
        layer.states.get_mut("a").unwrap()[0].texture = Some(bitmap());

        layer.apply_attributes(attributes(&["b"], 0));
        assert!(layer.slot("a", 0).is_none());
        assert!(layer.slot("b", 0).unwrap().texture.is_some());
        assert_eq!(layer.states().keys().collect::<Vec<_>>(), vec!["", "b"]);
    }

    #[test]
    fn test_target_opacity() {
        let mut layer = LayerNode::new(1, node_id(), LayerKind::Element, attributes(&[], 0));
        layer.bounds = Rect::new(0.0, 0.0, 10.0, 10.0);
        layer.update_target_opacity();
        assert_eq!(layer.content_target_opacity(), 0.0);

        layer.states.get_mut("").unwrap()[0].texture = Some(bitmap());
        layer.update_target_opacity();
        assert_eq!(layer.content_target_opacity(), 1.0);

        layer.bounds = Rect::new(0.0, 0.0, 0.0, 10.0);
        layer.update_target_opacity();
        assert_eq!(layer.content_target_opacity(), 0.0);
    }

    #[test]
    fn test_pose_approach() {
        let mut pose = Pose::IDENTITY;
        let target = Pose {
            position: Vec3::new(2.0, 0.0, 0.0),
            scale: Vec3::splat(3.0),
            orientation: Quat::from_rotation_z(1.0),
        };
        pose.approach(&target, 0.5);
        assert!((pose.position.x - 1.0).abs() < 1e-6);
        assert!((pose.scale.x - 2.0).abs() < 1e-6);

        pose.approach(&target, 1.0);
        assert!(pose.orientation.abs_diff_eq(target.orientation, 1e-5));
    }
}
