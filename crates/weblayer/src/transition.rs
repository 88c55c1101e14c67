//! Per-frame interpolation toward layer targets.

use crate::layer::LayerNode;

/// Opacity below which a content mesh is not drawn.
pub const HIDDEN_OPACITY: f32 = 0.005;

/// Outcome of a transition step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Keep,
    /// Detach the layer and release its resources.
    Remove,
}

/// Moves a layer toward its targets each frame.
///
/// Returning [`Transition::Remove`] is the only way a layer leaves the tree.
pub trait TransitionStrategy {
    fn transition(&self, layer: &mut LayerNode, alpha: f32) -> Transition;
}

/// Lerp/slerp toward the target transforms and opacity.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultTransition;

impl TransitionStrategy for DefaultTransition {
    fn transition(&self, layer: &mut LayerNode, alpha: f32) -> Transition {
        let alpha = alpha.clamp(0.0, 1.0);

        let target = layer.target;
        layer.pose.approach(&target, alpha);
        let content_target = layer.content_target;
        layer.content.approach(&content_target, alpha);

        let opacity = layer.content_opacity
            + (layer.content_target_opacity - layer.content_opacity) * alpha;
        layer.content_opacity = opacity.min(1.0);
        layer.visible = layer.content_opacity >= HIDDEN_OPACITY;

        if !layer.visible && layer.needs_removal {
            Transition::Remove
        } else {
            Transition::Keep
        }
    }
}

/// Applies a closure, for tests and ad-hoc animation.
impl<F> TransitionStrategy for F
where
    F: Fn(&mut LayerNode, f32) -> Transition,
{
    fn transition(&self, layer: &mut LayerNode, alpha: f32) -> Transition {
        self(layer, alpha)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::LayerAttributes;
    use crate::layer::{LayerKind, Pose};
    use dom::NodeId;
    use glam::Vec3;
    use slotmap::SlotMap;

    fn layer() -> LayerNode {
        let mut keys: SlotMap<NodeId, ()> = SlotMap::with_key();
        LayerNode::new(1, keys.insert(()), LayerKind::Element, LayerAttributes::default())
    }

    #[test]
    fn test_opacity_rises_and_clamps() {
        let mut layer = layer();
        layer.content_target_opacity = 1.0;

        assert_eq!(DefaultTransition.transition(&mut layer, 0.5), Transition::Keep);
        assert!((layer.content_opacity() - 0.5).abs() < 1e-6);
        assert!(layer.is_visible());

        DefaultTransition.transition(&mut layer, 4.0);
        assert_eq!(layer.content_opacity(), 1.0);
    }

    #[test]
    fn test_removal_waits_for_fade() {
        let mut layer = layer();
        layer.content_opacity = 1.0;
        layer.visible = true;
        layer.mark_removal();

        assert_eq!(DefaultTransition.transition(&mut layer, 0.5), Transition::Keep);
        let mut steps = 0;
        while DefaultTransition.transition(&mut layer, 0.5) == Transition::Keep {
            steps += 1;
            assert!(layer.content_opacity() >= HIDDEN_OPACITY);
        }
        assert!(steps > 0);
        assert!(layer.content_opacity() < HIDDEN_OPACITY);
    }

    #[test]
    fn test_pose_interpolation() {
        let mut layer = layer();
        layer.target = Pose::from_position(Vec3::new(1.0, -1.0, 0.5));
        DefaultTransition.transition(&mut layer, 0.25);
        assert!((layer.pose().position.x - 0.25).abs() < 1e-6);
        DefaultTransition.transition(&mut layer, 1.0);
        assert_eq!(layer.pose().position, Vec3::new(1.0, -1.0, 0.5));
    }

    #[test]
    fn test_closure_strategy() {
        let mut layer = layer();
        let remove_all = |_: &mut LayerNode, _: f32| Transition::Remove;
        assert_eq!(remove_all.transition(&mut layer, 1.0), Transition::Remove);
    }
}
