//! Declarative attributes read from layer elements.

use dom::{DomTree, ElementData, NodeId};

/// Marks an element as a layer boundary; its value is the layer id.
pub const LAYER_ATTR: &str = "data-layer";
/// Float multiplier applied to the global pixel ratio.
pub const PIXEL_RATIO_ATTR: &str = "data-layer-pixel-ratio";
/// Whitespace separated list of state classes.
pub const STATES_ATTR: &str = "data-layer-states";
/// Number of ancestor levels eligible for synthesized hover classes.
pub const HOVER_DEPTH_ATTR: &str = "data-layer-hover-depth";
/// Set on the document element while render jobs are prepared.
pub const DISABLE_TRANSFORMS_ATTR: &str = "data-layer-disable-transforms";
/// Marks the off-screen container synthesized for a detached root.
pub const CONTAINER_ATTR: &str = "data-layer-container";

/// Class synchronized with ray interaction.
pub const HOVER_CLASS: &str = "hover";

/// Lower bound for any effective pixel ratio.
pub const MIN_PIXEL_RATIO: f32 = 1e-5;
/// Upper bound for a declared hover depth.
pub const MAX_HOVER_DEPTH: u32 = 16;

/// The layer options an element declares.
#[derive(Clone, Debug, PartialEq)]
pub struct LayerAttributes {
    /// Declared states, always starting with the default state `""`.
    pub states: Vec<String>,
    pub hover_depth: u32,
    /// Pixel ratio multiplier, `1.0` unless a positive value is given.
    pub pixel_ratio: f32,
}

impl LayerAttributes {
    pub fn read(elem: &ElementData) -> Self {
        let mut states = vec![String::new()];
        if let Some(list) = elem.get_attribute(STATES_ATTR) {
            for state in list.split_whitespace() {
                if !states.iter().any(|s| s == state) {
                    states.push(state.to_string());
                }
            }
        }

        let data = elem.data();
        let hover_depth = data
            .parse::<u32>("layer-hover-depth")
            .unwrap_or(0)
            .min(MAX_HOVER_DEPTH);
        let pixel_ratio = data
            .parse::<f32>("layer-pixel-ratio")
            .filter(|r| r.is_finite() && *r > 0.0)
            .unwrap_or(1.0);

        Self {
            states,
            hover_depth,
            pixel_ratio,
        }
    }

    /// Options of `element` in place: the hover depth is also capped at
    /// the length of its element chain (itself plus element ancestors).
    pub fn read_in(dom: &DomTree, element: NodeId) -> Option<Self> {
        let elem = dom.get_element(element)?;
        let chain = std::iter::once(element)
            .chain(dom.ancestors(element))
            .filter(|node| dom.get_element(*node).is_some())
            .count();
        let mut attributes = Self::read(elem);
        attributes.hover_depth = attributes.hover_depth.min(chain as u32);
        Some(attributes)
    }

    pub fn is_declared(&self, class: &str) -> bool {
        !class.is_empty() && self.states.iter().any(|s| s == class)
    }

    /// The first declared non-default state present on the element.
    pub fn current_state(&self, elem: &ElementData) -> String {
        self.states
            .iter()
            .skip(1)
            .find(|s| elem.has_class(s))
            .cloned()
            .unwrap_or_default()
    }
}

impl Default for LayerAttributes {
    fn default() -> Self {
        Self {
            states: vec![String::new()],
            hover_depth: 0,
            pixel_ratio: 1.0,
        }
    }
}

/// Layer id stored in the marker attribute, if it is a valid number.
pub fn parse_layer_id(elem: &ElementData) -> Option<u32> {
    elem.data().parse::<u32>("layer").filter(|id| *id > 0)
}

/// Elements that start a child layer during traversal.
pub fn is_layer_boundary(elem: &ElementData) -> bool {
    elem.has_attribute(LAYER_ATTR) || elem.is_video()
}

/// Effective pixel ratio for an element under a global ratio.
pub fn effective_pixel_ratio(global: f32, multiplier: f32) -> f32 {
    (global * multiplier).max(MIN_PIXEL_RATIO)
}
