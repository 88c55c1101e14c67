//! Element geometry queries.
//!
//! Layout is external to this crate. [`GeometryProbe`] is the query
//! contract the layer tree relies on; [`BoxGeometry`] is a table-driven
//! implementation fed by the host (or by tests).

use crate::node::NodeId;
use crate::tree::DomTree;
use common::{Rect, Size};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Viewport-relative box queries.
pub trait GeometryProbe: Send + Sync {
    /// Border box of an element relative to the viewport. Hidden,
    /// detached or unknown elements report [`Rect::ZERO`].
    fn bounds_of(&self, dom: &DomTree, node: NodeId) -> Rect;

    fn viewport_bounds(&self) -> Rect;

    /// Scrollable extent of the document.
    fn document_bounds(&self, dom: &DomTree) -> Rect {
        let viewport = self.viewport_bounds();
        dom.descendants(dom.document())
            .map(|id| self.bounds_of(dom, id))
            .filter(|r| !r.is_empty())
            .fold(viewport, |acc, r| acc.union(&r))
    }
}

/// Geometry backed by explicit per-element boxes.
///
/// A box can be overridden while the element carries a given class, which
/// lets state and hover classes change the measured size.
#[derive(Debug)]
pub struct BoxGeometry {
    boxes: RwLock<HashMap<NodeId, Rect>>,
    class_boxes: RwLock<HashMap<(NodeId, String), Rect>>,
    viewport: RwLock<Rect>,
}

impl BoxGeometry {
    pub fn new(viewport: Size) -> Self {
        Self {
            boxes: RwLock::new(HashMap::new()),
            class_boxes: RwLock::new(HashMap::new()),
            viewport: RwLock::new(Rect::new(0.0, 0.0, viewport.width, viewport.height)),
        }
    }

    pub fn set_bounds(&self, node: NodeId, bounds: Rect) {
        self.boxes.write().insert(node, bounds);
    }

    /// Bounds used while `node` has `class`.
    pub fn set_class_bounds(&self, node: NodeId, class: &str, bounds: Rect) {
        self.class_boxes
            .write()
            .insert((node, class.to_string()), bounds);
    }

    pub fn clear_bounds(&self, node: NodeId) {
        self.boxes.write().remove(&node);
        self.class_boxes.write().retain(|(id, _), _| *id != node);
    }

    pub fn set_viewport(&self, size: Size) {
        *self.viewport.write() = Rect::new(0.0, 0.0, size.width, size.height);
    }
}

impl Default for BoxGeometry {
    fn default() -> Self {
        Self::new(Size::new(1280.0, 720.0))
    }
}

impl GeometryProbe for BoxGeometry {
    fn bounds_of(&self, dom: &DomTree, node: NodeId) -> Rect {
        let Some(elem) = dom.get_element(node) else {
            return Rect::ZERO;
        };
        if !dom.is_connected(node) {
            return Rect::ZERO;
        }
        let hidden = std::iter::once(node)
            .chain(dom.ancestors(node))
            .filter_map(|id| dom.get_element(id))
            .any(|e| e.is_hidden());
        if hidden {
            return Rect::ZERO;
        }

        {
            let class_boxes = self.class_boxes.read();
            if !class_boxes.is_empty() {
                let overridden = elem
                    .class_list
                    .iter()
                    .rev()
                    .find_map(|class| class_boxes.get(&(node, class.to_string())));
                if let Some(rect) = overridden {
                    return *rect;
                }
            }
        }

        self.boxes.read().get(&node).copied().unwrap_or(Rect::ZERO)
    }

    fn viewport_bounds(&self) -> Rect {
        *self.viewport.read()
    }
}
