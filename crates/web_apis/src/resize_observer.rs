//! Resize observation against a geometry probe.

use common::{Rect, Size};
use dom::{DomTree, GeometryProbe, NodeId};
use std::collections::HashMap;
use tracing::trace;

/// Sizes closer than this are considered equal.
const SIZE_TOLERANCE: f32 = 0.01;

/// What a resize entry refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResizeTarget {
    Element(NodeId),
    Viewport,
}

/// One observed size change.
#[derive(Clone, Debug, PartialEq)]
pub struct ResizeObserverEntry {
    pub target: ResizeTarget,
    /// Bounds at the time of observation.
    pub content_rect: Rect,
}

impl ResizeObserverEntry {
    pub fn size(&self) -> Size {
        self.content_rect.size()
    }
}

/// Resize observer.
///
/// Sizes are sampled on each [`process`](Self::process) call; the first
/// sample of a target always produces an entry.
#[derive(Debug, Default)]
pub struct ResizeObserver {
    targets: HashMap<ResizeTarget, Option<Size>>,
}

impl ResizeObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe a target element.
    pub fn observe(&mut self, target: NodeId) {
        self.targets.entry(ResizeTarget::Element(target)).or_insert(None);
    }

    /// Observe a target whose current size is already known; only later
    /// changes are reported.
    pub fn observe_sized(&mut self, target: NodeId, size: Size) {
        self.targets.insert(ResizeTarget::Element(target), Some(size));
    }

    /// Observe the viewport (window resizes).
    pub fn observe_viewport(&mut self) {
        self.targets.entry(ResizeTarget::Viewport).or_insert(None);
    }

    /// Stop observing a target element.
    pub fn unobserve(&mut self, target: NodeId) {
        self.targets.remove(&ResizeTarget::Element(target));
    }

    /// Stop observing all targets.
    pub fn disconnect(&mut self) {
        self.targets.clear();
    }

    pub fn is_observing(&self, target: NodeId) -> bool {
        self.targets.contains_key(&ResizeTarget::Element(target))
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Sample every target and report those whose size changed.
    pub fn process(
        &mut self,
        dom: &DomTree,
        probe: &dyn GeometryProbe,
    ) -> Vec<ResizeObserverEntry> {
        let mut entries = Vec::new();

        for (target, previous) in self.targets.iter_mut() {
            let rect = match target {
                ResizeTarget::Element(node) => probe.bounds_of(dom, *node),
                ResizeTarget::Viewport => probe.viewport_bounds(),
            };
            let size = rect.size();
            let changed = previous
                .map(|p| p.differs_from(size, SIZE_TOLERANCE))
                .unwrap_or(true);

            if changed {
                trace!(?target, width = size.width, height = size.height, "resize observed");
                *previous = Some(size);
                entries.push(ResizeObserverEntry {
                    target: *target,
                    content_rect: rect,
                });
            }
        }

        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dom::BoxGeometry;

    fn setup() -> (DomTree, NodeId, BoxGeometry) {
        let mut dom = DomTree::with_body();
        let body = dom.body().unwrap();
        let div = dom.create_element("div");
        dom.append_child(body, div).unwrap();
        let geometry = BoxGeometry::new(Size::new(800.0, 600.0));
        geometry.set_bounds(div, Rect::new(0.0, 0.0, 100.0, 100.0));
        (dom, div, geometry)
    }

    #[test]
    fn test_first_sample_reports() {
        let (dom, div, geometry) = setup();
        let mut observer = ResizeObserver::new();
        observer.observe(div);
        observer.observe_viewport();

        let entries = observer.process(&dom, &geometry);
        assert_eq!(entries.len(), 2);
        assert!(observer.process(&dom, &geometry).is_empty());
    }

    #[test]
    fn test_change_detection_tolerance() {
        let (dom, div, geometry) = setup();
        let mut observer = ResizeObserver::new();
        observer.observe(div);
        observer.process(&dom, &geometry);

        geometry.set_bounds(div, Rect::new(0.0, 0.0, 100.005, 100.0));
        assert!(observer.process(&dom, &geometry).is_empty());

        geometry.set_bounds(div, Rect::new(5.0, 5.0, 120.0, 100.0));
        let entries = observer.process(&dom, &geometry);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].target, ResizeTarget::Element(div));
        assert_eq!(entries[0].size(), Size::new(120.0, 100.0));
    }

    #[test]
    fn test_observe_sized_skips_first_report() {
        let (dom, div, geometry) = setup();
        let mut observer = ResizeObserver::new();
        observer.observe_sized(div, Size::new(100.0, 100.0));
        assert!(observer.process(&dom, &geometry).is_empty());
    }

    #[test]
    fn test_viewport_resize() {
        let (dom, _, geometry) = setup();
        let mut observer = ResizeObserver::new();
        observer.observe_viewport();
        observer.process(&dom, &geometry);

        geometry.set_viewport(Size::new(1024.0, 768.0));
        let entries = observer.process(&dom, &geometry);
        assert_eq!(entries[0].target, ResizeTarget::Viewport);
    }

    #[test]
    fn test_unobserve() {
        let (_, div, _) = setup();
        let mut observer = ResizeObserver::new();
        observer.observe(div);
        assert!(observer.is_observing(div));
        observer.unobserve(div);
        assert!(observer.is_empty());
    }
}
