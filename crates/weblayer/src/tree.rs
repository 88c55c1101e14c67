//! The layer tree controller.
//!
//! A [`LayerTree`] owns every [`LayerNode`] created under one root element.
//! Each frame the host calls [`LayerTree::update`], which delivers DOM
//! mutations, resolves interaction rays, refreshes layers recursively and
//! steps transitions. Rasterization runs separately from the queue, see
//! [`LayerTree::run_idle`] and [`LayerTree::run_tick`].

use crate::attributes::{
    is_layer_boundary, parse_layer_id, LayerAttributes, CONTAINER_ATTR, HOVER_CLASS, LAYER_ATTR,
};
use crate::config::{LayerConfig, LayerEvent};
use crate::hit_test::{intersect_quad, Intersection, LayerHit, Ray};
use crate::layer::{LayerId, LayerKind, LayerNode, Placement, Pose, MIN_CONTENT_SCALE};
use crate::registry::LayerRegistry;
use crate::scheduler::RasterQueue;
use crate::snapshot::{LayerSnapshot, RasterStats};
use crate::transition::{Transition, TransitionStrategy};
use common::{LayerError, LayerResult, Size};
use dom::{
    traverse_child_elements, DomTree, GeometryProbe, MutationObserverId, MutationObserverInit,
    MutationRecord, MutationType, NodeId, Visit,
};
use glam::{Affine3A, Quat, Vec3};
use ordered_float::OrderedFloat;
use parking_lot::RwLock;
use render::{RasterBackend, Texture};
use slotmap::SlotMap;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument, trace, warn};
use web_apis::{ResizeObserver, ResizeObserverEntry, ResizeTarget};

/// A tree of layers mirroring the marked elements below one root element.
pub struct LayerTree {
    pub(crate) dom: Arc<RwLock<DomTree>>,
    pub(crate) geometry: Arc<dyn GeometryProbe>,
    pub(crate) backend: Box<dyn RasterBackend>,
    pub(crate) config: LayerConfig,

    pub(crate) layers: SlotMap<LayerId, LayerNode>,
    pub(crate) root: LayerId,
    pub(crate) registry: LayerRegistry,
    pub(crate) queue: RasterQueue,

    rays: Vec<Ray>,
    resize: ResizeObserver,
    observer: Option<MutationObserverId>,
    /// Host records taken out of the way of our own DOM writes.
    deferred: Vec<MutationRecord>,
    /// Elements currently carrying the hover class because of a ray.
    hover_elements: HashSet<NodeId>,
    pub(crate) updating: bool,

    pub(crate) stats: RasterStats,
    pub(crate) events: Vec<LayerEvent>,
}

impl LayerTree {
    /// Build a tree rooted at `root_element`.
    ///
    /// A root that is not attached to the document is placed in an
    /// off-screen container sized to the configured virtual viewport.
    #[instrument(skip_all)]
    pub fn new(
        dom: Arc<RwLock<DomTree>>,
        geometry: Arc<dyn GeometryProbe>,
        backend: Box<dyn RasterBackend>,
        config: LayerConfig,
        root_element: NodeId,
    ) -> LayerResult<Self> {
        config.validate()?;

        let dom_lock = dom.clone();
        let mut doc = dom_lock.write();
        doc.element(root_element)?;

        if !doc.is_connected(root_element) {
            attach_offscreen(&mut doc, root_element, config.virtual_viewport)?;
        }

        let observer = doc.observe(
            root_element,
            MutationObserverInit::new()
                .child_list()
                .attribute_old_value()
                .character_data()
                .subtree(),
        )?;

        let mut tree = Self {
            dom,
            geometry,
            backend,
            registry: LayerRegistry::new(highest_layer_id(&doc)),
            queue: RasterQueue::new(config.queue_warning_len),
            config,
            layers: SlotMap::with_key(),
            root: LayerId::default(),
            rays: Vec::new(),
            resize: ResizeObserver::new(),
            observer: Some(observer),
            deferred: Vec::new(),
            hover_elements: HashSet::new(),
            updating: false,
            stats: RasterStats::default(),
            events: Vec::new(),
        };

        let root = tree.create_layer(&mut doc, root_element, None, 0)?;
        tree.layers[root].placement = Placement::Free;
        tree.root = root;

        tree.resize.observe_viewport();
        tree.resize.process(&doc, tree.geometry.as_ref());
        tree.discard_own_records(&mut doc);
        drop(doc);

        debug!(id = tree.layers[root].id, "layer tree created");
        tree.flush_events();
        Ok(tree)
    }

    pub fn root(&self) -> LayerId {
        self.root
    }

    pub fn layer(&self, id: LayerId) -> LayerResult<&LayerNode> {
        self.layers.get(id).ok_or_else(|| LayerError::unknown(id))
    }

    pub fn layer_mut(&mut self, id: LayerId) -> LayerResult<&mut LayerNode> {
        self.layers.get_mut(id).ok_or_else(|| LayerError::unknown(id))
    }

    pub fn contains(&self, id: LayerId) -> bool {
        self.layers.contains_key(id)
    }

    /// Number of live layers, the root included.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_queued(&self, id: LayerId) -> bool {
        self.queue.contains(id)
    }

    /// Whether a pass is currently writing to the DOM.
    pub fn is_updating(&self) -> bool {
        self.updating
    }

    pub fn stats(&self) -> RasterStats {
        self.stats
    }

    pub fn config(&self) -> &LayerConfig {
        &self.config
    }

    pub fn dom(&self) -> &Arc<RwLock<DomTree>> {
        &self.dom
    }

    pub fn set_interaction_rays(&mut self, rays: Vec<Ray>) {
        self.rays = rays;
    }

    pub fn add_interaction_ray(&mut self, ray: Ray) {
        self.rays.push(ray);
    }

    pub fn clear_interaction_rays(&mut self) {
        self.rays.clear();
    }

    pub fn interaction_rays(&self) -> &[Ray] {
        &self.rays
    }

    /// Per-frame update of the whole tree.
    ///
    /// Only the root may be updated; `lerp` is the interpolation factor
    /// handed to `strategy` for every layer.
    #[instrument(skip(self, strategy))]
    pub fn update(
        &mut self,
        root: LayerId,
        lerp: f32,
        strategy: &dyn TransitionStrategy,
    ) -> LayerResult<()> {
        self.ensure_root(root, "update")?;

        let dom_lock = self.dom.clone();
        let result = {
            let mut dom = dom_lock.write();

            let mut records = std::mem::take(&mut self.deferred);
            if let Some(observer) = self.observer {
                records.extend(dom.take_records(observer));
            }
            self.process_records(&dom, &records);
            let entries = self.resize.process(&dom, self.geometry.as_ref());
            self.process_resize(&entries);

            self.updating = true;
            let result = self.update_pass(&mut dom, lerp, strategy);
            self.discard_own_records(&mut dom);
            self.updating = false;
            result
        };

        self.flush_events();
        result
    }

    fn update_pass(
        &mut self,
        dom: &mut DomTree,
        lerp: f32,
        strategy: &dyn TransitionStrategy,
    ) -> LayerResult<()> {
        self.resolve_interaction(dom)?;

        let root = self.root;
        self.refresh_layer(dom, root, false)?;

        self.step_transitions(lerp, strategy);

        if !self.queue.is_empty() {
            trace!(queued = self.queue.len(), "rasterization pending");
        }
        Ok(())
    }

    /// Refresh one layer and its subtree outside of [`update`](Self::update).
    ///
    /// With `force` every layer is re-traversed and queued for
    /// rasterization, dirty or not.
    #[instrument(skip(self))]
    pub fn refresh(&mut self, id: LayerId, force: bool) -> LayerResult<()> {
        if !self.layers.contains_key(id) {
            return Err(LayerError::unknown(id));
        }

        let dom_lock = self.dom.clone();
        let result = {
            let mut dom = dom_lock.write();
            self.stash_pending(&mut dom);
            self.updating = true;
            let result = self.refresh_layer(&mut dom, id, force);
            self.discard_own_records(&mut dom);
            self.updating = false;
            result
        };

        self.flush_events();
        result
    }

    /// Ray query against visible content meshes.
    ///
    /// The reported element is the deepest element of the hit layer that
    /// lies under the hit point.
    pub fn hit_test(&self, root: LayerId, ray: &Ray) -> LayerResult<Option<LayerHit>> {
        self.ensure_root(root, "hit_test")?;

        let Some((layer, intersection)) = self.pick(ray) else {
            return Ok(None);
        };
        let dom = self.dom.read();
        let element = self.element_at(&dom, layer, intersection.uv);
        Ok(Some(LayerHit {
            layer,
            intersection,
            element,
        }))
    }

    /// The layer rendering `element`, found through the closest marked
    /// ancestor-or-self.
    pub fn layer_for_element(&self, element: NodeId) -> Option<LayerId> {
        let dom = self.dom.read();
        self.closest_marked_layer(&dom, element)
    }

    /// The layer rendering the first element matching `selector`.
    pub fn layer_for_query(&self, selector: &str) -> Option<LayerId> {
        let dom = self.dom.read();
        let element = dom.query_selector(selector)?;
        self.closest_marked_layer(&dom, element)
    }

    /// World transform of a layer's group, composed from the root down.
    pub fn world_matrix(&self, id: LayerId) -> LayerResult<Affine3A> {
        let layer = self.layer(id)?;
        let mut matrix = layer.pose.matrix();
        let mut parent = layer.parent;
        while let Some(pid) = parent {
            let Some(node) = self.layers.get(pid) else {
                break;
            };
            matrix = node.pose.matrix() * matrix;
            parent = node.parent;
        }
        Ok(matrix)
    }

    /// Visit `from` and its attached descendants in pre-order.
    pub fn traverse(&self, from: LayerId, mut visit: impl FnMut(LayerId, &LayerNode)) {
        for id in self.preorder(from) {
            if let Some(layer) = self.layers.get(id) {
                visit(id, layer);
            }
        }
    }

    pub fn snapshot(&self, id: LayerId) -> LayerResult<LayerSnapshot> {
        let dom = self.dom.read();
        self.snapshot_of(&dom, id)
    }

    fn snapshot_of(&self, dom: &DomTree, id: LayerId) -> LayerResult<LayerSnapshot> {
        let layer = self.layer(id)?;
        let tag = dom
            .get_element(layer.element)
            .map(|e| e.tag_name.to_string())
            .unwrap_or_default();
        let children = layer
            .children
            .iter()
            .map(|child| self.snapshot_of(dom, *child))
            .collect::<LayerResult<Vec<_>>>()?;
        Ok(LayerSnapshot::of(layer, tag, children))
    }

    /// Release a layer and its subtree.
    ///
    /// Disposing the root also stops DOM observation and clears the id map;
    /// the tree is unusable afterwards.
    #[instrument(skip(self))]
    pub fn dispose(&mut self, id: LayerId) -> LayerResult<()> {
        if !self.layers.contains_key(id) {
            return Err(LayerError::unknown(id));
        }

        if id == self.root {
            let dom_lock = self.dom.clone();
            let mut dom = dom_lock.write();
            self.dispose_subtree(id);
            if let Some(observer) = self.observer.take() {
                dom.disconnect(observer);
            }
            for element in self.hover_elements.drain() {
                if dom.contains_node(element) {
                    dom.remove_class(element, HOVER_CLASS)?;
                }
            }
            self.resize.disconnect();
            self.registry.clear();
            self.queue.clear();
            self.rays.clear();
            self.deferred.clear();
            debug!("layer tree disposed");
        } else {
            self.detach_layer(id);
            self.dispose_subtree(id);
        }

        self.flush_events();
        Ok(())
    }

    fn ensure_root(&self, id: LayerId, operation: &'static str) -> LayerResult<()> {
        if self.layers.is_empty() {
            return Err(LayerError::disposed(id));
        }
        if !self.layers.contains_key(id) {
            return Err(LayerError::unknown(id));
        }
        if id != self.root {
            return Err(LayerError::not_root(operation));
        }
        Ok(())
    }

    pub(crate) fn flush_events(&mut self) {
        let events = std::mem::take(&mut self.events);
        for event in events {
            self.config.emit(event);
        }
    }

    /// Park host records so they survive the discard after our writes.
    pub(crate) fn stash_pending(&mut self, dom: &mut DomTree) {
        if let Some(observer) = self.observer {
            self.deferred.extend(dom.take_records(observer));
        }
    }

    /// Drop records produced by our own DOM writes.
    pub(crate) fn discard_own_records(&mut self, dom: &mut DomTree) {
        if let Some(observer) = self.observer {
            let discarded = dom.take_records(observer);
            if !discarded.is_empty() {
                trace!(count = discarded.len(), "discarded own mutation records");
            }
        }
    }

    /// Pre-order list of `from` and its attached descendants.
    pub(crate) fn preorder(&self, from: LayerId) -> Vec<LayerId> {
        let mut order = Vec::new();
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            let Some(layer) = self.layers.get(id) else {
                continue;
            };
            order.push(id);
            stack.extend(layer.children.iter().rev().copied());
        }
        order
    }

    fn create_layer(
        &mut self,
        dom: &mut DomTree,
        element: NodeId,
        parent: Option<LayerId>,
        level: u32,
    ) -> LayerResult<LayerId> {
        let attributes = LayerAttributes::read_in(dom, element).unwrap_or_default();
        let elem = dom.element(element)?;
        let kind = if elem.is_video() {
            LayerKind::Video
        } else {
            LayerKind::Element
        };
        let marked = parse_layer_id(elem);

        let id = match marked {
            Some(id) if self.registry.claim(id) => id,
            _ => self.registry.allocate(),
        };
        if marked != Some(id) {
            dom.set_attribute(element, LAYER_ATTR, &id.to_string())?;
        }

        let mut node = LayerNode::new(id, element, kind, attributes);
        node.parent = parent;
        node.level = level;
        if kind == LayerKind::Video {
            if let Some(slot) = node.states.get_mut("").and_then(|slots| slots.get_mut(0)) {
                slot.texture = Some(Texture::video(element));
            }
            node.rasterized = true;
        }

        let layer = self.layers.insert(node);
        self.registry.bind(id, layer, element);
        let size = self.geometry.bounds_of(dom, element).size();
        self.resize.observe_sized(element, size);
        self.events.push(LayerEvent::Created(layer));

        debug!(id, ?kind, level, "layer created");
        Ok(layer)
    }

    /// Existing layer for a boundary element, or a new one.
    ///
    /// A marker pointing at another element's layer (a cloned element)
    /// yields a new layer under a fresh id.
    fn resolve_child(
        &mut self,
        dom: &mut DomTree,
        element: NodeId,
        parent: LayerId,
        level: u32,
    ) -> LayerResult<LayerId> {
        let existing = parse_layer_id(dom.element(element)?)
            .and_then(|id| self.registry.lookup(id))
            .filter(|layer| {
                self.layers
                    .get(*layer)
                    .is_some_and(|node| node.element == element && !node.needs_removal)
            });

        match existing {
            Some(layer) => Ok(layer),
            None => self.create_layer(dom, element, Some(parent), level),
        }
    }

    /// Attach `child` under `parent`, moving it if it lived elsewhere.
    fn adopt(&mut self, parent: LayerId, child: LayerId, level: u32) {
        let previous = self.layers.get(child).and_then(|node| node.parent);
        if previous != Some(parent) {
            if let Some(old) = previous.and_then(|p| self.layers.get_mut(p)) {
                old.children.retain(|c| *c != child);
                old.child_layers.retain(|c| *c != child);
            }
            if let Some(node) = self.layers.get_mut(child) {
                node.parent = Some(parent);
            }
        }
        if let Some(node) = self.layers.get_mut(child) {
            node.level = level;
        }
        if let Some(node) = self.layers.get_mut(parent) {
            if !node.children.contains(&child) {
                node.children.push(child);
            }
        }
    }

    pub(crate) fn refresh_layer(
        &mut self,
        dom: &mut DomTree,
        id: LayerId,
        force: bool,
    ) -> LayerResult<()> {
        let geometry = self.geometry.clone();
        let layer = self.layers.get_mut(id).ok_or_else(|| LayerError::unknown(id))?;
        let element = layer.element;

        let live = dom
            .get_element(element)
            .zip(LayerAttributes::read_in(dom, element));
        if let Some((elem, attributes)) = live {
            let state = attributes.current_state(elem);
            let hover = live_hover_slot(dom, element, attributes.hover_depth);
            if attributes != layer.attributes {
                layer.apply_attributes(attributes);
            }
            layer.current_state = state;
            layer.current_hover = hover;
        }

        let bounds = geometry.bounds_of(dom, element);
        // Detached elements keep their last bounds while fading out.
        if !(layer.needs_removal && bounds.is_empty()) {
            layer.bounds = bounds;
        }

        if !layer.needs_removal && (layer.needs_rasterize || force) {
            if layer.kind == LayerKind::Element {
                self.discover_children(dom, id)?;
                if self.queue.push(id) {
                    trace!(queued = self.queue.len(), "layer queued");
                }
                if let Some(layer) = self.layers.get_mut(id) {
                    layer.queued = true;
                }
            }
            if let Some(layer) = self.layers.get_mut(id) {
                layer.needs_rasterize = false;
            }
        }

        let children = self
            .layers
            .get(id)
            .map(|layer| layer.children.clone())
            .unwrap_or_default();
        for child in children {
            self.refresh_layer(dom, child, force)?;
        }

        self.layout(id);
        Ok(())
    }

    /// Traverse the layer's DOM subtree for boundary elements.
    fn discover_children(&mut self, dom: &mut DomTree, parent: LayerId) -> LayerResult<()> {
        let parent_element = self.layers[parent].element;

        let mut found: Vec<(NodeId, u32)> = Vec::new();
        traverse_child_elements(dom, parent_element, |node, level| {
            match dom.get_element(node) {
                Some(elem) if is_layer_boundary(elem) => {
                    found.push((node, level));
                    Visit::Skip
                }
                _ => Visit::Descend,
            }
        });

        let mut child_layers = Vec::with_capacity(found.len());
        for (element, level) in found {
            let child = self.resolve_child(dom, element, parent, level)?;
            self.adopt(parent, child, level);
            child_layers.push(child);
        }

        let previous = std::mem::replace(&mut self.layers[parent].child_layers, child_layers);
        let current = &self.layers[parent].child_layers;
        let gone: Vec<LayerId> = previous
            .into_iter()
            .filter(|old| !current.contains(old))
            .collect();
        for old in gone {
            self.mark_removal_recursive(old);
        }
        Ok(())
    }

    fn mark_removal_recursive(&mut self, id: LayerId) {
        for layer_id in self.preorder(id) {
            if let Some(layer) = self.layers.get_mut(layer_id) {
                if !layer.needs_removal {
                    debug!(id = layer.id, "layer marked for removal");
                }
                layer.mark_removal();
                layer.queued = false;
            }
            self.queue.remove(layer_id);
        }
    }

    fn mark_dirty_recursive(&mut self, id: LayerId) {
        for layer_id in self.preorder(id) {
            if let Some(layer) = self.layers.get_mut(layer_id) {
                if !layer.needs_removal && layer.kind == LayerKind::Element {
                    layer.needs_rasterize = true;
                }
            }
        }
    }

    fn layout(&mut self, id: LayerId) {
        let pixel_size = self.config.pixel_size;
        let separation = self.config.layer_separation;
        let Some(layer) = self.layers.get(id) else {
            return;
        };
        let parent_bounds = match layer.parent.and_then(|p| self.layers.get(p)) {
            Some(parent) => parent.bounds,
            None => self.geometry.viewport_bounds(),
        };

        let Some(layer) = self.layers.get_mut(id) else {
            return;
        };
        let bounds = layer.bounds;
        if layer.placement == Placement::Dom {
            let dx = bounds.x - parent_bounds.x;
            let dy = bounds.y - parent_bounds.y;
            layer.target = Pose::from_position(Vec3::new(
                dx * pixel_size,
                -dy * pixel_size,
                separation * layer.level as f32,
            ));
        }

        let width = bounds.width * pixel_size;
        let height = bounds.height * pixel_size;
        layer.content_target = Pose {
            position: Vec3::new(width / 2.0, -height / 2.0, 0.0),
            scale: Vec3::new(
                width.max(MIN_CONTENT_SCALE),
                height.max(MIN_CONTENT_SCALE),
                1.0,
            ),
            orientation: Quat::IDENTITY,
        };
        layer.update_target_opacity();

        if !layer.laid_out {
            layer.pose = layer.target;
            layer.content = layer.content_target;
            layer.laid_out = true;
        }
    }

    fn step_transitions(&mut self, lerp: f32, strategy: &dyn TransitionStrategy) {
        for id in self.preorder(self.root) {
            let Some(layer) = self.layers.get_mut(id) else {
                continue;
            };
            if strategy.transition(layer, lerp) == Transition::Remove {
                if id == self.root {
                    warn!("transition asked to remove the root layer, ignoring");
                    continue;
                }
                self.detach_layer(id);
                self.dispose_subtree(id);
            }
        }
    }

    fn detach_layer(&mut self, id: LayerId) {
        let parent = self.layers.get(id).and_then(|layer| layer.parent);
        if let Some(parent) = parent.and_then(|p| self.layers.get_mut(p)) {
            parent.children.retain(|c| *c != id);
            parent.child_layers.retain(|c| *c != id);
        }
    }

    fn dispose_subtree(&mut self, id: LayerId) {
        for layer_id in self.preorder(id) {
            self.queue.remove(layer_id);
            if let Some(mut layer) = self.layers.remove(layer_id) {
                // A replacement layer may already observe the same element.
                if self.registry.layer_for_node(layer.element) == Some(layer_id) {
                    self.resize.unobserve(layer.element);
                }
                self.registry.unbind(layer.id, layer_id, layer.element);
                layer.release_textures();
                self.events.push(LayerEvent::Removed(layer_id));
                debug!(id = layer.id, "layer removed");
            }
        }
    }

    fn process_records(&mut self, dom: &DomTree, records: &[MutationRecord]) {
        for record in records {
            if record.mutation_type == MutationType::Attributes
                && record.attribute_name.as_deref() == Some("class")
                && self.is_cosmetic_class_change(dom, record)
            {
                continue;
            }
            if let Some(layer) = self.closest_layer(dom, record.target) {
                trace!(kind = %record.mutation_type, "mutation marks layer dirty");
                self.mark_dirty_recursive(layer);
            }
        }
    }

    /// Class changes limited to the hover class or to states declared by
    /// the element's own layer do not need a re-render.
    fn is_cosmetic_class_change(&self, dom: &DomTree, record: &MutationRecord) -> bool {
        let Some(elem) = dom.get_element(record.target) else {
            return false;
        };
        let old: HashSet<&str> = record
            .old_value
            .as_deref()
            .unwrap_or_default()
            .split_whitespace()
            .collect();
        let new: HashSet<&str> = elem.class_list.iter().map(|c| c.as_ref()).collect();

        let declared = self
            .registry
            .layer_for_node(record.target)
            .and_then(|layer| self.layers.get(layer))
            .filter(|layer| layer.element == record.target)
            .map(|layer| &layer.attributes);

        old.symmetric_difference(&new).all(|class| {
            *class == HOVER_CLASS || declared.is_some_and(|attrs| attrs.is_declared(class))
        })
    }

    /// Nearest live layer whose element is `node` or an ancestor of it.
    fn closest_layer(&self, dom: &DomTree, node: NodeId) -> Option<LayerId> {
        std::iter::once(node)
            .chain(dom.ancestors(node))
            .find_map(|candidate| {
                self.registry
                    .layer_for_node(candidate)
                    .filter(|layer| {
                        self.layers
                            .get(*layer)
                            .is_some_and(|l| l.element == candidate && !l.needs_removal)
                    })
            })
    }

    /// Like [`closest_layer`](Self::closest_layer), but keyed by the marker
    /// attribute.
    fn closest_marked_layer(&self, dom: &DomTree, element: NodeId) -> Option<LayerId> {
        let mut current = Some(element);
        while let Some(node) = current {
            if let Some(elem) = dom.get_element(node) {
                if elem.has_attribute(LAYER_ATTR) {
                    return parse_layer_id(elem)
                        .and_then(|id| self.registry.lookup(id))
                        .filter(|layer| self.layers.get(*layer).is_some_and(|l| l.element == node));
                }
            }
            current = dom.parent(node);
        }
        None
    }

    fn process_resize(&mut self, entries: &[ResizeObserverEntry]) {
        for entry in entries {
            match entry.target {
                ResizeTarget::Viewport => {
                    debug!(size = ?entry.size(), "viewport resized");
                    let root = self.root;
                    self.mark_dirty_recursive(root);
                }
                ResizeTarget::Element(element) => {
                    let Some(layer) = self
                        .registry
                        .layer_for_node(element)
                        .and_then(|id| self.layers.get_mut(id))
                    else {
                        continue;
                    };
                    if !layer.needs_removal && layer.kind == LayerKind::Element {
                        trace!(id = layer.id, "element resized");
                        layer.needs_rasterize = true;
                    }
                }
            }
        }
    }

    /// Nearest content mesh hit by `ray` among layers meant to be visible.
    fn pick(&self, ray: &Ray) -> Option<(LayerId, Intersection)> {
        self.preorder(self.root)
            .into_iter()
            .filter_map(|id| {
                let layer = self.layers.get(id)?;
                if layer.content_target_opacity <= 0.0 {
                    return None;
                }
                let world = self.world_matrix(id).ok()?;
                let mesh = world * layer.content.matrix();
                intersect_quad(ray, &mesh).map(|hit| (id, hit))
            })
            .min_by_key(|(_, hit)| OrderedFloat(hit.distance))
    }

    /// Deepest element under the `uv` point of a layer, child layers excluded.
    fn element_at(&self, dom: &DomTree, layer: LayerId, uv: [f32; 2]) -> NodeId {
        let Some(node) = self.layers.get(layer) else {
            return NodeId::default();
        };
        let point = node.bounds.point_at(uv[0], uv[1]);

        let mut best = (node.element, 0);
        traverse_child_elements(dom, node.element, |candidate, level| {
            match dom.get_element(candidate) {
                Some(elem) if is_layer_boundary(elem) => return Visit::Skip,
                None => return Visit::Skip,
                _ => {}
            }
            let bounds = self.geometry.bounds_of(dom, candidate);
            if !bounds.is_empty() && bounds.contains_point(point) && level >= best.1 {
                best = (candidate, level);
            }
            Visit::Descend
        });
        best.0
    }

    /// Hovered flags, hover counters, cursors and the DOM hover class.
    fn resolve_interaction(&mut self, dom: &mut DomTree) -> LayerResult<()> {
        for layer in self.layers.values_mut() {
            layer.hovered = false;
            layer.hover = 0;
            layer.cursor = None;
        }

        let mut hits = Vec::new();
        for ray in &self.rays {
            let Some((layer, intersection)) = self.pick(ray) else {
                continue;
            };
            let local = self
                .world_matrix(layer)?
                .inverse()
                .transform_point3(Vec3::from(intersection.point));
            if let Some(node) = self.layers.get_mut(layer) {
                // First ray wins.
                if node.cursor.is_none() {
                    node.cursor = Some(local);
                }
            }
            hits.push(layer);
        }

        for hit in &hits {
            let mut current = Some(*hit);
            while let Some(id) = current {
                let Some(layer) = self.layers.get_mut(id) else {
                    break;
                };
                layer.hovered = true;
                current = layer.parent;
            }
        }

        let root = self.root;
        self.propagate_hover(root, 0);
        self.sync_hover_classes(dom, &hits)
    }

    fn propagate_hover(&mut self, id: LayerId, parent_hover: u32) {
        let Some(layer) = self.layers.get_mut(id) else {
            return;
        };
        layer.hover = if layer.hovered {
            1
        } else if parent_hover > 0 {
            parent_hover + 1
        } else {
            0
        };
        let hover = layer.hover;
        let children = layer.children.clone();
        for child in children {
            self.propagate_hover(child, hover);
        }
    }

    /// Hit elements and every element ancestor carry the hover class; all
    /// other elements we marked lose it.
    fn sync_hover_classes(&mut self, dom: &mut DomTree, hits: &[LayerId]) -> LayerResult<()> {
        let mut desired = HashSet::new();
        for hit in hits {
            let Some(layer) = self.layers.get(*hit) else {
                continue;
            };
            desired.insert(layer.element);
            for ancestor in dom.ancestors(layer.element) {
                if dom.get_element(ancestor).is_some() {
                    desired.insert(ancestor);
                }
            }
        }

        for element in self.hover_elements.difference(&desired) {
            if dom.contains_node(*element) {
                dom.remove_class(*element, HOVER_CLASS)?;
            }
        }
        for element in &desired {
            dom.add_class(*element, HOVER_CLASS)?;
        }
        self.hover_elements = desired;
        Ok(())
    }
}

impl std::fmt::Debug for LayerTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerTree")
            .field("root", &self.root)
            .field("layers", &self.layers.len())
            .field("queued", &self.queue.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

/// Hover slot implied by the live DOM: one more than the distance of the
/// nearest ancestor-or-self with the hover class, within `depth`.
fn live_hover_slot(dom: &DomTree, element: NodeId, depth: u32) -> u32 {
    let mut current = Some(element);
    for distance in 0..depth {
        let Some(node) = current else {
            break;
        };
        if dom.get_element(node).is_some_and(|e| e.has_class(HOVER_CLASS)) {
            return distance + 1;
        }
        current = dom.parent(node);
    }
    0
}

/// Highest marker id already present in the document.
fn highest_layer_id(dom: &DomTree) -> u32 {
    dom.descendants(dom.document())
        .filter_map(|node| dom.get_element(node).and_then(parse_layer_id))
        .max()
        .unwrap_or(0)
}

/// Put a detached root into a fixed-size container at the end of the body.
fn attach_offscreen(dom: &mut DomTree, element: NodeId, viewport: Size) -> LayerResult<NodeId> {
    let host = match dom.body().or_else(|| dom.document_element()) {
        Some(host) => host,
        None => {
            let html = dom.create_element("html");
            let document = dom.document();
            dom.append_child(document, html)?;
            html
        }
    };

    let container = dom.create_element("div");
    dom.set_attribute(container, CONTAINER_ATTR, "")?;
    dom.set_attribute(
        container,
        "style",
        &format!(
            "position: fixed; left: 0; top: 0; width: {}px; height: {}px; \
             z-index: -1; pointer-events: none",
            viewport.width, viewport.height
        ),
    )?;
    dom.append_child(host, container)?;
    dom.append_child(container, element)?;

    debug!(width = viewport.width, height = viewport.height, "root attached off-screen");
    Ok(container)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Rect;
    use dom::BoxGeometry;
    use render::{MemoryLoader, SoftwareRasterizer};

    fn setup() -> (Arc<RwLock<DomTree>>, Arc<BoxGeometry>, NodeId) {
        let mut dom = DomTree::with_body();
        let body = dom.body().unwrap();
        let root = dom.create_element("div");
        dom.append_child(body, root).unwrap();
        let geometry = Arc::new(BoxGeometry::new(Size::new(800.0, 600.0)));
        geometry.set_bounds(root, Rect::new(0.0, 0.0, 400.0, 300.0));
        (Arc::new(RwLock::new(dom)), geometry, root)
    }

    fn tree_for(
        dom: &Arc<RwLock<DomTree>>,
        geometry: &Arc<BoxGeometry>,
        root: NodeId,
    ) -> LayerTree {
        let backend = SoftwareRasterizer::new(geometry.clone(), Arc::new(MemoryLoader::new()));
        LayerTree::new(
            dom.clone(),
            geometry.clone(),
            Box::new(backend),
            LayerConfig::default(),
            root,
        )
        .unwrap()
    }

    #[test]
    fn test_root_gets_marker() {
        let (dom, geometry, root) = setup();
        let tree = tree_for(&dom, &geometry, root);

        let id = tree.layer(tree.root()).unwrap().id();
        let marker = dom.read().element(root).unwrap().get_attribute(LAYER_ATTR).map(String::from);
        assert_eq!(marker, Some(id.to_string()));
        assert_eq!(tree.layer(tree.root()).unwrap().placement(), Placement::Free);
    }

    #[test]
    fn test_detached_root_gets_container() {
        let (dom, geometry, _) = setup();
        let detached = dom.write().create_element("div");
        let _tree = tree_for(&dom, &geometry, detached);

        let doc = dom.read();
        assert!(doc.is_connected(detached));
        let container = doc.parent(detached).unwrap();
        assert!(doc.element(container).unwrap().has_attribute(CONTAINER_ATTR));
    }

    #[test]
    fn test_ids_start_above_existing_markers() {
        let (dom, geometry, root) = setup();
        {
            let mut doc = dom.write();
            let other = doc.create_element("div");
            let body = doc.body().unwrap();
            doc.append_child(body, other).unwrap();
            doc.set_attribute(other, LAYER_ATTR, "41").unwrap();
        }
        let tree = tree_for(&dom, &geometry, root);
        assert_eq!(tree.layer(tree.root()).unwrap().id(), 42);
    }

    #[test]
    fn test_live_hover_slot() {
        let (dom, _, root) = setup();
        let mut doc = dom.write();
        let child = doc.create_element("span");
        doc.append_child(root, child).unwrap();

        assert_eq!(live_hover_slot(&doc, child, 2), 0);
        doc.add_class(root, HOVER_CLASS).unwrap();
        assert_eq!(live_hover_slot(&doc, child, 2), 2);
        assert_eq!(live_hover_slot(&doc, child, 1), 0);
        doc.add_class(child, HOVER_CLASS).unwrap();
        assert_eq!(live_hover_slot(&doc, child, 2), 1);
    }

    #[test]
    fn test_cosmetic_class_changes_keep_layer_clean() {
        let (dom, geometry, root) = setup();
        dom.write().set_attribute(root, "data-layer-states", "open").unwrap();
        let mut tree = tree_for(&dom, &geometry, root);
        let id = tree.root();
        tree.update(id, 1.0, &crate::transition::DefaultTransition).unwrap();
        assert!(!tree.layer(id).unwrap().needs_rasterize());

        dom.write().add_class(root, "open").unwrap();
        tree.update(id, 1.0, &crate::transition::DefaultTransition).unwrap();
        assert_eq!(tree.layer(id).unwrap().current_state(), "open");

        dom.write().add_class(root, "wide").unwrap();
        {
            let mut doc = dom.write();
            let records = doc.take_records(tree.observer.unwrap());
            tree.process_records(&doc, &records);
        }
        assert!(tree.layer(id).unwrap().needs_rasterize());
    }
}
