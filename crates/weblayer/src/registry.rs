//! Marker id to layer mapping.

use crate::layer::LayerId;
use dom::NodeId;
use std::collections::HashMap;

/// Identity map of one layer tree.
///
/// Created with the root layer and cleared when the root is disposed. Ids
/// are never reused while the registry lives.
#[derive(Debug, Default)]
pub struct LayerRegistry {
    by_id: HashMap<u32, LayerId>,
    by_element: HashMap<NodeId, LayerId>,
    next_id: u32,
}

impl LayerRegistry {
    /// Registry whose fresh ids start above `highest_existing`.
    pub fn new(highest_existing: u32) -> Self {
        Self {
            by_id: HashMap::new(),
            by_element: HashMap::new(),
            next_id: highest_existing.saturating_add(1).max(1),
        }
    }

    /// A fresh, unused id.
    pub fn allocate(&mut self) -> u32 {
        while self.by_id.contains_key(&self.next_id) {
            self.next_id += 1;
        }
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Claim `id` if it is free. Later allocations skip it.
    pub fn claim(&mut self, id: u32) -> bool {
        if id == 0 || self.by_id.contains_key(&id) {
            return false;
        }
        if id >= self.next_id {
            self.next_id = id + 1;
        }
        true
    }

    pub fn bind(&mut self, id: u32, layer: LayerId, element: NodeId) {
        self.by_id.insert(id, layer);
        self.by_element.insert(element, layer);
    }

    /// Remove the bindings of `layer`; bindings since taken over by another
    /// layer are kept.
    pub fn unbind(&mut self, id: u32, layer: LayerId, element: NodeId) {
        if self.by_id.get(&id) == Some(&layer) {
            self.by_id.remove(&id);
        }
        if self.by_element.get(&element) == Some(&layer) {
            self.by_element.remove(&element);
        }
    }

    pub fn lookup(&self, id: u32) -> Option<LayerId> {
        self.by_id.get(&id).copied()
    }

    pub fn layer_for_node(&self, element: NodeId) -> Option<LayerId> {
        self.by_element.get(&element).copied()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_id.clear();
        self.by_element.clear();
    }
}
