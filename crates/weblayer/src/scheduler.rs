//! Rasterization queue.

use crate::layer::LayerId;
use std::collections::{HashSet, VecDeque};
use tracing::warn;

/// FIFO of layers awaiting rasterization, one entry per layer.
///
/// The queue is unbounded: a mutation storm grows it but work is never
/// dropped. Crossing `warning_len` is logged once per excursion.
#[derive(Debug)]
pub struct RasterQueue {
    entries: VecDeque<LayerId>,
    members: HashSet<LayerId>,
    warning_len: usize,
    warned: bool,
}

impl RasterQueue {
    pub fn new(warning_len: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            members: HashSet::new(),
            warning_len,
            warned: false,
        }
    }

    /// Enqueue a layer. Returns `false` if it was already queued.
    pub fn push(&mut self, layer: LayerId) -> bool {
        if !self.members.insert(layer) {
            return false;
        }
        self.entries.push_back(layer);

        if self.entries.len() > self.warning_len && !self.warned {
            self.warned = true;
            warn!(len = self.entries.len(), "rasterization queue is growing");
        }
        true
    }

    pub fn pop(&mut self) -> Option<LayerId> {
        let layer = self.entries.pop_front()?;
        self.members.remove(&layer);
        if self.entries.len() <= self.warning_len {
            self.warned = false;
        }
        Some(layer)
    }

    /// Drop a queued layer, e.g. one that was disposed.
    pub fn remove(&mut self, layer: LayerId) -> bool {
        if !self.members.remove(&layer) {
            return false;
        }
        self.entries.retain(|l| *l != layer);
        true
    }

    pub fn contains(&self, layer: LayerId) -> bool {
        self.members.contains(&layer)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.members.clear();
        self.warned = false;
    }

    pub fn iter(&self) -> impl Iterator<Item = LayerId> + '_ {
        self.entries.iter().copied()
    }
}
