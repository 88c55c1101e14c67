//! Mutation observers.
//!
//! Every mutation made through [`DomTree`](crate::DomTree) produces a
//! [`MutationRecord`] that is queued on each interested observer. Records
//! are pulled with [`DomTree::take_records`](crate::DomTree::take_records).

use crate::error::{DomError, DomResult};
use crate::node::NodeId;
use slotmap::{new_key_type, SlotMap};
use std::collections::VecDeque;

new_key_type! {
    /// Handle of a registered mutation observer.
    pub struct MutationObserverId;
}

/// A registered observer: its targets and undelivered records.
#[derive(Debug, Default)]
pub struct MutationObserver {
    targets: Vec<(NodeId, MutationObserverInit)>,
    pending_records: VecDeque<MutationRecord>,
}

impl MutationObserver {
    /// Observe a target node.
    pub fn observe(&mut self, target: NodeId, options: MutationObserverInit) -> DomResult<()> {
        if !options.child_list && !options.attributes && !options.character_data {
            return Err(DomError::InvalidObserverOptions(
                "at least one of child_list, attributes or character_data must be set",
            ));
        }
        if options.attribute_old_value && !options.attributes {
            return Err(DomError::InvalidObserverOptions(
                "attribute_old_value requires attributes",
            ));
        }
        if options.character_data_old_value && !options.character_data {
            return Err(DomError::InvalidObserverOptions(
                "character_data_old_value requires character_data",
            ));
        }

        self.targets.retain(|(t, _)| *t != target);
        self.targets.push((target, options));
        Ok(())
    }

    /// Stop observing a single target.
    pub fn unobserve(&mut self, target: NodeId) {
        self.targets.retain(|(t, _)| *t != target);
    }

    /// Stop observing all targets and drop undelivered records.
    pub fn disconnect(&mut self) {
        self.targets.clear();
        self.pending_records.clear();
    }

    pub fn take_records(&mut self) -> Vec<MutationRecord> {
        self.pending_records.drain(..).collect()
    }

    pub fn pending_len(&self) -> usize {
        self.pending_records.len()
    }

    pub fn is_observing(&self, target: NodeId) -> bool {
        self.targets.iter().any(|(t, _)| *t == target)
    }

    pub fn is_connected(&self) -> bool {
        !self.targets.is_empty()
    }

    /// Options of the first registration interested in `record`.
    fn interest(
        &self,
        record: &MutationRecord,
        contains: &dyn Fn(NodeId, NodeId) -> bool,
    ) -> Option<&MutationObserverInit> {
        self.targets.iter().find_map(|(target, options)| {
            if *target != record.target && !(options.subtree && contains(*target, record.target)) {
                return None;
            }

            let wanted = match record.mutation_type {
                MutationType::ChildList => options.child_list,
                MutationType::Attributes => {
                    options.attributes
                        && match (&options.attribute_filter, &record.attribute_name) {
                            (Some(filter), Some(name)) => filter.iter().any(|f| f == name),
                            _ => true,
                        }
                }
                MutationType::CharacterData => options.character_data,
            };
            wanted.then_some(options)
        })
    }
}

/// Mutation observer initialization options.
#[derive(Clone, Debug, Default)]
pub struct MutationObserverInit {
    pub child_list: bool,
    pub attributes: bool,
    pub character_data: bool,
    /// Also observe every descendant of the target.
    pub subtree: bool,
    pub attribute_old_value: bool,
    pub character_data_old_value: bool,
    /// Restrict attribute records to these names.
    pub attribute_filter: Option<Vec<String>>,
}

impl MutationObserverInit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn child_list(mut self) -> Self {
        self.child_list = true;
        self
    }

    pub fn attributes(mut self) -> Self {
        self.attributes = true;
        self
    }

    pub fn character_data(mut self) -> Self {
        self.character_data = true;
        self
    }

    pub fn subtree(mut self) -> Self {
        self.subtree = true;
        self
    }

    pub fn attribute_old_value(mut self) -> Self {
        self.attribute_old_value = true;
        self.attributes = true;
        self
    }

    pub fn character_data_old_value(mut self) -> Self {
        self.character_data_old_value = true;
        self.character_data = true;
        self
    }

    pub fn attribute_filter(mut self, filter: Vec<String>) -> Self {
        self.attribute_filter = Some(filter);
        self.attributes = true;
        self
    }
}

/// Mutation record.
#[derive(Clone, Debug, PartialEq)]
pub struct MutationRecord {
    pub mutation_type: MutationType,
    /// Element whose attribute changed, text node whose data changed, or
    /// parent whose children changed.
    pub target: NodeId,
    pub added_nodes: Vec<NodeId>,
    pub removed_nodes: Vec<NodeId>,
    pub attribute_name: Option<String>,
    /// Previous value, present only when the observer asked for it.
    pub old_value: Option<String>,
}

impl MutationRecord {
    pub fn child_list(target: NodeId) -> Self {
        Self {
            mutation_type: MutationType::ChildList,
            target,
            added_nodes: Vec::new(),
            removed_nodes: Vec::new(),
            attribute_name: None,
            old_value: None,
        }
    }

    pub fn attributes(target: NodeId, attribute_name: &str, old_value: Option<String>) -> Self {
        Self {
            mutation_type: MutationType::Attributes,
            target,
            added_nodes: Vec::new(),
            removed_nodes: Vec::new(),
            attribute_name: Some(attribute_name.to_string()),
            old_value,
        }
    }

    pub fn character_data(target: NodeId, old_value: Option<String>) -> Self {
        Self {
            mutation_type: MutationType::CharacterData,
            target,
            added_nodes: Vec::new(),
            removed_nodes: Vec::new(),
            attribute_name: None,
            old_value,
        }
    }

    pub fn with_added_node(mut self, node: NodeId) -> Self {
        self.added_nodes.push(node);
        self
    }

    pub fn with_removed_node(mut self, node: NodeId) -> Self {
        self.removed_nodes.push(node);
        self
    }
}

/// Mutation type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MutationType {
    ChildList,
    Attributes,
    CharacterData,
}

impl std::fmt::Display for MutationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MutationType::ChildList => write!(f, "childList"),
            MutationType::Attributes => write!(f, "attributes"),
            MutationType::CharacterData => write!(f, "characterData"),
        }
    }
}

/// All observers registered on one tree.
#[derive(Debug, Default)]
pub(crate) struct MutationObservers {
    observers: SlotMap<MutationObserverId, MutationObserver>,
}

impl MutationObservers {
    pub(crate) fn register(&mut self) -> MutationObserverId {
        self.observers.insert(MutationObserver::default())
    }

    pub(crate) fn unregister(&mut self, id: MutationObserverId) -> bool {
        self.observers.remove(id).is_some()
    }

    pub(crate) fn get_mut(&mut self, id: MutationObserverId) -> DomResult<&mut MutationObserver> {
        self.observers.get_mut(id).ok_or(DomError::UnknownObserver)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Queue `record` on every interested observer. `contains(a, b)` tells
    /// whether `b` is a descendant of `a`.
    pub(crate) fn notify(
        &mut self,
        record: &MutationRecord,
        contains: &dyn Fn(NodeId, NodeId) -> bool,
    ) {
        for observer in self.observers.values_mut() {
            let Some(options) = observer.interest(record, contains) else {
                continue;
            };

            let keep_old = match record.mutation_type {
                MutationType::Attributes => options.attribute_old_value,
                MutationType::CharacterData => options.character_data_old_value,
                MutationType::ChildList => false,
            };

            let mut queued = record.clone();
            if !keep_old {
                queued.old_value = None;
            }
            observer.pending_records.push_back(queued);
        }
    }
}
