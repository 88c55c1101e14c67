//! DOM Tree implementation.
//!
//! All structural and attribute mutations go through [`DomTree`] so that
//! they can be recorded for mutation observers.

use crate::element::{ElementData, TagName};
use crate::error::{DomError, DomResult};
use crate::mutation_observer::{
    MutationObserverId, MutationObserverInit, MutationObservers, MutationRecord,
};
use crate::node::{Node, NodeData, NodeId};
use crate::selector::Selector;
use slotmap::SlotMap;
use tracing::trace;

/// The DOM tree structure.
#[derive(Debug)]
pub struct DomTree {
    /// All nodes, connected or not.
    nodes: SlotMap<NodeId, Node>,
    /// Document node.
    document: NodeId,
    observers: MutationObservers,
}

impl DomTree {
    pub fn new() -> Self {
        let mut nodes = SlotMap::with_key();
        let document = nodes.insert_with_key(|id| Node::new(id, NodeData::Document));
        Self {
            nodes,
            document,
            observers: MutationObservers::default(),
        }
    }

    /// Create a tree holding `<html><body></body></html>`.
    pub fn with_body() -> Self {
        let mut tree = Self::new();
        let html = tree.create_element("html");
        let body = tree.create_element("body");
        let document = tree.document;
        // Fresh nodes under a fresh document cannot form a cycle.
        let _ = tree.append_child(document, html);
        let _ = tree.append_child(html, body);
        tree
    }

    /// The document node.
    pub fn document(&self) -> NodeId {
        self.document
    }

    /// First element child of the document.
    pub fn document_element(&self) -> Option<NodeId> {
        self.child_elements(self.document).next()
    }

    /// The `body` element, if present.
    pub fn body(&self) -> Option<NodeId> {
        let html = self.document_element()?;
        self.child_elements(html)
            .find(|&id| self.get_element(id).is_some_and(|e| e.tag_name == "body"))
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Get element data for a node.
    pub fn get_element(&self, id: NodeId) -> Option<&ElementData> {
        self.nodes.get(id).and_then(|n| n.as_element())
    }

    /// Element data for a node, or an error naming why there is none.
    pub fn element(&self, id: NodeId) -> DomResult<&ElementData> {
        self.nodes
            .get(id)
            .ok_or(DomError::NotFound(id))?
            .as_element()
            .ok_or(DomError::NotAnElement(id))
    }

    fn element_mut(&mut self, id: NodeId) -> DomResult<&mut ElementData> {
        self.nodes
            .get_mut(id)
            .ok_or(DomError::NotFound(id))?
            .as_element_mut()
            .ok_or(DomError::NotAnElement(id))
    }

    /// Create a detached element node.
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.create_element_with(ElementData::new(TagName::new(tag)))
    }

    pub fn create_element_with(&mut self, data: ElementData) -> NodeId {
        self.nodes
            .insert_with_key(|id| Node::new(id, NodeData::Element(data)))
    }

    /// Create a detached text node.
    pub fn create_text(&mut self, content: &str) -> NodeId {
        self.nodes.insert_with_key(|id| {
            Node::new(
                id,
                NodeData::Text {
                    content: content.to_string(),
                },
            )
        })
    }

    pub fn create_comment(&mut self, content: &str) -> NodeId {
        self.nodes.insert_with_key(|id| {
            Node::new(
                id,
                NodeData::Comment {
                    content: content.to_string(),
                },
            )
        })
    }

    /// Append a child to a parent node, moving it from its old parent.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> DomResult<()> {
        self.insert_before(parent, child, None)
    }

    /// Insert `child` before `reference` (or at the end when `None`).
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> DomResult<()> {
        if !self.nodes.contains_key(parent) {
            return Err(DomError::NotFound(parent));
        }
        if !self.nodes.contains_key(child) {
            return Err(DomError::NotFound(child));
        }
        if self.contains(child, parent) || self.nodes[child].is_document() {
            return Err(DomError::HierarchyRequest { parent, child });
        }
        if let Some(reference) = reference {
            if self.parent(reference) != Some(parent) {
                return Err(DomError::NotFound(reference));
            }
        }

        self.detach(child)?;

        let parent_node = &mut self.nodes[parent];
        let position = reference
            .and_then(|r| parent_node.children.iter().position(|&id| id == r))
            .unwrap_or(parent_node.children.len());
        parent_node.children.insert(position, child);
        self.nodes[child].parent = Some(parent);

        self.record(MutationRecord::child_list(parent).with_added_node(child));
        Ok(())
    }

    /// Remove `child` from `parent`. The node stays alive, detached.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> DomResult<()> {
        if self.parent(child) != Some(parent) {
            return Err(DomError::NotFound(child));
        }
        self.detach(child)
    }

    /// Detach a node from its parent, if it has one.
    pub fn detach(&mut self, node: NodeId) -> DomResult<()> {
        let parent = self.nodes.get(node).ok_or(DomError::NotFound(node))?.parent;
        let Some(parent) = parent else {
            return Ok(());
        };

        if let Some(parent_node) = self.nodes.get_mut(parent) {
            parent_node.children.retain(|id| *id != node);
        }
        self.nodes[node].parent = None;

        self.record(MutationRecord::child_list(parent).with_removed_node(node));
        Ok(())
    }

    /// Detach a node and free it with its whole subtree.
    pub fn remove(&mut self, node: NodeId) -> DomResult<()> {
        if node == self.document {
            return Err(DomError::HierarchyRequest {
                parent: node,
                child: node,
            });
        }
        self.detach(node)?;

        let mut to_remove = vec![node];
        let mut i = 0;
        while i < to_remove.len() {
            if let Some(n) = self.nodes.get(to_remove[i]) {
                to_remove.extend(n.children.iter().copied());
            }
            i += 1;
        }
        for id in to_remove {
            self.nodes.remove(id);
        }
        Ok(())
    }

    /// Copy a node (and its descendants when `deep`) into a detached clone.
    pub fn clone_node(&mut self, node: NodeId, deep: bool) -> DomResult<NodeId> {
        let source = self.nodes.get(node).ok_or(DomError::NotFound(node))?;
        let data = source.data.clone();
        let children: Vec<NodeId> = if deep {
            source.children.to_vec()
        } else {
            Vec::new()
        };

        let clone = self.nodes.insert_with_key(|id| Node::new(id, data));
        for child in children {
            let child_clone = self.clone_node(child, true)?;
            self.nodes[child_clone].parent = Some(clone);
            self.nodes[clone].children.push(child_clone);
        }
        Ok(clone)
    }

    /// Set an attribute on an element.
    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> DomResult<()> {
        let old = self.element_mut(node)?.set_attribute(name, value);
        self.record(MutationRecord::attributes(
            node,
            &name.to_ascii_lowercase(),
            old,
        ));
        Ok(())
    }

    /// Remove an attribute. Removing an absent attribute records nothing.
    pub fn remove_attribute(&mut self, node: NodeId, name: &str) -> DomResult<()> {
        if let Some(old) = self.element_mut(node)?.remove_attribute(name) {
            self.record(MutationRecord::attributes(
                node,
                &name.to_ascii_lowercase(),
                Some(old),
            ));
        }
        Ok(())
    }

    /// Add a class. Returns whether the class list changed.
    pub fn add_class(&mut self, node: NodeId, class: &str) -> DomResult<bool> {
        match self.element_mut(node)?.add_class(class) {
            Some(old) => {
                self.record(MutationRecord::attributes(node, "class", Some(old)));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Remove a class. Returns whether the class list changed.
    pub fn remove_class(&mut self, node: NodeId, class: &str) -> DomResult<bool> {
        match self.element_mut(node)?.remove_class(class) {
            Some(old) => {
                self.record(MutationRecord::attributes(node, "class", Some(old)));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Toggle a class; returns whether it is present afterwards.
    pub fn toggle_class(&mut self, node: NodeId, class: &str) -> DomResult<bool> {
        if self.element(node)?.has_class(class) {
            self.remove_class(node, class)?;
            Ok(false)
        } else {
            self.add_class(node, class)?;
            Ok(true)
        }
    }

    /// Replace the data of a text or comment node.
    pub fn set_text(&mut self, node: NodeId, text: &str) -> DomResult<()> {
        let n = self.nodes.get_mut(node).ok_or(DomError::NotFound(node))?;
        let old = match &mut n.data {
            NodeData::Text { content } | NodeData::Comment { content } => {
                std::mem::replace(content, text.to_string())
            }
            _ => return Err(DomError::NotAnElement(node)),
        };
        self.record(MutationRecord::character_data(node, Some(old)));
        Ok(())
    }

    /// Replace all children of an element with a single text node.
    pub fn set_text_content(&mut self, node: NodeId, text: &str) -> DomResult<()> {
        if self.nodes.get(node).ok_or(DomError::NotFound(node))?.as_text().is_some() {
            return self.set_text(node, text);
        }
        let children: Vec<NodeId> = self.children(node).collect();
        for child in children {
            self.remove(child)?;
        }
        if !text.is_empty() {
            let text_node = self.create_text(text);
            self.append_child(node, text_node)?;
        }
        Ok(())
    }

    /// Text content of a node and its descendants.
    pub fn text_content(&self, node: NodeId) -> String {
        let mut result = String::new();
        if let Some(text) = self.get(node).and_then(|n| n.as_text()) {
            result.push_str(text);
        }
        for id in self.descendants(node) {
            if let Some(text) = self.get(id).and_then(|n| n.as_text()) {
                result.push_str(text);
            }
        }
        result
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node).and_then(|n| n.parent)
    }

    /// Get all children.
    pub fn children(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .get(node)
            .into_iter()
            .flat_map(|n| n.children.iter().copied())
    }

    /// Element children only.
    pub fn child_elements(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(node)
            .filter(move |&id| self.nodes.get(id).is_some_and(|n| n.is_element()))
    }

    /// Get ancestors, nearest first.
    pub fn ancestors(&self, node: NodeId) -> AncestorIterator<'_> {
        AncestorIterator {
            tree: self,
            current: self.parent(node),
        }
    }

    /// Get descendants (pre-order).
    pub fn descendants(&self, node: NodeId) -> DescendantIterator<'_> {
        let stack = self
            .nodes
            .get(node)
            .map(|n| n.children.iter().rev().copied().collect())
            .unwrap_or_default();
        DescendantIterator { tree: self, stack }
    }

    /// Whether `node` is `ancestor` or one of its descendants.
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        is_inclusive_ancestor(&self.nodes, ancestor, node)
    }

    /// Number of parent steps from `ancestor` down to `node`.
    pub fn depth_below(&self, ancestor: NodeId, node: NodeId) -> Option<u32> {
        let mut depth = 0;
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return Some(depth);
            }
            depth += 1;
            current = self.parent(id);
        }
        None
    }

    /// Whether the node is attached to the document.
    pub fn is_connected(&self, node: NodeId) -> bool {
        self.contains(self.document, node)
    }

    /// Find a connected element by its `id` attribute.
    pub fn find_element_by_id(&self, id: &str) -> Option<NodeId> {
        self.descendants(self.document)
            .find(|&node| self.get_element(node).and_then(|e| e.id()) == Some(id))
    }

    /// First connected element matching the selector.
    pub fn query_selector(&self, selector: &str) -> Option<NodeId> {
        self.query_selector_within(self.document, selector)
            .into_iter()
            .next()
    }

    pub fn query_selector_all(&self, selector: &str) -> Vec<NodeId> {
        self.query_selector_within(self.document, selector)
    }

    /// Descendants of `scope` matching the selector, in document order.
    pub fn query_selector_within(&self, scope: NodeId, selector: &str) -> Vec<NodeId> {
        let Some(selector) = Selector::parse(selector) else {
            trace!(selector, "unsupported selector");
            return Vec::new();
        };
        let Some((last, outer)) = selector.compounds.split_last() else {
            return Vec::new();
        };

        self.descendants(scope)
            .filter(|&id| {
                let Some(elem) = self.get_element(id) else {
                    return false;
                };
                if !last.matches(elem) {
                    return false;
                }
                // Right-to-left over the descendant combinators, bounded by scope.
                let mut ancestors = self
                    .ancestors(id)
                    .take_while(|&a| a != scope)
                    .filter_map(|a| self.get_element(a));
                outer
                    .iter()
                    .rev()
                    .all(|compound| ancestors.any(|a| compound.matches(a)))
            })
            .collect()
    }

    /// Register a new observer and start observing `target`.
    pub fn observe(
        &mut self,
        target: NodeId,
        options: MutationObserverInit,
    ) -> DomResult<MutationObserverId> {
        if !self.nodes.contains_key(target) {
            return Err(DomError::NotFound(target));
        }
        let id = self.observers.register();
        if let Err(err) = self.observers.get_mut(id)?.observe(target, options) {
            self.observers.unregister(id);
            return Err(err);
        }
        Ok(id)
    }

    /// Add another target to an existing observer.
    pub fn observe_more(
        &mut self,
        observer: MutationObserverId,
        target: NodeId,
        options: MutationObserverInit,
    ) -> DomResult<()> {
        self.observers.get_mut(observer)?.observe(target, options)
    }

    /// Drain the observer's pending records.
    pub fn take_records(&mut self, observer: MutationObserverId) -> Vec<MutationRecord> {
        self.observers
            .get_mut(observer)
            .map(|o| o.take_records())
            .unwrap_or_default()
    }

    /// Stop and forget an observer.
    pub fn disconnect(&mut self, observer: MutationObserverId) -> bool {
        self.observers.unregister(observer)
    }

    fn record(&mut self, record: MutationRecord) {
        if self.observers.is_empty() {
            return;
        }
        let nodes = &self.nodes;
        self.observers
            .notify(&record, &|ancestor, node| is_inclusive_ancestor(nodes, ancestor, node));
    }

    /// Get total number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Only the document node exists.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }
}

impl Default for DomTree {
    fn default() -> Self {
        Self::new()
    }
}

fn is_inclusive_ancestor(nodes: &SlotMap<NodeId, Node>, ancestor: NodeId, node: NodeId) -> bool {
    let mut current = Some(node);
    while let Some(id) = current {
        if id == ancestor {
            return true;
        }
        current = nodes.get(id).and_then(|n| n.parent);
    }
    false
}

/// Iterator over ancestor nodes.
pub struct AncestorIterator<'a> {
    tree: &'a DomTree,
    current: Option<NodeId>,
}

impl<'a> Iterator for AncestorIterator<'a> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current?;
        self.current = self.tree.parent(current);
        Some(current)
    }
}

/// Iterator over descendant nodes (pre-order traversal).
pub struct DescendantIterator<'a> {
    tree: &'a DomTree,
    stack: Vec<NodeId>,
}

impl<'a> Iterator for DescendantIterator<'a> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.stack.pop()?;

        // Children in reverse so the first child is visited first.
        if let Some(node) = self.tree.nodes.get(current) {
            self.stack.extend(node.children.iter().rev().copied());
        }

        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation_observer::MutationType;

    fn tree_with_div() -> (DomTree, NodeId) {
        let mut tree = DomTree::with_body();
        let body = tree.body().unwrap();
        let div = tree.create_element("div");
        tree.append_child(body, div).unwrap();
        (tree, div)
    }

    #[test]
    fn test_tree_creation() {
        let tree = DomTree::with_body();
        let html = tree.document_element().unwrap();
        assert_eq!(tree.get_element(html).unwrap().tag_name, TagName::new("html"));
        assert!(tree.body().is_some());
    }

    #[test]
    fn test_append_and_insert_before() {
        let (mut tree, div) = tree_with_div();
        let a = tree.create_element("span");
        let b = tree.create_element("span");
        tree.append_child(div, a).unwrap();
        tree.insert_before(div, b, Some(a)).unwrap();

        assert_eq!(tree.children(div).collect::<Vec<_>>(), vec![b, a]);
        assert_eq!(tree.parent(a), Some(div));
        assert!(tree.is_connected(a));
    }

    #[test]
    fn test_cycle_rejected() {
        let (mut tree, div) = tree_with_div();
        let child = tree.create_element("span");
        tree.append_child(div, child).unwrap();

        assert!(matches!(
            tree.append_child(child, div),
            Err(DomError::HierarchyRequest { .. })
        ));
    }

    #[test]
    fn test_remove_node() {
        let (mut tree, div) = tree_with_div();
        let span = tree.create_element("span");
        tree.append_child(div, span).unwrap();

        tree.remove(div).unwrap();

        assert!(tree.get(div).is_none());
        assert!(tree.get(span).is_none());
    }

    #[test]
    fn test_depth_below() {
        let (mut tree, div) = tree_with_div();
        let inner = tree.create_element("span");
        let leaf = tree.create_element("b");
        tree.append_child(div, inner).unwrap();
        tree.append_child(inner, leaf).unwrap();

        assert_eq!(tree.depth_below(div, leaf), Some(2));
        assert_eq!(tree.depth_below(div, div), Some(0));
        assert_eq!(tree.depth_below(leaf, div), None);
    }

    #[test]
    fn test_query_selector() {
        let (mut tree, div) = tree_with_div();
        tree.set_attribute(div, "class", "card").unwrap();
        let span = tree.create_element("span");
        tree.set_attribute(span, "data-layer", "4").unwrap();
        tree.append_child(div, span).unwrap();

        assert_eq!(tree.query_selector(".card"), Some(div));
        assert_eq!(tree.query_selector(".card span"), Some(span));
        assert_eq!(tree.query_selector("[data-layer=4]"), Some(span));
        assert_eq!(tree.query_selector("#missing"), None);
        assert_eq!(tree.query_selector_within(div, ".card"), Vec::<NodeId>::new());
    }

    #[test]
    fn test_clone_node_is_detached() {
        let (mut tree, div) = tree_with_div();
        tree.set_attribute(div, "data-layer", "1").unwrap();
        let child = tree.create_element("span");
        tree.append_child(div, child).unwrap();

        let clone = tree.clone_node(div, true).unwrap();
        assert!(!tree.is_connected(clone));
        assert_eq!(tree.element(clone).unwrap().get_attribute("data-layer"), Some("1"));
        assert_eq!(tree.children(clone).count(), 1);
    }

    #[test]
    fn test_mutation_records() {
        let (mut tree, div) = tree_with_div();
        let body = tree.body().unwrap();
        let observer = tree
            .observe(
                body,
                MutationObserverInit::new()
                    .child_list()
                    .attribute_old_value()
                    .character_data()
                    .subtree(),
            )
            .unwrap();

        tree.add_class(div, "hover").unwrap();
        tree.add_class(div, "hover").unwrap();
        tree.set_text_content(div, "hello").unwrap();

        let records = tree.take_records(observer);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].mutation_type, MutationType::Attributes);
        assert_eq!(records[0].old_value.as_deref(), Some(""));
        assert_eq!(records[1].mutation_type, MutationType::ChildList);
        assert_eq!(records[1].target, div);

        let text = tree.children(div).next().unwrap();
        tree.set_text(text, "bye").unwrap();
        let records = tree.take_records(observer);
        assert_eq!(records[0].mutation_type, MutationType::CharacterData);
        assert_eq!(records[0].old_value, None);

        assert!(tree.disconnect(observer));
        tree.add_class(div, "other").unwrap();
        assert!(tree.take_records(observer).is_empty());
    }

    #[test]
    fn test_observe_rejects_empty_options() {
        let (mut tree, div) = tree_with_div();
        assert!(matches!(
            tree.observe(div, MutationObserverInit::new()),
            Err(DomError::InvalidObserverOptions(_))
        ));
    }
}
