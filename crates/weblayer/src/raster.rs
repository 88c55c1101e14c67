//! Rasterization of queued layers into state × hover textures.

use crate::attributes::{effective_pixel_ratio, DISABLE_TRANSFORMS_ATTR, HOVER_CLASS};
use crate::config::LayerEvent;
use crate::layer::{LayerId, LayerKind};
use crate::tree::LayerTree;
use common::{LayerError, LayerResult, Rect};
use dom::{DomTree, NodeId};
use render::{RenderJob, RenderOptions, Texture};
use std::time::Duration;
use tracing::{debug, instrument, trace, warn};
use web_apis::{yield_tick, Clock, IdleDeadline};

/// One state × hover permutation captured for painting.
struct PreparedSlot {
    state: String,
    hover: u32,
    bounds: Rect,
    /// `None` when the element had no area in this configuration.
    job: Option<RenderJob>,
}

/// DOM changes made for the duration of a capture.
struct CaptureGuard {
    classes: Vec<(NodeId, Option<String>)>,
    hidden: Vec<NodeId>,
    transforms_disabled: Option<NodeId>,
}

impl CaptureGuard {
    fn restore(self, dom: &mut DomTree) -> LayerResult<()> {
        for (node, class) in self.classes {
            match class {
                Some(class) => dom.set_attribute(node, "class", &class)?,
                None => dom.remove_attribute(node, "class")?,
            }
        }
        for node in self.hidden {
            dom.remove_attribute(node, "hidden")?;
        }
        if let Some(root) = self.transforms_disabled {
            dom.remove_attribute(root, DISABLE_TRANSFORMS_ATTR)?;
        }
        Ok(())
    }
}

impl LayerTree {
    /// Drain the raster queue while `deadline` reports time remaining.
    ///
    /// Returns the number of layers rasterized.
    #[instrument(skip_all)]
    pub async fn run_idle(&mut self, deadline: &dyn IdleDeadline) -> usize {
        self.stats.drains += 1;
        let mut drained = 0;

        while !self.queue.is_empty() && deadline.time_remaining() > Duration::ZERO {
            let Some(layer) = self.queue.pop() else {
                break;
            };
            if self.rasterize(layer).await {
                drained += 1;
            }
        }

        debug!(drained, remaining = self.queue.len(), "idle drain finished");
        self.flush_events();
        drained
    }

    /// Fallback drain: yield one tick, then rasterize until the configured
    /// wall clock budget is spent. The budget is checked after each layer.
    #[instrument(skip_all)]
    pub async fn run_tick(&mut self, clock: &dyn Clock) -> usize {
        yield_tick().await;
        self.stats.drains += 1;

        let budget = self.config.raster_budget();
        let started = clock.now();
        let mut drained = 0;

        while let Some(layer) = self.queue.pop() {
            if self.rasterize(layer).await {
                drained += 1;
            }
            if clock.now().saturating_sub(started) >= budget {
                break;
            }
        }

        debug!(drained, remaining = self.queue.len(), "tick drain finished");
        self.flush_events();
        drained
    }

    /// Rasterize every state × hover permutation of one layer.
    ///
    /// Failures are logged and leave the affected slots with their previous
    /// texture. Returns whether the layer was rasterized.
    pub(crate) async fn rasterize(&mut self, id: LayerId) -> bool {
        let Some(layer) = self.layers.get_mut(id) else {
            trace!("skipping disposed layer");
            return false;
        };
        layer.queued = false;
        if layer.needs_removal || layer.kind == LayerKind::Video {
            return false;
        }
        let layer_id = layer.id;

        let prepared = {
            let dom_lock = self.dom.clone();
            let mut dom = dom_lock.write();
            self.stash_pending(&mut dom);
            self.updating = true;
            let prepared = self.capture(&mut dom, id);
            self.discard_own_records(&mut dom);
            self.updating = false;
            prepared
        };
        let prepared = match prepared {
            Ok(prepared) => prepared,
            Err(err) => {
                warn!(id = layer_id, error = %err, "layer capture failed");
                self.stats.failures += 1;
                return false;
            }
        };

        if let Err(err) = self.backend.ready().await {
            warn!(id = layer_id, error = %err, "render resources unavailable");
            self.stats.failures += 1;
            return false;
        }

        let mut committed = 0u64;
        for slot in prepared {
            let texture = match &slot.job {
                Some(job) => match self.backend.paint(job) {
                    Ok(pixels) => Some(Texture::bitmap(pixels)),
                    Err(err) => {
                        warn!(
                            id = layer_id,
                            state = %slot.state,
                            hover = slot.hover,
                            error = %err,
                            "paint failed"
                        );
                        self.stats.failures += 1;
                        continue;
                    }
                },
                None => None,
            };

            let Some(target) = self
                .layers
                .get_mut(id)
                .and_then(|layer| layer.states.get_mut(&slot.state))
                .and_then(|slots| slots.get_mut(slot.hover as usize))
            else {
                continue;
            };
            target.bounds = slot.bounds;
            if texture.is_some() {
                target.texture = texture;
                committed += 1;
            }
        }

        if let Some(layer) = self.layers.get_mut(id) {
            layer.rasterized = true;
            layer.update_target_opacity();
        }
        self.stats.layers_rasterized += 1;
        self.stats.textures_committed += committed;
        self.events.push(LayerEvent::Rasterized(id));

        debug!(id = layer_id, committed, "layer rasterized");
        true
    }

    /// Put the element through each configuration and prepare a job for it,
    /// restoring the DOM afterwards whatever happened.
    fn capture(&mut self, dom: &mut DomTree, id: LayerId) -> LayerResult<Vec<PreparedSlot>> {
        let layer = self.layers.get(id).ok_or_else(|| LayerError::unknown(id))?;
        let element = layer.element;
        let states = layer.attributes.states.clone();
        let depth = layer.attributes.hover_depth;
        let options = RenderOptions {
            pixel_ratio: effective_pixel_ratio(
                self.config.pixel_ratio,
                layer.attributes.pixel_ratio,
            ),
            allow_taint: self.config.allow_taint,
            origin: self.config.origin.clone(),
        };
        let child_elements: Vec<NodeId> = layer
            .child_layers
            .iter()
            .filter_map(|child| self.layers.get(*child))
            .map(|child| child.element)
            .collect();

        // Element plus ancestors at distance < depth.
        let chain: Vec<NodeId> = std::iter::once(element)
            .chain(dom.ancestors(element))
            .filter(|node| dom.get_element(*node).is_some())
            .take(depth as usize)
            .collect();

        let guard = self.begin_capture(dom, element, &chain, &child_elements)?;
        let prepared = self.capture_permutations(dom, element, &chain, &states, depth, &options);
        guard.restore(dom)?;
        prepared
    }

    fn begin_capture(
        &self,
        dom: &mut DomTree,
        element: NodeId,
        chain: &[NodeId],
        child_elements: &[NodeId],
    ) -> LayerResult<CaptureGuard> {
        let saved: Vec<NodeId> = if chain.is_empty() {
            vec![element]
        } else {
            chain.to_vec()
        };
        let classes = saved
            .into_iter()
            .map(|node| {
                let class = dom
                    .get_element(node)
                    .and_then(|e| e.get_attribute("class"))
                    .map(String::from);
                (node, class)
            })
            .collect();

        // Child layers render into their own textures.
        let mut hidden = Vec::new();
        for child in child_elements {
            if dom.get_element(*child).is_some_and(|e| !e.is_hidden()) {
                dom.set_attribute(*child, "hidden", "")?;
                hidden.push(*child);
            }
        }

        let mut transforms_disabled = None;
        if let Some(root) = dom.document_element() {
            if !dom.element(root)?.has_attribute(DISABLE_TRANSFORMS_ATTR) {
                dom.set_attribute(root, DISABLE_TRANSFORMS_ATTR, "")?;
                transforms_disabled = Some(root);
            }
        }

        Ok(CaptureGuard {
            classes,
            hidden,
            transforms_disabled,
        })
    }

    fn capture_permutations(
        &mut self,
        dom: &mut DomTree,
        element: NodeId,
        chain: &[NodeId],
        states: &[String],
        depth: u32,
        options: &RenderOptions,
    ) -> LayerResult<Vec<PreparedSlot>> {
        let mut prepared = Vec::with_capacity(states.len() * (depth as usize + 1));

        for state in states {
            for hover in 0..=depth {
                apply_configuration(dom, element, chain, states, state, hover)?;

                let bounds = self.geometry.bounds_of(dom, element);
                if bounds.is_empty() {
                    prepared.push(PreparedSlot {
                        state: state.clone(),
                        hover,
                        bounds: Rect::ZERO,
                        job: None,
                    });
                    continue;
                }

                match self.backend.prepare(dom, element, bounds, options) {
                    Ok(job) => {
                        self.stats.jobs_prepared += 1;
                        prepared.push(PreparedSlot {
                            state: state.clone(),
                            hover,
                            bounds,
                            job: Some(job),
                        });
                    }
                    Err(err) => {
                        warn!(state = %state, hover, error = %err, "render job failed");
                        self.stats.failures += 1;
                    }
                }
            }
        }

        Ok(prepared)
    }
}

/// Set the state classes of `element` and the hover classes of `chain` for
/// one permutation. Slot `hover` means the nearest hovered element in the
/// chain sits at distance `hover - 1`; slot 0 means none is hovered.
fn apply_configuration(
    dom: &mut DomTree,
    element: NodeId,
    chain: &[NodeId],
    states: &[String],
    state: &str,
    hover: u32,
) -> LayerResult<()> {
    for other in states.iter().filter(|s| !s.is_empty() && s.as_str() != state) {
        dom.remove_class(element, other)?;
    }
    if !state.is_empty() {
        dom.add_class(element, state)?;
    }

    for (distance, node) in chain.iter().enumerate() {
        if hover >= 1 && distance as u32 >= hover - 1 {
            dom.add_class(*node, HOVER_CLASS)?;
        } else {
            dom.remove_class(*node, HOVER_CLASS)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_configuration_hover_slots() {
        let mut dom = DomTree::with_body();
        let body = dom.body().unwrap();
        let outer = dom.create_element("div");
        let inner = dom.create_element("div");
        dom.append_child(body, outer).unwrap();
        dom.append_child(outer, inner).unwrap();
        let chain = [inner, outer];
        let states = vec![String::new(), "open".to_string()];
        let has = |dom: &DomTree, node, class| dom.element(node).unwrap().has_class(class);

        apply_configuration(&mut dom, inner, &chain, &states, "open", 0).unwrap();
        assert!(has(&dom, inner, "open"));
        assert!(!has(&dom, inner, HOVER_CLASS));
        assert!(!has(&dom, outer, HOVER_CLASS));

        apply_configuration(&mut dom, inner, &chain, &states, "", 1).unwrap();
        assert!(!has(&dom, inner, "open"));
        assert!(has(&dom, inner, HOVER_CLASS));
        assert!(has(&dom, outer, HOVER_CLASS));

        apply_configuration(&mut dom, inner, &chain, &states, "", 2).unwrap();
        assert!(!has(&dom, inner, HOVER_CLASS));
        assert!(has(&dom, outer, HOVER_CLASS));
    }
}
