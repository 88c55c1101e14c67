//! JSON scene descriptions.
//!
//! A scene is an element tree with host-provided bounds, since there is no
//! layout engine behind the viewer:
//!
//! ```json
//! {
//!   "viewport": { "width": 800, "height": 600 },
//!   "root": {
//!     "tag": "div",
//!     "bounds": { "x": 0, "y": 0, "width": 400, "height": 300 },
//!     "children": [
//!       { "tag": "div", "attrs": { "data-layer": "" },
//!         "bounds": { "x": 20, "y": 20, "width": 100, "height": 80 } }
//!     ]
//!   }
//! }
//! ```

use common::{Rect, Size};
use dom::{BoxGeometry, DomError, DomTree, NodeId};
use parking_lot::RwLock;
use render::MemoryLoader;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum SceneError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid scene: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("DOM error: {0}")]
    Dom(#[from] DomError),
}

fn default_viewport() -> Size {
    Size::new(1280.0, 720.0)
}

/// Top-level scene file.
#[derive(Debug, Deserialize)]
pub struct SceneFile {
    #[serde(default = "default_viewport")]
    pub viewport: Size,
    /// Resource URL to file path, relative to the scene file.
    #[serde(default)]
    pub resources: BTreeMap<String, PathBuf>,
    pub root: SceneNode,
    /// Attach the root to the body instead of leaving it detached.
    #[serde(default = "default_attached")]
    pub attached: bool,
}

fn default_attached() -> bool {
    true
}

/// One element of the scene.
#[derive(Debug, Deserialize)]
pub struct SceneNode {
    pub tag: String,
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
    #[serde(default)]
    pub bounds: Rect,
    /// Bounds used while the element carries a class.
    #[serde(default)]
    pub class_bounds: BTreeMap<String, Rect>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub children: Vec<SceneNode>,
}

/// A built scene, ready to hand to a layer tree.
pub struct Scene {
    pub dom: Arc<RwLock<DomTree>>,
    pub geometry: Arc<BoxGeometry>,
    pub loader: Arc<MemoryLoader>,
    pub root: NodeId,
}

impl SceneFile {
    pub fn from_json(json: &str) -> Result<Self, SceneError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, SceneError> {
        let json = std::fs::read_to_string(path).map_err(|source| SceneError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Build the DOM and geometry. Resource paths resolve against `base`.
    pub fn build(&self, base: Option<&Path>) -> Result<Scene, SceneError> {
        let mut dom = DomTree::with_body();
        let geometry = Arc::new(BoxGeometry::new(self.viewport));

        let root = build_node(&mut dom, &geometry, &self.root)?;
        if self.attached {
            let host = dom.body().unwrap_or_else(|| dom.document());
            dom.append_child(host, root)?;
        }

        let loader = Arc::new(MemoryLoader::new());
        for (url, path) in &self.resources {
            let path = match base {
                Some(base) => base.join(path),
                None => path.clone(),
            };
            let bytes = std::fs::read(&path).map_err(|source| SceneError::Io {
                path: path.clone(),
                source,
            })?;
            debug!(url = %url, bytes = bytes.len(), "resource loaded");
            loader.insert(url.clone(), bytes);
        }

        debug!(nodes = dom.len(), "scene built");
        Ok(Scene {
            dom: Arc::new(RwLock::new(dom)),
            geometry,
            loader,
            root,
        })
    }
}

fn build_node(
    dom: &mut DomTree,
    geometry: &BoxGeometry,
    node: &SceneNode,
) -> Result<NodeId, SceneError> {
    let element = dom.create_element(&node.tag);
    for (name, value) in &node.attrs {
        dom.set_attribute(element, name, value)?;
    }
    geometry.set_bounds(element, node.bounds);
    for (class, bounds) in &node.class_bounds {
        geometry.set_class_bounds(element, class, *bounds);
    }
    if let Some(text) = &node.text {
        dom.set_text_content(element, text)?;
    }
    for child in &node.children {
        let child = build_node(dom, geometry, child)?;
        dom.append_child(element, child)?;
    }
    Ok(element)
}
