//! Frame loop and exports.

use crate::scene::Scene;
use anyhow::{Context, Result};
use render::SoftwareRasterizer;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};
use web_apis::{ClockDeadline, SystemClock};
use weblayer::{DefaultTransition, LayerConfig, LayerSnapshot, LayerTree, Ray};

/// How the viewer drives the tree.
#[derive(Clone, Debug)]
pub struct ViewerOptions {
    /// Frames to run.
    pub frames: u32,
    /// Interpolation factor per frame.
    pub lerp: f32,
    pub rays: Vec<Ray>,
    /// Drain against an idle deadline of this length instead of the
    /// fallback tick.
    pub idle_budget: Option<Duration>,
}

impl Default for ViewerOptions {
    fn default() -> Self {
        Self {
            frames: 60,
            lerp: 0.2,
            rays: Vec::new(),
            idle_budget: None,
        }
    }
}

/// A layer tree over a loaded scene.
pub struct Viewer {
    scene: Scene,
    tree: LayerTree,
    idle_frames: u32,
}

impl Viewer {
    pub fn new(scene: Scene, config: LayerConfig) -> Result<Self> {
        let backend = SoftwareRasterizer::new(scene.geometry.clone(), scene.loader.clone());
        let tree = LayerTree::new(
            scene.dom.clone(),
            scene.geometry.clone(),
            Box::new(backend),
            config,
            scene.root,
        )
        .context("failed to create layer tree")?;

        Ok(Self {
            scene,
            tree,
            idle_frames: 0,
        })
    }

    pub fn tree(&self) -> &LayerTree {
        &self.tree
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Run the frame loop: update, then a fallback raster drain each frame.
    pub async fn run(&mut self, options: &ViewerOptions) -> Result<()> {
        self.tree.set_interaction_rays(options.rays.clone());
        let root = self.tree.root();
        let clock = SystemClock::new();

        for frame in 0..options.frames {
            self.tree.update(root, options.lerp, &DefaultTransition)?;
            let drained = match options.idle_budget {
                Some(budget) => {
                    let deadline = ClockDeadline::new(&clock, budget);
                    self.tree.run_idle(&deadline).await
                }
                None => self.tree.run_tick(&clock).await,
            };
            if drained == 0 {
                self.idle_frames += 1;
            }
            debug!(frame, drained, queued = self.tree.queue_len(), "frame");
        }

        let stats = self.tree.stats();
        info!(
            layers = self.tree.len(),
            rasterized = stats.layers_rasterized,
            failures = stats.failures,
            idle_frames = self.idle_frames,
            "run finished"
        );
        Ok(())
    }

    pub fn snapshot(&self) -> Result<LayerSnapshot> {
        Ok(self.tree.snapshot(self.tree.root())?)
    }

    /// Write the current texture of every layer as `layer-<id>.png`.
    pub fn export_textures(&self, dir: &Path) -> Result<usize> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;

        let mut written = 0;
        let mut result = Ok(());
        self.tree.traverse(self.tree.root(), |_, layer| {
            if result.is_err() {
                return;
            }
            let Some(image) = layer
                .current_texture()
                .and_then(|t| t.pixels())
                .and_then(|p| p.to_rgba_image())
            else {
                return;
            };
            let path = dir.join(format!("layer-{}.png", layer.id()));
            result = image
                .save(&path)
                .with_context(|| format!("failed to write {}", path.display()));
            if result.is_ok() {
                written += 1;
            }
        });
        result?;

        info!(written, dir = %dir.display(), "textures exported");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::SceneFile;

    const SCENE: &str = r#"{
        "viewport": { "width": 800, "height": 600 },
        "root": {
            "tag": "div",
            "bounds": { "x": 0, "y": 0, "width": 400, "height": 300 },
            "children": [
                { "tag": "div", "attrs": { "data-layer": "" },
                  "bounds": { "x": 20, "y": 20, "width": 100, "height": 80 } },
                { "tag": "div", "attrs": { "data-layer": "" },
                  "bounds": { "x": 200, "y": 20, "width": 100, "height": 80 } }
            ]
        }
    }"#;

    fn viewer() -> Viewer {
        let scene = SceneFile::from_json(SCENE).unwrap().build(None).unwrap();
        Viewer::new(scene, LayerConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_run_rasterizes_everything() {
        let mut viewer = viewer();
        let options = ViewerOptions {
            frames: 10,
            lerp: 1.0,
            rays: Vec::new(),
            idle_budget: Some(Duration::from_millis(50)),
        };
        viewer.run(&options).await.unwrap();

        assert_eq!(viewer.tree().queue_len(), 0);
        let snapshot = viewer.snapshot().unwrap();
        assert_eq!(snapshot.count(), 3);
        assert!(snapshot.children.iter().all(|c| c.texture.is_some()));
    }

    #[tokio::test]
    async fn test_export_textures() {
        let mut viewer = viewer();
        viewer.run(&ViewerOptions { frames: 10, ..Default::default() }).await.unwrap();

        let dir = std::env::temp_dir().join(format!("weblayer-viewer-{}", std::process::id()));
        let written = viewer.export_textures(&dir).unwrap();
        assert_eq!(written, 3);
        assert!(dir.join("layer-1.png").exists());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
