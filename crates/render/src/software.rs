//! Software rasterization backend.
//!
//! Paints element boxes as solid rectangles and `img` elements as scaled
//! bitmaps. Text and borders are not drawn.

use crate::backend::{PaintBox, RasterBackend, RenderJob, RenderOptions};
use crate::error::{RasterError, RasterResult};
use crate::image_data::ImageData;
use crate::loader::{is_cross_origin, ResourceLoader};
use crate::pixel_buffer::PixelBuffer;
use async_trait::async_trait;
use common::{Color, Rect};
use dom::{traverse_child_elements, DomTree, ElementData, GeometryProbe, NodeId, Visit};
use indexmap::IndexSet;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Lightening applied to elements carrying the `hover` class.
const HOVER_LIGHTEN: f32 = 0.25;

/// Reference backend rendering into a [`PixelBuffer`].
pub struct SoftwareRasterizer {
    geometry: Arc<dyn GeometryProbe>,
    loader: Arc<dyn ResourceLoader>,
    /// Resources referenced by prepared jobs and not yet requested.
    pending: IndexSet<String>,
    images: HashMap<String, Arc<ImageData>>,
    /// Failures from the last `ready()`. These are requested again by the
    /// next job that references them.
    failed: HashMap<String, RasterError>,
    jobs_painted: usize,
}

impl SoftwareRasterizer {
    pub fn new(geometry: Arc<dyn GeometryProbe>, loader: Arc<dyn ResourceLoader>) -> Self {
        Self {
            geometry,
            loader,
            pending: IndexSet::new(),
            images: HashMap::new(),
            failed: HashMap::new(),
            jobs_painted: 0,
        }
    }

    pub fn jobs_painted(&self) -> usize {
        self.jobs_painted
    }

    fn paint_box(
        &mut self,
        dom: &DomTree,
        node: NodeId,
        origin: Rect,
        options: &RenderOptions,
    ) -> RasterResult<Option<PaintBox>> {
        let Some(elem) = dom.get_element(node) else {
            return Ok(None);
        };
        let image = if elem.tag_name == "img" {
            elem.get_attribute("src").map(str::to_string)
        } else {
            None
        };
        let background = style_background(elem);
        if image.is_none() && background.is_none() {
            return Ok(None);
        }

        if let Some(url) = &image {
            if !options.allow_taint && is_cross_origin(url, options.origin.as_deref()) {
                return Err(RasterError::tainted(url.clone()));
            }
            if !self.images.contains_key(url) {
                self.pending.insert(url.clone());
            }
        }

        let bounds = self.geometry.bounds_of(dom, node);
        Ok(Some(PaintBox {
            rect: bounds.translate(-origin.x, -origin.y),
            background,
            image,
        }))
    }
}

#[async_trait]
impl RasterBackend for SoftwareRasterizer {
    fn prepare(
        &mut self,
        dom: &DomTree,
        element: NodeId,
        bounds: Rect,
        options: &RenderOptions,
    ) -> RasterResult<RenderJob> {
        let elem = dom.get_element(element).ok_or(RasterError::NotRenderable(element))?;
        if bounds.is_empty() {
            return Err(RasterError::EmptyBounds);
        }

        let mut job = RenderJob::new(element, bounds, options.clone());
        job.push(PaintBox {
            rect: Rect::new(0.0, 0.0, bounds.width, bounds.height),
            background: Some(style_background(elem).unwrap_or_else(|| derived_color(elem))),
            image: None,
        });

        let mut first_error = None;
        traverse_child_elements(dom, element, |node, _| {
            if dom.get_element(node).is_some_and(|e| e.is_hidden()) {
                return Visit::Skip;
            }
            match self.paint_box(dom, node, bounds, options) {
                Ok(Some(paint_box)) => job.push(paint_box),
                Ok(None) => {}
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
            Visit::Descend
        });
        if let Some(err) = first_error {
            return Err(err);
        }

        trace!(?element, boxes = job.boxes.len(), "render job prepared");
        Ok(job)
    }

    async fn ready(&mut self) -> RasterResult<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let urls: Vec<String> = self.pending.drain(..).collect();
        debug!(count = urls.len(), "loading render resources");

        let results = self.loader.load_all(&urls).await;
        for (url, result) in urls.into_iter().zip(results) {
            match result.and_then(|bytes| ImageData::decode(&url, &bytes)) {
                Ok(image) => {
                    self.failed.remove(&url);
                    self.images.insert(url, Arc::new(image));
                }
                Err(err) => {
                    warn!(%url, error = %err, "render resource unavailable");
                    self.failed.insert(url, err);
                }
            }
        }
        Ok(())
    }

    fn paint(&mut self, job: &RenderJob) -> RasterResult<PixelBuffer> {
        let (width, height) = job.pixel_size();
        let ratio = job.options.pixel_ratio;
        let mut buffer = PixelBuffer::new(width, height);

        for paint_box in &job.boxes {
            let rect = paint_box.rect.to_pixel_rect(ratio);
            if let Some(color) = paint_box.background {
                buffer.fill_rect(rect, color);
            }
            if let Some(url) = &paint_box.image {
                match (self.images.get(url), self.failed.get(url)) {
                    (Some(image), _) => buffer.draw_image(rect, image),
                    (None, Some(err)) => return Err(err.clone()),
                    (None, None) => return Err(RasterError::NotReady(url.clone())),
                }
            }
        }

        self.jobs_painted += 1;
        Ok(buffer)
    }
}

/// `background` or `background-color` from the inline style.
fn style_background(elem: &ElementData) -> Option<Color> {
    let style = elem.get_attribute("style")?;
    let color = style.split(';').find_map(|decl| {
        let (name, value) = decl.split_once(':')?;
        match name.trim() {
            "background" | "background-color" => Color::from_hex(value.trim()),
            _ => None,
        }
    })?;
    Some(apply_hover(elem, color))
}

/// Stable color from the tag and class list, so distinct states paint
/// distinct bitmaps.
fn derived_color(elem: &ElementData) -> Color {
    let mut hasher = DefaultHasher::new();
    elem.tag_name.as_str().hash(&mut hasher);
    for class in elem.class_list.iter().filter(|c| c.as_ref() != "hover") {
        class.hash(&mut hasher);
    }
    let [r, g, b, ..] = hasher.finish().to_le_bytes();
    apply_hover(elem, Color::rgb(r, g, b))
}

fn apply_hover(elem: &ElementData, color: Color) -> Color {
    if elem.has_class("hover") {
        color.adjust_lightness(HOVER_LIGHTEN)
    } else {
        color
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::MemoryLoader;
    use common::Size;
    use dom::BoxGeometry;
    use std::io::Cursor;

    struct Fixture {
        dom: DomTree,
        geometry: Arc<BoxGeometry>,
        loader: Arc<MemoryLoader>,
        root: NodeId,
    }

    fn fixture() -> Fixture {
        let mut dom = DomTree::with_body();
        let body = dom.body().unwrap();
        let root = dom.create_element("div");
        dom.set_attribute(root, "style", "background: #102030").unwrap();
        dom.append_child(body, root).unwrap();

        let geometry = Arc::new(BoxGeometry::new(Size::new(800.0, 600.0)));
        geometry.set_bounds(root, Rect::new(10.0, 10.0, 4.0, 4.0));

        Fixture {
            dom,
            geometry,
            loader: Arc::new(MemoryLoader::new()),
            root,
        }
    }

    fn png(color: [u8; 4]) -> Vec<u8> {
        let mut bytes = Vec::new();
        image::RgbaImage::from_pixel(1, 1, image::Rgba(color))
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn backend(f: &Fixture) -> SoftwareRasterizer {
        SoftwareRasterizer::new(f.geometry.clone(), f.loader.clone())
    }

    #[tokio::test]
    async fn test_paints_background_and_child() {
        let mut f = fixture();
        let child = f.dom.create_element("span");
        f.dom.set_attribute(child, "style", "background-color: #ff0000").unwrap();
        f.dom.append_child(f.root, child).unwrap();
        f.geometry.set_bounds(child, Rect::new(12.0, 12.0, 2.0, 2.0));

        let mut backend = backend(&f);
        let bounds = f.geometry.bounds_of(&f.dom, f.root);
        let job = backend
            .prepare(&f.dom, f.root, bounds, &RenderOptions::default())
            .unwrap();
        backend.ready().await.unwrap();
        let pixels = backend.paint(&job).unwrap();

        assert_eq!((pixels.width, pixels.height), (4, 4));
        assert_eq!(pixels.get_pixel(0, 0), Color::rgb(0x10, 0x20, 0x30));
        assert_eq!(pixels.get_pixel(3, 3), Color::rgb(255, 0, 0));
    }

    #[tokio::test]
    async fn test_snapshot_ignores_later_mutation() {
        let mut f = fixture();
        let mut backend = backend(&f);
        let bounds = f.geometry.bounds_of(&f.dom, f.root);
        let job = backend
            .prepare(&f.dom, f.root, bounds, &RenderOptions::default())
            .unwrap();

        f.dom.set_attribute(f.root, "style", "background: #ffffff").unwrap();
        backend.ready().await.unwrap();
        let pixels = backend.paint(&job).unwrap();
        assert_eq!(pixels.get_pixel(1, 1), Color::rgb(0x10, 0x20, 0x30));
    }

    #[tokio::test]
    async fn test_images_load_behind_ready() {
        let mut f = fixture();
        let img = f.dom.create_element("img");
        f.dom.set_attribute(img, "src", "dot.png").unwrap();
        f.dom.append_child(f.root, img).unwrap();
        f.geometry.set_bounds(img, Rect::new(10.0, 10.0, 4.0, 4.0));
        f.loader.insert("dot.png", png([0, 255, 0, 255]));

        let mut backend = backend(&f);
        let bounds = f.geometry.bounds_of(&f.dom, f.root);
        let job = backend
            .prepare(&f.dom, f.root, bounds, &RenderOptions::default())
            .unwrap();

        assert_eq!(backend.paint(&job), Err(RasterError::NotReady("dot.png".into())));

        backend.ready().await.unwrap();
        let pixels = backend.paint(&job).unwrap();
        assert_eq!(pixels.get_pixel(2, 2), Color::rgb(0, 255, 0));
        assert_eq!(f.loader.load_count(), 1);

        // Second job reuses the decoded image.
        let job = backend
            .prepare(&f.dom, f.root, bounds, &RenderOptions::default())
            .unwrap();
        backend.ready().await.unwrap();
        assert!(backend.paint(&job).is_ok());
        assert_eq!(f.loader.load_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_image_is_requested_again() {
        let mut f = fixture();
        let img = f.dom.create_element("img");
        f.dom.set_attribute(img, "src", "late.png").unwrap();
        f.dom.append_child(f.root, img).unwrap();
        f.geometry.set_bounds(img, Rect::new(10.0, 10.0, 4.0, 4.0));

        let mut backend = backend(&f);
        let bounds = f.geometry.bounds_of(&f.dom, f.root);
        let job = backend
            .prepare(&f.dom, f.root, bounds, &RenderOptions::default())
            .unwrap();
        backend.ready().await.unwrap();
        assert!(matches!(
            backend.paint(&job),
            Err(RasterError::ResourceLoad { .. })
        ));
        assert_eq!(f.loader.load_count(), 1);

        f.loader.insert("late.png", png([0, 0, 255, 255]));
        let job = backend
            .prepare(&f.dom, f.root, bounds, &RenderOptions::default())
            .unwrap();
        backend.ready().await.unwrap();
        let pixels = backend.paint(&job).unwrap();
        assert_eq!(pixels.get_pixel(2, 2), Color::rgb(0, 0, 255));
        assert_eq!(f.loader.load_count(), 2);
    }

    #[test]
    fn test_taint_rejected_unless_allowed() {
        let mut f = fixture();
        let img = f.dom.create_element("img");
        f.dom.set_attribute(img, "src", "https://cdn.example/x.png").unwrap();
        f.dom.append_child(f.root, img).unwrap();

        let mut backend = backend(&f);
        let bounds = f.geometry.bounds_of(&f.dom, f.root);
        let options = RenderOptions {
            origin: Some("https://app.example".into()),
            ..Default::default()
        };
        assert!(matches!(
            backend.prepare(&f.dom, f.root, bounds, &options),
            Err(RasterError::Tainted { .. })
        ));

        let options = RenderOptions {
            allow_taint: true,
            ..options
        };
        assert!(backend.prepare(&f.dom, f.root, bounds, &options).is_ok());
    }

    #[test]
    fn test_hidden_children_skipped() {
        let mut f = fixture();
        let child = f.dom.create_element("span");
        f.dom.set_attribute(child, "style", "background: #ff0000").unwrap();
        f.dom.set_attribute(child, "hidden", "").unwrap();
        f.dom.append_child(f.root, child).unwrap();

        let mut backend = backend(&f);
        let bounds = f.geometry.bounds_of(&f.dom, f.root);
        let job = backend
            .prepare(&f.dom, f.root, bounds, &RenderOptions::default())
            .unwrap();
        assert_eq!(job.boxes.len(), 1);
    }

    #[test]
    fn test_empty_bounds() {
        let f = fixture();
        let mut backend = backend(&f);
        assert_eq!(
            backend.prepare(&f.dom, f.root, Rect::ZERO, &RenderOptions::default()),
            Err(RasterError::EmptyBounds)
        );
    }

    #[test]
    fn test_class_changes_color() {
        let mut elem = ElementData::new(dom::TagName::div());
        let plain = derived_color(&elem);
        elem.add_class("selected");
        assert_ne!(derived_color(&elem), plain);
        elem.add_class("hover");
        let lightened = derived_color_without_hover(&elem).adjust_lightness(HOVER_LIGHTEN);
        assert_eq!(derived_color(&elem), lightened);
    }

    fn derived_color_without_hover(elem: &ElementData) -> Color {
        let mut elem = elem.clone();
        elem.remove_class("hover");
        derived_color(&elem)
    }
}
