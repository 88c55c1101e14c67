//! Layer tree configuration.

use crate::layer::LayerId;
use common::{LayerError, LayerResult, Size};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Lifecycle notification delivered to [`LayerConfig::on_layer_event`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayerEvent {
    Created(LayerId),
    Rasterized(LayerId),
    Removed(LayerId),
}

pub type LayerCallback = Arc<dyn Fn(LayerEvent) + Send + Sync>;

/// Layer tree configuration.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct LayerConfig {
    /// Device pixels per CSS pixel for rasterization.
    pub pixel_ratio: f32,
    /// Depth offset between nesting levels, in world units.
    pub layer_separation: f32,
    /// World units per CSS pixel.
    pub pixel_size: f32,
    /// Size of the container synthesized for a detached root.
    pub virtual_viewport: Size,
    /// Accept cross-origin resources while rasterizing.
    pub allow_taint: bool,
    /// Document origin used for taint checks.
    pub origin: Option<String>,
    /// Wall clock budget of the fallback drain, in milliseconds.
    pub raster_budget_ms: u64,
    /// Queue length above which a warning is logged.
    pub queue_warning_len: usize,
    #[serde(skip)]
    pub on_layer_event: Option<LayerCallback>,
}

impl LayerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pixel_ratio(mut self, ratio: f32) -> Self {
        self.pixel_ratio = ratio;
        self
    }

    pub fn with_layer_separation(mut self, separation: f32) -> Self {
        self.layer_separation = separation;
        self
    }

    pub fn with_pixel_size(mut self, pixel_size: f32) -> Self {
        self.pixel_size = pixel_size;
        self
    }

    pub fn with_virtual_viewport(mut self, width: f32, height: f32) -> Self {
        self.virtual_viewport = Size::new(width, height);
        self
    }

    pub fn with_allow_taint(mut self, allow: bool) -> Self {
        self.allow_taint = allow;
        self
    }

    pub fn with_origin(mut self, origin: &str) -> Self {
        self.origin = Some(origin.to_string());
        self
    }

    pub fn with_raster_budget(mut self, budget: Duration) -> Self {
        self.raster_budget_ms = budget.as_millis() as u64;
        self
    }

    pub fn with_queue_warning_len(mut self, len: usize) -> Self {
        self.queue_warning_len = len;
        self
    }

    pub fn with_callback(mut self, callback: impl Fn(LayerEvent) + Send + Sync + 'static) -> Self {
        self.on_layer_event = Some(Arc::new(callback));
        self
    }

    pub fn raster_budget(&self) -> Duration {
        Duration::from_millis(self.raster_budget_ms)
    }

    /// Reject values that would make layout or rasterization meaningless.
    pub fn validate(&self) -> LayerResult<()> {
        if !(self.pixel_ratio.is_finite() && self.pixel_ratio > 0.0) {
            return Err(LayerError::config("pixel_ratio must be positive"));
        }
        if !(self.pixel_size.is_finite() && self.pixel_size > 0.0) {
            return Err(LayerError::config("pixel_size must be positive"));
        }
        if !self.layer_separation.is_finite() {
            return Err(LayerError::config("layer_separation must be finite"));
        }
        if self.virtual_viewport.is_empty() {
            return Err(LayerError::config("virtual_viewport must not be empty"));
        }
        Ok(())
    }

    pub(crate) fn emit(&self, event: LayerEvent) {
        if let Some(callback) = &self.on_layer_event {
            callback(event);
        }
    }
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            pixel_ratio: 1.0,
            layer_separation: 0.005,
            pixel_size: 0.001,
            virtual_viewport: Size::new(1920.0, 1080.0),
            allow_taint: false,
            origin: None,
            raster_budget_ms: 5,
            queue_warning_len: 256,
            on_layer_event: None,
        }
    }
}

impl std::fmt::Debug for LayerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerConfig")
            .field("pixel_ratio", &self.pixel_ratio)
            .field("layer_separation", &self.layer_separation)
            .field("pixel_size", &self.pixel_size)
            .field("virtual_viewport", &self.virtual_viewport)
            .field("allow_taint", &self.allow_taint)
            .field("origin", &self.origin)
            .field("raster_budget_ms", &self.raster_budget_ms)
            .field("queue_warning_len", &self.queue_warning_len)
            .field("on_layer_event", &self.on_layer_event.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LayerConfig::default();
        assert_eq!(config.pixel_size, 0.001);
        assert_eq!(config.layer_separation, 0.005);
        assert_eq!(config.raster_budget(), Duration::from_millis(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: LayerConfig =
            serde_json::from_str(r#"{ "pixel_ratio": 2.0, "allow_taint": true }"#).unwrap();
        assert_eq!(config.pixel_ratio, 2.0);
        assert!(config.allow_taint);
        assert_eq!(config.pixel_size, 0.001);
        assert!(config.on_layer_event.is_none());
    }

    #[test]
    fn test_validate() {
        assert!(LayerConfig::new().with_pixel_ratio(0.0).validate().is_err());
        assert!(LayerConfig::new().with_pixel_size(-1.0).validate().is_err());
        assert!(LayerConfig::new()
            .with_virtual_viewport(0.0, 10.0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_callback() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let config = LayerConfig::new().with_callback(move |_| {
            seen.fetch_add(1, Ordering::Relaxed);
        });
        config.emit(LayerEvent::Created(LayerId::default()));
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }
}
