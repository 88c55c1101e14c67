//! Textures attached to layer content meshes.

use crate::pixel_buffer::PixelBuffer;
use dom::NodeId;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_TEXTURE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique texture identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct TextureId(u64);

impl TextureId {
    fn next() -> Self {
        TextureId(NEXT_TEXTURE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Where a texture's pixels come from.
#[derive(Clone, Debug)]
pub enum TextureSource {
    /// Pixels produced by a rasterization pass.
    Bitmap(Arc<PixelBuffer>),
    /// Frames pulled live from a video element.
    Video(NodeId),
}

#[derive(Clone, Debug)]
pub struct Texture {
    id: TextureId,
    source: TextureSource,
}

impl Texture {
    pub fn bitmap(pixels: PixelBuffer) -> Self {
        Self {
            id: TextureId::next(),
            source: TextureSource::Bitmap(Arc::new(pixels)),
        }
    }

    pub fn video(element: NodeId) -> Self {
        Self {
            id: TextureId::next(),
            source: TextureSource::Video(element),
        }
    }

    pub fn id(&self) -> TextureId {
        self.id
    }

    pub fn source(&self) -> &TextureSource {
        &self.source
    }

    pub fn is_video(&self) -> bool {
        matches!(self.source, TextureSource::Video(_))
    }

    pub fn pixels(&self) -> Option<&PixelBuffer> {
        match &self.source {
            TextureSource::Bitmap(pixels) => Some(pixels),
            TextureSource::Video(_) => None,
        }
    }

    /// Pixel dimensions, if known.
    pub fn size(&self) -> Option<(u32, u32)> {
        self.pixels().map(|p| (p.width, p.height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let a = Texture::bitmap(PixelBuffer::new(1, 1));
        let b = a.clone();
        let c = Texture::bitmap(PixelBuffer::new(1, 1));
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
        assert_eq!(a.size(), Some((1, 1)));
    }
}
