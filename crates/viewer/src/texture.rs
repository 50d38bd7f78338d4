//! Asynchronous texture slots for the skin and cape.
//!
//! Each slot owns a source identifier, the decoded canonical surface, and a
//! re-upload flag the GPU backend drains. Loads run on fire-and-forget
//! worker threads (fetch, decode, canonicalize) and report back over a
//! channel; the render thread applies completions between frames.
//!
//! Every load carries the slot's generation at the time it started. A
//! completion whose generation no longer matches lost a race against a
//! newer `set_source` call and is dropped, so the latest request always
//! wins regardless of network ordering.

use std::fs;
use std::thread;

use anyhow::{Context, Result};
use crossbeam_channel::Sender;
use image::RgbaImage;

/// Which model texture a slot feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Skin,
    Cape,
}

/// A decoded, canonicalized surface ready for GPU upload.
pub(crate) struct DecodedTexture {
    pub surface: RgbaImage,
    /// Slim-arm variant detected from the atlas; meaningful for skins only.
    pub slim: bool,
}

/// Completion message sent from a load worker back to the render thread.
pub(crate) struct LoadResult {
    pub kind: SlotKind,
    pub generation: u64,
    pub source: String,
    pub outcome: Result<DecodedTexture>,
}

/// Owned unit of source URL, decoded surface, and upload state for one of
/// (skin, cape). The GPU texture itself lives in the backend; the slot only
/// flags when it must be re-uploaded, which keeps texture dimensions in
/// lockstep with the decoded surface.
pub(crate) struct TextureSlot {
    kind: SlotKind,
    source: Option<String>,
    generation: u64,
    ready: bool,
    dirty: bool,
    surface: Option<RgbaImage>,
    slim: bool,
}

impl TextureSlot {
    pub(crate) fn new(kind: SlotKind) -> Self {
        Self {
            kind,
            source: None,
            generation: 0,
            ready: false,
            dirty: false,
            surface: None,
            slim: false,
        }
    }

    pub(crate) fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub(crate) fn ready(&self) -> bool {
        self.ready
    }

    pub(crate) fn slim(&self) -> bool {
        self.slim
    }

    /// Stores the new source and kicks off an asynchronous load. Returns
    /// immediately; the completion arrives through the channel.
    pub(crate) fn set_source(&mut self, url: impl Into<String>, completions: Sender<LoadResult>) {
        let url = url.into();
        self.source = Some(url.clone());
        self.generation += 1;

        let kind = self.kind;
        let generation = self.generation;
        thread::spawn(move || {
            let outcome = fetch_and_decode(kind, &url);
            // The receiver disappearing just means the viewer went away.
            let _ = completions.send(LoadResult {
                kind,
                generation,
                source: url,
                outcome,
            });
        });
    }

    /// Whether a completion belongs to this slot and is still current.
    pub(crate) fn accepts(&self, result: &LoadResult) -> bool {
        result.kind == self.kind && result.generation == self.generation
    }

    /// Applies a load completion. Success installs the surface and marks it
    /// for re-upload; failure is reported and leaves the previous surface,
    /// readiness, and model-part visibility untouched.
    pub(crate) fn apply(&mut self, result: LoadResult) -> bool {
        debug_assert!(self.accepts(&result));
        match result.outcome {
            Ok(decoded) => {
                self.surface = Some(decoded.surface);
                self.slim = decoded.slim;
                self.ready = true;
                self.dirty = true;
                tracing::debug!(kind = ?self.kind, source = %result.source, "texture loaded");
                true
            }
            Err(err) => {
                tracing::error!(
                    kind = ?self.kind,
                    source = %result.source,
                    error = %format!("{err:#}"),
                    "failed to load texture"
                );
                false
            }
        }
    }

    /// Hands out the surface once per upload cycle.
    pub(crate) fn take_dirty_surface(&mut self) -> Option<(&RgbaImage, bool)> {
        if !self.dirty {
            return None;
        }
        self.dirty = false;
        self.surface.as_ref().map(|surface| (surface, self.slim))
    }
}

/// Fetches the source bytes, decodes them, and canonicalizes the layout.
///
/// `http(s)` sources go through reqwest; anything else is treated as a
/// filesystem path. Runs on a worker thread.
fn fetch_and_decode(kind: SlotKind, url: &str) -> Result<DecodedTexture> {
    let bytes = if url.starts_with("http://") || url.starts_with("https://") {
        reqwest::blocking::get(url)
            .and_then(|response| response.error_for_status())
            .with_context(|| format!("failed to fetch {url}"))?
            .bytes()
            .with_context(|| format!("failed to read response body of {url}"))?
            .to_vec()
    } else {
        fs::read(url).with_context(|| format!("failed to read {url}"))?
    };

    let decoded = image::load_from_memory(&bytes)
        .with_context(|| format!("failed to decode image at {url}"))?
        .to_rgba8();

    match kind {
        SlotKind::Skin => {
            let surface = skinpix::canonicalize_skin(&decoded)
                .with_context(|| format!("unsupported skin layout at {url}"))?;
            let slim = skinpix::is_slim_skin(&surface);
            Ok(DecodedTexture { surface, slim })
        }
        SlotKind::Cape => {
            let surface = skinpix::canonicalize_cape(&decoded)
                .with_context(|| format!("unsupported cape layout at {url}"))?;
            Ok(DecodedTexture {
                surface,
                slim: false,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use image::Rgba;

    fn decoded(width: u32, height: u32, slim: bool) -> DecodedTexture {
        DecodedTexture {
            surface: RgbaImage::from_pixel(width, height, Rgba([7, 7, 7, 255])),
            slim,
        }
    }

    fn success(generation: u64) -> LoadResult {
        LoadResult {
            kind: SlotKind::Skin,
            generation,
            source: "a.png".into(),
            outcome: Ok(decoded(64, 64, true)),
        }
    }

    #[test]
    fn successful_load_marks_ready_and_dirty() {
        let mut slot = TextureSlot::new(SlotKind::Skin);
        slot.generation = 1;
        let result = success(1);
        assert!(slot.accepts(&result));
        assert!(slot.apply(result));
        assert!(slot.ready());
        assert!(slot.slim());
        let (surface, slim) = slot.take_dirty_surface().expect("dirty surface");
        assert_eq!(surface.dimensions(), (64, 64));
        assert!(slim);
        assert!(slot.take_dirty_surface().is_none(), "dirty drains once");
    }

    #[test]
    fn stale_generation_is_rejected() {
        let mut slot = TextureSlot::new(SlotKind::Skin);
        slot.generation = 3;
        let stale = success(2);
        assert!(!slot.accepts(&stale));
    }

    #[test]
    fn failed_load_preserves_previous_state() {
        let mut slot = TextureSlot::new(SlotKind::Skin);
        slot.generation = 1;
        assert!(slot.apply(success(1)));
        let _ = slot.take_dirty_surface();

        slot.generation = 2;
        let failure = LoadResult {
            kind: SlotKind::Skin,
            generation: 2,
            source: "b.png".into(),
            outcome: Err(anyhow!("404")),
        };
        assert!(!slot.apply(failure));
        assert!(slot.ready(), "failure never clears readiness");
        assert!(slot.surface.is_some(), "failure never drops the surface");
        assert!(slot.take_dirty_surface().is_none(), "no spurious re-upload");
    }
}
