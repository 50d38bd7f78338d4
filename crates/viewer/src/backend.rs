//! The seam between the viewer lifecycle and the 3-D engine.
//!
//! The viewer drives whatever implements [`RenderTarget`]: the plain wgpu
//! renderer, the FXAA composer wrapping it, or a recording fake under test.
//! Keeping this a trait (rather than the composer subclassing the viewer)
//! means the frame-submission step dispatches polymorphically and the
//! lifecycle invariants stay testable without a GPU.

use anyhow::Result;
use glam::Mat4;
use image::RgbaImage;

use crate::model::PartInstance;

/// Everything the backend needs to draw one frame.
pub struct ScenePacket {
    pub view_projection: Mat4,
    pub parts: Vec<PartInstance>,
}

/// An exclusive-ownership render sink.
///
/// All methods are called from the single render/callback thread. `dispose`
/// is called exactly once; implementations may keep a flag and turn later
/// submits into no-ops, but the viewer already guarantees it never submits
/// after disposing.
pub trait RenderTarget {
    /// Resizes the output surface. `width`/`height` are logical pixels; the
    /// physical surface is `dimension * pixel_ratio` on each axis.
    fn set_size(&mut self, width: u32, height: u32, pixel_ratio: f32);

    /// Re-uploads the skin atlas, rebuilding arm geometry if the model
    /// variant changed.
    fn upload_skin(&mut self, surface: &RgbaImage, slim: bool);

    /// Re-uploads the cape frame.
    fn upload_cape(&mut self, surface: &RgbaImage);

    /// Draws one frame to the visible surface.
    fn submit(&mut self, scene: &ScenePacket) -> Result<()>;

    /// Releases GPU resources. Called exactly once.
    fn dispose(&mut self);
}
