//! The viewer: lifecycle, accessors, and frame production.
//!
//! Construction wires up the camera, the player model, both texture slots,
//! the load-completion channel, and the render loop, then arms the first
//! frame. The host drives everything afterwards: it fires
//! [`Viewer::handle_frame`] when the requested callback arrives and may
//! call [`Viewer::render`] for manual draws.

use std::time::Instant;

use anyhow::Result;
use crossbeam_channel::{unbounded, Receiver, Sender};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::animation::RootAnimation;
use crate::backend::{RenderTarget, ScenePacket};
use crate::camera::Camera;
use crate::fxaa::FxaaOptions;
use crate::gpu::{Composer, GpuRenderer};
use crate::model::PlayerModel;
use crate::schedule::{FrameScheduler, LoopState, RenderLoop};
use crate::texture::{LoadResult, SlotKind, TextureSlot};

/// Construction-time configuration. Everything is optional except the host
/// surface handle passed alongside.
#[derive(Debug, Clone)]
pub struct ViewerOptions {
    pub skin_url: Option<String>,
    pub cape_url: Option<String>,
    /// Logical output size in pixels.
    pub width: u32,
    pub height: u32,
    /// Device-to-logical pixel scale reported by the host.
    pub pixel_ratio: f32,
    /// Automatic slim/wide detection from the skin atlas.
    pub detect_model: bool,
    /// Transparent background. FXAA is documented as incompatible with it;
    /// hosts enabling `fxaa` should set this to false.
    pub transparent: bool,
    /// Enables the post-processing pipeline.
    pub fxaa: Option<FxaaOptions>,
}

impl Default for ViewerOptions {
    fn default() -> Self {
        Self {
            skin_url: None,
            cape_url: None,
            width: 300,
            height: 300,
            pixel_ratio: 1.0,
            detect_model: true,
            transparent: true,
            fxaa: None,
        }
    }
}

/// Renders a textured player model continuously into a host surface.
pub struct Viewer {
    backend: Box<dyn RenderTarget>,
    scheduler: Box<dyn FrameScheduler>,
    render_loop: RenderLoop,
    camera: Camera,
    model: PlayerModel,
    animations: RootAnimation,
    skin: TextureSlot,
    cape: TextureSlot,
    completions_tx: Sender<LoadResult>,
    completions_rx: Receiver<LoadResult>,
    width: u32,
    height: u32,
    pixel_ratio: f32,
    detect_model: bool,
    disposed: bool,
    last_frame: Option<Instant>,
}

impl Viewer {
    /// Builds a viewer rendering into the given host surface.
    pub fn new<T>(
        target: &T,
        options: ViewerOptions,
        scheduler: Box<dyn FrameScheduler>,
    ) -> Result<Self>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let gpu = GpuRenderer::new(target, &options)?;
        let backend: Box<dyn RenderTarget> = match options.fxaa {
            Some(fxaa) => Box::new(Composer::new(gpu, fxaa, &options)?),
            None => Box::new(gpu),
        };
        Self::with_backend(backend, scheduler, options)
    }

    /// Builds a viewer over an arbitrary render sink. Used by headless
    /// hosts and tests; [`Viewer::new`] funnels through here.
    pub fn with_backend(
        mut backend: Box<dyn RenderTarget>,
        scheduler: Box<dyn FrameScheduler>,
        options: ViewerOptions,
    ) -> Result<Self> {
        let (completions_tx, completions_rx) = unbounded();

        let mut camera = Camera::new();
        camera.set_aspect(options.width as f32 / options.height.max(1) as f32);
        backend.set_size(options.width, options.height, options.pixel_ratio);

        let mut viewer = Self {
            backend,
            scheduler,
            render_loop: RenderLoop::new(),
            camera,
            model: PlayerModel::new(),
            animations: RootAnimation::new(),
            skin: TextureSlot::new(SlotKind::Skin),
            cape: TextureSlot::new(SlotKind::Cape),
            completions_tx,
            completions_rx,
            width: options.width,
            height: options.height,
            pixel_ratio: options.pixel_ratio,
            detect_model: options.detect_model,
            disposed: false,
            last_frame: None,
        };

        if let Some(url) = options.skin_url {
            viewer.set_skin_url(url);
        }
        if let Some(url) = options.cape_url {
            viewer.set_cape_url(url);
        }

        viewer.render_loop.start(viewer.scheduler.as_ref());
        Ok(viewer)
    }

    /// Entry point for the scheduled frame callback.
    ///
    /// Guarded against callbacks that outlive a pause or dispose; a live
    /// frame polls load completions, advances the animation root, uploads
    /// any freshly decoded surfaces, submits, and re-arms exactly one more
    /// frame.
    pub fn handle_frame(&mut self) {
        if !self.render_loop.begin_frame() {
            return;
        }

        self.poll_texture_loads();

        let now = Instant::now();
        let delta = self
            .last_frame
            .map(|last| now.duration_since(last).as_secs_f64())
            .unwrap_or(0.0);
        self.last_frame = Some(now);
        self.animations.run(&mut self.model, delta);

        self.upload_dirty_surfaces();
        self.submit();
        self.render_loop.finish_frame(self.scheduler.as_ref());
    }

    /// Submits one frame immediately, outside the scheduled loop. Used for
    /// manual and headless draws; does not tick animations or re-arm. A
    /// no-op once disposed.
    pub fn render(&mut self) {
        if self.disposed {
            return;
        }
        self.poll_texture_loads();
        self.upload_dirty_surfaces();
        self.submit();
    }

    /// Applies pending load completions.
    ///
    /// Hosts may call this between frames (e.g. while the loop is paused)
    /// so textures keep arriving; scheduled frames call it implicitly.
    /// Completions for a disposed viewer or a superseded request are
    /// dropped.
    pub fn poll_texture_loads(&mut self) {
        while let Ok(result) = self.completions_rx.try_recv() {
            if self.disposed {
                continue;
            }
            match result.kind {
                SlotKind::Skin => {
                    if self.skin.accepts(&result) && self.skin.apply(result) {
                        self.model.set_skin_visible(true);
                        if self.detect_model {
                            self.model.set_slim(self.skin.slim());
                        }
                    }
                }
                SlotKind::Cape => {
                    if self.cape.accepts(&result) && self.cape.apply(result) {
                        self.model.set_cape_visible(true);
                    }
                }
            }
        }
    }

    /// Updates the camera projection and resizes the output surface; a
    /// composed backend also resizes its pass pipeline and recomputes the
    /// texel uniform. The camera update deliberately happens first.
    pub fn set_size(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.camera
            .set_aspect(width as f32 / height.max(1) as f32);
        self.backend.set_size(width, height, self.pixel_ratio);
    }

    /// Re-derives the physical surface size and texel uniform for a new
    /// device scale.
    pub fn set_pixel_ratio(&mut self, pixel_ratio: f32) {
        self.pixel_ratio = pixel_ratio;
        self.backend.set_size(self.width, self.height, pixel_ratio);
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn set_width(&mut self, width: u32) {
        self.set_size(width, self.height);
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn set_height(&mut self, height: u32) {
        self.set_size(self.width, height);
    }

    pub fn render_paused(&self) -> bool {
        self.render_loop.state() == LoopState::Paused
    }

    /// Writing `true` pauses the loop; writing `false` resumes it only if
    /// it is currently paused and the viewer is not disposed.
    pub fn set_render_paused(&mut self, paused: bool) {
        if paused {
            self.render_loop.pause();
        } else {
            self.render_loop.resume(self.scheduler.as_ref());
        }
    }

    pub fn skin_url(&self) -> Option<&str> {
        self.skin.source()
    }

    /// Stores the new skin source and starts an asynchronous load. The
    /// getter reflects this immediately; the decoded content follows later.
    pub fn set_skin_url(&mut self, url: impl Into<String>) {
        if self.disposed {
            return;
        }
        self.skin.set_source(url, self.completions_tx.clone());
    }

    pub fn cape_url(&self) -> Option<&str> {
        self.cape.source()
    }

    /// Whether a skin has ever been decoded and installed.
    pub fn skin_loaded(&self) -> bool {
        self.skin.ready()
    }

    pub fn cape_loaded(&self) -> bool {
        self.cape.ready()
    }

    pub fn set_cape_url(&mut self, url: impl Into<String>) {
        if self.disposed {
            return;
        }
        self.cape.set_source(url, self.completions_tx.clone());
    }

    pub fn disposed(&self) -> bool {
        self.disposed
    }

    /// Stops the loop and releases the backend's GPU resources exactly
    /// once. Safe to call repeatedly and safe against in-flight loads;
    /// their completions are dropped by the poll guard.
    pub fn dispose(&mut self) {
        if !self.render_loop.dispose() {
            return;
        }
        self.disposed = true;
        self.backend.dispose();
        tracing::debug!("viewer disposed");
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn model(&self) -> &PlayerModel {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut PlayerModel {
        &mut self.model
    }

    pub fn animations(&self) -> &RootAnimation {
        &self.animations
    }

    pub fn animations_mut(&mut self) -> &mut RootAnimation {
        &mut self.animations
    }

    fn upload_dirty_surfaces(&mut self) {
        let slim = self.model.slim();
        if let Some((surface, _)) = self.skin.take_dirty_surface() {
            self.backend.upload_skin(surface, slim);
        }
        if let Some((surface, _)) = self.cape.take_dirty_surface() {
            self.backend.upload_cape(surface);
        }
    }

    fn submit(&mut self) {
        let scene = ScenePacket {
            view_projection: self.camera.view_projection(),
            parts: self.model.part_instances(),
        };
        if let Err(err) = self.backend.submit(&scene) {
            // Render faults are local; only dispose() stops the loop.
            tracing::warn!(error = %format!("{err:#}"), "frame submission failed");
        }
    }
}

impl Drop for Viewer {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PartId;
    use crate::texture::DecodedTexture;
    use image::{Rgba, RgbaImage};
    use std::cell::Cell;
    use std::rc::Rc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct RecordingScheduler {
        requests: Rc<Cell<u32>>,
    }

    impl FrameScheduler for RecordingScheduler {
        fn request_frame(&self) {
            self.requests.set(self.requests.get() + 1);
        }
    }

    #[derive(Default, Clone)]
    struct BackendLog {
        sizes: Arc<std::sync::Mutex<Vec<(u32, u32, f32)>>>,
        submits: Arc<AtomicU32>,
        skin_uploads: Arc<AtomicU32>,
        disposals: Arc<AtomicU32>,
        last_skin_visible: Arc<std::sync::Mutex<Option<bool>>>,
    }

    struct FakeBackend {
        log: BackendLog,
    }

    impl RenderTarget for FakeBackend {
        fn set_size(&mut self, width: u32, height: u32, pixel_ratio: f32) {
            self.log.sizes.lock().unwrap().push((width, height, pixel_ratio));
        }

        fn upload_skin(&mut self, _surface: &RgbaImage, _slim: bool) {
            self.log.skin_uploads.fetch_add(1, Ordering::SeqCst);
        }

        fn upload_cape(&mut self, _surface: &RgbaImage) {}

        fn submit(&mut self, scene: &ScenePacket) -> Result<()> {
            self.log.submits.fetch_add(1, Ordering::SeqCst);
            let skin_visible = scene
                .parts
                .iter()
                .find(|part| part.id == PartId::Body)
                .map(|part| part.visible);
            *self.log.last_skin_visible.lock().unwrap() = skin_visible;
            Ok(())
        }

        fn dispose(&mut self) {
            self.log.disposals.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn viewer_with_log(options: ViewerOptions) -> (Viewer, BackendLog, Rc<Cell<u32>>) {
        let log = BackendLog::default();
        let backend = Box::new(FakeBackend { log: log.clone() });
        let scheduler = RecordingScheduler::default();
        let requests = scheduler.requests.clone();
        let viewer = Viewer::with_backend(backend, Box::new(scheduler), options).unwrap();
        (viewer, log, requests)
    }

    fn skin_result(generation: u64) -> LoadResult {
        LoadResult {
            kind: SlotKind::Skin,
            generation,
            source: "skin-a.png".into(),
            outcome: Ok(DecodedTexture {
                surface: RgbaImage::from_pixel(64, 64, Rgba([9, 9, 9, 255])),
                slim: false,
            }),
        }
    }

    #[test]
    fn construction_arms_exactly_one_frame() {
        let (_viewer, _log, requests) = viewer_with_log(ViewerOptions::default());
        assert_eq!(requests.get(), 1);
    }

    #[test]
    fn set_size_updates_camera_then_backend() {
        let (mut viewer, log, _) = viewer_with_log(ViewerOptions::default());
        viewer.set_size(600, 600);
        assert_eq!(viewer.width(), 600);
        assert_eq!(viewer.height(), 600);
        assert!((viewer.camera().aspect - 1.0).abs() < f32::EPSILON);

        viewer.set_size(800, 400);
        assert!((viewer.camera().aspect - 2.0).abs() < f32::EPSILON);
        assert_eq!(
            log.sizes.lock().unwrap().last().copied(),
            Some((800, 400, 1.0))
        );
    }

    #[test]
    fn pixel_ratio_changes_flow_to_backend() {
        let (mut viewer, log, _) = viewer_with_log(ViewerOptions::default());
        viewer.set_pixel_ratio(2.0);
        assert_eq!(
            log.sizes.lock().unwrap().last().copied(),
            Some((300, 300, 2.0))
        );
    }

    #[test]
    fn skin_invisible_until_load_completes() {
        let (mut viewer, log, _) = viewer_with_log(ViewerOptions::default());
        viewer.set_skin_url("skin-a.png");
        assert_eq!(viewer.skin_url(), Some("skin-a.png"));

        viewer.render();
        assert_eq!(*log.last_skin_visible.lock().unwrap(), Some(false));
        assert_eq!(log.skin_uploads.load(Ordering::SeqCst), 0);

        // The load callback fires successfully.
        viewer.completions_tx.send(skin_result(1)).unwrap();
        viewer.render();
        assert_eq!(*log.last_skin_visible.lock().unwrap(), Some(true));
        assert_eq!(log.skin_uploads.load(Ordering::SeqCst), 1);

        // No re-upload without a new decode.
        viewer.render();
        assert_eq!(log.skin_uploads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stale_load_result_loses_to_newer_request() {
        let (mut viewer, log, _) = viewer_with_log(ViewerOptions::default());
        viewer.set_skin_url("skin-a.png");
        viewer.set_skin_url("skin-b.png");

        // Generation 1 belongs to the superseded first request.
        viewer.completions_tx.send(skin_result(1)).unwrap();
        viewer.render();
        assert_eq!(*log.last_skin_visible.lock().unwrap(), Some(false));
        assert_eq!(log.skin_uploads.load(Ordering::SeqCst), 0);

        // The current request still lands.
        viewer.completions_tx.send(skin_result(2)).unwrap();
        viewer.render();
        assert_eq!(*log.last_skin_visible.lock().unwrap(), Some(true));
    }

    #[test]
    fn pause_blocks_frames_and_resume_rearms() {
        let (mut viewer, log, requests) = viewer_with_log(ViewerOptions::default());
        assert!(!viewer.render_paused());

        viewer.set_render_paused(true);
        assert!(viewer.render_paused());

        // The already-queued callback fires while paused: no render.
        viewer.handle_frame();
        assert_eq!(log.submits.load(Ordering::SeqCst), 0);
        assert_eq!(requests.get(), 1);

        // Resuming while already running is a no-op.
        viewer.set_render_paused(false);
        assert!(!viewer.render_paused());
        assert_eq!(requests.get(), 2);
        viewer.set_render_paused(false);
        assert_eq!(requests.get(), 2);

        viewer.handle_frame();
        assert_eq!(log.submits.load(Ordering::SeqCst), 1);
        assert_eq!(requests.get(), 3);
    }

    #[test]
    fn dispose_is_idempotent_and_releases_once() {
        let (mut viewer, log, requests) = viewer_with_log(ViewerOptions::default());
        viewer.dispose();
        viewer.dispose();
        assert!(viewer.disposed());
        assert_eq!(log.disposals.load(Ordering::SeqCst), 1);

        // Stale frame callback and manual draws after dispose are no-ops.
        viewer.handle_frame();
        viewer.render();
        assert_eq!(log.submits.load(Ordering::SeqCst), 0);
        assert_eq!(requests.get(), 1);

        // Resume cannot revive a disposed loop.
        viewer.set_render_paused(false);
        assert_eq!(requests.get(), 1);
    }

    #[test]
    fn late_load_callback_after_dispose_is_dropped() {
        let (mut viewer, log, _) = viewer_with_log(ViewerOptions::default());
        viewer.set_skin_url("skin-a.png");
        viewer.dispose();

        viewer.completions_tx.send(skin_result(1)).unwrap();
        viewer.poll_texture_loads();
        assert!(!viewer.model().skin_visible());
        assert_eq!(log.skin_uploads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn scheduled_frame_ticks_animations() {
        struct Nod;
        impl crate::animation::Animation for Nod {
            fn animate(&mut self, model: &mut PlayerModel, progress: f64, _delta: f64) {
                model.head.rotation.x = progress as f32;
            }
        }

        let (mut viewer, _log, _) = viewer_with_log(ViewerOptions::default());
        viewer.animations_mut().add(Box::new(Nod));
        viewer.handle_frame();
        viewer.handle_frame();
        // Manual render never advances the animation clock.
        let pose = viewer.model().head.rotation.x;
        viewer.render();
        assert_eq!(viewer.model().head.rotation.x, pose);
    }
}
