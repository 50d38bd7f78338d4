//! End-to-end lifecycle coverage over the public API with a recording
//! backend: real worker-thread loads from disk, visibility flips, resize
//! read-back, and disposal against late completions.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use anyhow::Result;
use image::{Rgba, RgbaImage};
use viewer::{
    FrameScheduler, PartId, RenderTarget, ScenePacket, Viewer, ViewerOptions,
};

struct NoopScheduler;

impl FrameScheduler for NoopScheduler {
    fn request_frame(&self) {}
}

#[derive(Default, Clone)]
struct Recorder {
    skin_uploads: Rc<RefCell<Vec<(u32, u32, bool)>>>,
    cape_uploads: Rc<RefCell<Vec<(u32, u32)>>>,
    sizes: Rc<RefCell<Vec<(u32, u32, f32)>>>,
    visible_parts: Rc<RefCell<Vec<PartId>>>,
    disposed: Rc<RefCell<u32>>,
}

struct RecordingBackend {
    recorder: Recorder,
}

impl RenderTarget for RecordingBackend {
    fn set_size(&mut self, width: u32, height: u32, pixel_ratio: f32) {
        self.recorder
            .sizes
            .borrow_mut()
            .push((width, height, pixel_ratio));
    }

    fn upload_skin(&mut self, surface: &RgbaImage, slim: bool) {
        let (width, height) = surface.dimensions();
        self.recorder
            .skin_uploads
            .borrow_mut()
            .push((width, height, slim));
    }

    fn upload_cape(&mut self, surface: &RgbaImage) {
        let (width, height) = surface.dimensions();
        self.recorder.cape_uploads.borrow_mut().push((width, height));
    }

    fn submit(&mut self, scene: &ScenePacket) -> Result<()> {
        *self.recorder.visible_parts.borrow_mut() = scene
            .parts
            .iter()
            .filter(|part| part.visible)
            .map(|part| part.id)
            .collect();
        Ok(())
    }

    fn dispose(&mut self) {
        *self.recorder.disposed.borrow_mut() += 1;
    }
}

fn build_viewer(options: ViewerOptions) -> (Viewer, Recorder) {
    let recorder = Recorder::default();
    let backend = Box::new(RecordingBackend {
        recorder: recorder.clone(),
    });
    let viewer = Viewer::with_backend(backend, Box::new(NoopScheduler), options).unwrap();
    (viewer, recorder)
}

/// Polls load completions until the skin becomes visible or the deadline
/// passes. Loads run on real worker threads, so the test has to wait.
fn wait_for_skin(viewer: &mut Viewer) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        viewer.poll_texture_loads();
        if viewer.model().skin_visible() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

fn write_skin(dir: &tempfile::TempDir, name: &str, width: u32, height: u32) -> String {
    let path = dir.path().join(name);
    RgbaImage::from_pixel(width, height, Rgba([120, 80, 40, 255]))
        .save(&path)
        .unwrap();
    path.to_string_lossy().into_owned()
}

#[test]
fn skin_load_flows_from_disk_to_backend() {
    let dir = tempfile::tempdir().unwrap();
    let skin_path = write_skin(&dir, "skin.png", 64, 64);

    let (mut viewer, recorder) = build_viewer(ViewerOptions::default());
    viewer.render();
    assert!(
        recorder.visible_parts.borrow().is_empty(),
        "nothing is visible before a skin arrives"
    );

    viewer.set_skin_url(skin_path.clone());
    assert_eq!(viewer.skin_url(), Some(skin_path.as_str()));
    assert!(wait_for_skin(&mut viewer), "skin load timed out");

    viewer.render();
    assert_eq!(recorder.skin_uploads.borrow().as_slice(), &[(64, 64, false)]);
    let visible = recorder.visible_parts.borrow();
    assert!(visible.contains(&PartId::Head));
    assert!(visible.contains(&PartId::Body));
    assert!(!visible.contains(&PartId::Cape));
}

#[test]
fn legacy_skin_is_upgraded_before_upload() {
    let dir = tempfile::tempdir().unwrap();
    let skin_path = write_skin(&dir, "legacy.png", 64, 32);

    let (mut viewer, recorder) = build_viewer(ViewerOptions::default());
    viewer.set_skin_url(skin_path);
    assert!(wait_for_skin(&mut viewer), "skin load timed out");

    viewer.render();
    assert_eq!(recorder.skin_uploads.borrow().as_slice(), &[(64, 64, false)]);
}

#[test]
fn failed_load_leaves_the_model_hidden() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.png");

    let (mut viewer, recorder) = build_viewer(ViewerOptions::default());
    viewer.set_skin_url(missing.to_string_lossy().into_owned());

    // Give the worker time to fail, then drain the completion.
    std::thread::sleep(Duration::from_millis(200));
    viewer.poll_texture_loads();
    viewer.render();

    assert!(!viewer.model().skin_visible());
    assert!(recorder.skin_uploads.borrow().is_empty());
}

#[test]
fn resize_reads_back_and_reaches_the_backend() {
    let (mut viewer, recorder) = build_viewer(ViewerOptions::default());
    viewer.set_size(600, 600);
    assert_eq!((viewer.width(), viewer.height()), (600, 600));
    assert_eq!(
        recorder.sizes.borrow().last().copied(),
        Some((600, 600, 1.0))
    );
}

#[test]
fn dispose_survives_a_late_load_completion() {
    let dir = tempfile::tempdir().unwrap();
    let skin_path = write_skin(&dir, "skin.png", 64, 64);

    let (mut viewer, recorder) = build_viewer(ViewerOptions::default());
    viewer.set_skin_url(skin_path);
    viewer.dispose();
    viewer.dispose();
    assert_eq!(*recorder.disposed.borrow(), 1);

    // The worker finishes after disposal; its completion must be dropped.
    std::thread::sleep(Duration::from_millis(200));
    viewer.poll_texture_loads();
    viewer.render();
    assert!(!viewer.model().skin_visible());
    assert!(recorder.skin_uploads.borrow().is_empty());
}
