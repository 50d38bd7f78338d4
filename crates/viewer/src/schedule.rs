//! Frame scheduling for the continuous render loop.
//!
//! The viewer never spins; it asks its host for one frame callback at a
//! time and re-arms itself after rendering, the same way a Wayland surface
//! requests frame callbacks or a winit window requests redraws. The host
//! supplies the primitive through [`FrameScheduler`], which keeps the loop
//! deterministic under test: a fake scheduler just counts requests and the
//! test fires callbacks by hand.

/// Host-provided "request one frame callback" primitive.
///
/// Implementations must eventually cause the host to call
/// [`Viewer::handle_frame`](crate::Viewer::handle_frame) once per request.
/// Requesting is idempotent from the loop's point of view; the loop itself
/// guarantees it never has more than one request outstanding.
pub trait FrameScheduler {
    fn request_frame(&self);
}

/// Render loop lifecycle. `Disposed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Paused,
    Disposed,
}

/// The frame-scheduling state machine.
///
/// `armed` tracks whether a frame request is currently outstanding. Frame
/// callbacks may race pause/dispose requests, so every callback re-checks
/// the state through [`begin_frame`](Self::begin_frame) before rendering.
#[derive(Debug)]
pub(crate) struct RenderLoop {
    state: LoopState,
    armed: bool,
}

impl RenderLoop {
    pub(crate) fn new() -> Self {
        Self {
            state: LoopState::Running,
            armed: false,
        }
    }

    pub(crate) fn state(&self) -> LoopState {
        self.state
    }

    /// Arms the first frame. Called once at construction.
    pub(crate) fn start(&mut self, scheduler: &dyn FrameScheduler) {
        debug_assert!(!self.armed);
        scheduler.request_frame();
        self.armed = true;
    }

    /// A scheduled callback fired. Clears the outstanding request and
    /// reports whether the frame should actually render; stale callbacks
    /// delivered while paused or disposed are skipped without re-arming.
    pub(crate) fn begin_frame(&mut self) -> bool {
        self.armed = false;
        self.state == LoopState::Running
    }

    /// Re-arms exactly one frame after a successful render.
    pub(crate) fn finish_frame(&mut self, scheduler: &dyn FrameScheduler) {
        if self.state == LoopState::Running && !self.armed {
            scheduler.request_frame();
            self.armed = true;
        }
    }

    pub(crate) fn pause(&mut self) {
        if self.state == LoopState::Running {
            self.state = LoopState::Paused;
        }
    }

    /// Paused -> Running. Requests a new frame unless one is still pending
    /// from before the pause, so a stale callback can never double up with
    /// a fresh one.
    pub(crate) fn resume(&mut self, scheduler: &dyn FrameScheduler) -> bool {
        if self.state != LoopState::Paused {
            return false;
        }
        self.state = LoopState::Running;
        if !self.armed {
            scheduler.request_frame();
            self.armed = true;
        }
        true
    }

    /// Transitions to the terminal state. Returns true only on the first
    /// call so the owner releases its resources exactly once.
    pub(crate) fn dispose(&mut self) -> bool {
        if self.state == LoopState::Disposed {
            return false;
        }
        self.state = LoopState::Disposed;
        true
    }
}
