//! Per-frame pose mutation.
//!
//! The loop invokes the injected animation root once per produced frame;
//! what the root actually does to the model is the host's business. The
//! root composes child animations, scales wall-clock time by a speed
//! factor, and can be paused independently of the render loop.

use crate::model::PlayerModel;

/// A per-frame pose mutator.
///
/// `progress` is the accumulated, speed-scaled time in seconds; `delta` is
/// the scaled time since the previous frame.
pub trait Animation {
    fn animate(&mut self, model: &mut PlayerModel, progress: f64, delta: f64);
}

/// Composable root of the animation tree.
pub struct RootAnimation {
    children: Vec<Box<dyn Animation>>,
    pub speed: f64,
    pub paused: bool,
    progress: f64,
}

impl RootAnimation {
    pub fn new() -> Self {
        Self {
            children: Vec::new(),
            speed: 1.0,
            paused: false,
            progress: 0.0,
        }
    }

    pub fn add(&mut self, animation: Box<dyn Animation>) {
        self.children.push(animation);
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    /// Advances the clock and runs every child against the model.
    pub fn run(&mut self, model: &mut PlayerModel, delta_seconds: f64) {
        if self.paused {
            return;
        }
        let delta = delta_seconds * self.speed;
        self.progress += delta;
        for child in &mut self.children {
            child.animate(model, self.progress, delta);
        }
    }
}

impl Default for RootAnimation {
    fn default() -> Self {
        Self::new()
    }
}

impl Animation for RootAnimation {
    fn animate(&mut self, model: &mut PlayerModel, _progress: f64, delta: f64) {
        self.run(model, delta);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct Recorder {
        calls: Rc<Cell<u32>>,
        last_progress: Rc<Cell<f64>>,
    }

    impl Animation for Recorder {
        fn animate(&mut self, _model: &mut PlayerModel, progress: f64, _delta: f64) {
            self.calls.set(self.calls.get() + 1);
            self.last_progress.set(progress);
        }
    }

    #[test]
    fn speed_scales_progress() {
        let calls = Rc::new(Cell::new(0));
        let progress = Rc::new(Cell::new(0.0));
        let mut root = RootAnimation::new();
        root.add(Box::new(Recorder {
            calls: calls.clone(),
            last_progress: progress.clone(),
        }));
        root.speed = 2.0;

        let mut model = PlayerModel::new();
        root.run(&mut model, 0.5);
        root.run(&mut model, 0.5);
        assert_eq!(calls.get(), 2);
        assert!((progress.get() - 2.0).abs() < 1e-9);
        assert!((root.progress() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn paused_root_freezes_children_and_clock() {
        let calls = Rc::new(Cell::new(0));
        let progress = Rc::new(Cell::new(0.0));
        let mut root = RootAnimation::new();
        root.add(Box::new(Recorder {
            calls: calls.clone(),
            last_progress: progress,
        }));
        root.paused = true;

        let mut model = PlayerModel::new();
        root.run(&mut model, 1.0);
        assert_eq!(calls.get(), 0);
        assert_eq!(root.progress(), 0.0);
    }
}
