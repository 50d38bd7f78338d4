//! Renders textured Minecraft player models into a host-provided surface.
//!
//! The crate is organised around a host-driven frame loop. The host owns
//! the window and the frame clock; the viewer owns everything between a
//! skin URL and the pixels:
//!
//! ```text
//! set_skin_url -> worker thread -> channel -> poll_texture_loads
//!                                                   |
//! scheduler callback -> handle_frame -> animations -> upload -> submit
//!                                                                |
//!                                         re-arm one frame <-----+
//! ```
//!
//! [`Viewer`] drives a [`RenderTarget`]; the wgpu implementation behind it
//! draws either directly to the surface or through an FXAA resolve pass.
//! Hosts plug in their own [`FrameScheduler`] (a winit host forwards
//! `request_redraw`), and tests substitute both seams with recorders.

mod animation;
mod backend;
mod camera;
mod fxaa;
mod gpu;
mod model;
mod schedule;
mod texture;
mod viewer;

pub use animation::{Animation, RootAnimation};
pub use backend::{RenderTarget, ScenePacket};
pub use camera::Camera;
pub use fxaa::{FxaaOptions, FxaaQualityPreset};
pub use model::{cuboid_spec, CuboidSpec, ModelPart, PartId, PartInstance, PlayerModel};
pub use schedule::{FrameScheduler, LoopState};
pub use texture::SlotKind;
pub use viewer::{Viewer, ViewerOptions};
