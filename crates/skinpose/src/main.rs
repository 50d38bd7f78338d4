//! Windowed preview: opens a winit window, wires its redraw requests into
//! the viewer's frame loop, and drives a simple walking animation.
//!
//! Space toggles the render loop; closing the window disposes the viewer.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowBuilder};

use viewer::{
    Animation, FrameScheduler, FxaaOptions, FxaaQualityPreset, PlayerModel, Viewer, ViewerOptions,
};

#[derive(Parser, Debug)]
#[command(name = "skinpose", about = "Preview Minecraft skins on a posable player model")]
struct Cli {
    /// Skin image path or http(s) URL.
    #[arg(long)]
    skin: Option<String>,

    /// Cape image path or http(s) URL.
    #[arg(long)]
    cape: Option<String>,

    /// Window width in logical pixels.
    #[arg(long, default_value_t = 300)]
    width: u32,

    /// Window height in logical pixels.
    #[arg(long, default_value_t = 300)]
    height: u32,

    /// Enable FXAA with the given quality preset code (10-15, 20-29, 39).
    #[arg(long, value_name = "PRESET")]
    fxaa: Option<u32>,

    /// Render on an opaque background instead of a transparent surface.
    #[arg(long)]
    opaque: bool,

    /// Keep the wide model even for skins detected as slim.
    #[arg(long)]
    no_detect_model: bool,

    /// Show the idle pose without the walking animation.
    #[arg(long)]
    still: bool,
}

struct WinitScheduler {
    window: Arc<Window>,
}

impl FrameScheduler for WinitScheduler {
    fn request_frame(&self) {
        self.window.request_redraw();
    }
}

struct WalkingAnimation;

impl Animation for WalkingAnimation {
    fn animate(&mut self, model: &mut PlayerModel, progress: f64, _delta: f64) {
        let t = (progress * 8.0) as f32;
        let swing = t.sin() * 0.5;
        model.right_arm.rotation.x = swing;
        model.left_arm.rotation.x = -swing;
        model.right_leg.rotation.x = -swing;
        model.left_leg.rotation.x = swing;
        model.head.rotation.y = (t * 0.25).sin() * 0.2;
    }
}

fn initialise_tracing() {
    let default_filter =
        "warn,skinpose=info,viewer=info,naga=error,wgpu=error,wgpu_core=error,wgpu_hal=error,winit=error";
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    initialise_tracing();

    let fxaa = match cli.fxaa {
        Some(code) => {
            let preset = FxaaQualityPreset::from_code(code)
                .ok_or_else(|| anyhow!("unknown FXAA quality preset {code}"))?;
            Some(FxaaOptions {
                quality_preset: Some(preset),
            })
        }
        None => None,
    };
    // FXAA resolves onto an opaque surface.
    let transparent = !cli.opaque && fxaa.is_none();

    let event_loop = EventLoop::new().context("failed to create event loop")?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("skinpose")
            .with_inner_size(LogicalSize::new(cli.width, cli.height))
            .with_transparent(transparent)
            .build(&event_loop)
            .context("failed to create window")?,
    );

    let pixel_ratio = window.scale_factor() as f32;
    let options = ViewerOptions {
        skin_url: cli.skin,
        cape_url: cli.cape,
        width: cli.width,
        height: cli.height,
        pixel_ratio,
        detect_model: !cli.no_detect_model,
        transparent,
        fxaa,
    };

    let scheduler = WinitScheduler {
        window: window.clone(),
    };
    let mut viewer = Viewer::new(window.as_ref(), options, Box::new(scheduler))
        .context("failed to initialise the viewer")?;
    if !cli.still {
        viewer.animations_mut().add(Box::new(WalkingAnimation));
    }

    let loop_window = window.clone();
    event_loop
        .run(move |event, elwt| match event {
            Event::WindowEvent { event, .. } => match event {
                WindowEvent::CloseRequested => {
                    viewer.dispose();
                    elwt.exit();
                }
                WindowEvent::Resized(size) => {
                    let logical = size.to_logical::<u32>(loop_window.scale_factor());
                    viewer.set_size(logical.width, logical.height);
                }
                WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                    viewer.set_pixel_ratio(scale_factor as f32);
                }
                WindowEvent::KeyboardInput { event, .. } => {
                    if event.state == ElementState::Pressed
                        && event.logical_key == Key::Named(NamedKey::Space)
                    {
                        let paused = viewer.render_paused();
                        viewer.set_render_paused(!paused);
                        tracing::info!(paused = !paused, "toggled render loop");
                    }
                }
                WindowEvent::RedrawRequested => {
                    viewer.handle_frame();
                }
                _ => {}
            },
            Event::AboutToWait => {
                viewer.poll_texture_loads();
                elwt.set_control_flow(ControlFlow::Wait);
            }
            _ => {}
        })
        .context("event loop terminated abnormally")?;

    Ok(())
}
