// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use clap::Parser;
use rayframe_core::init_tracing;
use rayframe_render::{FrameStatus, RenderInit, RenderSize, Renderer, ResizeEvent};
use rayframe_render_vk::{FrameTimeBar, VkRenderer};
use tracing::{debug, error, info};

use rayframe_platform::winit::{
    application::ApplicationHandler,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{Key, NamedKey},
    window::{Window, WindowId},
};
use rayframe_platform::{render_size, WinitHost};

mod config;
mod demo;

use config::{load_cfg, AppCfg, PresentModeCfg};
use demo::DemoScene;

static QUAD_VERT: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/quad.vert.spv"));
static RAYTRACE_FRAG: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/raytrace.frag.spv"));

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML config
    #[arg(long, default_value = "rayframe.toml")]
    config: PathBuf,
    /// Present without waiting for vblank
    #[arg(long)]
    no_vsync: bool,
    #[arg(long)]
    width: Option<u32>,
    #[arg(long)]
    height: Option<u32>,
}

fn apply_args(cfg: &mut AppCfg, args: &Args) {
    if args.no_vsync {
        cfg.render.vsync = false;
    }
    if let Some(w) = args.width {
        cfg.window.width = w;
    }
    if let Some(h) = args.height {
        cfg.window.height = h;
    }
}

struct App {
    cfg: AppCfg,
    window: Option<Arc<Window>>,
    host: Option<WinitHost>,
    renderer: Option<VkRenderer>,
    scene: DemoScene,
    render_size: RenderSize,
    vsync: bool,

    exiting: bool,
    paused: bool,
    frames: u32,
    last_fps_instant: Instant,
    fatal: Option<anyhow::Error>,
}

impl App {
    fn new(cfg: AppCfg) -> Self {
        App {
            vsync: cfg.render.vsync,
            render_size: RenderSize::new(cfg.window.width, cfg.window.height),
            cfg,
            window: None,
            host: None,
            renderer: None,
            scene: DemoScene::new(),
            exiting: false,
            paused: false,
            frames: 0,
            last_fps_instant: Instant::now(),
            fatal: None,
        }
    }

    fn init_window(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = rayframe_platform::create_window(
            event_loop,
            &self.cfg.window.title,
            self.render_size,
        )?;
        self.render_size = render_size(window.inner_size());

        let init = RenderInit {
            size: self.render_size,
            vertex_spv: QUAD_VERT,
            fragment_spv: RAYTRACE_FRAG,
            uniform_capacity: std::mem::size_of::<rayframe_math::CameraUniform>(),
            triangles: self.scene.triangles(),
            spheres: self.scene.spheres(),
            vsync: self.vsync,
            prefer_mailbox: self.cfg.render.present_mode == PresentModeCfg::Mailbox,
        };
        let mut renderer = VkRenderer::new(&*window, &*window, init)?;
        renderer.set_clear_color(self.cfg.render.clear_color);
        if self.cfg.render.overlay {
            renderer.set_overlay(Some(Box::new(FrameTimeBar::new(
                120,
                [0.9, 0.9, 0.2, 1.0],
            ))));
        }
        info!("renderer = vk ({})", renderer.device_name());
        info!("vsync cfg = {}", self.vsync);

        let poll = Duration::from_millis(self.cfg.render.minimized_poll_ms);
        self.host = Some(WinitHost::new(window.clone(), poll));
        self.window = Some(window);
        self.renderer = Some(renderer);
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, e: anyhow::Error) {
        error!("{e:#}");
        self.fatal = Some(e);
        self.shutdown(event_loop);
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.exiting = true;
        // renderer first: it waits for the device before the window goes away
        self.renderer = None;
        self.host = None;
        self.window = None;
        event_loop.exit();
    }

    fn toggle_vsync(&mut self) {
        self.vsync = !self.vsync;
        if let Some(r) = &mut self.renderer {
            r.set_vsync(self.vsync);
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.init_window(event_loop) {
                self.fail(event_loop, e.context("renderer init"));
                return;
            }
        }

        event_loop.set_control_flow(if self.vsync {
            ControlFlow::Wait
        } else {
            ControlFlow::Poll
        });

        self.paused = self.render_size.is_zero();
        info!("resumed → paused={}", self.paused);

        if !self.paused {
            if let Some(w) = &self.window {
                w.request_redraw();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.shutdown(event_loop);
            }

            // held keys repeat, so camera moves keep going
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key,
                        state: ElementState::Pressed,
                        repeat,
                        ..
                    },
                ..
            } => match logical_key {
                Key::Named(NamedKey::Escape) => self.shutdown(event_loop),
                Key::Character(c) if c.as_str().eq_ignore_ascii_case("v") => {
                    if !repeat {
                        self.toggle_vsync();
                    }
                }
                Key::Character(c) => {
                    if let Some(key) = c.chars().next() {
                        self.scene.steer(key);
                    }
                }
                _ => {}
            },

            WindowEvent::Resized(new_size) => {
                self.render_size = render_size(new_size);
                let now_paused = self.render_size.is_zero();
                if self.paused != now_paused {
                    self.paused = now_paused;
                    info!(
                        "Resized → {}x{} (paused={})",
                        self.render_size.width, self.render_size.height, self.paused
                    );
                } else {
                    debug!(
                        "Resized → {}x{}",
                        self.render_size.width, self.render_size.height
                    );
                }

                if !self.paused {
                    if let Some(r) = &mut self.renderer {
                        r.resize(ResizeEvent {
                            width: new_size.width,
                            height: new_size.height,
                        });
                    }
                    if let Some(w) = &self.window {
                        w.request_redraw();
                    }
                }
            }

            WindowEvent::RedrawRequested => {
                if self.exiting || self.paused {
                    return;
                }

                let res = match (self.renderer.as_mut(), self.host.as_ref()) {
                    (Some(r), Some(host)) => r.render(host, &mut self.scene),
                    _ => return,
                };

                match res {
                    Ok(FrameStatus::Presented) => {
                        // count only frames that were actually shown
                        self.frames = self.frames.saturating_add(1);
                    }
                    Ok(FrameStatus::Recreated) => {
                        debug!("swapchain recreated");
                    }
                    Ok(FrameStatus::Skipped) => {}
                    Err(e) => self.fail(event_loop, e.context("render")),
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exiting {
            return;
        }

        if self.paused {
            // minimized → sleep until the next event
            event_loop.set_control_flow(ControlFlow::Wait);
            self.frames = 0;
            return;
        }

        event_loop.set_control_flow(if self.vsync {
            ControlFlow::Wait
        } else {
            ControlFlow::Poll
        });
        if let Some(w) = &self.window {
            w.request_redraw();
        }

        let now = Instant::now();
        if now.duration_since(self.last_fps_instant).as_secs_f32() >= 1.0 {
            let recreations = self.renderer.as_ref().map_or(0, |r| r.recreations());
            info!("fps ~ {} (swapchain rebuilds {})", self.frames, recreations);
            self.frames = 0;
            self.last_fps_instant = now;
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let mut cfg = load_cfg(&args.config);
    apply_args(&mut cfg, &args);

    let event_loop: EventLoop<()> = EventLoop::new()?;
    let mut app = App::new(cfg);
    event_loop.run_app(&mut app)?;

    match app.fatal.take() {
        Some(e) => Err(anyhow!("fatal: {e:#}")),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_config() {
        let args = Args::parse_from(["rayframe", "--no-vsync", "--width", "640"]);
        let mut cfg = AppCfg::default();
        apply_args(&mut cfg, &args);
        assert!(!cfg.render.vsync);
        assert_eq!(cfg.window.width, 640);
        assert_eq!(cfg.window.height, 720);
        assert_eq!(args.config, PathBuf::from("rayframe.toml"));
    }
}
