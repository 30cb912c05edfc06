//! Terrapin -- a fixed-size turtle-graphics window driven by a Lua script.
//!
//! Thread layout: winit owns the window, the CPU framebuffer surface, and
//! key input; the Lua script runs on its own thread, issuing turtle
//! commands and pacing itself by iterating `turtle.loop()`. Frames travel
//! from the engine to the window through the shared present buffer, with a
//! user event nudging the winit thread awake for each one. The input path
//! back is narrower still: a key press only appends bound callbacks to the
//! engine's event queue.
//!
//! Startup order follows the config file: load it, build the engine, open
//! the window, then start the script. Closing the window ends the process,
//! script thread included.

mod config;
mod script;

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::thread;

use pixels::{Pixels, SurfaceTexture};
use winit::application::ApplicationHandler;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowId};

use terrapin_core::{Engine, KeyCode};
use terrapin_platform::{FramePresented, FrameShare, PlatformConfig, WindowSink};

struct DisplayState {
    window: Arc<Window>,
    pixels: Pixels<'static>,
}

struct App {
    platform: PlatformConfig,
    engine: Arc<Engine>,
    share: Arc<FrameShare>,
    script_path: PathBuf,
    display: Option<DisplayState>,
    script_started: bool,
}

impl ApplicationHandler<FramePresented> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.display.is_some() {
            return;
        }
        let window = terrapin_platform::create_window(event_loop, &self.platform);
        log::info!(
            "Window created: {}x{}",
            self.platform.width,
            self.platform.height
        );

        let surface = SurfaceTexture::new(self.platform.width, self.platform.height, window.clone());
        let pixels = Pixels::new(self.platform.width, self.platform.height, surface)
            .expect("Failed to create framebuffer surface");
        self.display = Some(DisplayState { window, pixels });

        if !self.script_started {
            self.script_started = true;
            let engine = self.engine.clone();
            let path = self.script_path.clone();
            thread::spawn(move || {
                if let Err(err) = script::run_script(engine, &path) {
                    log::error!("{err}");
                    return;
                }
                log::info!("Script finished: {}", path.display());
            });
        }
    }

    fn user_event(&mut self, _event_loop: &ActiveEventLoop, _event: FramePresented) {
        if let Some(display) = &self.display {
            display.window.request_redraw();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(display) = self.display.as_mut() else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, exiting.");
                event_loop.exit();
            }

            // Presses only; releases and typed text are deliberately not
            // handled.
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state == ElementState::Pressed {
                    if let Some(code) = map_key(&event.logical_key) {
                        self.engine.key_pressed(code);
                    }
                }
            }

            WindowEvent::RedrawRequested => {
                self.share.blit_rgba(display.pixels.frame_mut());
                if let Err(err) = display.pixels.render() {
                    log::error!("Frame present failed: {err}");
                }
            }

            _ => {}
        }
    }
}

fn map_key(key: &Key) -> Option<KeyCode> {
    match key {
        Key::Named(NamedKey::Enter) => Some(KeyCode::ENTER),
        Key::Named(NamedKey::Escape) => Some(KeyCode::ESCAPE),
        Key::Named(NamedKey::ArrowLeft) => Some(KeyCode::LEFT),
        Key::Named(NamedKey::ArrowRight) => Some(KeyCode::RIGHT),
        Key::Named(NamedKey::ArrowUp) => Some(KeyCode::UP),
        Key::Named(NamedKey::ArrowDown) => Some(KeyCode::DOWN),
        Key::Named(NamedKey::Shift) => Some(KeyCode::SHIFT),
        Key::Named(NamedKey::Control) => Some(KeyCode::CONTROL),
        Key::Named(NamedKey::Space) => KeyCode::from_char(' '),
        Key::Character(text) => {
            let mut chars = text.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => KeyCode::from_char(c),
                _ => None,
            }
        }
        _ => None,
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "init.cfg".to_string());
    let config = match config::load_config(Path::new(&config_path)) {
        Ok(config) => config,
        Err(err) => {
            log::error!("{err}");
            process::exit(1);
        }
    };
    log::info!(
        "Terrapin starting: {}x{} canvas, {}ms frames, script {}",
        config.width,
        config.height,
        config.frame_delay.as_millis(),
        config.script_path.display()
    );

    let event_loop = EventLoop::<FramePresented>::with_user_event()
        .build()
        .expect("Failed to create event loop");
    event_loop.set_control_flow(ControlFlow::Wait);

    let share = FrameShare::new(config.width, config.height);
    let sink = WindowSink::new(share.clone(), event_loop.create_proxy());
    let engine = Engine::new(
        config.width,
        config.height,
        config.frame_delay,
        Arc::new(sink),
    );

    let mut app = App {
        platform: PlatformConfig {
            title: "Terrapin".to_string(),
            width: config.width,
            height: config.height,
        },
        engine,
        share,
        script_path: config.script_path,
        display: None,
        script_started: false,
    };
    event_loop.run_app(&mut app).expect("Event loop error");
}
