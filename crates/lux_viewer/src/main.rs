mod presenter;
mod trackball;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use lux_math::OrbitTransform;
use lux_render::{CapturedFrame, RenderConfig, RenderContext, ShadingMode, StrategyKind};
use presenter::Presenter;
use trackball::Trackball;
use winit::{
    application::ApplicationHandler,
    event::{ElementState, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Strategy {
    Flat,
    Grouped,
    Persistent,
}

impl From<Strategy> for StrategyKind {
    fn from(strategy: Strategy) -> Self {
        match strategy {
            Strategy::Flat => StrategyKind::FlatGrid,
            Strategy::Grouped => StrategyKind::GroupedTiling,
            Strategy::Persistent => StrategyKind::PersistentClaiming,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Progressive path tracer viewer")]
struct Cli {
    /// JSON render configuration; command line values override it
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    width: Option<u32>,
    #[arg(long)]
    height: Option<u32>,
    #[arg(long, value_enum)]
    strategy: Option<Strategy>,
    #[arg(long)]
    gamma: Option<f32>,
    /// Samples per pixel per frame
    #[arg(long)]
    spp: Option<u32>,
    /// Render this many frames without a window, save the image and exit
    #[arg(long)]
    frames: Option<u32>,
    /// Output path for --frames
    #[arg(long, default_value = "lux.png")]
    output: PathBuf,
    /// Directory for screenshots taken with S
    #[arg(long, default_value = ".")]
    screenshot_dir: PathBuf,
}

impl Cli {
    fn render_config(&self) -> Result<RenderConfig> {
        let mut config = match &self.config {
            Some(path) => RenderConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => RenderConfig::default(),
        };
        if let Some(width) = self.width {
            config.width = width;
        }
        if let Some(height) = self.height {
            config.height = height;
        }
        if let Some(strategy) = self.strategy {
            config.strategy = strategy.into();
        }
        if let Some(gamma) = self.gamma {
            config.gamma = gamma;
        }
        if let Some(spp) = self.spp {
            config.sampling.samples_per_pixel = spp;
        }
        config.validate()?;
        Ok(config)
    }
}

fn save_frame(frame: &CapturedFrame, path: &std::path::Path) -> Result<()> {
    let image = image::RgbaImage::from_raw(frame.width, frame.height, frame.to_rgba8())
        .context("Captured frame has the wrong size")?;
    image
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    log::info!("Saved {}", path.display());
    Ok(())
}

/// Application state
struct App {
    config: RenderConfig,
    screenshot_dir: PathBuf,
    window: Option<Arc<Window>>,
    presenter: Option<Presenter>,
    context: Option<RenderContext>,

    trackball: Trackball,
    left_mouse_pressed: bool,
    last_mouse_pos: Option<(f64, f64)>,
}

impl App {
    fn new(config: RenderConfig, screenshot_dir: PathBuf) -> Self {
        Self {
            config,
            screenshot_dir,
            window: None,
            presenter: None,
            context: None,
            trackball: Trackball::default(),
            left_mouse_pressed: false,
            last_mouse_pos: None,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window_attrs = Window::default_attributes()
            .with_title("Lux")
            .with_inner_size(winit::dpi::PhysicalSize::new(self.config.width, self.config.height));
        let window = Arc::new(event_loop.create_window(window_attrs)?);

        // The window manager may not honour the requested size
        let size = window.inner_size();
        let mut config = self.config.clone();
        config.width = size.width.max(1);
        config.height = size.height.max(1);

        let presenter = pollster::block_on(Presenter::new(window.clone()))?;
        let context = RenderContext::new(config, lux_core::demo::three_spheres()?)?;

        self.window = Some(window);
        self.presenter = Some(presenter);
        self.context = Some(context);
        Ok(())
    }

    /// Camera input invalidates everything accumulated so far.
    fn camera_moved(&mut self) {
        if let Some(context) = &mut self.context {
            context.restart();
        }
    }

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, key: KeyCode) {
        let Some(context) = &mut self.context else {
            return;
        };

        match key {
            KeyCode::Escape => event_loop.exit(),
            KeyCode::KeyR => {
                self.trackball.reset();
                context.restart();
            }
            KeyCode::Digit1 | KeyCode::Digit2 | KeyCode::Digit3 => {
                let index = match key {
                    KeyCode::Digit1 => 0,
                    KeyCode::Digit2 => 1,
                    _ => 2,
                };
                if let Some(kind) = StrategyKind::from_index(index) {
                    context.set_strategy(kind);
                }
            }
            KeyCode::Equal | KeyCode::NumpadAdd | KeyCode::Minus | KeyCode::NumpadSubtract => {
                let step = if matches!(key, KeyCode::Equal | KeyCode::NumpadAdd) {
                    0.1
                } else {
                    -0.1
                };
                let gamma = context.config().gamma + step;
                match context.set_gamma(gamma) {
                    Ok(()) => log::info!("Gamma {:.1}", gamma),
                    Err(err) => log::warn!("{err}"),
                }
            }
            KeyCode::KeyN => {
                let next = match context.config().sampling.shading {
                    ShadingMode::PathTrace => ShadingMode::Normals,
                    ShadingMode::Normals => ShadingMode::Albedo,
                    ShadingMode::Albedo => ShadingMode::PathTrace,
                };
                log::info!("Shading mode {:?}", next);
                context.set_shading(next);
            }
            KeyCode::KeyS => {
                let path = self
                    .screenshot_dir
                    .join(format!("lux_{:05}.png", context.iteration_count()));
                let result = context
                    .capture()
                    .map_err(anyhow::Error::from)
                    .and_then(|frame| save_frame(&frame, &path));
                if let Err(err) = result {
                    log::error!("Screenshot failed: {err:#}");
                }
            }
            _ => {}
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let (Some(context), Some(presenter), Some(window)) =
            (&mut self.context, &mut self.presenter, &self.window)
        else {
            return;
        };

        let outcome = context.render_frame(&self.trackball.transform());
        if let Some(status) = &outcome.status {
            window.set_title(&format!("Lux - {} - {}", context.config().strategy, status));
        }

        match context.presentation().acquire_read() {
            Ok(guard) => presenter.upload(&guard),
            Err(err) => log::warn!("Presentation skipped: {err}"),
        }

        match presenter.render() {
            Ok(()) => {}
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => presenter.reconfigure(),
            Err(wgpu::SurfaceError::OutOfMemory) => {
                log::error!("Out of memory!");
                event_loop.exit();
            }
            Err(err) => log::error!("Surface error: {:?}", err),
        }

        window.request_redraw();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(err) = self.init(event_loop) {
                log::error!("Failed to start viewer: {err:#}");
                event_loop.exit();
                return;
            }
            log::info!("Window and renderer initialized");
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested");
                event_loop.exit();
            }
            WindowEvent::Resized(physical_size) => {
                if physical_size.width == 0 || physical_size.height == 0 {
                    // Minimised
                    return;
                }
                if let Some(presenter) = &mut self.presenter {
                    presenter.resize((physical_size.width, physical_size.height));
                }
                if let Some(context) = &mut self.context {
                    if let Err(err) = context.resize(physical_size.width, physical_size.height) {
                        log::error!("Resize failed: {err}");
                        event_loop.exit();
                    }
                }
            }
            WindowEvent::MouseInput {
                button: MouseButton::Left,
                state,
                ..
            } => {
                self.left_mouse_pressed = state == ElementState::Pressed;
                if !self.left_mouse_pressed {
                    self.last_mouse_pos = None;
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                if self.left_mouse_pressed {
                    if let Some(last_pos) = self.last_mouse_pos {
                        let dx = (position.x - last_pos.0) as f32;
                        let dy = (position.y - last_pos.1) as f32;
                        self.trackball.drag(dx, dy);
                        self.camera_moved();
                    }
                    self.last_mouse_pos = Some((position.x, position.y));
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / 100.0,
                };
                self.trackball.scroll(lines);
                self.camera_moved();
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(keycode),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => self.handle_key(event_loop, keycode),
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }
}

/// Render a fixed number of frames without opening a window.
fn render_offline(config: RenderConfig, frames: u32, output: &std::path::Path) -> Result<()> {
    let mut context = RenderContext::new(config, lux_core::demo::three_spheres()?)?;
    let orbit = OrbitTransform::IDENTITY;

    for _ in 0..frames {
        let outcome = context.render_frame(&orbit);
        if let Some(status) = outcome.status {
            log::info!("{status}");
        }
    }

    save_frame(&context.capture()?, output)
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let cli = Cli::parse();
    let config = cli.render_config()?;

    if let Some(frames) = cli.frames {
        return render_offline(config, frames, &cli.output);
    }

    log::info!("Starting Lux viewer");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config, cli.screenshot_dir);

    log::info!("Running event loop");
    event_loop.run_app(&mut app)?;

    Ok(())
}
