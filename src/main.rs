use std::any::Any;
use std::env;
use std::fmt;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use glam::{Vec2, Vec3};
use log::{info, warn};
use pollster::block_on;
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{DeviceEvent, DeviceId, ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode as WinitKey, PhysicalKey};
use winit::window::{CursorGrabMode, Window, WindowId};

use prism_render::{
    AssetLoader, FrameInput, FramePipeline, FrameTimer, InputState, KeyCode, LightSpawner, LogSink,
    NamedKey, RenderContext, Renderable, Scene, TelemetryPublisher,
};

const SPAWN_INTERVAL: Duration = Duration::from_millis(250);

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = CliOptions::parse()?;
    let (scene, asset_root) = match &options.scene {
        Some(path) => {
            let xml = fs::read_to_string(path)
                .with_context(|| format!("failed to read scene {}", path.display()))?;
            let scene = Scene::from_xml(&xml).context("failed to parse scene XML")?;
            let root = path
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            (scene, root)
        }
        None => (Scene::demo(), PathBuf::from(".")),
    };

    println!(
        "Loaded scene with {} objects ({} point lights)",
        scene.objects.len(),
        scene.point_lights.len()
    );

    if options.summary_only {
        return run_headless(&scene, &options);
    }
    match run_interactive(&scene, asset_root, &options) {
        Ok(()) => Ok(()),
        Err(err) => {
            if err.downcast_ref::<WindowInitError>().is_some() {
                eprintln!(
                    "{err}. Falling back to --summary-only mode (set DISPLAY or install X11 libs to enable rendering)."
                );
                run_headless(&scene, &options)
            } else {
                Err(err)
            }
        }
    }
}

/// Runs the frame update without a window and prints what the renderer would see.
fn run_headless(scene: &Scene, options: &CliOptions) -> Result<()> {
    let mut context = RenderContext::new(scene).context("invalid render settings")?;
    let spawner = options
        .spawn_lights
        .then(|| start_spawner(&context, scene.camera.position));
    let mut timer = FrameTimer::new(context.config().frame_rate_cap);
    let idle = FrameInput::default();

    for _ in 0..options.frames {
        let dt = timer.begin_frame(Instant::now());
        context.update(dt, &idle);
        let deadline = timer.end_frame(Instant::now());
        thread::sleep(deadline.saturating_duration_since(Instant::now()));
    }
    if let Some(spawner) = spawner {
        println!("Spawner added {} light(s)", spawner.stop());
    }

    print_summary(&context, timer.frames());
    Ok(())
}

fn print_summary(context: &RenderContext, frames: u64) {
    let shadows = context.shadows();
    println!(
        "Cascades: {} at {}x{}",
        shadows.cascades().len(),
        shadows.resolution(),
        shadows.resolution()
    );
    for cascade in shadows.cascades() {
        println!(
            " - cascade {}: {:.2}..{:.2} radius {:.2} ({:.1} texels/unit)",
            cascade.index, cascade.near, cascade.far, cascade.radius, cascade.texels_per_unit
        );
    }

    let grid = context.tile_grid();
    println!(
        "Tile grid: {}x{} ({} tiles)",
        grid.tiles_x(),
        grid.tiles_y(),
        grid.total()
    );
    let lists = context.cull_lights();
    let lit_tiles = (0..lists.tile_count())
        .filter(|&tile| !lists.lights_in_tile(tile).is_empty())
        .count();
    println!(
        "Point lights: {} active, {} lit tiles, at most {} per tile",
        context.lights().count(),
        lit_tiles,
        lists.max_lights_in_any_tile()
    );

    let position = context.cameras().primary.position();
    println!("Frames simulated: {frames}");
    println!(
        "Final camera position: ({:.2}, {:.2}, {:.2})",
        position.x, position.y, position.z
    );
}

fn start_spawner(context: &RenderContext, around: Vec3) -> LightSpawner {
    LightSpawner::start(
        Arc::clone(context.lights()),
        Vec3::new(around.x, 0.0, around.z),
        SPAWN_INTERVAL,
    )
}

fn run_interactive(scene: &Scene, asset_root: PathBuf, options: &CliOptions) -> Result<()> {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let event_loop = panic::catch_unwind(AssertUnwindSafe(EventLoop::new));
    panic::set_hook(default_hook);
    let event_loop = event_loop
        .map_err(|panic| WindowInitError::from_panic("event loop", panic))?
        .map_err(|err| WindowInitError::from_error("event loop", err))?;

    let context = RenderContext::new(scene).context("invalid render settings")?;
    let spawner = options
        .spawn_lights
        .then(|| start_spawner(&context, scene.camera.position));
    let mut app = App {
        scene: scene.clone(),
        loader: AssetLoader::new(asset_root),
        timer: FrameTimer::new(context.config().frame_rate_cap),
        context,
        input: InputState::new(),
        telemetry: TelemetryPublisher::new(Box::new(LogSink)),
        next_frame: Instant::now(),
        gpu: None,
        error: None,
    };

    event_loop.set_control_flow(ControlFlow::Poll);
    event_loop.run_app(&mut app).context("event loop failed")?;

    if let Some(spawner) = spawner {
        info!("spawner added {} light(s)", spawner.stop());
    }
    if let Some(err) = app.error {
        return Err(err);
    }
    print_summary(&app.context, app.timer.frames());
    Ok(())
}

struct GpuState {
    pipeline: FramePipeline,
    renderables: Vec<Box<dyn Renderable>>,
}

struct App {
    scene: Scene,
    loader: AssetLoader,
    context: RenderContext,
    input: InputState,
    timer: FrameTimer,
    telemetry: TelemetryPublisher,
    next_frame: Instant,
    gpu: Option<GpuState>,
    error: Option<anyhow::Error>,
}

impl App {
    fn init_gpu(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let config = self.context.config();
        let attributes = Window::default_attributes()
            .with_title("prism-render")
            .with_inner_size(LogicalSize::new(config.width, config.height));
        let window = Arc::new(
            event_loop
                .create_window(attributes)
                .map_err(|err| WindowInitError::from_error("window", err))?,
        );

        let mut pipeline = block_on(FramePipeline::new(Arc::clone(&window), &self.context))?;
        pipeline.resize(window.inner_size());
        // The pipeline may clamp the surface; tile grids must match it.
        let size = pipeline.size();
        self.context.resize(size.width, size.height);
        let renderables = pipeline.create_renderables(&self.scene, &self.loader);
        info!(
            "uploaded {} renderables ({} mesh files read)",
            renderables.len(),
            self.loader.cached_files()
        );

        let grabbed = window
            .set_cursor_grab(CursorGrabMode::Confined)
            .or_else(|_| window.set_cursor_grab(CursorGrabMode::Locked));
        match grabbed {
            Ok(()) => window.set_cursor_visible(false),
            Err(err) => warn!("cursor grab unavailable: {err}"),
        }

        self.gpu = Some(GpuState {
            pipeline,
            renderables,
        });
        Ok(())
    }

    fn frame(&mut self, event_loop: &ActiveEventLoop) {
        let Some(gpu) = self.gpu.as_mut() else {
            return;
        };
        let dt = self.timer.begin_frame(Instant::now());
        let input = self.input.take_frame();
        self.context.update(dt, &input);
        if self.context.quit_requested() {
            event_loop.exit();
            return;
        }

        match gpu.pipeline.render_frame(&self.context, &gpu.renderables) {
            Ok(()) => {}
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                let size = gpu.pipeline.window().inner_size();
                gpu.pipeline.resize(size);
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                self.error = Some(anyhow!("GPU is out of memory"));
                event_loop.exit();
                return;
            }
            Err(wgpu::SurfaceError::Timeout) => {
                info!("Surface timeout; retrying next frame");
            }
            Err(err) => warn!("surface error: {err}"),
        }

        let now = Instant::now();
        self.telemetry
            .tick(now, &self.timer, self.context.view_camera());
        self.next_frame = self.timer.end_frame(now);
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.gpu.is_some() {
            return;
        }
        if let Err(err) = self.init_gpu(event_loop) {
            self.error = Some(err);
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        let Some(gpu) = self.gpu.as_mut() else {
            return;
        };
        if window_id != gpu.pipeline.window_id() {
            return;
        }
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                gpu.pipeline.resize(size);
                let size = gpu.pipeline.size();
                self.context.resize(size.width, size.height);
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state,
                        ..
                    },
                ..
            } => {
                let Some(key) = map_keycode(code) else {
                    return;
                };
                match state {
                    ElementState::Pressed => self.input.set_key_down(key),
                    ElementState::Released => self.input.set_key_up(key),
                }
            }
            WindowEvent::RedrawRequested => self.frame(event_loop),
            _ => {}
        }
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, _device_id: DeviceId, event: DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta } = event {
            self.input
                .add_mouse_delta(Vec2::new(delta.0 as f32, delta.1 as f32));
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let Some(gpu) = self.gpu.as_ref() else {
            return;
        };
        if Instant::now() >= self.next_frame {
            gpu.pipeline.window().request_redraw();
            event_loop.set_control_flow(ControlFlow::Wait);
        } else {
            event_loop.set_control_flow(ControlFlow::WaitUntil(self.next_frame));
        }
    }
}

#[derive(Debug)]
struct WindowInitError {
    message: String,
}

impl WindowInitError {
    fn from_panic(stage: &str, panic: Box<dyn Any + Send>) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {}", panic_message(panic)),
        }
    }

    fn from_error(stage: &str, err: impl fmt::Display) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {err}"),
        }
    }
}

impl fmt::Display for WindowInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for WindowInitError {}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(msg) => *msg,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(msg) => (*msg).to_string(),
            Err(_) => "unknown panic".into(),
        },
    }
}

fn map_keycode(code: WinitKey) -> Option<KeyCode> {
    Some(match code {
        WinitKey::Space => KeyCode::Named(NamedKey::Space),
        WinitKey::Enter => KeyCode::Named(NamedKey::Enter),
        WinitKey::Tab => KeyCode::Named(NamedKey::Tab),
        WinitKey::Escape => KeyCode::Named(NamedKey::Escape),
        WinitKey::Home => KeyCode::Named(NamedKey::Home),
        WinitKey::End => KeyCode::Named(NamedKey::End),
        WinitKey::ShiftLeft => KeyCode::Named(NamedKey::LeftShift),
        WinitKey::BracketLeft => KeyCode::Character('['),
        WinitKey::BracketRight => KeyCode::Character(']'),
        WinitKey::Digit0 => KeyCode::Digit(0),
        WinitKey::Digit1 => KeyCode::Digit(1),
        WinitKey::Digit2 => KeyCode::Digit(2),
        WinitKey::Digit3 => KeyCode::Digit(3),
        WinitKey::Digit4 => KeyCode::Digit(4),
        WinitKey::Digit5 => KeyCode::Digit(5),
        WinitKey::Digit6 => KeyCode::Digit(6),
        WinitKey::Digit7 => KeyCode::Digit(7),
        WinitKey::Digit8 => KeyCode::Digit(8),
        WinitKey::Digit9 => KeyCode::Digit(9),
        WinitKey::KeyA => KeyCode::Character('A'),
        WinitKey::KeyB => KeyCode::Character('B'),
        WinitKey::KeyC => KeyCode::Character('C'),
        WinitKey::KeyD => KeyCode::Character('D'),
        WinitKey::KeyE => KeyCode::Character('E'),
        WinitKey::KeyF => KeyCode::Character('F'),
        WinitKey::KeyG => KeyCode::Character('G'),
        WinitKey::KeyH => KeyCode::Character('H'),
        WinitKey::KeyI => KeyCode::Character('I'),
        WinitKey::KeyJ => KeyCode::Character('J'),
        WinitKey::KeyK => KeyCode::Character('K'),
        WinitKey::KeyL => KeyCode::Character('L'),
        WinitKey::KeyM => KeyCode::Character('M'),
        WinitKey::KeyN => KeyCode::Character('N'),
        WinitKey::KeyO => KeyCode::Character('O'),
        WinitKey::KeyP => KeyCode::Character('P'),
        WinitKey::KeyQ => KeyCode::Character('Q'),
        WinitKey::KeyR => KeyCode::Character('R'),
        WinitKey::KeyS => KeyCode::Character('S'),
        WinitKey::KeyT => KeyCode::Character('T'),
        WinitKey::KeyU => KeyCode::Character('U'),
        WinitKey::KeyV => KeyCode::Character('V'),
        WinitKey::KeyW => KeyCode::Character('W'),
        WinitKey::KeyX => KeyCode::Character('X'),
        WinitKey::KeyY => KeyCode::Character('Y'),
        WinitKey::KeyZ => KeyCode::Character('Z'),
        WinitKey::F1 => KeyCode::Function(1),
        WinitKey::F2 => KeyCode::Function(2),
        WinitKey::F3 => KeyCode::Function(3),
        WinitKey::F4 => KeyCode::Function(4),
        WinitKey::F5 => KeyCode::Function(5),
        WinitKey::F6 => KeyCode::Function(6),
        WinitKey::F7 => KeyCode::Function(7),
        WinitKey::F8 => KeyCode::Function(8),
        WinitKey::F9 => KeyCode::Function(9),
        WinitKey::F10 => KeyCode::Function(10),
        WinitKey::F11 => KeyCode::Function(11),
        WinitKey::F12 => KeyCode::Function(12),
        _ => return None,
    })
}

struct CliOptions {
    scene: Option<PathBuf>,
    summary_only: bool,
    frames: u32,
    spawn_lights: bool,
}

const USAGE: &str =
    "Usage: prism-render [scene.xml] [--summary-only] [--frames N] [--spawn-lights]";

impl CliOptions {
    fn parse() -> Result<Self> {
        let mut options = Self {
            scene: None,
            summary_only: false,
            frames: 1,
            spawn_lights: false,
        };
        let mut args = env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--summary-only" => options.summary_only = true,
                "--spawn-lights" => options.spawn_lights = true,
                "--frames" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--frames expects a number. {USAGE}"))?;
                    options.frames = value
                        .parse()
                        .with_context(|| format!("invalid frame count {value}"))?;
                }
                other if other.starts_with("--") => {
                    return Err(anyhow!("Unknown argument: {other}. {USAGE}"));
                }
                path => {
                    if options.scene.is_some() {
                        return Err(anyhow!("Only one scene file may be given. {USAGE}"));
                    }
                    options.scene = Some(PathBuf::from(path));
                }
            }
        }
        Ok(options)
    }
}
