use std::any::Any;
use std::env;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use glam::{Vec2, Vec3};
use log::{error, info};
use pollster::block_on;
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, MouseButton, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode as WinitKey, PhysicalKey};
use winit::window::{Window, WindowId};

use mountain_flyover::render::{FrameView, RenderError, Renderer};
use mountain_flyover::scene::asset_root;
use mountain_flyover::{
    Action, Flyover, FlyoverConfig, FrameClock, KeyCode, MeshLibrary, NamedKey, Scene, ShadowBias,
};

/// Step used by `--summary-only`, which never reads the wall clock.
const HEADLESS_FRAME_SECONDS: f32 = 1.0 / 60.0;

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = CliOptions::parse(env::args().skip(1))?;
    let mut library = MeshLibrary::for_scene(&options.path);
    let scene = Scene::load(&options.path, &mut library)?;

    println!(
        "Loaded scene with {} objects ({} materials)",
        scene.objects.len(),
        scene.materials.len()
    );
    for object in &scene.objects {
        println!(
            " - {} ({}{}{})",
            object.name,
            object.mesh.name(),
            if object.collidable { ", collidable" } else { "" },
            if object.casts_shadow { ", casts shadow" } else { "" },
        );
    }

    let mut config = scene.config.clone();
    options.apply(&mut config);
    let flyover = Flyover::new(scene, &config);

    if options.summary_only {
        run_headless(flyover, library, &options)
    } else {
        match run_interactive(flyover, &config, asset_root(&options.path)) {
            Ok(flyover) => {
                print_final_state(&flyover);
                Ok(())
            }
            Err(err) if err.downcast_ref::<WindowInitError>().is_some() => {
                eprintln!(
                    "{err}. Run with --summary-only to fly without a window (set DISPLAY or install X11 libs to enable rendering)."
                );
                Err(err)
            }
            Err(err) => Err(err),
        }
    }
}

fn run_headless(mut flyover: Flyover, mut library: MeshLibrary, options: &CliOptions) -> Result<()> {
    library.wait();
    let pending = flyover.scene().pending_meshes();
    if pending > 0 {
        println!("{pending} mesh(es) failed to load");
    }

    for action in &options.hold {
        flyover.action(*action, true);
    }
    for _ in 0..options.frames {
        flyover.step(HEADLESS_FRAME_SECONDS);
    }
    println!(
        "Simulated {} frames ({} blocked)",
        flyover.frames(),
        flyover.blocked_frames()
    );
    print_final_state(&flyover);
    Ok(())
}

fn print_final_state(flyover: &Flyover) {
    let camera = flyover.camera();
    // Round before printing so tiny negative residues do not show as -0.00.
    let position = (camera.position() * 100.0).round() / 100.0 + Vec3::ZERO;
    println!(
        "Final camera pos=({:.2}, {:.2}, {:.2}) facing {}",
        position.x,
        position.y,
        position.z,
        camera.facing_label()
    );
}

fn run_interactive(flyover: Flyover, config: &FlyoverConfig, assets: PathBuf) -> Result<Flyover> {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let event_loop = panic::catch_unwind(AssertUnwindSafe(EventLoop::new));
    panic::set_hook(default_hook);
    let event_loop = event_loop
        .map_err(|panic| WindowInitError::from_panic("event loop", panic))?
        .map_err(|err| WindowInitError::from_error("event loop", err))?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = FlyoverApp {
        flyover,
        shadow: config.shadow,
        assets,
        renderer: None,
        clock: FrameClock::default(),
        last_error: None,
    };
    event_loop
        .run_app(&mut app)
        .context("event loop terminated abnormally")?;

    if let Some(err) = app.last_error {
        return Err(err);
    }
    Ok(app.flyover)
}

struct FlyoverApp {
    flyover: Flyover,
    shadow: mountain_flyover::ShadowConfig,
    assets: PathBuf,
    renderer: Option<Renderer>,
    clock: FrameClock,
    last_error: Option<anyhow::Error>,
}

impl FlyoverApp {
    fn create_renderer(&self, event_loop: &ActiveEventLoop) -> Result<Renderer> {
        let attributes = Window::default_attributes()
            .with_title("Mountain Flyover")
            .with_inner_size(LogicalSize::new(1280.0, 720.0));
        let window = Arc::new(
            event_loop
                .create_window(attributes)
                .map_err(|err| WindowInitError::from_error("window", err))?,
        );
        block_on(Renderer::new(window, self.shadow, self.assets.clone()))
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{err:#}");
        self.last_error = Some(err);
        event_loop.exit();
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };
        let frame = self.flyover.step(self.clock.tick());
        let view = FrameView {
            camera: self.flyover.camera(),
            lighting: &frame.lighting,
            models: &frame.models,
            materials: self.flyover.materials(),
        };
        match renderer.render(&view) {
            Ok(()) => {}
            Err(RenderError::Surface(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated)) => {
                let size = renderer.window().inner_size();
                renderer.resize(size);
            }
            Err(RenderError::Surface(wgpu::SurfaceError::OutOfMemory)) => {
                self.fail(event_loop, anyhow!("GPU is out of memory"));
            }
            Err(RenderError::Surface(err)) => {
                info!("surface error {err:?}; retrying next frame");
            }
            Err(err @ RenderError::Shadow(_)) => {
                self.fail(event_loop, err.into());
            }
        }
    }

    fn key(&mut self, key: WinitKey, pressed: bool, event_loop: &ActiveEventLoop) {
        if key == WinitKey::Escape && pressed {
            event_loop.exit();
            return;
        }
        let Some(key) = map_keycode(key) else {
            return;
        };
        if self.flyover.key(key, pressed) == Some(Action::ToggleDepthView) && pressed {
            if let Some(renderer) = self.renderer.as_mut() {
                let shown = renderer.toggle_depth_view();
                info!("depth overlay {}", if shown { "on" } else { "off" });
            }
        }
    }
}

impl ApplicationHandler for FlyoverApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.renderer.is_some() {
            return;
        }
        match self.create_renderer(event_loop) {
            Ok(renderer) => self.renderer = Some(renderer),
            Err(err) => self.fail(event_loop, err),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, id: WindowId, event: WindowEvent) {
        if self.renderer.as_ref().map(Renderer::window_id) != Some(id) {
            return;
        }
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.resize(size);
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.repeat {
                    return;
                }
                if let PhysicalKey::Code(key) = event.physical_key {
                    self.key(key, event.state == ElementState::Pressed, event_loop);
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                if let Some(renderer) = self.renderer.as_ref() {
                    let size = renderer.size();
                    let center = Vec2::new(size.width as f32, size.height as f32) * 0.5;
                    self.flyover
                        .pointer_moved(Vec2::new(position.x as f32, position.y as f32) - center);
                }
            }
            WindowEvent::CursorLeft { .. } => self.flyover.pointer_left(),
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => match state {
                ElementState::Pressed => self.flyover.pointer_pressed(),
                ElementState::Released => self.flyover.pointer_released(),
            },
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(renderer) = self.renderer.as_ref() {
            renderer.window().request_redraw();
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
    use WinitKey as Key;
    Some(match code {
        Key::Space => KeyCode::Named(NamedKey::Space),
        Key::Escape => KeyCode::Named(NamedKey::Escape),
        Key::ShiftLeft => KeyCode::Named(NamedKey::LeftShift),
        Key::ShiftRight => KeyCode::Named(NamedKey::RightShift),
        Key::Comma => KeyCode::Character(','),
        Key::Period => KeyCode::Character('.'),
        Key::Digit0 => KeyCode::Digit(0),
        Key::Digit1 => KeyCode::Digit(1),
        Key::Digit2 => KeyCode::Digit(2),
        Key::Digit3 => KeyCode::Digit(3),
        Key::Digit4 => KeyCode::Digit(4),
        Key::Digit5 => KeyCode::Digit(5),
        Key::Digit6 => KeyCode::Digit(6),
        Key::Digit7 => KeyCode::Digit(7),
        Key::Digit8 => KeyCode::Digit(8),
        Key::Digit9 => KeyCode::Digit(9),
        Key::KeyA => KeyCode::Character('A'),
        Key::KeyB => KeyCode::Character('B'),
        Key::KeyC => KeyCode::Character('C'),
        Key::KeyD => KeyCode::Character('D'),
        Key::KeyE => KeyCode::Character('E'),
        Key::KeyF => KeyCode::Character('F'),
        Key::KeyG => KeyCode::Character('G'),
        Key::KeyH => KeyCode::Character('H'),
        Key::KeyI => KeyCode::Character('I'),
        Key::KeyJ => KeyCode::Character('J'),
        Key::KeyK => KeyCode::Character('K'),
        Key::KeyL => KeyCode::Character('L'),
        Key::KeyM => KeyCode::Character('M'),
        Key::KeyN => KeyCode::Character('N'),
        Key::KeyO => KeyCode::Character('O'),
        Key::KeyP => KeyCode::Character('P'),
        Key::KeyQ => KeyCode::Character('Q'),
        Key::KeyR => KeyCode::Character('R'),
        Key::KeyS => KeyCode::Character('S'),
        Key::KeyT => KeyCode::Character('T'),
        Key::KeyU => KeyCode::Character('U'),
        Key::KeyV => KeyCode::Character('V'),
        Key::KeyW => KeyCode::Character('W'),
        Key::KeyX => KeyCode::Character('X'),
        Key::KeyY => KeyCode::Character('Y'),
        Key::KeyZ => KeyCode::Character('Z'),
        _ => return None,
    })
}

struct CliOptions {
    path: PathBuf,
    summary_only: bool,
    frames: u32,
    hold: Vec<Action>,
    shadow_size: Option<u32>,
    constant_bias: bool,
}

const USAGE: &str = "Usage: mountain-flyover <scene.xml> [--summary-only] [--frames N] \
[--hold ACTION]... [--shadow-size N] [--constant-bias]";

impl CliOptions {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut args = args.into_iter();
        let Some(path) = args.next() else {
            return Err(anyhow!(USAGE));
        };
        let mut options = Self {
            path: PathBuf::from(path),
            summary_only: false,
            frames: 120,
            hold: Vec::new(),
            shadow_size: None,
            constant_bias: false,
        };
        while let Some(arg) = args.next() {
            let mut value = |flag: &str| {
                args.next()
                    .ok_or_else(|| anyhow!("{flag} expects a value. {USAGE}"))
            };
            match arg.as_str() {
                "--summary-only" => options.summary_only = true,
                "--constant-bias" => options.constant_bias = true,
                "--frames" => {
                    let count = value("--frames")?;
                    options.frames = count
                        .parse()
                        .with_context(|| format!("invalid frame count '{count}'"))?;
                }
                "--shadow-size" => {
                    let size = value("--shadow-size")?;
                    options.shadow_size = Some(
                        size.parse()
                            .with_context(|| format!("invalid shadow map size '{size}'"))?,
                    );
                }
                "--hold" => {
                    let name = value("--hold")?;
                    let action = Action::from_name(&name)
                        .ok_or_else(|| anyhow!("unknown action '{name}'"))?;
                    options.hold.push(action);
                }
                other => return Err(anyhow!("Unknown argument: {other}. {USAGE}")),
            }
        }
        Ok(options)
    }

    fn apply(&self, config: &mut FlyoverConfig) {
        if let Some(size) = self.shadow_size {
            config.shadow.map_size = size;
        }
        if self.constant_bias {
            config.shadow.bias = ShadowBias::CONSTANT_DEFAULT;
        }
    }
}
