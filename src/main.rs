use std::ops::ControlFlow;
use std::path::Path;
use std::sync::mpsc;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use glam::Vec2;
use image::{Rgba, RgbaImage};
use minifb::Key;
use tracing::{error, info, warn};

use rusty_glasses::anchor::{ArModel, PartKind};
use rusty_glasses::args::{Args, Mode};
use rusty_glasses::camera::{list_cameras, CameraSource};
use rusty_glasses::catalog::{JsonCatalog, ProductArConfig, ProductRecord};
use rusty_glasses::compositor::Compositor2D;
use rusty_glasses::config::AppConfig;
use rusty_glasses::editor::Editor2D;
use rusty_glasses::editor3d::{PointerButton, SceneController};
use rusty_glasses::images::{attach_fetched, fetch_part_images, HttpImageFetcher, ImageFetcher};
use rusty_glasses::inference::FaceMeshLandmarker;
use rusty_glasses::landmarks::{LandmarkSource, LazyLandmarker};
use rusty_glasses::logging::init_tracing;
use rusty_glasses::output::{PointerState, WindowOutput};
use rusty_glasses::pose::{HeadPose, PoseEstimator};
use rusty_glasses::pose3d::PoseTracker3D;
use rusty_glasses::preprocess::{deskew, DeskewConfig};
use rusty_glasses::renderer3d::Renderer3D;
use rusty_glasses::scene::{ParamKey, SceneParams};
use rusty_glasses::session::{FrameSource, OverlayRenderer, Overlay2D, Session, StopSignal};
use rusty_glasses::template::TemplateStore;

/// Everything a mode needs besides the camera and the landmark model.
struct App {
    config: AppConfig,
    mirrored: bool,
    catalog: JsonCatalog,
    templates: TemplateStore,
    product: Option<ProductRecord>,
    runtime: tokio::runtime::Runtime,
    fetcher: HttpImageFetcher,
}

impl App {
    /// Writes a modified AR config slot back to the loaded product.
    fn save_product(&self, update: impl FnOnce(&mut ProductArConfig)) {
        let Some(product) = &self.product else {
            warn!("no product loaded, start with --product to save");
            return;
        };
        let mut ar = self.catalog.load(&product.id).map(|r| r.ar()).unwrap_or_else(|_| product.ar());
        update(&mut ar);
        match ar.to_value().and_then(|v| self.catalog.update_ar_config(&product.id, v)) {
            Ok(_) => info!(id = %product.id, "product AR config saved"),
            Err(e) => warn!(id = %product.id, error = %e, "saving product failed"),
        }
    }
}

/// Press/release edges between two pointer samples.
#[derive(Default)]
struct PointerEdges {
    prev: PointerState,
}

impl PointerEdges {
    fn sample(&mut self, now: PointerState) -> (PointerState, PointerState) {
        let prev = std::mem::replace(&mut self.prev, now);
        (prev, now)
    }
}

fn print_cameras() -> Result<()> {
    let cameras = list_cameras()?;
    println!("{}", "Available Cameras:".bold());
    println!("{:<5} | {:<30} | {:<10}", "Index", "Name", "Misc");
    println!("{}", "-".repeat(60));
    for cam in cameras {
        println!("{:<5} | {:<30} | {:?}", cam.index().to_string().cyan(), cam.human_name(), cam.misc());
    }
    Ok(())
}

/// Keeps a window up with a status line until the user closes it.
fn show_status(message: &str) -> Result<()> {
    eprintln!("{}", message.red());
    let mut window = WindowOutput::new(&format!("rusty-glasses: {message}"), 640, 360)?;
    let canvas = RgbaImage::from_pixel(640, 360, Rgba([40, 40, 40, 255]));
    window.present(&canvas)?;
    while window.is_open() {
        window.pump();
    }
    Ok(())
}

/// Reads a local image the user picked, straightened when `deskew_with` is set.
fn load_upload(path: &Path, deskew_with: Option<&DeskewConfig>) -> Result<Arc<RgbaImage>> {
    let img = image::open(path).with_context(|| format!("Failed to open {}", path.display()))?.into_rgba8();
    let Some(cfg) = deskew_with else {
        return Ok(Arc::new(img));
    };
    let out = deskew(&img, cfg);
    info!(path = %path.display(), angle_deg = out.angle.to_degrees(), w = out.image.width(), h = out.image.height(), "upload straightened");
    Ok(Arc::new(out.image))
}

fn title(mode: Mode, tracking: bool) -> String {
    let status = if tracking { "tracking" } else { "looking for a face" };
    format!("rusty-glasses [{mode:?}] {status}")
}

fn run_2d<L: LandmarkSource>(app: &App, args: &Args, camera: CameraSource, landmarker: L) -> Result<()> {
    let editing = args.mode == Mode::Editor;
    let gate = if editing { app.config.tracking.editor_gate } else { app.config.tracking.try_on_gate };

    let mut model = ArModel::default();
    let pending = match app.product.as_ref().and_then(|p| p.ar().flat) {
        Some(cfg) => model.apply_config(&cfg),
        None => {
            match app.templates.load_ar() {
                Ok(Some(params)) => {
                    model.apply_params(&params);
                    info!("applied saved default template");
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "could not read default template"),
            }
            model.push_history();
            Vec::new()
        }
    };
    if let Some(path) = &args.front_image {
        model.set_part_image(PartKind::Front, Some(load_upload(path, None)?), None);
    }
    if let Some(path) = &args.temple_image {
        let img = load_upload(path, None)?;
        model.set_part_image(PartKind::Left, Some(img.clone()), None);
        model.set_part_image(PartKind::Right, Some(img), None);
    }

    let (tx, rx) = mpsc::channel();
    if !pending.is_empty() {
        let fetcher = app.fetcher.clone();
        app.runtime.spawn(async move {
            let fetched = fetch_part_images(pending, &fetcher).await;
            let _ = tx.send(fetched);
        });
    }

    let mut window = WindowOutput::new(&title(args.mode, false), camera.width() as usize, camera.height() as usize)?;
    let compositor = Compositor2D::new(app.config.compositor, gate, app.mirrored);
    let tracker = PoseEstimator::new(app.config.tracking.pose);
    let mut session = Session::new(camera, landmarker, tracker, Overlay2D::new(compositor, model), app.mirrored);

    let mut editor = Editor2D::new(app.config.compositor.anchor_hit_radius);
    let mut edges = PointerEdges::default();
    let mut last_pose: Option<HeadPose> = None;
    let mut tracking = false;
    if editing {
        info!("Controls: [1] front [2] left [3] right [0] none [=]/[-] scale [Z] undo [C] clear [A] auto anchors [S] save template [P] save product");
    }

    let stop = StopSignal::new();
    let summary = session.run(&stop, |overlay, outcome| {
        if let Ok(fetched) = rx.try_recv() {
            let attached = attach_fetched(&mut overlay.model, fetched);
            info!(attached, "part images loaded");
        }
        if let Some(pose) = outcome.and_then(|o| o.pose) {
            last_pose = Some(pose);
        }
        let found = outcome.is_some_and(|o| o.face_found);
        if found != tracking {
            tracking = found;
            window.set_title(&title(args.mode, tracking));
        }

        if editing {
            let model = &mut overlay.model;
            for key in window.pressed_keys() {
                match key {
                    Key::Key1 => model.select_part(Some(PartKind::Front)),
                    Key::Key2 => model.select_part(Some(PartKind::Left)),
                    Key::Key3 => model.select_part(Some(PartKind::Right)),
                    Key::Key0 => model.select_part(None),
                    Key::Equal => {
                        editor.scale(model, 1.05);
                    }
                    Key::Minus => {
                        editor.scale(model, 1.0 / 1.05);
                    }
                    Key::Z => {
                        if !model.undo() {
                            info!("nothing to undo");
                        }
                    }
                    Key::C => {
                        model.clear_all();
                        model.push_history();
                    }
                    Key::A => {
                        model.auto_anchors = !model.auto_anchors;
                        if model.auto_anchors {
                            model.snap_anchors_to_front();
                        }
                        model.push_history();
                        info!(auto_anchors = model.auto_anchors, "auto anchors toggled");
                    }
                    Key::S => match app.templates.save_ar(&model.params()) {
                        Ok(()) => info!("default template saved"),
                        Err(e) => warn!(error = %e, "saving template failed"),
                    },
                    Key::P => {
                        let flat = model.get_config();
                        app.save_product(|ar| ar.flat = Some(flat));
                    }
                    _ => {}
                }
            }

            let (prev, now) = edges.sample(window.pointer());
            if let Some((x, y)) = now.pos {
                let at = Vec2::new(x, y);
                if now.left && !prev.left {
                    editor.pointer_down(model, last_pose.as_ref(), at);
                } else if now.left {
                    editor.pointer_move(model, at);
                }
            }
            if prev.left && !now.left {
                editor.pointer_up(model);
            }
        }

        if let Err(e) = window.present(overlay.surface()) {
            warn!(error = %e, "present failed");
        }
        if window.is_open() {
            ControlFlow::Continue(())
        } else {
            ControlFlow::Break(())
        }
    });
    session.close();
    info!(frames = summary.frames, errors = summary.errors, "session finished");
    Ok(())
}

enum Texture {
    Front,
    Temple,
}

fn run_3d<L: LandmarkSource>(app: &App, args: &Args, camera: CameraSource, landmarker: L) -> Result<()> {
    let ar = app.product.as_ref().map(|p| p.ar()).unwrap_or_default();
    let params = match ar.scene {
        Some(params) => params,
        None => match app.templates.load_scene() {
            Ok(saved) => saved.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "could not read scene template");
                SceneParams::default()
            }
        },
    };

    let mut renderer = Renderer3D::new(app.config.scene.clone(), app.mirrored);
    let mut controller = SceneController::new(params, app.config.scene_drag, &mut renderer);

    let mut remote = Vec::new();
    match &args.front_image {
        Some(path) => renderer.set_front_texture(Some(load_upload(path, Some(&app.config.preprocess))?)),
        None => {
            let front_url = ar
                .flat
                .as_ref()
                .and_then(|f| f.front.clone())
                .or_else(|| app.product.as_ref().and_then(|p| p.image_url.clone()));
            remote.extend(front_url.map(|url| (Texture::Front, url)));
        }
    }
    match &args.temple_image {
        Some(path) => renderer.set_temple_texture(Some(load_upload(path, Some(&app.config.preprocess))?)),
        None => remote.extend(ar.temple_url.clone().map(|url| (Texture::Temple, url))),
    }

    let (tx, rx) = mpsc::channel();
    for (kind, url) in remote {
        let fetcher = app.fetcher.clone();
        let tx = tx.clone();
        app.runtime.spawn(async move {
            let result = fetcher.fetch(&url).await.map(|img| Arc::new(img.into_rgba8()));
            let _ = tx.send((kind, url, result));
        });
    }

    let mut window = WindowOutput::new(&title(args.mode, false), camera.width() as usize, camera.height() as usize)?;
    let tracker = PoseTracker3D::new(app.config.scene.camera, app.config.tracking.pose3d);
    let mut session = Session::new(camera, landmarker, tracker, renderer, app.mirrored);
    info!("Controls: drag to move, drag temple ends to open, right-drag temples (shift: depth), wheel zoom, [=]/[-] scale, [Z] undo, [R] reset, [S] save template, [P] save product");

    let mut edges = PointerEdges::default();
    let mut tracking = false;
    let stop = StopSignal::new();
    let summary = session.run(&stop, |renderer, outcome| {
        while let Ok((kind, url, result)) = rx.try_recv() {
            match (kind, result) {
                (Texture::Front, Ok(img)) => renderer.set_front_texture(Some(img)),
                (Texture::Temple, Ok(img)) => renderer.set_temple_texture(Some(img)),
                (_, Err(e)) => warn!(url = %url, error = %e, "texture unavailable"),
            }
        }
        let found = outcome.is_some_and(|o| o.face_found);
        if found != tracking {
            tracking = found;
            window.set_title(&title(args.mode, tracking));
        }

        for key in window.pressed_keys() {
            match key {
                Key::Equal => controller.set_param(renderer, ParamKey::Scale, controller.params().scale + 0.02),
                Key::Minus => controller.set_param(renderer, ParamKey::Scale, controller.params().scale - 0.02),
                Key::Z => {
                    if !controller.undo(renderer) {
                        info!("nothing to undo");
                    }
                }
                Key::R => controller.reset(renderer),
                Key::S => match app.templates.save_scene(controller.params()) {
                    Ok(()) => info!("scene template saved"),
                    Err(e) => warn!(error = %e, "saving scene template failed"),
                },
                Key::P => {
                    let scene: SceneParams = *controller.params();
                    app.save_product(|ar| ar.scene = Some(scene));
                }
                _ => {}
            }
        }

        let (prev, now) = edges.sample(window.pointer());
        let modifier = window.is_key_down(Key::LeftShift) || window.is_key_down(Key::RightShift);
        if let Some((x, y)) = now.pos {
            let at = Vec2::new(x, y);
            if now.left && !prev.left {
                controller.pointer_down(renderer, PointerButton::Left, at, modifier);
            } else if now.right && !prev.right {
                controller.pointer_down(renderer, PointerButton::Right, at, modifier);
            } else if now.left || now.right {
                controller.pointer_move(renderer, at);
            }
        }
        if (prev.left && !now.left) || (prev.right && !now.right) {
            controller.pointer_up();
        }
        if now.wheel != 0.0 {
            controller.wheel(renderer, now.wheel.signum());
        }

        if let Err(e) = window.present(renderer.surface()) {
            warn!(error = %e, "present failed");
        }
        if window.is_open() {
            ControlFlow::Continue(())
        } else {
            ControlFlow::Break(())
        }
    });
    session.close();
    info!(frames = summary.frames, errors = summary.errors, "session finished");
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.list {
        return print_cameras();
    }

    let config = AppConfig::load(&args.config).context("Failed to load configuration")?;
    init_tracing(&config.logging);
    info!(path = %args.config.display(), mode = ?args.mode, "configuration ready");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    let catalog_dir = args.catalog.clone().unwrap_or_else(|| config.paths.catalog_dir.clone());
    let catalog = JsonCatalog::open(&catalog_dir).context("Failed to open catalog")?;
    let product = match args.product.as_deref() {
        Some(id) => match catalog.load(id) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(id, error = %e, "product not found, starting from defaults");
                None
            }
        },
        None => None,
    };

    let mut landmarker = {
        let options = config.tracking.landmarker.clone();
        LazyLandmarker::new("face mesh", move || FaceMeshLandmarker::new(options))
    };
    landmarker.preload();

    let camera = match CameraSource::new(args.cam_index) {
        Ok(camera) => camera,
        Err(e) => {
            error!(error = %e, index = args.cam_index, "camera unavailable");
            return show_status("could not start camera");
        }
    };
    if let Some(name) = camera.name() {
        println!("{}", format!("Opened camera: {name}").green());
    }

    let app = App {
        mirrored: args.mirror.unwrap_or(config.tracking.mirror),
        templates: TemplateStore::new(&config.paths.data_dir),
        config,
        catalog,
        product,
        runtime,
        fetcher: HttpImageFetcher::new(),
    };

    match args.mode {
        Mode::TryOn | Mode::Editor => run_2d(&app, &args, camera, landmarker),
        Mode::Mesh => run_3d(&app, &args, camera, landmarker),
    }
}
