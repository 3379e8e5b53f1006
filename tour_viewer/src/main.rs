use anyhow::{Context, Result};
use clap::Parser;
use glam::{Quat, Vec3};
use tour_backend::{Backend, FixtureBackend, RestBackend};
use tour_viewer::{
    SceneLoader, TourDriver,
    audio::{AudioSync, HeadlessMediaGraph},
    cli::{Args, TourConfig, load_tour_config},
    scene::normalize_angle,
    tour::{FrameInput, XrFrame},
    visit_log::VisitLog,
    xr::{SimulatedHeadset, XrPhase},
};

/// Frame step of the headless loop.
const FRAME_DT: f32 = 1.0 / 60.0;
/// Upper bound on frames spent settling one transition.
const SETTLE_FRAMES: usize = 10_000;
/// Standing height reported by the simulated headset before correction.
const SIMULATED_HEAD_HEIGHT: f32 = 1.75;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::init();

    args.validate()?;
    let config = match args.config.as_deref() {
        Some(path) => load_tour_config(path)?,
        None => TourConfig::default(),
    };

    if let Some(path) = args.fixture.as_deref() {
        let backend = FixtureBackend::from_path(path)
            .with_context(|| format!("loading tour fixture {}", path.display()))?;
        run(backend, &args, &config).await
    } else {
        let url = args.backend_url.clone().unwrap_or_default();
        let key = args.api_key.clone().unwrap_or_default();
        run(RestBackend::new(url, key), &args, &config).await
    }
}

async fn run<B: Backend + 'static>(backend: B, args: &Args, config: &TourConfig) -> Result<()> {
    let loader = SceneLoader::new(backend).with_batch_size(config.prefetch_batch());
    let mut driver = TourDriver::boot(loader, args.start_scene, config.settings())
        .await
        .context("starting tour")?;

    let audio = AudioSync::connect(
        Box::new(HeadlessMediaGraph::default()),
        args.audio_video_id.as_deref(),
        args.audio_fallback.as_deref(),
    );
    println!(
        "[tour_viewer] audio backend: {}",
        audio.backend_kind().unwrap_or("<none>")
    );
    driver.tour_mut().attach_audio(audio);
    if let Some(path) = args.visit_log.as_ref() {
        driver.tour_mut().attach_visit_log(VisitLog::open(path));
    }
    report_scene(&driver);

    // Frames below advance the walk and the panorama sweep between them.
    driver.start_prefetch();

    if args.xr {
        simulate_xr_session(&mut driver).await;
    }

    for &hotspot in &args.route {
        let from = driver.tour().current_scene_id();
        if !driver.click_hotspot(hotspot, FRAME_DT).await {
            println!("[tour_viewer] hotspot {hotspot} is not in scene {from}; skipping");
            continue;
        }
        if !driver.settle(FRAME_DT, SETTLE_FRAMES).await {
            println!("[tour_viewer] transition from scene {from} did not settle");
            continue;
        }
        if driver.tour().current_scene_id() == from {
            println!("[tour_viewer] hotspot {hotspot} did not leave scene {from}");
        } else {
            report_scene(&driver);
        }
    }

    let sweep = driver.finish_prefetch().await;
    println!(
        "[tour_viewer] prefetched {} scene(s); {} panorama(s) warmed, {} failed",
        driver.tour().context().scenes.len(),
        sweep.fetched,
        sweep.failed.len()
    );

    let history: Vec<String> = driver
        .tour()
        .history()
        .iter()
        .map(|id| id.to_string())
        .collect();
    println!("[tour_viewer] visited {}", history.join(" -> "));
    Ok(())
}

fn report_scene<B: Backend + 'static>(driver: &TourDriver<B>) {
    let tour = driver.tour();
    let (yaw, pitch, _) = tour.rig().camera.euler();
    println!(
        "[tour_viewer] scene {} yaw={:.1} pitch={:.1} hotspots={} panorama={}",
        tour.current_scene_id(),
        normalize_angle(yaw).to_degrees(),
        pitch.to_degrees(),
        tour.current_scene().hotspots.len(),
        if tour.node().panorama.texture.is_some() {
            "ready"
        } else {
            "missing"
        }
    );
}

/// Enter XR with no controllers, wait out discovery, then leave.
async fn simulate_xr_session<B: Backend + 'static>(driver: &mut TourDriver<B>) {
    let now = driver.clock();
    driver
        .tour_mut()
        .on_session_start(&mut SimulatedHeadset::default(), now);

    let frame = XrFrame {
        head_position: Vec3::new(0.0, SIMULATED_HEAD_HEIGHT, 0.0),
        head_rotation: Quat::IDENTITY,
        ..XrFrame::default()
    };
    for _ in 0..SETTLE_FRAMES {
        if driver.tour().xr().phase() != XrPhase::DiscoveringControllers {
            break;
        }
        driver
            .run_frame(FrameInput {
                dt: 0.1,
                xr: Some(frame.clone()),
                ..FrameInput::default()
            })
            .await;
    }

    let tour = driver.tour();
    let xr = tour.xr();
    println!(
        "[tour_viewer] xr session: {:?} after {} attempt(s), eye height {:.2} m",
        xr.phase(),
        xr.attempts(),
        tour.rig().camera.position.y
    );
    driver.tour_mut().on_session_end();
}
