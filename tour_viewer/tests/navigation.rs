use std::time::Duration;

use anyhow::{Context, Result};
use glam::{Quat, Vec2, Vec3};
use image::{ColorType, ImageEncoder, RgbaImage, codecs::png::PngEncoder};
use tour_backend::{FixtureBackend, HotspotRecord, SceneRecord, TourFixture};
use tour_viewer::{
    SceneLoader, TourDriver, TourSettings,
    interaction::ControllerFrame,
    scene::normalize_angle,
    tour::{FrameInput, PointerEvent, XrFrame},
    xr::{InputSource, SimulatedHeadset, XrPhase},
};

const DT: f32 = 1.0 / 60.0;

fn png() -> Result<Vec<u8>> {
    let image = RgbaImage::from_pixel(8, 4, image::Rgba([40, 90, 160, 255]));
    let mut bytes = Vec::new();
    PngEncoder::new(&mut bytes)
        .write_image(image.as_raw(), 8, 4, ColorType::Rgba8)
        .context("encoding test panorama")?;
    Ok(bytes)
}

fn scene(id: i64, yaw: f64) -> SceneRecord {
    SceneRecord {
        id,
        panorama_url: format!("p{id}.png"),
        yaw,
        pitch: 0.0,
        roll: 0.0,
        height: None,
    }
}

fn hotspot(id: i64, scene_id: i64, target: i64, position: [f64; 3], yaw: Option<f64>) -> HotspotRecord {
    HotspotRecord {
        id,
        scene_id,
        label: format!("Door {id}"),
        x: Some(position[0]),
        y: Some(position[1]),
        z: Some(position[2]),
        yaw,
        pitch: None,
        roll: None,
        target_scene_id: Some(target),
    }
}

/// 28 ↔ 31 ↔ 40, with the 28 → 31 hotspot carrying an entry yaw of 250°.
fn backend() -> Result<FixtureBackend> {
    let fixture = TourFixture {
        scenes: vec![scene(28, 30.0), scene(31, 90.0), scene(40, 180.0)],
        hotspots: vec![
            hotspot(1, 28, 31, [0.0, 0.0, -5.0], Some(250.0)),
            hotspot(2, 31, 28, [5.0, 0.0, 0.0], None),
            hotspot(3, 31, 40, [-5.0, 0.0, 0.0], None),
            hotspot(4, 40, 31, [0.0, 0.0, 5.0], None),
        ],
    };
    let mut backend = FixtureBackend::new(fixture);
    for url in ["p28.png", "p31.png", "p40.png"] {
        backend = backend.with_asset(url, png()?);
    }
    Ok(backend)
}

async fn boot() -> Result<TourDriver<FixtureBackend>> {
    TourDriver::boot(SceneLoader::new(backend()?), 28, TourSettings::default())
        .await
        .context("booting tour at scene 28")
}

fn yaw_degrees(driver: &TourDriver<FixtureBackend>) -> f32 {
    normalize_angle(driver.tour().rig().camera.euler().0).to_degrees()
}

#[tokio::test]
async fn clicking_hotspot_enters_target_facing_hotspot_yaw() -> Result<()> {
    let mut driver = boot().await?;
    assert!((yaw_degrees(&driver) - 30.0).abs() < 1e-3);

    let sweep = driver.prefetch().await;
    assert!(sweep.failed.is_empty());
    assert_eq!(driver.loader().backend().scene_fetches(28), 1);
    assert_eq!(driver.loader().backend().scene_fetches(31), 1);
    assert_eq!(driver.loader().backend().scene_fetches(40), 1);

    assert!(driver.click_hotspot(1, DT).await);
    assert!(driver.settle(DT, 1_000).await);

    assert_eq!(driver.tour().current_scene_id(), 31);
    let yaw = yaw_degrees(&driver);
    assert!((yaw - 250.0).abs() < 1e-2, "yaw {yaw} should follow the hotspot");
    assert!((yaw - 90.0).abs() > 1.0);
    assert_eq!(driver.tour().history(), &[28, 31]);
    Ok(())
}

#[tokio::test]
async fn old_scene_stays_current_until_screen_is_black() -> Result<()> {
    let mut driver = boot().await?;
    driver.prefetch().await;
    assert!(driver.click_hotspot(1, DT).await);

    let mut previous = driver.tour().fade().opacity();
    while driver.tour().current_scene_id() == 28 {
        assert!(driver.tour().fade().opacity() >= previous);
        previous = driver.tour().fade().opacity();
        driver.run_frame(FrameInput::idle(DT)).await;
    }
    // The swap happens on the frame that reaches full opacity.
    assert_eq!(driver.tour().fade().opacity(), 1.0);

    assert!(driver.settle(DT, 1_000).await);
    assert_eq!(driver.tour().fade().opacity(), 0.0);
    Ok(())
}

#[tokio::test]
async fn hovering_a_hotspot_shows_its_label() -> Result<()> {
    let mut driver = boot().await?;
    assert!(driver.tour_mut().aim_at_hotspot(1));
    driver
        .run_frame(FrameInput {
            dt: DT,
            pointer: vec![PointerEvent::Move(Vec2::ZERO)],
            ..FrameInput::default()
        })
        .await;

    let label = driver.tour().label();
    assert_eq!(label.hotspot(), Some(1));
    let canvas = label.canvas().context("label canvas")?;
    assert_eq!(canvas.lines, vec!["Door 1".to_string()]);

    // The pointer stays put, so the label is redrawn on every frame.
    let before = label.redraws();
    for _ in 0..4 {
        driver.run_frame(FrameInput::idle(DT)).await;
    }
    let tour = driver.tour();
    let label = tour.label();
    assert_eq!(label.redraws(), before + 4);
    let facing = label.rotation * Vec3::Z;
    let to_camera = (tour.rig().camera.position - label.position).normalize();
    assert!(
        (facing - to_camera).length() < 1e-4,
        "label faces {facing}, camera is towards {to_camera}"
    );

    driver
        .run_frame(FrameInput {
            dt: DT,
            pointer: vec![PointerEvent::Move(Vec2::new(1.0, 1.0))],
            ..FrameInput::default()
        })
        .await;
    assert!(!driver.tour().label().visible());
    Ok(())
}

#[tokio::test]
async fn controller_trigger_navigates_inside_xr() -> Result<()> {
    let mut driver = boot().await?;
    driver.prefetch().await;
    driver.tour_mut().on_session_start(
        &mut SimulatedHeadset {
            floor_supported: true,
        },
        Duration::ZERO,
    );

    let tour = driver.tour();
    let target = tour
        .rig()
        .root
        .to_world(tour.node().billboard(1).context("hotspot 1 billboard")?.position);
    let controller = ControllerFrame {
        index: 0,
        position: Vec3::ZERO,
        rotation: Quat::from_rotation_arc(Vec3::NEG_Z, target.normalize()),
        trigger_pressed: Some(true),
    };
    let frame = XrFrame {
        head_position: Vec3::new(0.0, 1.6, 0.0),
        head_rotation: Quat::IDENTITY,
        input_sources: vec![InputSource {
            index: 0,
            has_gamepad: true,
        }],
        controllers: vec![controller],
        events: Vec::new(),
    };

    driver
        .run_frame(FrameInput {
            dt: DT,
            xr: Some(frame),
            ..FrameInput::default()
        })
        .await;
    assert_eq!(driver.tour().xr().bound_controllers(), &[0]);
    assert_eq!(driver.tour().xr().phase(), XrPhase::DiscoveringControllers);
    let laser = driver.tour().interaction().controllers()[0].laser_length;
    assert!(laser < 5.0, "laser should stop at the billboard, got {laser}");

    assert!(driver.settle(DT, 1_000).await);
    assert_eq!(driver.tour().current_scene_id(), 31);
    // The headset keeps its pose; the world turns to the entry yaw instead.
    assert_eq!(driver.tour().rig().camera.rotation, Quat::IDENTITY);
    let expected = Quat::from_rotation_y(-250.0_f32.to_radians());
    assert!(driver.tour().rig().root.rotation.angle_between(expected) < 1e-3);
    Ok(())
}
