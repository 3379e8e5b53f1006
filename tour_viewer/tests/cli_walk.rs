use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use anyhow::{Context, Result};
use image::{Rgba, RgbaImage};
use tempfile::tempdir;

const FIXTURE: &str = r#"{
  "scenes": [
    {"id": 28, "panorama_url": "p28.png", "yaw": 30},
    {"id": 31, "image_url": "p31.png", "yaw": 90},
    {"id": 40, "panorama_url": "p40.png", "yaw": 180}
  ],
  "hotspots": [
    {"id": 1, "scene_id": 28, "label": "Hall", "x": 0, "y": 0, "z": -5, "yaw": 250, "target_scene_id": 31},
    {"id": 2, "scene_id": 31, "label": "Lobby", "x": 5, "y": 0, "z": 0, "target_scene_id": 28},
    {"id": 3, "scene_id": 31, "label": "Stairs", "x": -5, "y": 0, "z": 0, "target_scene_id": 40},
    {"id": 4, "scene_id": 40, "label": "Back", "x": 0, "y": 0, "z": 5, "target_scene_id": 31}
  ]
}"#;

/// Writes the fixture and its panoramas; `p40.png` is left out.
fn write_tour(dir: &Path) -> Result<()> {
    fs::write(dir.join("tour.json"), FIXTURE).context("writing fixture")?;
    for name in ["p28.png", "p31.png"] {
        RgbaImage::from_pixel(8, 4, Rgba([200, 120, 40, 255]))
            .save(dir.join(name))
            .with_context(|| format!("writing {name}"))?;
    }
    Ok(())
}

fn run_viewer(dir: &Path, extra: &[&str]) -> Result<Output> {
    let fixture = dir.join("tour.json");
    let fixture = fixture.to_str().context("fixture path is not valid UTF-8")?;
    Command::new(env!("CARGO_BIN_EXE_tour_viewer"))
        .args(["--fixture", fixture])
        .args(extra)
        .env_remove("TOUR_API_KEY")
        .output()
        .context("executing tour_viewer")
}

#[test]
fn route_walk_reports_entry_yaw_and_logs_visits() -> Result<()> {
    let temp_dir = tempdir().context("creating temporary tour directory")?;
    write_tour(temp_dir.path())?;
    let visit_log = temp_dir.path().join("visits.json");
    let visit_log_str = visit_log.to_str().context("visit log path is not valid UTF-8")?;

    let output = run_viewer(
        temp_dir.path(),
        &["--route", "1,3,99", "--visit-log", visit_log_str],
    )?;
    assert!(
        output.status.success(),
        "tour_viewer exited with {:?}: {}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("[tour_viewer] scene 28 yaw=30.0"),
        "start scene line missing: {stdout}"
    );
    assert!(
        stdout.contains("[tour_viewer] scene 31 yaw=250.0"),
        "scene 31 should face the hotspot's yaw: {stdout}"
    );
    // Hotspot 3 stores no yaw, so its position (-5, 0, 0) sets the facing.
    assert!(
        stdout.contains("scene 40 yaw=270.0") && stdout.contains("panorama=missing"),
        "scene 40 should open without its panorama: {stdout}"
    );
    assert!(
        stdout.contains("hotspot 99 is not in scene 40"),
        "unknown hotspot should be skipped: {stdout}"
    );
    assert!(stdout.contains("[tour_viewer] visited 28 -> 31 -> 40"));

    let visits: Vec<i64> = serde_json::from_str(&fs::read_to_string(&visit_log)?)?;
    assert_eq!(visits, vec![28, 31, 40]);
    Ok(())
}

#[test]
fn missing_start_scene_fails_startup() -> Result<()> {
    let temp_dir = tempdir().context("creating temporary tour directory")?;
    write_tour(temp_dir.path())?;

    let output = run_viewer(temp_dir.path(), &["--start-scene", "77"])?;
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("loading start scene 77"),
        "startup error should name the scene: {stderr}"
    );
    Ok(())
}

#[test]
fn simulated_xr_session_falls_back_to_head_look() -> Result<()> {
    let temp_dir = tempdir().context("creating temporary tour directory")?;
    write_tour(temp_dir.path())?;
    let config = temp_dir.path().join("config.json");
    fs::write(&config, r#"{"controller_attempts": 5, "controller_interval_ms": 200}"#)?;
    let config_str = config.to_str().context("config path is not valid UTF-8")?;

    let output = run_viewer(temp_dir.path(), &["--xr", "--config", config_str])?;
    assert!(output.status.success(), "tour_viewer exited with {:?}", output.status);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("xr session: HeadLookOnly after 5 attempt(s), eye height 1.60 m"),
        "xr summary missing: {stdout}"
    );
    assert!(stdout.contains("audio backend: <none>"));
    Ok(())
}
