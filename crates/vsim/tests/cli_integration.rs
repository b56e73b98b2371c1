//! Integration tests for the vera-vsim CLI.

use std::fs::{self, File};
use std::path::PathBuf;
use std::process::Command;

use ctrlc as _;
use env_filter as _;
use hound as _;
use log as _;
#[cfg(feature = "window")]
use minifb as _;
use thiserror as _;
use vsim_core as _;

fn binary_path() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop();
    path.pop();
    path.join("vera-vsim")
}

#[test]
fn help_exits_cleanly() {
    let output = Command::new(binary_path())
        .arg("--help")
        .output()
        .expect("failed to run vera-vsim");

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Usage: vera-vsim"));
}

#[test]
fn unknown_option_fails() {
    let output = Command::new(binary_path())
        .arg("--bogus")
        .output()
        .expect("failed to run vera-vsim");

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown option: --bogus"));
}

#[test]
fn missing_replay_file_is_fatal() {
    let temp_dir = tempfile::tempdir().unwrap();
    let logdir = temp_dir.path().join("logs");
    let capture = temp_dir.path().join("absent.csv");

    let output = Command::new(binary_path())
        .args(["-n", "--logdir", logdir.to_str().unwrap(), "-c", capture.to_str().unwrap()])
        .output()
        .expect("failed to run vera-vsim");

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("absent.csv"));
    let log = fs::read_to_string(logdir.join("vera_vsim.log")).unwrap();
    assert!(log.contains("cannot read replay file"));
}

#[test]
fn headless_run_logs_frames_and_summary() {
    let temp_dir = tempfile::tempdir().unwrap();
    let logdir = temp_dir.path().join("logs");

    let output = Command::new(binary_path())
        .args(["-n", "--frames", "1", "--logdir", logdir.to_str().unwrap()])
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run vera-vsim");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Simulation ended after 1 frames"));
    // frame statistics go to the log file only
    assert!(!stdout.contains("Frame   0"));

    let log = fs::read_to_string(logdir.join("vera_vsim.log")).unwrap();
    assert!(log.contains("Frame   0, 420000 pixel-clocks"));
    assert!(log.contains("800x525 hsync 96, vsync 2"));
    assert!(log.contains("Simulation ended after 1 frames"));
    assert!(!logdir.join("vera_vsim_640x480_f00.png").exists());
}

#[test]
fn rendered_run_writes_full_raster_screenshot() {
    let temp_dir = tempfile::tempdir().unwrap();
    let logdir = temp_dir.path().join("logs");

    let status = Command::new(binary_path())
        .args(["--frames", "1", "--logdir", logdir.to_str().unwrap()])
        .status()
        .expect("failed to run vera-vsim");

    assert!(status.success());
    let screenshot = logdir.join("vera_vsim_640x480_f00.png");
    let decoder = png::Decoder::new(File::open(&screenshot).unwrap());
    let reader = decoder.read_info().unwrap();
    let info = reader.info();
    assert_eq!((info.width, info.height), (800, 525));
    assert_eq!(info.color_type, png::ColorType::Rgb);
}

#[test]
fn video_log_replay_runs_to_done() {
    let temp_dir = tempfile::tempdir().unwrap();
    let logdir = temp_dir.path().join("logs");
    let video_log = temp_dir.path().join("video.log");
    fs::write(&video_log, "0 0x9F22 0x10\n100 0x9F23 0x0F\n200 $03 $0A\n").unwrap();

    let output = Command::new(binary_path())
        .args([
            "-n",
            "--frames",
            "0",
            "--logdir",
            logdir.to_str().unwrap(),
            "-l",
            video_log.to_str().unwrap(),
        ])
        .output()
        .expect("failed to run vera-vsim");

    assert!(output.status.success());
    let log = fs::read_to_string(logdir.join("vera_vsim.log")).unwrap();
    assert!(log.contains("replaying 3 register writes"));
    assert!(log.contains("bus: 3 writes, 0 reads"));
    assert!(log.contains("bus program done"));
}
