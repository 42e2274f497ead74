//! Error scenario integration tests
//!
//! All of these fail before any audio device is touched.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn voice_survey(config_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("voice-survey").expect("binary built");
    cmd.env("VOICE_SURVEY_CONFIG", config_dir.path().join("config.toml"))
        .env_remove("OPENAI_API_KEY")
        .env_remove("OPENAI_BASE_URL");
    cmd
}

#[test]
fn say_without_api_key() {
    let dir = TempDir::new().unwrap();
    voice_survey(&dir)
        .args(["say", "hello"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("OPENAI_API_KEY"));
}

#[test]
fn transcribe_without_api_key() {
    let dir = TempDir::new().unwrap();
    voice_survey(&dir)
        .arg("transcribe")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Missing API key"));
}

#[test]
fn invalid_silence_flag_is_usage_error() {
    let dir = TempDir::new().unwrap();
    voice_survey(&dir)
        .args(["--silence", "soon", "record"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("audio.silence"));
}

#[test]
fn threshold_out_of_range_is_usage_error() {
    let dir = TempDir::new().unwrap();
    voice_survey(&dir)
        .args(["--threshold", "2.5", "record"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("volume_threshold"));
}

#[test]
fn broken_config_file_is_reported() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("config.toml"), "[audio\nsilence = ").unwrap();
    voice_survey(&dir)
        .args(["say", "hello"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("parse"));
}

#[test]
fn config_get_unknown_key() {
    let dir = TempDir::new().unwrap();
    voice_survey(&dir)
        .args(["config", "get", "unknown_key"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Unknown key"));
}

#[test]
fn config_set_invalid_duration() {
    let dir = TempDir::new().unwrap();
    voice_survey(&dir)
        .args(["config", "set", "audio.max_duration", "forever"])
        .assert()
        .code(2);
    assert!(!dir.path().join("config.toml").exists());
}

#[test]
fn config_set_rejects_inverted_gains() {
    let dir = TempDir::new().unwrap();
    voice_survey(&dir)
        .args(["config", "set", "audio.background_gain", "3.0"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("background_gain"));
}

#[test]
fn play_missing_file() {
    let dir = TempDir::new().unwrap();
    voice_survey(&dir)
        .args(["play", "/nonexistent/prompt.wav"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to read"));
}
