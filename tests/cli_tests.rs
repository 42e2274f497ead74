//! CLI integration tests
//!
//! Every test points the binary at a temporary config file so the user's
//! own configuration never leaks in.

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
fn help_lists_commands_and_flags() {
    let dir = TempDir::new().unwrap();
    voice_survey(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("record"))
        .stdout(predicate::str::contains("listen"))
        .stdout(predicate::str::contains("say"))
        .stdout(predicate::str::contains("--threshold"))
        .stdout(predicate::str::contains("--max-duration"));
}

#[test]
fn version_output() {
    let dir = TempDir::new().unwrap();
    voice_survey(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn missing_subcommand_is_usage_error() {
    let dir = TempDir::new().unwrap();
    voice_survey(&dir).assert().code(2);
}

#[test]
fn config_path_honours_override() {
    let dir = TempDir::new().unwrap();
    voice_survey(&dir)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains(dir.path().to_string_lossy().as_ref()))
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn config_init_then_list() {
    let dir = TempDir::new().unwrap();
    voice_survey(&dir).args(["config", "init"]).assert().success();
    assert!(dir.path().join("config.toml").exists());

    voice_survey(&dir)
        .args(["config", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("speech.voice: onyx"))
        .stdout(predicate::str::contains("audio.silence: 2s"))
        .stdout(predicate::str::contains("speech.transcription_models: gpt-4o-transcribe,whisper-1"));
}

#[test]
fn config_init_twice_fails() {
    let dir = TempDir::new().unwrap();
    voice_survey(&dir).args(["config", "init"]).assert().success();
    voice_survey(&dir)
        .args(["config", "init"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn config_set_and_get() {
    let dir = TempDir::new().unwrap();
    voice_survey(&dir)
        .args(["config", "set", "audio.silence", "1500ms"])
        .assert()
        .success();
    voice_survey(&dir)
        .args(["config", "get", "audio.silence"])
        .assert()
        .success()
        .stdout("1500ms\n");
}

#[test]
fn config_get_unset_key() {
    let dir = TempDir::new().unwrap();
    voice_survey(&dir)
        .args(["config", "get", "speech.voice"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(not set)"));
}

#[test]
fn config_api_key_is_masked() {
    let dir = TempDir::new().unwrap();
    voice_survey(&dir)
        .args(["config", "set", "api_key", "sk-abcdefghijklmnop"])
        .assert()
        .success();
    voice_survey(&dir)
        .args(["config", "get", "api_key"])
        .assert()
        .success()
        .stdout(predicate::str::contains("sk-a...mnop"))
        .stdout(predicate::str::contains("efgh").not());
}
