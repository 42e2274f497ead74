//! Config command handler

use std::str::FromStr;

use crate::application::ports::ConfigStore;
use crate::domain::config::{AppConfig, AudioSection, SpeechSection};
use crate::domain::error::ConfigError;
use crate::domain::recording::Duration;

use super::args::{is_valid_config_key, ConfigAction, VALID_CONFIG_KEYS};
use super::presenter::Presenter;

const NOT_SET: &str = "(not set)";

/// Handle config subcommand
pub async fn handle_config_command<S: ConfigStore + ?Sized>(
    action: ConfigAction,
    store: &S,
    presenter: &Presenter,
) -> Result<(), ConfigError> {
    match action {
        ConfigAction::Init => handle_init(store, presenter).await,
        ConfigAction::Set { key, value } => handle_set(store, presenter, &key, &value).await,
        ConfigAction::Get { key } => handle_get(store, presenter, &key).await,
        ConfigAction::List => handle_list(store, presenter).await,
        ConfigAction::Path => {
            presenter.output(&store.path().to_string_lossy());
            Ok(())
        }
    }
}

async fn handle_init<S: ConfigStore + ?Sized>(store: &S, presenter: &Presenter) -> Result<(), ConfigError> {
    store.init().await?;
    presenter.success(&format!("Config file created at: {}", store.path().display()));
    Ok(())
}

async fn handle_set<S: ConfigStore + ?Sized>(
    store: &S,
    presenter: &Presenter,
    key: &str,
    value: &str,
) -> Result<(), ConfigError> {
    check_key(key)?;

    let mut config = store.load().await?;
    set_value(&mut config, key, value)?;

    // Reject combinations the audio pipeline would refuse at startup
    if key.starts_with("audio.") {
        AppConfig::defaults().merge(config.clone()).to_audio_config()?;
    }

    store.save(&config).await?;
    presenter.success(&format!("{} = {}", key, value));
    Ok(())
}

async fn handle_get<S: ConfigStore + ?Sized>(
    store: &S,
    presenter: &Presenter,
    key: &str,
) -> Result<(), ConfigError> {
    check_key(key)?;

    let config = store.load().await?;
    presenter.output(get_value(&config, key).as_deref().unwrap_or(NOT_SET));
    Ok(())
}

async fn handle_list<S: ConfigStore + ?Sized>(store: &S, presenter: &Presenter) -> Result<(), ConfigError> {
    let config = store.load().await?;
    for key in VALID_CONFIG_KEYS {
        presenter.key_value(key, get_value(&config, key).as_deref().unwrap_or(NOT_SET));
    }
    Ok(())
}

fn check_key(key: &str) -> Result<(), ConfigError> {
    if is_valid_config_key(key) {
        return Ok(());
    }
    Err(ConfigError::ValidationError {
        key: key.to_string(),
        message: format!("Unknown key. Valid keys: {}", VALID_CONFIG_KEYS.join(", ")),
    })
}

/// Parse and store one value, leaving `config` untouched on error
fn set_value(config: &mut AppConfig, key: &str, value: &str) -> Result<(), ConfigError> {
    match key.split_once('.') {
        None => match key {
            "api_key" => config.api_key = Some(value.to_string()),
            "base_url" => {
                if !(value.starts_with("http://") || value.starts_with("https://")) {
                    return Err(invalid(key, "Value must be an http(s) URL"));
                }
                config.base_url = Some(value.trim_end_matches('/').to_string());
            }
            _ => return Err(invalid(key, "Unknown key")),
        },
        Some(("audio", field)) => {
            let mut audio = config.audio.clone().unwrap_or_default();
            set_audio(&mut audio, key, field, value)?;
            config.audio = Some(audio);
        }
        Some(("speech", field)) => {
            let mut speech = config.speech.clone().unwrap_or_default();
            set_speech(&mut speech, key, field, value)?;
            config.speech = Some(speech);
        }
        Some(_) => return Err(invalid(key, "Unknown key")),
    }
    Ok(())
}

fn set_audio(audio: &mut AudioSection, key: &str, field: &str, value: &str) -> Result<(), ConfigError> {
    match field {
        "sample_rate" => audio.sample_rate = Some(parse(key, value)?),
        "channels" => audio.channels = Some(parse(key, value)?),
        "block_size" => audio.block_size = Some(parse(key, value)?),
        "device" => audio.device = Some(value.to_string()),
        "volume_threshold" => audio.volume_threshold = Some(parse(key, value)?),
        "min_speech" => audio.min_speech = Some(duration(key, value)?),
        "silence" => audio.silence = Some(duration(key, value)?),
        "patience" => audio.patience = Some(duration(key, value)?),
        "max_duration" => audio.max_duration = Some(duration(key, value)?),
        "speech_gain" => audio.speech_gain = Some(parse(key, value)?),
        "background_gain" => audio.background_gain = Some(parse(key, value)?),
        "headroom" => audio.headroom = Some(parse(key, value)?),
        "high_pass_hz" => audio.high_pass_hz = Some(parse(key, value)?),
        _ => return Err(invalid(key, "Unknown key")),
    }
    Ok(())
}

fn set_speech(speech: &mut SpeechSection, key: &str, field: &str, value: &str) -> Result<(), ConfigError> {
    match field {
        "transcription_models" => speech.transcription_models = Some(model_list(key, value)?),
        "synthesis_models" => speech.synthesis_models = Some(model_list(key, value)?),
        "voice" => speech.voice = Some(value.to_string()),
        "language" => speech.language = Some(value.to_string()),
        "speed" => speech.speed = Some(parse(key, value)?),
        "temperature" => speech.temperature = Some(parse(key, value)?),
        _ => return Err(invalid(key, "Unknown key")),
    }
    Ok(())
}

fn get_value(config: &AppConfig, key: &str) -> Option<String> {
    let audio = config.audio.as_ref();
    let speech = config.speech.as_ref();
    match key {
        "api_key" => config.api_key.as_deref().map(mask_api_key),
        "base_url" => config.base_url.clone(),
        "audio.sample_rate" => audio?.sample_rate.map(|v| v.to_string()),
        "audio.channels" => audio?.channels.map(|v| v.to_string()),
        "audio.block_size" => audio?.block_size.map(|v| v.to_string()),
        "audio.device" => audio?.device.clone(),
        "audio.volume_threshold" => audio?.volume_threshold.map(|v| v.to_string()),
        "audio.min_speech" => audio?.min_speech.clone(),
        "audio.silence" => audio?.silence.clone(),
        "audio.patience" => audio?.patience.clone(),
        "audio.max_duration" => audio?.max_duration.clone(),
        "audio.speech_gain" => audio?.speech_gain.map(|v| v.to_string()),
        "audio.background_gain" => audio?.background_gain.map(|v| v.to_string()),
        "audio.headroom" => audio?.headroom.map(|v| v.to_string()),
        "audio.high_pass_hz" => audio?.high_pass_hz.map(|v| v.to_string()),
        "speech.transcription_models" => speech?.transcription_models.as_ref().map(|m| m.join(",")),
        "speech.synthesis_models" => speech?.synthesis_models.as_ref().map(|m| m.join(",")),
        "speech.voice" => speech?.voice.clone(),
        "speech.language" => speech?.language.clone(),
        "speech.speed" => speech?.speed.map(|v| v.to_string()),
        "speech.temperature" => speech?.temperature.map(|v| v.to_string()),
        _ => None,
    }
}

fn invalid(key: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        key: key.to_string(),
        message: message.into(),
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| invalid(key, format!("Invalid value '{}': {}", value, e)))
}

/// Validate a duration and store its canonical form
fn duration(key: &str, value: &str) -> Result<String, ConfigError> {
    value
        .parse::<Duration>()
        .map(|d| d.to_string())
        .map_err(|e| invalid(key, e.to_string()))
}

/// Comma-separated, priority order
fn model_list(key: &str, value: &str) -> Result<Vec<String>, ConfigError> {
    let models: Vec<String> = value
        .split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect();
    if models.is_empty() {
        return Err(invalid(key, "At least one model is required"));
    }
    Ok(models)
}

/// Mask API key for display (show first 4 and last 4 chars)
fn mask_api_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        "*".repeat(chars.len())
    } else {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    }
}
