//! Command runners
//!
//! Builds the adapters, merges configuration and drives the use cases for
//! each subcommand. Every runner returns a [`CliError`] that maps to an
//! exit code in one place.

use std::env;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tracing::Level;

use crate::application::ports::{
    ConfigStore, DeviceEnumerator, HandlerError, Transcriber, TranscriptionError,
    UtteranceHandler,
};
use crate::application::{
    ContinuousListener, ListenerExit, PlaybackError, PlaybackState, Player, Recording,
    RecordingError, RecordingSession, ShutdownToken,
};
use crate::domain::audio::{AudioConfig, EncodedAudio, PcmDefaults};
use crate::domain::config::AppConfig;
use crate::domain::error::{AudioDeviceError, ConfigError};
use crate::infrastructure::{
    synthesizer_chain, transcriber_chain, CpalInput, RodioOutput, XdgConfigStore,
};

use super::args::{Cli, Commands};
use super::config_cmd::handle_config_command;
use super::presenter::Presenter;
use super::signals;

/// Exit codes
pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_ERROR: u8 = 1;
pub const EXIT_USAGE_ERROR: u8 = 2;

pub const ENV_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_BASE_URL: &str = "OPENAI_BASE_URL";

/// How often the live volume bar is redrawn
const LEVEL_REFRESH: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Device(#[from] AudioDeviceError),

    #[error(transparent)]
    Recording(#[from] RecordingError),

    #[error(transparent)]
    Playback(#[from] PlaybackError),

    #[error(transparent)]
    Transcription(#[from] TranscriptionError),

    #[error("Missing API key. Set OPENAI_API_KEY or run 'voice-survey config set api_key <key>'")]
    MissingApiKey,

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl CliError {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Usage(_) | Self::Config(ConfigError::ValidationError { .. }) => EXIT_USAGE_ERROR,
            _ => EXIT_ERROR,
        }
    }

    fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Install the stderr log subscriber. `-v` repetitions raise the level.
pub fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(verbose >= 2)
        .finish();
    // A subscriber may already be set when embedded in tests
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Settings taken from the environment
pub fn env_config() -> AppConfig {
    let var = |name: &str| env::var(name).ok().filter(|s| !s.trim().is_empty());
    AppConfig {
        api_key: var(ENV_API_KEY),
        base_url: var(ENV_BASE_URL),
        ..Default::default()
    }
}

/// Merge configuration: defaults < file < env < CLI
pub async fn load_merged_config(
    store: &dyn ConfigStore,
    cli_config: AppConfig,
) -> Result<AppConfig, ConfigError> {
    let file_config = store.load().await?;
    Ok(AppConfig::defaults()
        .merge(file_config)
        .merge(env_config())
        .merge(cli_config))
}

fn config_store(cli: &Cli) -> XdgConfigStore {
    XdgConfigStore::locate(cli.config.as_deref())
}

/// Parse-free entry point used by `main`
pub async fn run(cli: Cli) -> ExitCode {
    let mut presenter = Presenter::new();
    match dispatch(cli, &mut presenter).await {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(e) => {
            presenter.stop_spinner();
            presenter.error(&e.to_string());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn dispatch(cli: Cli, presenter: &mut Presenter) -> Result<(), CliError> {
    let store = config_store(&cli);
    let overrides = cli.overrides();

    let command = match cli.command {
        Commands::Config { action } => {
            return Ok(handle_config_command(action, &store, presenter).await?);
        }
        Commands::Devices => return run_devices(presenter).await,
        command => command,
    };

    let config = load_merged_config(&store, overrides).await?;
    let audio = config.to_audio_config()?;
    tracing::debug!(?audio, "audio configuration");

    let token = ShutdownToken::new();
    signals::install(token.clone())
        .map_err(|e| CliError::io("Failed to install signal handler", e))?;

    let ctx = Context {
        config,
        audio,
        token,
    };

    match command {
        Commands::Record { output, manual } => run_record(&ctx, presenter, &output, manual).await,
        Commands::Play { file } => run_play(&ctx, presenter, &file).await,
        Commands::Say { text } => run_say(&ctx, presenter, &text).await,
        Commands::Transcribe => run_transcribe(&ctx, presenter).await,
        Commands::Listen => run_listen(&ctx, presenter).await,
        Commands::Config { .. } | Commands::Devices => Ok(()),
    }
}

/// Resolved settings shared by the device commands
struct Context {
    config: AppConfig,
    audio: AudioConfig,
    token: ShutdownToken,
}

impl Context {
    fn api_key(&self) -> Result<&str, CliError> {
        self.config
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(CliError::MissingApiKey)
    }

    fn player(&self) -> Player {
        Player::new(
            Arc::new(RodioOutput::new()),
            PcmDefaults {
                sample_rate: self.audio.sample_rate(),
                channels: self.audio.channels(),
            },
        )
    }
}

async fn run_devices(presenter: &Presenter) -> Result<(), CliError> {
    let devices = tokio::task::spawn_blocking(|| CpalInput::new().list_input_devices())
        .await
        .map_err(|e| AudioDeviceError::Open(format!("device listing task failed: {}", e)))??;

    if devices.is_empty() {
        presenter.warn("No input devices found");
    }
    for device in &devices {
        presenter.device(device);
    }
    Ok(())
}

/// Capture one utterance with a live volume bar
async fn capture(ctx: &Context, presenter: &mut Presenter, manual: bool) -> Result<Recording, CliError> {
    let input = Arc::new(CpalInput::new());
    let mut session = RecordingSession::new(ctx.audio.clone(), input.clone(), ctx.token.clone())
        .with_enumerator(input);
    session.start(!manual).await?;

    if manual {
        presenter.info("Press Enter to stop, Ctrl-C to cancel");
        let stop = session.stop_handle();
        // Detached so a pending read never holds up runtime shutdown
        std::thread::spawn(move || {
            let mut line = String::new();
            let _ = std::io::stdin().read_line(&mut line);
            stop.stop();
        });
    }

    let meter = session.meter();
    let threshold = ctx.audio.volume_threshold();
    let started = Instant::now();
    presenter.start_spinner("Recording");

    let completion = session.await_completion();
    tokio::pin!(completion);
    let mut ticker = tokio::time::interval(LEVEL_REFRESH);
    let result = loop {
        tokio::select! {
            result = &mut completion => break result,
            _ = ticker.tick() => {
                presenter.update_level(started.elapsed(), meter.level(), threshold, meter.is_speaking());
            }
        }
    };

    match result {
        Ok(recording) => {
            presenter.spinner_success(&format!(
                "Captured {:.1}s ({}, {})",
                recording.stats.captured.as_secs_f32(),
                recording.reason,
                recording.audio.human_readable_size()
            ));
            if recording.stats.dropped_blocks > 0 {
                presenter.warn(&format!(
                    "{} audio blocks were dropped",
                    recording.stats.dropped_blocks
                ));
            }
            Ok(recording)
        }
        Err(e) => {
            presenter.spinner_fail("Recording failed");
            Err(e.into())
        }
    }
}

async fn run_record(
    ctx: &Context,
    presenter: &mut Presenter,
    output: &Path,
    manual: bool,
) -> Result<(), CliError> {
    let recording = capture(ctx, presenter, manual).await?;
    write_file(output, &recording.audio).await?;
    presenter.success(&format!("Saved {}", output.display()));
    Ok(())
}

async fn write_file(path: &Path, audio: &EncodedAudio) -> Result<(), CliError> {
    tokio::fs::write(path, audio.data())
        .await
        .map_err(|e| CliError::io(format!("Failed to write {}", path.display()), e))
}

async fn run_play(ctx: &Context, presenter: &mut Presenter, file: &Path) -> Result<(), CliError> {
    let bytes = tokio::fs::read(file)
        .await
        .map_err(|e| CliError::io(format!("Failed to read {}", file.display()), e))?;
    if bytes.is_empty() {
        return Err(CliError::Usage(format!("{} is empty", file.display())));
    }

    let player = ctx.player();
    presenter.start_spinner(&format!("Playing {}", file.display()));
    let session = player.play(&EncodedAudio::new(bytes)).await?;
    let outcome = session.await_finished(&ctx.token).await;
    report_playback(presenter, outcome)
}

async fn run_say(ctx: &Context, presenter: &mut Presenter, text: &str) -> Result<(), CliError> {
    if text.trim().is_empty() {
        return Err(CliError::Usage("Nothing to say".into()));
    }
    let synthesizer = synthesizer_chain(&ctx.config, ctx.api_key()?);
    let player = ctx.player();

    presenter.start_spinner("Speaking");
    let outcome = player.say(&synthesizer, text, &ctx.token).await;
    report_playback(presenter, outcome)
}

fn report_playback(
    presenter: &mut Presenter,
    outcome: Result<PlaybackState, PlaybackError>,
) -> Result<(), CliError> {
    match outcome {
        Ok(PlaybackState::Stopped) | Err(PlaybackError::Cancelled) => {
            presenter.spinner_fail("Playback stopped");
            Ok(())
        }
        Ok(_) => {
            presenter.spinner_success("Done");
            Ok(())
        }
        Err(e) => {
            presenter.spinner_fail("Playback failed");
            Err(e.into())
        }
    }
}

async fn run_transcribe(ctx: &Context, presenter: &mut Presenter) -> Result<(), CliError> {
    let transcriber = transcriber_chain(&ctx.config, ctx.api_key()?);
    let recording = capture(ctx, presenter, false).await?;

    presenter.start_spinner("Transcribing");
    let text = tokio::select! {
        text = transcriber.transcribe(&recording.audio) => text?,
        _ = ctx.token.cancelled() => return Err(RecordingError::Cancelled.into()),
    };
    presenter.stop_spinner();

    if text.trim().is_empty() {
        presenter.warn("Nothing was recognised");
    } else {
        presenter.output(text.trim());
    }
    Ok(())
}

/// Prints each utterance on its own line
struct PrintUtterance;

#[async_trait]
impl UtteranceHandler for PrintUtterance {
    async fn on_utterance(&self, text: &str) -> Result<(), HandlerError> {
        println!("{}", text);
        Ok(())
    }
}

async fn run_listen(ctx: &Context, presenter: &mut Presenter) -> Result<(), CliError> {
    let transcriber = Arc::new(transcriber_chain(&ctx.config, ctx.api_key()?));
    let input = Arc::new(CpalInput::new());
    let listener = ContinuousListener::new(ctx.audio.clone(), input.clone(), transcriber, &ctx.token)
        .with_enumerator(input);

    presenter.info("Listening. Say \"exit\" or press Ctrl-C to finish.");
    match listener.run(&PrintUtterance).await {
        ListenerExit::ExitKeyword(keyword) => presenter.success(&format!("Heard \"{}\", done", keyword)),
        ListenerExit::Stopped => presenter.info("Stopped"),
    }
    Ok(())
}
