//! CLI presenter for output formatting

use std::time::Duration;

use colored::*;
use indicatif::{ProgressBar, ProgressStyle};

use crate::application::ports::DeviceInfo;

/// Width of the live volume bar
const BAR_WIDTH: usize = 24;

/// RMS level drawn as a full bar. Speech rarely exceeds this.
const FULL_SCALE: f32 = 0.25;

pub struct Presenter {
    spinner: Option<ProgressBar>,
}

impl Presenter {
    pub fn new() -> Self {
        Self { spinner: None }
    }

    /// Start a spinner with message
    pub fn start_spinner(&mut self, message: &str) {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
            .template("{spinner:.cyan} {msg}")
        {
            spinner.set_style(style);
        }
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(80));
        self.spinner = Some(spinner);
    }

    pub fn update_spinner(&self, message: &str) {
        if let Some(ref spinner) = self.spinner {
            spinner.set_message(message.to_string());
        }
    }

    pub fn spinner_success(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_with_message(format!("{} {}", "✓".green(), message));
        }
    }

    pub fn spinner_fail(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_with_message(format!("{} {}", "✗".red(), message));
        }
    }

    pub fn stop_spinner(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }

    /// Print info message to stderr
    pub fn info(&self, message: &str) {
        eprintln!("{} {}", "ℹ".cyan(), message);
    }

    /// Print success message to stderr
    pub fn success(&self, message: &str) {
        eprintln!("{} {}", "✓".green(), message);
    }

    /// Print warning message to stderr
    pub fn warn(&self, message: &str) {
        eprintln!("{} {}", "⚠".yellow(), message);
    }

    /// Print error message to stderr
    pub fn error(&self, message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Output text to stdout (transcripts and command results)
    pub fn output(&self, text: &str) {
        println!("{}", text);
    }

    /// Render the live input level against the speech threshold
    pub fn format_level(&self, level: f32, threshold: f32, speaking: bool) -> String {
        let cells = |value: f32| {
            ((value / FULL_SCALE).clamp(0.0, 1.0) * BAR_WIDTH as f32).round() as usize
        };
        let filled = cells(level);
        let mark = cells(threshold).min(BAR_WIDTH - 1);

        let mut bar = String::with_capacity(BAR_WIDTH * 3);
        for i in 0..BAR_WIDTH {
            let cell = if i < filled { "█" } else if i == mark { "│" } else { "░" };
            bar.push_str(cell);
        }

        let bar = if speaking { bar.green() } else { bar.normal() };
        let label = if speaking { "speech" } else { "quiet " };
        format!("[{}] {:.3} {}", bar, level, label)
    }

    /// Update the recording spinner with the current level
    pub fn update_level(&self, elapsed: Duration, level: f32, threshold: f32, speaking: bool) {
        self.update_spinner(&format!(
            "Recording {:>4.1}s {}",
            elapsed.as_secs_f32(),
            self.format_level(level, threshold, speaking)
        ));
    }

    pub fn device(&self, device: &DeviceInfo) {
        let marker = if device.is_default { "*".green() } else { " ".normal() };
        let detail = match (device.default_sample_rate, device.channels) {
            (Some(rate), Some(channels)) => format!(" ({} Hz, {} ch)", rate, channels),
            (Some(rate), None) => format!(" ({} Hz)", rate),
            _ => String::new(),
        };
        println!("{} {}{}", marker, device.name, detail.dimmed());
    }

    /// Print a key-value pair (for config list)
    pub fn key_value(&self, key: &str, value: &str) {
        println!("{}: {}", key.cyan(), value);
    }
}

impl Default for Presenter {
    fn default() -> Self {
        Self::new()
    }
}
