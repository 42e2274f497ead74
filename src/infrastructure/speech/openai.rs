//! OpenAI-compatible speech API adapters
//!
//! One adapter instance talks to one model. Fallback across models is the
//! job of the application layer's provider chains.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::application::ports::{SynthesisError, Synthesizer, TranscriptionError, Transcriber};
use crate::domain::audio::EncodedAudio;
use crate::domain::config::DEFAULT_BASE_URL;

// Request and response types

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    response_format: &'static str,
    speed: f32,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Connection settings shared by both adapters
#[derive(Debug, Clone)]
struct Endpoint {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl Endpoint {
    fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// Failure classes common to both endpoints
#[derive(Debug, PartialEq, Eq)]
enum HttpFailure {
    Unauthorized,
    RateLimited,
    Api(String),
}

/// Pull the message out of an error body, falling back to the raw text
fn error_message(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => format!("HTTP {}: {}", status, envelope.error.message),
        Err(_) if body.trim().is_empty() => format!("HTTP {}", status),
        Err(_) => format!("HTTP {}: {}", status, body.trim()),
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, HttpFailure> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        return Err(HttpFailure::Unauthorized);
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(HttpFailure::RateLimited);
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(HttpFailure::Api(error_message(status, &body)));
    }
    Ok(response)
}

impl From<HttpFailure> for TranscriptionError {
    fn from(failure: HttpFailure) -> Self {
        match failure {
            HttpFailure::Unauthorized => TranscriptionError::InvalidApiKey,
            HttpFailure::RateLimited => TranscriptionError::RateLimited,
            HttpFailure::Api(message) => TranscriptionError::ApiError(message),
        }
    }
}

impl From<HttpFailure> for SynthesisError {
    fn from(failure: HttpFailure) -> Self {
        match failure {
            HttpFailure::Unauthorized => SynthesisError::InvalidApiKey,
            HttpFailure::RateLimited => SynthesisError::RateLimited,
            HttpFailure::Api(message) => SynthesisError::ApiError(message),
        }
    }
}

/// Speech-to-text through `POST {base}/audio/transcriptions`
#[derive(Debug, Clone)]
pub struct OpenAiTranscriber {
    endpoint: Endpoint,
    model: String,
    language: Option<String>,
    temperature: Option<f32>,
    prompt: Option<String>,
}

impl OpenAiTranscriber {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            endpoint: Endpoint::new(api_key),
            model: model.into(),
            language: None,
            temperature: None,
            prompt: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.endpoint.base_url = base_url.into();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Context hint sent along with the audio
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    fn build_form(&self, audio: &EncodedAudio) -> Result<Form, TranscriptionError> {
        let file = Part::bytes(audio.data().to_vec())
            .file_name(format!("utterance.{}", EncodedAudio::EXTENSION))
            .mime_str(EncodedAudio::MIME_TYPE)
            .map_err(|e| TranscriptionError::RequestFailed(e.to_string()))?;

        let mut form = Form::new()
            .part("file", file)
            .text("model", self.model.clone())
            .text("response_format", "text");
        if let Some(language) = &self.language {
            form = form.text("language", language.clone());
        }
        if let Some(temperature) = self.temperature {
            form = form.text("temperature", temperature.to_string());
        }
        if let Some(prompt) = &self.prompt {
            form = form.text("prompt", prompt.clone());
        }
        Ok(form)
    }
}

#[async_trait]
impl Transcriber for OpenAiTranscriber {
    fn name(&self) -> &str {
        &self.model
    }

    async fn transcribe(&self, audio: &EncodedAudio) -> Result<String, TranscriptionError> {
        if audio.is_empty() {
            return Err(TranscriptionError::RequestFailed("no audio to transcribe".into()));
        }

        let form = self.build_form(audio)?;
        let response = self
            .endpoint
            .client
            .post(self.endpoint.url("audio/transcriptions"))
            .bearer_auth(&self.endpoint.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| TranscriptionError::RequestFailed(e.to_string()))?;

        let response = check_status(response).await?;
        let text = response
            .text()
            .await
            .map_err(|e| TranscriptionError::RequestFailed(e.to_string()))?;

        // Silence legitimately transcribes to nothing
        Ok(text.trim().to_string())
    }
}

/// Text-to-speech through `POST {base}/audio/speech`
#[derive(Debug, Clone)]
pub struct OpenAiSynthesizer {
    endpoint: Endpoint,
    model: String,
    voice: String,
    speed: f32,
}

impl OpenAiSynthesizer {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        voice: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: Endpoint::new(api_key),
            model: model.into(),
            voice: voice.into(),
            speed: 1.0,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.endpoint.base_url = base_url.into();
        self
    }

    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = speed;
        self
    }

    fn build_request<'a>(&'a self, text: &'a str) -> SpeechRequest<'a> {
        SpeechRequest {
            model: &self.model,
            voice: &self.voice,
            input: text,
            response_format: EncodedAudio::EXTENSION,
            speed: self.speed,
        }
    }
}

#[async_trait]
impl Synthesizer for OpenAiSynthesizer {
    fn name(&self) -> &str {
        &self.model
    }

    async fn synthesize(&self, text: &str) -> Result<EncodedAudio, SynthesisError> {
        let response = self
            .endpoint
            .client
            .post(self.endpoint.url("audio/speech"))
            .bearer_auth(&self.endpoint.api_key)
            .json(&self.build_request(text))
            .send()
            .await
            .map_err(|e| SynthesisError::RequestFailed(e.to_string()))?;

        let response = check_status(response).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| SynthesisError::RequestFailed(e.to_string()))?;

        if bytes.is_empty() {
            return Err(SynthesisError::EmptyResponse);
        }
        Ok(EncodedAudio::new(bytes.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_without_double_slash() {
        let transcriber = OpenAiTranscriber::new("key", "whisper-1").with_base_url("http://host/v1/");
        assert_eq!(
            transcriber.endpoint.url("audio/transcriptions"),
            "http://host/v1/audio/transcriptions"
        );
    }

    #[test]
    fn default_base_url() {
        let synth = OpenAiSynthesizer::new("key", "tts-1", "onyx");
        assert_eq!(synth.endpoint.url("audio/speech"), format!("{}/audio/speech", DEFAULT_BASE_URL));
    }

    #[test]
    fn speech_request_asks_for_wav() {
        let synth = OpenAiSynthesizer::new("key", "tts-1", "onyx").with_speed(0.9);
        let json = serde_json::to_value(synth.build_request("hello")).unwrap();

        assert_eq!(json["model"], "tts-1");
        assert_eq!(json["voice"], "onyx");
        assert_eq!(json["input"], "hello");
        assert_eq!(json["response_format"], "wav");
        assert!((json["speed"].as_f64().unwrap() - 0.9).abs() < 1e-6);
    }

    #[test]
    fn error_message_prefers_api_message() {
        let body = r#"{"error": {"message": "model not found", "type": "invalid_request_error"}}"#;
        assert_eq!(
            error_message(StatusCode::NOT_FOUND, body),
            "HTTP 404 Not Found: model not found"
        );
    }

    #[test]
    fn error_message_falls_back_to_raw_body() {
        assert_eq!(
            error_message(StatusCode::BAD_GATEWAY, "upstream down\n"),
            "HTTP 502 Bad Gateway: upstream down"
        );
        assert_eq!(error_message(StatusCode::BAD_GATEWAY, ""), "HTTP 502 Bad Gateway");
    }

    #[test]
    fn failures_map_per_port() {
        assert!(matches!(
            TranscriptionError::from(HttpFailure::Unauthorized),
            TranscriptionError::InvalidApiKey
        ));
        assert!(matches!(
            SynthesisError::from(HttpFailure::RateLimited),
            SynthesisError::RateLimited
        ));
        assert!(matches!(
            SynthesisError::from(HttpFailure::Api("x".into())),
            SynthesisError::ApiError(m) if m == "x"
        ));
    }

    #[tokio::test]
    async fn empty_audio_is_rejected_locally() {
        let transcriber = OpenAiTranscriber::new("key", "whisper-1").with_base_url("http://127.0.0.1:9");
        assert!(matches!(
            transcriber.transcribe(&EncodedAudio::new(Vec::new())).await,
            Err(TranscriptionError::RequestFailed(_))
        ));
    }
}
