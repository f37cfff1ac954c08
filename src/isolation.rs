//! Noise-isolation adapter for the speech-isolation HTTP service.
//!
//! The service is strictly optional: every failure mode degrades to "return
//! the input waveform unchanged" with a warning, never a pipeline error.
//! Transport-level failures (connect/timeout) are retried with linearly
//! increasing backoff; HTTP rejections (auth, not-found, rate-limit) are
//! terminal for the call and are not retried.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::audio;
use crate::config::{AppConfig, SessionState};
use crate::error::{ForgeError, ForgeResult};

/// Endpoint path appended to the configured base URL.
const ISOLATION_ENDPOINT: &str = "/audio-isolation";

/// API-key header the service expects.
const API_KEY_HEADER: &str = "xi-api-key";

/// Multipart field name carrying the waveform.
const AUDIO_FIELD: &str = "audio";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

/// Transport retry policy: `attempts` tries, waiting
/// `attempt_index × backoff_unit` between consecutive tries.
#[derive(Debug, Clone, Copy)]
pub struct RetrySettings {
    pub attempts: u32,
    pub backoff_unit: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: 5,
            backoff_unit: Duration::from_secs(3),
        }
    }
}

/// Why isolation was skipped for an item. All of these are non-fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No API key configured.
    NotConfigured,
    /// Operator disabled isolation for this batch.
    Disabled,
    /// HTTP 401: bad credentials.
    AuthRejected,
    /// HTTP 404: the feature is not available on this account.
    NotAvailable,
    /// HTTP 429: rate limited.
    RateLimited,
    /// Any other non-200 response.
    ServiceError(u16),
    /// Connect/timeout errors persisted through every retry.
    TransportExhausted,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConfigured => f.write_str("isolation service not configured"),
            Self::Disabled => f.write_str("isolation disabled for this batch"),
            Self::AuthRejected => f.write_str("isolation auth rejected (check API key)"),
            Self::NotAvailable => f.write_str("isolation not available on this account"),
            Self::RateLimited => f.write_str("isolation rate limit exceeded"),
            Self::ServiceError(status) => write!(f, "isolation service error (status {status})"),
            Self::TransportExhausted => f.write_str("isolation unreachable after all retries"),
        }
    }
}

/// Result of an isolation attempt.
#[derive(Debug)]
pub enum IsolationOutcome {
    /// A new canonical waveform containing the isolated result.
    Applied(PathBuf),
    /// Isolation skipped; the caller proceeds with the input unchanged.
    Skipped(SkipReason),
}

impl IsolationOutcome {
    /// The waveform path the pipeline should carry forward.
    #[must_use]
    pub fn current_path(&self, input: &Path) -> PathBuf {
        match self {
            Self::Applied(path) => path.clone(),
            Self::Skipped(_) => input.to_path_buf(),
        }
    }
}

pub struct IsolationClient {
    base_url: String,
    api_key: Option<String>,
    retry: RetrySettings,
    http: reqwest::blocking::Client,
}

impl IsolationClient {
    pub fn from_config(cfg: &AppConfig) -> ForgeResult<Self> {
        Self::new(
            cfg.isolation_base_url.clone(),
            cfg.isolation_api_key.clone(),
            RetrySettings::default(),
        )
    }

    pub fn new(
        base_url: String,
        api_key: Option<String>,
        retry: RetrySettings,
    ) -> ForgeResult<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ForgeError::InvalidRequest(format!("http client: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key,
            retry,
            http,
        })
    }

    /// Post `wav` to the isolation service and return the outcome.
    ///
    /// Only infrastructure errors (file I/O, re-encode of a successful
    /// response) surface as `Err`; every service-side condition degrades to
    /// `IsolationOutcome::Skipped`.
    pub fn isolate(
        &self,
        wav: &Path,
        state: &SessionState,
        cfg: &AppConfig,
    ) -> ForgeResult<IsolationOutcome> {
        if state.isolation_disabled {
            tracing::info!("isolation disabled for this batch, passing audio through");
            return Ok(IsolationOutcome::Skipped(SkipReason::Disabled));
        }
        let Some(api_key) = self.api_key.as_deref().filter(|k| !k.trim().is_empty()) else {
            tracing::warn!("isolation API key not configured, passing audio through");
            return Ok(IsolationOutcome::Skipped(SkipReason::NotConfigured));
        };

        let url = format!("{}{ISOLATION_ENDPOINT}", self.base_url);
        let file_name = wav
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.wav".to_owned());
        let bytes = std::fs::read(wav)?;

        tracing::info!(url = %url, file = %file_name, bytes = bytes.len(), "posting waveform to isolation service");

        for attempt in 1..=self.retry.attempts {
            let part = reqwest::blocking::multipart::Part::bytes(bytes.clone())
                .file_name(file_name.clone())
                .mime_str("audio/wav")
                .map_err(|e| ForgeError::InvalidRequest(format!("multipart: {e}")))?;
            let form = reqwest::blocking::multipart::Form::new().part(AUDIO_FIELD, part);

            tracing::debug!(attempt, max = self.retry.attempts, "isolation attempt");
            match self
                .http
                .post(&url)
                .header(API_KEY_HEADER, api_key)
                .multipart(form)
                .send()
            {
                Ok(response) => return self.handle_response(response, cfg),
                Err(err) => {
                    if attempt == self.retry.attempts {
                        tracing::warn!(
                            attempts = self.retry.attempts,
                            error = %err,
                            "isolation unreachable, passing audio through"
                        );
                        return Ok(IsolationOutcome::Skipped(SkipReason::TransportExhausted));
                    }
                    let wait = self.retry.backoff_unit * attempt;
                    tracing::warn!(
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        error = %err,
                        "isolation attempt failed, retrying"
                    );
                    std::thread::sleep(wait);
                }
            }
        }

        // attempts >= 1 guarantees the loop returned already.
        Ok(IsolationOutcome::Skipped(SkipReason::TransportExhausted))
    }

    fn handle_response(
        &self,
        response: reqwest::blocking::Response,
        cfg: &AppConfig,
    ) -> ForgeResult<IsolationOutcome> {
        let status = response.status().as_u16();
        match status {
            200 => {
                let body = response
                    .bytes()
                    .map_err(|e| ForgeError::InvalidRequest(format!("isolation body: {e}")))?;
                let tmp = tempfile::Builder::new().suffix(".wav").tempfile()?;
                std::fs::write(tmp.path(), &body)?;
                // Strip service metadata and restore the canonical format;
                // the temp response file is removed on drop.
                let canonical = audio::reencode_metadata_free(tmp.path(), cfg)?;
                tracing::info!(output = %canonical.display(), "isolation applied");
                Ok(IsolationOutcome::Applied(canonical))
            }
            401 => {
                tracing::error!("isolation auth rejected (status 401)");
                Ok(IsolationOutcome::Skipped(SkipReason::AuthRejected))
            }
            404 => {
                tracing::warn!("isolation endpoint not available on this account (status 404)");
                Ok(IsolationOutcome::Skipped(SkipReason::NotAvailable))
            }
            429 => {
                tracing::error!("isolation rate limit exceeded (status 429)");
                Ok(IsolationOutcome::Skipped(SkipReason::RateLimited))
            }
            other => {
                let detail = response.text().unwrap_or_default();
                tracing::error!(status = other, detail = %detail, "isolation service error");
                Ok(IsolationOutcome::Skipped(SkipReason::ServiceError(other)))
            }
        }
    }
}
