use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::modes::{RewriteMode, Tone};
use crate::network::RewriteService;
use crate::utils::is_blank;

const MISSING_API_KEY_MESSAGE: &str = "API Key is missing from the environment configuration.";

/// One user-initiated paraphrase action. Blank text never becomes a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    text: String,
    mode: RewriteMode,
    tone: Tone,
}

impl Submission {
    pub fn new(text: impl Into<String>, mode: RewriteMode, tone: Tone) -> Option<Self> {
        let text = text.into();
        if is_blank(&text) {
            return None;
        }
        Some(Self { text, mode, tone })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn mode(&self) -> RewriteMode {
        self.mode
    }

    pub fn tone(&self) -> Tone {
        self.tone
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteRequest {
    pub instruction: &'static str,
    pub tone_descriptor: &'static str,
    pub source_text: String,
}

impl RewriteRequest {
    pub fn from_submission(submission: &Submission) -> Self {
        Self {
            instruction: submission.mode.instruction(),
            tone_descriptor: submission.tone.descriptor(),
            source_text: submission.text.clone(),
        }
    }

    pub fn prompt(&self) -> String {
        format!(
            "{}\n\nThe desired tone for the output is {}\n\n[TEXT START]\n{}\n[TEXT END]\n\nOutput only the rewritten text, nothing else.",
            self.instruction, self.tone_descriptor, self.source_text
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RewriteErrorKind {
    AuthError,
    RateLimitError,
    ServerError,
    NetworkError,
    SafetyError,
    EmptyResponse,
    GenericError,
    ConfigurationError,
}

impl RewriteErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            Self::AuthError => "AUTH_ERROR",
            Self::RateLimitError => "RATE_LIMIT_ERROR",
            Self::ServerError => "SERVER_ERROR",
            Self::NetworkError => "NETWORK_ERROR",
            Self::SafetyError => "SAFETY_ERROR",
            Self::EmptyResponse => "EMPTY_RESPONSE",
            Self::GenericError => "GENERIC_ERROR",
            Self::ConfigurationError => "CONFIGURATION_ERROR",
        }
    }

    pub fn user_message(self) -> &'static str {
        match self {
            Self::AuthError => "Authentication failed. Please check your API key.",
            Self::RateLimitError => "Too many requests. Please wait a moment before trying again.",
            Self::ServerError => {
                "The AI service is currently overloaded. Please try again in a few seconds."
            }
            Self::NetworkError => "Network error. Please check your internet connection.",
            Self::SafetyError => {
                "The content was flagged by safety filters and could not be processed."
            }
            Self::EmptyResponse => "The model returned an empty response.",
            Self::GenericError => "Unable to paraphrase text. Please try again.",
            Self::ConfigurationError => MISSING_API_KEY_MESSAGE,
        }
    }

    /// Icon shown next to the failure message in the output pane.
    pub fn icon(self) -> &'static str {
        match self {
            Self::RateLimitError => "timer",
            Self::AuthError | Self::ConfigurationError => "key-round",
            Self::SafetyError => "shield-off",
            Self::ServerError => "server-crash",
            Self::NetworkError => "wifi-off",
            Self::EmptyResponse | Self::GenericError => "alert-triangle",
        }
    }

    pub fn arms_cooldown(self) -> bool {
        matches!(self, Self::RateLimitError)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RewriteError {
    pub kind: RewriteErrorKind,
    pub message: String,
}

impl RewriteError {
    pub fn from_kind(kind: RewriteErrorKind) -> Self {
        Self {
            kind,
            message: kind.user_message().to_string(),
        }
    }
}

/// Maps a raw service failure message onto the user-facing taxonomy.
pub fn classify_error_message(raw: &str) -> RewriteErrorKind {
    let normalized = raw.to_lowercase();
    let has_any = |needles: &[&str]| needles.iter().any(|needle| normalized.contains(needle));

    if has_any(&["401", "403", "key"]) {
        RewriteErrorKind::AuthError
    } else if has_any(&["429", "quota", "exhausted"]) {
        RewriteErrorKind::RateLimitError
    } else if has_any(&["500", "503", "overloaded"]) {
        RewriteErrorKind::ServerError
    } else if has_any(&["network", "fetch"]) {
        RewriteErrorKind::NetworkError
    } else if has_any(&["safety", "blocked"]) {
        RewriteErrorKind::SafetyError
    } else {
        RewriteErrorKind::GenericError
    }
}

pub async fn invoke_rewrite(
    service: &dyn RewriteService,
    submission: &Submission,
) -> Result<String, RewriteError> {
    if !service.is_configured() {
        return Err(RewriteError::from_kind(RewriteErrorKind::ConfigurationError));
    }

    let request = RewriteRequest::from_submission(submission);
    match service.rewrite(&request).await {
        Ok(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                warn!(mode = ?submission.mode, "rewrite service returned an empty response");
                Err(RewriteError::from_kind(RewriteErrorKind::EmptyResponse))
            } else {
                Ok(trimmed.to_string())
            }
        }
        Err(err) => {
            let raw = err.to_string();
            let kind = classify_error_message(&raw);
            warn!(kind = kind.code(), "rewrite service error: {raw}");
            Err(RewriteError::from_kind(kind))
        }
    }
}
