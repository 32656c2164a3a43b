use serde::Serialize;
use tracing::warn;

use crate::network::{DetectionPayload, DetectionService};
use crate::utils::truncate_chars;

pub const MAX_DETECTION_CHARS: usize = 3000;
pub const FALLBACK_SCORE: u8 = 5;
pub const UNCONFIGURED_SCORE: u8 = 2;
/// Scores above this read as machine-written.
pub const AI_SCORE_THRESHOLD: u8 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DetectionLabel {
    Human,
    #[serde(rename = "AI")]
    Ai,
    Mixed,
}

impl DetectionLabel {
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "ai" => Self::Ai,
            "mixed" => Self::Mixed,
            _ => Self::Human,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionSource {
    Service,
    Fallback,
    Unconfigured,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    pub score: u8,
    pub label: DetectionLabel,
    pub source: DetectionSource,
}

impl DetectionResult {
    pub fn fallback() -> Self {
        Self {
            score: FALLBACK_SCORE,
            label: DetectionLabel::Human,
            source: DetectionSource::Fallback,
        }
    }

    pub fn unconfigured() -> Self {
        Self {
            score: UNCONFIGURED_SCORE,
            label: DetectionLabel::Human,
            source: DetectionSource::Unconfigured,
        }
    }

    fn from_payload(payload: DetectionPayload) -> Self {
        let score = payload
            .score
            .filter(|score| score.is_finite())
            .map(|score| score.round().clamp(0.0, 100.0) as u8)
            .unwrap_or(0);
        let label = payload
            .label
            .as_deref()
            .map(DetectionLabel::parse_lenient)
            .unwrap_or(DetectionLabel::Human);

        Self {
            score,
            label,
            source: DetectionSource::Service,
        }
    }

    pub fn flagged_as_ai(&self) -> bool {
        self.score > AI_SCORE_THRESHOLD
    }

    pub fn banner(&self) -> &'static str {
        if self.flagged_as_ai() {
            "Content flagged as AI"
        } else {
            "Content is Undetectable"
        }
    }
}

/// Best-effort detection. Failures degrade to a conservative "Human" result.
pub async fn invoke_detection(service: &dyn DetectionService, text: &str) -> DetectionResult {
    if !service.is_configured() {
        warn!("detection service is not configured; returning placeholder result");
        return DetectionResult::unconfigured();
    }

    let excerpt = truncate_chars(text, MAX_DETECTION_CHARS);
    match service.detect(excerpt).await {
        Ok(payload) => DetectionResult::from_payload(payload),
        Err(err) => {
            warn!("ai detection failed, using fallback result: {err}");
            DetectionResult::fallback()
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::network::ServiceError;

    pub(crate) struct ScriptedDetector {
        configured: bool,
        delay: Duration,
        outcome: Mutex<Option<Result<DetectionPayload, ServiceError>>>,
        pub(crate) seen: Mutex<Vec<String>>,
    }

    impl ScriptedDetector {
        pub(crate) fn returning(score: f64, label: &str) -> Self {
            Self::with_outcome(Ok(DetectionPayload {
                score: Some(score),
                label: Some(label.to_string()),
            }))
        }

        pub(crate) fn with_outcome(outcome: Result<DetectionPayload, ServiceError>) -> Self {
            Self {
                configured: true,
                delay: Duration::ZERO,
                outcome: Mutex::new(Some(outcome)),
                seen: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn unconfigured() -> Self {
            Self {
                configured: false,
                ..Self::returning(0.0, "Human")
            }
        }

        pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub(crate) fn seen_texts(&self) -> Vec<String> {
            self.seen.lock().expect("seen lock").clone()
        }
    }

    #[async_trait]
    impl DetectionService for ScriptedDetector {
        fn is_configured(&self) -> bool {
            self.configured
        }

        async fn detect(&self, text: &str) -> Result<DetectionPayload, ServiceError> {
            self.seen.lock().expect("seen lock").push(text.to_string());
            let outcome = self
                .outcome
                .lock()
                .expect("outcome lock")
                .take()
                .unwrap_or_else(|| Ok(DetectionPayload::default()));
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            outcome
        }
    }

    #[tokio::test]
    async fn transport_failure_is_absorbed_into_fallback() {
        let service = ScriptedDetector::with_outcome(Err(ServiceError::Transport(
            "connection reset".to_string(),
        )));

        let result = invoke_detection(&service, "some text").await;
        assert!(result.score <= 10);
        assert_eq!(result.label, DetectionLabel::Human);
        assert_eq!(result.source, DetectionSource::Fallback);
    }

    #[tokio::test]
    async fn unconfigured_service_is_never_called() {
        let service = ScriptedDetector::unconfigured();

        let result = invoke_detection(&service, "some text").await;
        assert_eq!(result, DetectionResult::unconfigured());
        assert!(service.seen_texts().is_empty());
    }

    #[tokio::test]
    async fn long_text_is_truncated_before_the_call() {
        let service = ScriptedDetector::returning(40.0, "Mixed");
        let text = "é".repeat(MAX_DETECTION_CHARS + 250);

        let result = invoke_detection(&service, &text).await;
        assert_eq!(result.label, DetectionLabel::Mixed);

        let seen = service.seen_texts();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].chars().count(), MAX_DETECTION_CHARS);
    }

    #[tokio::test]
    async fn payload_is_normalized() {
        let service = ScriptedDetector::with_outcome(Ok(DetectionPayload {
            score: Some(140.0),
            label: Some("unsure".to_string()),
        }));

        let result = invoke_detection(&service, "text").await;
        assert_eq!(result.score, 100);
        assert_eq!(result.label, DetectionLabel::Human);

        let missing = ScriptedDetector::with_outcome(Ok(DetectionPayload::default()));
        let result = invoke_detection(&missing, "text").await;
        assert_eq!(result.score, 0);
        assert_eq!(result.source, DetectionSource::Service);
    }

    #[test]
    fn label_parsing_is_case_insensitive() {
        assert_eq!(DetectionLabel::parse_lenient("AI"), DetectionLabel::Ai);
        assert_eq!(DetectionLabel::parse_lenient(" mixed "), DetectionLabel::Mixed);
        assert_eq!(DetectionLabel::parse_lenient("Human"), DetectionLabel::Human);
    }

    #[test]
    fn banner_flips_above_threshold() {
        let mut result = DetectionResult::fallback();
        assert_eq!(result.banner(), "Content is Undetectable");
        result.score = 51;
        assert_eq!(result.banner(), "Content flagged as AI");
    }
}
