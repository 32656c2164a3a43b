use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::AppSettings;
use crate::cooldown::{COOLDOWN_SECS, COOLDOWN_TICK, Cooldown};
use crate::detection::{DetectionSource, invoke_detection};
use crate::error::AppError;
use crate::metrics::{PerformanceReport, RuntimeMetrics};
use crate::modes::{RewriteMode, Tone};
use crate::network::{DetectionService, GeminiClient, GeminiConfig, RewriteService, ServiceError};
use crate::progress::{SCAN_TICK, ScanAnimation, ScanSnapshot, ScanStatus};
use crate::rewrite::{RewriteError, RewriteErrorKind, Submission, invoke_rewrite};
use crate::utils::{char_count, is_blank, word_count};

/// Pause before the rewrite call so the interaction never feels instantaneous.
pub const PACING_DELAY: Duration = Duration::from_millis(600);
pub const COPY_ACK_DURATION: Duration = Duration::from_millis(2000);
const EVENT_CHANNEL_CAPACITY: usize = 256;

pub trait ClipboardSink: Send + Sync {
    fn write_text(&self, text: &str) -> Result<(), String>;
}

#[derive(Clone)]
pub struct Services {
    pub rewrite: Arc<dyn RewriteService>,
    pub detection: Arc<dyn DetectionService>,
}

impl Services {
    pub fn shared<T>(client: Arc<T>) -> Self
    where
        T: RewriteService + DetectionService + 'static,
    {
        Self {
            rewrite: Arc::clone(&client) as Arc<dyn RewriteService>,
            detection: client,
        }
    }

    pub fn from_settings(settings: &AppSettings) -> Result<Self, ServiceError> {
        let client = GeminiClient::new(GeminiConfig::from(settings))?;
        Ok(Self::shared(Arc::new(client)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Phase {
    #[default]
    Idle,
    Working,
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub kind: RewriteErrorKind,
    pub code: &'static str,
    pub message: String,
    pub icon: &'static str,
}

impl From<RewriteError> for ErrorRecord {
    fn from(err: RewriteError) -> Self {
        Self {
            kind: err.kind,
            code: err.kind.code(),
            message: err.message,
            icon: err.kind.icon(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RejectReason {
    EmptyInput,
    CoolingDown,
    AlreadyWorking,
    NothingToRetry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum SubmitOutcome {
    Started { generation: u64 },
    Rejected { reason: RejectReason },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    PhaseChanged { phase: Phase },
    InputChanged { input: String },
    OutputChanged { output: String },
    ErrorChanged { error: Option<ErrorRecord> },
    CooldownTick { remaining: u32 },
    ScanProgress { scan: ScanSnapshot },
    CopiedChanged { copied: bool },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub input: String,
    pub mode: RewriteMode,
    pub tone: Tone,
    pub tone_label: &'static str,
    pub phase: Phase,
    pub output: String,
    pub error: Option<ErrorRecord>,
    pub copied: bool,
    pub cooldown_secs: u32,
    pub can_submit: bool,
    pub can_copy: bool,
    pub input_words: usize,
    pub input_chars: usize,
    pub output_words: usize,
    pub output_chars: usize,
    pub word_delta: i64,
    pub scan: ScanSnapshot,
}

#[derive(Default)]
struct TaskSlot(Option<JoinHandle<()>>);

impl TaskSlot {
    fn replace(&mut self, handle: JoinHandle<()>) {
        if let Some(previous) = self.0.replace(handle) {
            previous.abort();
        }
    }

    fn cancel(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }
}

#[derive(Default)]
struct SessionTasks {
    submission: TaskSlot,
    detection: TaskSlot,
    scan: TaskSlot,
    cooldown: TaskSlot,
    copy_ack: TaskSlot,
}

struct Session {
    input: String,
    mode: RewriteMode,
    tone: Tone,
    phase: Phase,
    output: String,
    error: Option<ErrorRecord>,
    copied: bool,
    cooldown: Cooldown,
    generation: u64,
    copy_generation: u64,
    last_submission: Option<Submission>,
    scan: ScanAnimation,
    services: Services,
    metrics: RuntimeMetrics,
    tasks: SessionTasks,
}

impl Session {
    fn gate(&self) -> Result<(), RejectReason> {
        if self.phase == Phase::Working {
            Err(RejectReason::AlreadyWorking)
        } else if is_blank(&self.input) {
            Err(RejectReason::EmptyInput)
        } else if self.cooldown.is_active() {
            Err(RejectReason::CoolingDown)
        } else {
            Ok(())
        }
    }

    fn can_copy(&self) -> bool {
        !self.output.is_empty() && self.error.is_none()
    }

    fn snapshot(&self) -> SessionSnapshot {
        let input_words = word_count(&self.input);
        let output_words = word_count(&self.output);
        SessionSnapshot {
            input: self.input.clone(),
            mode: self.mode,
            tone: self.tone,
            tone_label: self.tone.label(),
            phase: self.phase,
            output: self.output.clone(),
            error: self.error.clone(),
            copied: self.copied,
            cooldown_secs: self.cooldown.remaining(),
            can_submit: self.gate().is_ok(),
            can_copy: self.can_copy(),
            input_words,
            input_chars: char_count(&self.input),
            output_words,
            output_chars: char_count(&self.output),
            word_delta: if self.output.is_empty() {
                0
            } else {
                output_words as i64 - input_words as i64
            },
            scan: self.scan.snapshot(),
        }
    }
}

struct ControllerShared {
    session: Mutex<Session>,
    events: broadcast::Sender<SessionEvent>,
    clipboard: Arc<dyn ClipboardSink>,
}

/// Owns one paraphrasing session: input, submission lifecycle, cooldown, detection scan.
///
/// Every asynchronous step captures the session generation when it is spawned
/// and only applies its outcome if the generation is unchanged when it resolves.
#[derive(Clone)]
pub struct LifecycleController {
    shared: Arc<ControllerShared>,
}

impl LifecycleController {
    pub fn new(services: Services, clipboard: Arc<dyn ClipboardSink>) -> Self {
        Self::with_defaults(services, clipboard, RewriteMode::default(), Tone::default())
    }

    pub fn with_defaults(
        services: Services,
        clipboard: Arc<dyn ClipboardSink>,
        mode: RewriteMode,
        tone: Tone,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let session = Session {
            input: String::new(),
            mode,
            tone,
            phase: Phase::Idle,
            output: String::new(),
            error: None,
            copied: false,
            cooldown: Cooldown::default(),
            generation: 0,
            copy_generation: 0,
            last_submission: None,
            scan: ScanAnimation::default(),
            services,
            metrics: RuntimeMetrics::new(),
            tasks: SessionTasks::default(),
        };

        Self {
            shared: Arc::new(ControllerShared {
                session: Mutex::new(session),
                events,
                clipboard,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.shared.session.lock().await.snapshot()
    }

    pub async fn performance_report(&self) -> PerformanceReport {
        self.shared.session.lock().await.metrics.report()
    }

    pub async fn replace_services(&self, services: Services) {
        let mut session = self.shared.session.lock().await;
        session.services = services;
        info!("paraphrase services replaced");
    }

    pub async fn set_input(&self, text: impl Into<String>) {
        let text = text.into();
        let mut session = self.shared.session.lock().await;
        if session.input == text {
            return;
        }

        session.input = text;
        if session.phase == Phase::Working {
            self.shared.cancel_submission(&mut session, "input changed");
        }
        if is_blank(&session.input) {
            self.shared.reset_results(&mut session);
        }
    }

    pub async fn set_mode(&self, mode: RewriteMode) {
        let mut session = self.shared.session.lock().await;
        session.mode = mode;
    }

    /// Returns `false` while the tone slider is locked (working or cooling down).
    pub async fn set_tone(&self, tone: Tone) -> bool {
        let mut session = self.shared.session.lock().await;
        if session.phase == Phase::Working || session.cooldown.is_active() {
            return false;
        }
        session.tone = tone;
        true
    }

    pub async fn submit(&self) -> SubmitOutcome {
        let mut session = self.shared.session.lock().await;
        if let Err(reason) = session.gate() {
            debug!(?reason, "submission rejected");
            return SubmitOutcome::Rejected { reason };
        }

        let Some(submission) = Submission::new(session.input.clone(), session.mode, session.tone)
        else {
            return SubmitOutcome::Rejected {
                reason: RejectReason::EmptyInput,
            };
        };
        self.shared.start_submission(&mut session, submission)
    }

    /// "Try Again": re-runs the failed submission's parameters.
    pub async fn retry(&self) -> SubmitOutcome {
        let mut session = self.shared.session.lock().await;
        if session.phase != Phase::Failed {
            return SubmitOutcome::Rejected {
                reason: RejectReason::NothingToRetry,
            };
        }
        if let Err(reason) = session.gate() {
            debug!(?reason, "retry rejected");
            return SubmitOutcome::Rejected { reason };
        }

        let Some(submission) = session.last_submission.clone() else {
            return SubmitOutcome::Rejected {
                reason: RejectReason::NothingToRetry,
            };
        };
        self.shared.start_submission(&mut session, submission)
    }

    /// Copies the output to the clipboard. Returns `false` when there is nothing to copy.
    pub async fn copy_output(&self) -> Result<bool, AppError> {
        let mut session = self.shared.session.lock().await;
        if !session.can_copy() {
            return Ok(false);
        }

        self.shared
            .clipboard
            .write_text(&session.output)
            .map_err(AppError::Clipboard)?;

        session.copied = true;
        session.copy_generation += 1;
        let token = session.copy_generation;
        self.shared.emit(SessionEvent::CopiedChanged { copied: true });

        let shared = Arc::clone(&self.shared);
        session.tasks.copy_ack.replace(tokio::spawn(async move {
            tokio::time::sleep(COPY_ACK_DURATION).await;
            let mut session = shared.session.lock().await;
            if session.copy_generation == token && session.copied {
                session.copied = false;
                shared.emit(SessionEvent::CopiedChanged { copied: false });
            }
        }));
        Ok(true)
    }

    /// Resets input, output, error and the copied flag. The cooldown keeps running.
    pub async fn clear(&self) {
        let mut session = self.shared.session.lock().await;
        session.input.clear();
        self.shared.emit(SessionEvent::InputChanged {
            input: String::new(),
        });
        if session.phase == Phase::Working {
            self.shared.cancel_submission(&mut session, "cleared");
        }
        self.shared.reset_results(&mut session);
    }

    /// Aborts every task the session owns.
    pub async fn shutdown(&self) {
        let mut session = self.shared.session.lock().await;
        session.generation += 1;
        session.tasks.submission.cancel();
        session.tasks.detection.cancel();
        session.tasks.scan.cancel();
        session.tasks.cooldown.cancel();
        session.tasks.copy_ack.cancel();
        info!("lifecycle controller shut down");
    }
}

impl ControllerShared {
    fn emit(&self, event: SessionEvent) {
        // Fails only when nobody is subscribed.
        let _ = self.events.send(event);
    }

    fn set_phase(&self, session: &mut Session, phase: Phase) {
        if session.phase != phase {
            session.phase = phase;
            self.emit(SessionEvent::PhaseChanged { phase });
        }
    }

    fn start_submission(
        self: &Arc<Self>,
        session: &mut Session,
        submission: Submission,
    ) -> SubmitOutcome {
        session.generation += 1;
        let generation = session.generation;

        session.error = None;
        session.output.clear();
        session.copied = false;
        session.tasks.copy_ack.cancel();
        self.stop_scan(session);
        self.set_phase(session, Phase::Working);
        self.emit(SessionEvent::ErrorChanged { error: None });
        self.emit(SessionEvent::OutputChanged {
            output: String::new(),
        });
        self.emit(SessionEvent::CopiedChanged { copied: false });

        info!(
            generation,
            mode = ?submission.mode(),
            tone = submission.tone().value(),
            chars = char_count(submission.text()),
            "submission started"
        );
        session.last_submission = Some(submission.clone());
        session.metrics.record_submission();

        let services = session.services.clone();
        let shared = Arc::clone(self);
        session.tasks.submission.replace(tokio::spawn(run_submission(
            shared, services, submission, generation,
        )));

        SubmitOutcome::Started { generation }
    }

    fn cancel_submission(&self, session: &mut Session, reason: &str) {
        session.generation += 1;
        session.tasks.submission.cancel();
        self.set_phase(session, Phase::Idle);
        info!(
            generation = session.generation,
            reason, "in-flight submission cancelled"
        );
    }

    fn reset_results(&self, session: &mut Session) {
        session.generation += 1;
        session.output.clear();
        session.error = None;
        session.copied = false;
        session.tasks.copy_ack.cancel();
        self.stop_scan(session);
        self.set_phase(session, Phase::Idle);
        self.emit(SessionEvent::OutputChanged {
            output: String::new(),
        });
        self.emit(SessionEvent::ErrorChanged { error: None });
        self.emit(SessionEvent::CopiedChanged { copied: false });
    }

    fn stop_scan(&self, session: &mut Session) {
        session.tasks.detection.cancel();
        session.tasks.scan.cancel();
        if session.scan.status() != ScanStatus::Idle {
            session.scan.reset();
            self.emit(SessionEvent::ScanProgress {
                scan: session.scan.snapshot(),
            });
        }
    }

    fn arm_cooldown(self: &Arc<Self>, session: &mut Session) {
        let needs_ticker = session.cooldown.arm(COOLDOWN_SECS);
        self.emit(SessionEvent::CooldownTick {
            remaining: session.cooldown.remaining(),
        });
        if needs_ticker {
            let shared = Arc::clone(self);
            session.tasks.cooldown.replace(tokio::spawn(run_cooldown(shared)));
        }
    }

    fn start_detection(
        self: &Arc<Self>,
        session: &mut Session,
        detection: Arc<dyn DetectionService>,
        generation: u64,
    ) {
        session.scan.start();
        self.emit(SessionEvent::ScanProgress {
            scan: session.scan.snapshot(),
        });

        let text = session.output.clone();
        let shared = Arc::clone(self);
        session.tasks.detection.replace(tokio::spawn(async move {
            let started = Instant::now();
            let result = invoke_detection(detection.as_ref(), &text).await;
            let latency_ms = started.elapsed().as_millis() as u64;

            let mut session = shared.session.lock().await;
            if session.generation != generation {
                debug!(generation, "discarding stale detection result");
                session.metrics.record_stale_result();
                return;
            }
            session
                .metrics
                .record_detection(latency_ms, result.source != DetectionSource::Service);
            info!(
                generation,
                score = result.score,
                label = ?result.label,
                latency_ms,
                "detection resolved"
            );
            session.scan.resolve(result);
        }));

        let shared = Arc::clone(self);
        session
            .tasks
            .scan
            .replace(tokio::spawn(run_scan(shared, generation)));
    }
}

async fn run_submission(
    shared: Arc<ControllerShared>,
    services: Services,
    submission: Submission,
    generation: u64,
) {
    tokio::time::sleep(PACING_DELAY).await;
    if shared.session.lock().await.generation != generation {
        debug!(generation, "submission superseded during pacing delay");
        return;
    }

    let started = Instant::now();
    let outcome = invoke_rewrite(services.rewrite.as_ref(), &submission).await;
    let latency_ms = started.elapsed().as_millis() as u64;

    let mut session = shared.session.lock().await;
    if session.generation != generation {
        debug!(
            generation,
            current = session.generation,
            "discarding stale rewrite result"
        );
        session.metrics.record_stale_result();
        return;
    }
    session
        .metrics
        .record_rewrite(latency_ms, outcome.as_ref().err().map(|err| err.kind));

    match outcome {
        Ok(text) => {
            info!(generation, latency_ms, "rewrite succeeded");
            session.output = text;
            shared.emit(SessionEvent::OutputChanged {
                output: session.output.clone(),
            });
            shared.set_phase(&mut session, Phase::Success);
            shared.arm_cooldown(&mut session);
            shared.start_detection(&mut session, services.detection, generation);
        }
        Err(err) => {
            warn!(generation, kind = err.kind.code(), latency_ms, "rewrite failed");
            let arms_cooldown = err.kind.arms_cooldown();
            let record = ErrorRecord::from(err);
            session.error = Some(record.clone());
            shared.emit(SessionEvent::ErrorChanged {
                error: Some(record),
            });
            shared.set_phase(&mut session, Phase::Failed);
            if arms_cooldown {
                shared.arm_cooldown(&mut session);
            }
        }
    }
}

async fn run_cooldown(shared: Arc<ControllerShared>) {
    loop {
        tokio::time::sleep(COOLDOWN_TICK).await;
        let mut session = shared.session.lock().await;
        let remaining = session.cooldown.tick();
        shared.emit(SessionEvent::CooldownTick { remaining });
        if remaining == 0 {
            debug!("cooldown elapsed");
            break;
        }
    }
}

async fn run_scan(shared: Arc<ControllerShared>, generation: u64) {
    let mut ticker = tokio::time::interval(SCAN_TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick of an interval fires immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let mut session = shared.session.lock().await;
        if session.generation != generation || !session.scan.is_running() {
            break;
        }

        let complete = session.scan.tick();
        shared.emit(SessionEvent::ScanProgress {
            scan: session.scan.snapshot(),
        });
        if complete {
            info!(generation, "detection scan complete");
            break;
        }
    }
}
