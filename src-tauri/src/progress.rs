use std::time::Duration;

use serde::Serialize;

use crate::detection::{AI_SCORE_THRESHOLD, DetectionResult};

pub const SCAN_TICK: Duration = Duration::from_millis(50);
pub const SCAN_DURATION: Duration = Duration::from_millis(3000);
pub const PENDING_RESULT_CEILING: f32 = 90.0;

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectorEngine {
    pub name: &'static str,
    pub nominal_ms: u64,
}

pub const DETECTOR_ROSTER: [DetectorEngine; 8] = [
    DetectorEngine { name: "Quillbot", nominal_ms: 1200 },
    DetectorEngine { name: "GPTZero", nominal_ms: 1800 },
    DetectorEngine { name: "ZeroGPT", nominal_ms: 1500 },
    DetectorEngine { name: "CopyLeaks", nominal_ms: 2200 },
    DetectorEngine { name: "Crossplag", nominal_ms: 1600 },
    DetectorEngine { name: "Sapling", nominal_ms: 1400 },
    DetectorEngine { name: "Writer", nominal_ms: 1900 },
    DetectorEngine { name: "Originality.ai", nominal_ms: 2500 },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    #[default]
    Idle,
    Checking,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineVerdict {
    Ai,
    Human,
}

/// Cosmetic per-engine verdict: the overall score nudged by a fixed offset keyed off the name.
pub fn engine_verdict(name: &str, score: u8) -> EngineVerdict {
    let len = name.len() as i32;
    let variance = (len % 5) * 5;
    let adjusted = if len % 2 == 0 {
        i32::from(score) + variance
    } else {
        i32::from(score) - variance
    };

    if adjusted > i32::from(AI_SCORE_THRESHOLD) {
        EngineVerdict::Ai
    } else {
        EngineVerdict::Human
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    pub name: &'static str,
    pub complete: bool,
    pub verdict: Option<EngineVerdict>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSnapshot {
    pub status: ScanStatus,
    pub progress: f32,
    pub engines: Vec<EngineSnapshot>,
    pub result: Option<DetectionResult>,
    pub banner: Option<&'static str>,
    pub engine_count: usize,
}

/// Simulated multi-engine scan. Driven by `tick`; holds at 90% until `resolve` supplies the real result.
#[derive(Debug, Clone, Default)]
pub struct ScanAnimation {
    status: ScanStatus,
    step: u32,
    progress: f32,
    completed: Vec<&'static str>,
    result: Option<DetectionResult>,
}

impl ScanAnimation {
    pub fn total_steps() -> u32 {
        (SCAN_DURATION.as_millis() / SCAN_TICK.as_millis()) as u32
    }

    pub fn start(&mut self) {
        *self = Self {
            status: ScanStatus::Checking,
            ..Self::default()
        };
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn resolve(&mut self, result: DetectionResult) {
        if self.status == ScanStatus::Checking {
            self.result = Some(result);
        }
    }

    /// Advances one tick. Returns `true` once the scan is complete.
    pub fn tick(&mut self) -> bool {
        if self.status != ScanStatus::Checking {
            return self.status == ScanStatus::Complete;
        }

        let total_steps = Self::total_steps();
        self.step += 1;
        let mut progress = self.step as f32 / total_steps as f32 * 100.0;

        if progress > PENDING_RESULT_CEILING && self.result.is_none() {
            progress = PENDING_RESULT_CEILING;
            self.step -= 1;
        } else if progress > 100.0 {
            progress = 100.0;
        }
        self.progress = progress.min(100.0);

        if self.result.is_some() {
            let elapsed_ms = u64::from(self.step) * SCAN_TICK.as_millis() as u64;
            let finished = self.progress >= 100.0;
            self.completed = DETECTOR_ROSTER
                .iter()
                .filter(|engine| engine.nominal_ms <= elapsed_ms || finished)
                .map(|engine| engine.name)
                .collect();
        }

        if self.progress >= 100.0 && self.result.is_some() {
            self.status = ScanStatus::Complete;
        }
        self.status == ScanStatus::Complete
    }

    pub fn status(&self) -> ScanStatus {
        self.status
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn result(&self) -> Option<DetectionResult> {
        self.result
    }

    pub fn is_running(&self) -> bool {
        self.status == ScanStatus::Checking
    }

    pub fn snapshot(&self) -> ScanSnapshot {
        let engines = DETECTOR_ROSTER
            .iter()
            .map(|engine| {
                let complete = self.completed.contains(&engine.name);
                let verdict = match (complete, self.result) {
                    (true, Some(result)) => Some(engine_verdict(engine.name, result.score)),
                    _ => None,
                };
                EngineSnapshot {
                    name: engine.name,
                    complete,
                    verdict,
                }
            })
            .collect();

        let banner = match (self.status, self.result) {
            (ScanStatus::Complete, Some(result)) => Some(result.banner()),
            _ => None,
        };

        ScanSnapshot {
            status: self.status,
            progress: self.progress,
            engines,
            result: if self.status == ScanStatus::Complete {
                self.result
            } else {
                None
            },
            banner,
            engine_count: DETECTOR_ROSTER.len(),
        }
    }
}
