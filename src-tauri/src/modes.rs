use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MIN_TONE: i8 = -2;
pub const MAX_TONE: i8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RewriteMode {
    Standard,
    Fluency,
    #[default]
    Academic,
    Creative,
    Shorten,
    Expand,
    Simple,
    Formal,
    #[serde(rename = "Humanize (Max)")]
    Humanize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeConfig {
    pub id: RewriteMode,
    pub label: &'static str,
    pub description: &'static str,
    #[serde(skip)]
    pub instruction: &'static str,
    pub accent: &'static str,
}

/// Selector catalog, in display order.
pub const MODES: [ModeConfig; 9] = [
    ModeConfig {
        id: RewriteMode::Standard,
        label: "Standard",
        description: "Balanced rewrite. Retains meaning.",
        instruction: "Rewrite the text to be clear and natural. Avoid robotic phrasing. Keep the meaning but vary the vocabulary.",
        accent: "blue-500",
    },
    ModeConfig {
        id: RewriteMode::Fluency,
        label: "Fluency",
        description: "Improves grammar and flow.",
        instruction: "Fix all grammatical errors and improve the flow. Ensure the text reads smoothly like a native speaker wrote it.",
        accent: "green-500",
    },
    ModeConfig {
        id: RewriteMode::Academic,
        label: "Academic",
        description: "Formal, objective, research-ready.",
        instruction: "Rewrite this for an academic context. Use precise terminology and a formal tone. Use the varied sentence structures typical of human researchers. Strictly maintain the original perspective.",
        accent: "indigo-600",
    },
    ModeConfig {
        id: RewriteMode::Humanize,
        label: "Humanize (Max)",
        description: "Most natural, human-sounding voice.",
        instruction: "Rewrite this text in a natural, distinctly human voice.\n\nINSTRUCTIONS:\n1. BURSTINESS: Mix short, punchy sentences with longer, complex ones.\n2. PERPLEXITY: Use unexpected but fitting vocabulary.\n3. PERSPECTIVE: Strictly maintain the exact original perspective (e.g., 'I' remains 'I').\n4. AVOID STOCK PHRASING: Do not use words like 'delve', 'underscore', 'realm', 'tapestry', 'furthermore'.",
        accent: "rose-500",
    },
    ModeConfig {
        id: RewriteMode::Creative,
        label: "Creative",
        description: "More metaphors and variety.",
        instruction: "Rewrite creatively. Use evocative language and varied sentence rhythms. Make it sound unique and human.",
        accent: "purple-500",
    },
    ModeConfig {
        id: RewriteMode::Formal,
        label: "Formal",
        description: "Professional business tone.",
        instruction: "Rewrite in a professional business tone. Be polite, direct, and sophisticated.",
        accent: "slate-600",
    },
    ModeConfig {
        id: RewriteMode::Shorten,
        label: "Shorten",
        description: "Concise, remove fluff.",
        instruction: "Condense the text while keeping the core message. Be concise and direct.",
        accent: "amber-500",
    },
    ModeConfig {
        id: RewriteMode::Expand,
        label: "Expand",
        description: "Add depth and detail.",
        instruction: "Elaborate on the text. Add relevant context and depth to the explanation while maintaining a natural flow.",
        accent: "cyan-500",
    },
    ModeConfig {
        id: RewriteMode::Simple,
        label: "Simple",
        description: "Plain English, easy to read.",
        instruction: "Simplify the language. Use plain English and shorter sentences for better readability.",
        accent: "teal-500",
    },
];

impl RewriteMode {
    pub fn config(self) -> &'static ModeConfig {
        MODES
            .iter()
            .find(|entry| entry.id == self)
            .unwrap_or(&MODES[2])
    }

    pub fn instruction(self) -> &'static str {
        self.config().instruction
    }

    pub fn label(self) -> &'static str {
        self.config().label
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("tone must be between {MIN_TONE} and {MAX_TONE}, got {0}")]
pub struct ToneOutOfRange(pub i64);

/// Formality slider position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i8")]
pub struct Tone(i8);

impl Tone {
    pub const NEUTRAL: Tone = Tone(0);

    pub fn new(value: i64) -> Result<Self, ToneOutOfRange> {
        if (i64::from(MIN_TONE)..=i64::from(MAX_TONE)).contains(&value) {
            Ok(Self(value as i8))
        } else {
            Err(ToneOutOfRange(value))
        }
    }

    pub fn value(self) -> i8 {
        self.0
    }

    pub fn label(self) -> &'static str {
        match self.0 {
            -2 => "Very Informal",
            -1 => "Informal",
            1 => "Formal",
            2 => "Very Formal",
            _ => "Neutral",
        }
    }

    /// Sentence fragment completing "The desired tone for the output is ...".
    pub fn descriptor(self) -> &'static str {
        match self.0 {
            -2 => "very informal, using conversational language and even slang where appropriate.",
            -1 => "informal and relaxed.",
            1 => "formal and professional.",
            2 => "highly formal, academic, and sophisticated.",
            _ => "neutral and balanced.",
        }
    }

    pub fn all() -> impl Iterator<Item = Tone> {
        (MIN_TONE..=MAX_TONE).map(Tone)
    }
}

impl TryFrom<i64> for Tone {
    type Error = ToneOutOfRange;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Tone::new(value)
    }
}

impl From<Tone> for i8 {
    fn from(tone: Tone) -> Self {
        tone.0
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToneOption {
    pub value: i8,
    pub label: &'static str,
}

pub fn tone_options() -> Vec<ToneOption> {
    Tone::all()
        .map(|tone| ToneOption {
            value: tone.value(),
            label: tone.label(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_covers_every_mode_once() {
        let all = [
            RewriteMode::Standard,
            RewriteMode::Fluency,
            RewriteMode::Academic,
            RewriteMode::Creative,
            RewriteMode::Shorten,
            RewriteMode::Expand,
            RewriteMode::Simple,
            RewriteMode::Formal,
            RewriteMode::Humanize,
        ];
        for mode in all {
            let matches = MODES.iter().filter(|entry| entry.id == mode).count();
            assert_eq!(matches, 1, "{mode:?} should appear exactly once");
            assert_eq!(mode.config().id, mode);
        }
    }

    #[test]
    fn default_mode_is_academic() {
        assert_eq!(RewriteMode::default(), RewriteMode::Academic);
        assert_eq!(RewriteMode::default().label(), "Academic");
    }

    #[test]
    fn humanize_serializes_with_display_identifier() {
        let serialized = serde_json::to_string(&RewriteMode::Humanize).expect("mode should serialize");
        assert_eq!(serialized, "\"Humanize (Max)\"");

        let parsed: RewriteMode =
            serde_json::from_str("\"Humanize (Max)\"").expect("mode should parse");
        assert_eq!(parsed, RewriteMode::Humanize);
    }

    #[test]
    fn tone_rejects_values_outside_slider_range() {
        assert!(Tone::new(-2).is_ok());
        assert!(Tone::new(2).is_ok());
        assert_eq!(Tone::new(3), Err(ToneOutOfRange(3)));
        assert_eq!(Tone::new(-3), Err(ToneOutOfRange(-3)));
        assert!(serde_json::from_str::<Tone>("7").is_err());
    }

    #[test]
    fn tone_lookup_tables_match_slider_positions() {
        let labels: Vec<_> = Tone::all().map(Tone::label).collect();
        assert_eq!(
            labels,
            ["Very Informal", "Informal", "Neutral", "Formal", "Very Formal"]
        );
        assert_eq!(Tone::NEUTRAL.descriptor(), "neutral and balanced.");
        assert_eq!(
            Tone::new(2).expect("valid tone").descriptor(),
            "highly formal, academic, and sophisticated."
        );
    }
}
