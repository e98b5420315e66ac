use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Processing lifecycle of an uploaded podcast.
///
/// Transitions are monotonic: `uploaded -> processing -> completed`
/// or `uploaded -> processing -> failed`. `completed` and `failed`
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PodcastStatus {
    Uploaded,
    Processing,
    Completed,
    Failed,
}

impl Default for PodcastStatus {
    fn default() -> Self {
        Self::Uploaded
    }
}

impl PodcastStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether moving from `self` to `next` is one of the allowed
    /// monotonic transitions.
    pub fn can_transition_to(&self, next: PodcastStatus) -> bool {
        matches!(
            (self, next),
            (Self::Uploaded, Self::Processing)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
        )
    }
}

impl std::fmt::Display for PodcastStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PodcastStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uploaded" => Ok(Self::Uploaded),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(StoreError::Validation(format!(
                "unknown podcast status '{}'",
                s
            ))),
        }
    }
}

/// Coarse bias rating derived from `bias_score` by the analyzer.
///
/// Thresholds: a score of 20 or less is Low, under 50 is Moderate,
/// otherwise High.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BiasLevel {
    Low,
    Moderate,
    High,
}

impl BiasLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Moderate => "Moderate",
            Self::High => "High",
        }
    }

    /// The level the analyzer's thresholds assign to a score.
    pub fn for_score(score: i64) -> Self {
        if score <= 20 {
            Self::Low
        } else if score < 50 {
            Self::Moderate
        } else {
            Self::High
        }
    }
}

impl std::fmt::Display for BiasLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BiasLevel {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Low" => Ok(Self::Low),
            "Moderate" => Ok(Self::Moderate),
            "High" => Ok(Self::High),
            _ => Err(StoreError::Validation(format!(
                "unknown bias level '{}'",
                s
            ))),
        }
    }
}

/// Lexicon category a flagged phrase belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiasCategory {
    PoliticalLeft,
    PoliticalRight,
    Gender,
    Loaded,
    Weasel,
}

impl BiasCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PoliticalLeft => "political_left",
            Self::PoliticalRight => "political_right",
            Self::Gender => "gender",
            Self::Loaded => "loaded",
            Self::Weasel => "weasel",
        }
    }
}

impl std::fmt::Display for BiasCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BiasCategory {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "political_left" => Ok(Self::PoliticalLeft),
            "political_right" => Ok(Self::PoliticalRight),
            "gender" => Ok(Self::Gender),
            "loaded" => Ok(Self::Loaded),
            "weasel" => Ok(Self::Weasel),
            _ => Err(StoreError::Validation(format!(
                "unknown bias category '{}'",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Severity {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(StoreError::Validation(format!("unknown severity '{}'", s))),
        }
    }
}

/// An uploaded audio asset and its processing state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Podcast {
    pub id: String,
    pub filename: String,
    pub original_filename: Option<String>,
    pub file_size: i64,
    pub duration: Option<f64>,
    pub language: String,
    pub upload_date: String,
    pub file_path: String,
    pub transcript_path: Option<String>,
    pub status: PodcastStatus,
    pub error_message: Option<String>,
}

/// Metadata supplied by the ingester when registering an upload.
///
/// `id` is optional: the ingester may assign its own UUID, otherwise
/// the store generates a v4. `upload_date` defaults to now.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewPodcast {
    pub id: Option<String>,
    pub filename: String,
    pub original_filename: Option<String>,
    pub file_size: i64,
    pub duration: Option<f64>,
    pub language: Option<String>,
    pub upload_date: Option<chrono::DateTime<chrono::Utc>>,
    pub file_path: String,
    pub transcript_path: Option<String>,
}

/// One scoring run's aggregate results for a podcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub id: i64,
    pub podcast_id: String,
    pub sentiment_positive_pct: f64,
    pub sentiment_neutral_pct: f64,
    pub sentiment_negative_pct: f64,
    pub sentiment_score: f64,
    pub dominant_tone: String,
    pub tone_calm_pct: f64,
    pub tone_aggressive_pct: f64,
    pub tone_persuasive_pct: f64,
    pub tone_anxious_pct: f64,
    pub tone_confident_pct: f64,
    pub tone_excited_pct: f64,
    pub bias_score: i64,
    pub bias_level: BiasLevel,
    pub bias_flags_count: i64,
    pub processing_time: Option<f64>,
    pub created_at: String,
    pub result_json_path: Option<String>,
}

/// Metrics computed by the analysis pipeline for one scoring run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAnalysis {
    pub sentiment_positive_pct: f64,
    pub sentiment_neutral_pct: f64,
    pub sentiment_negative_pct: f64,
    pub sentiment_score: f64,
    pub dominant_tone: String,
    pub tone_calm_pct: f64,
    pub tone_aggressive_pct: f64,
    pub tone_persuasive_pct: f64,
    pub tone_anxious_pct: f64,
    pub tone_confident_pct: f64,
    pub tone_excited_pct: f64,
    pub bias_score: i64,
    pub bias_level: BiasLevel,
    pub processing_time: Option<f64>,
    pub result_json_path: Option<String>,
}

/// One detected biased phrase instance within an analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiasFlag {
    pub id: i64,
    pub analysis_id: i64,
    pub phrase: String,
    pub category: BiasCategory,
    pub severity: Severity,
    pub sentence: Option<String>,
    pub context: Option<String>,
    pub timestamp: String,
    pub timestamp_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBiasFlag {
    pub phrase: String,
    pub category: BiasCategory,
    pub severity: Severity,
    pub sentence: Option<String>,
    pub context: Option<String>,
    pub timestamp: String,
    pub timestamp_seconds: f64,
}

/// Aggregate counts across the whole store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_podcasts: i64,
    pub total_analyses: i64,
    pub avg_bias_score: f64,
    pub avg_sentiment_score: f64,
}

fn timestamp_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{1,4}):([0-5]\d)$").unwrap())
}

fn language_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z]{2,3}(-[A-Z]{2})?$").unwrap())
}

/// Parse a display timestamp like `"02:05"` into whole seconds.
pub fn parse_timestamp(ts: &str) -> Result<f64, StoreError> {
    let caps = timestamp_re().captures(ts).ok_or_else(|| {
        StoreError::Validation(format!("timestamp '{}' is not in MM:SS format", ts))
    })?;
    // Capture groups are all-digit, parse cannot fail
    let minutes: f64 = caps[1].parse().unwrap();
    let seconds: f64 = caps[2].parse().unwrap();
    Ok(minutes * 60.0 + seconds)
}

/// Validate a language tag (`en`, `pt-BR`, ...).
pub fn is_valid_language(lang: &str) -> bool {
    language_re().is_match(lang)
}
