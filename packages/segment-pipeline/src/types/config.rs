//! Configuration types for segmentation and enrichment.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::prompts::ContentKind;

/// Bounds for word-count segmentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordSegmentConfig {
    /// A segment closes once it reaches this many words.
    ///
    /// Default: 8000.
    pub target_words: usize,

    /// A segment closes before it would grow past this many words.
    ///
    /// A single unit larger than this is still emitted whole. Default: 9000.
    pub max_words: usize,

    /// Words repeated at the start of the next segment for context.
    ///
    /// Default: 100.
    pub overlap_words: usize,

    /// A trailing segment smaller than this is merged into its predecessor.
    ///
    /// Default: 3000.
    pub min_final_words: usize,

    /// Words per pseudo-sentence.
    ///
    /// Transcribed speech has no reliable punctuation, so text is cut into
    /// fixed-size word groups instead of real sentences. Default: 40.
    pub unit_words: usize,
}

impl Default for WordSegmentConfig {
    fn default() -> Self {
        Self {
            target_words: 8000,
            max_words: 9000,
            overlap_words: 100,
            min_final_words: 3000,
            unit_words: 40,
        }
    }
}

impl WordSegmentConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set target and maximum words.
    pub fn with_bounds(mut self, target_words: usize, max_words: usize) -> Self {
        self.target_words = target_words;
        self.max_words = max_words;
        self
    }

    /// Set overlap words.
    pub fn with_overlap(mut self, overlap_words: usize) -> Self {
        self.overlap_words = overlap_words;
        self
    }

    /// Set the minimum size of a standalone final segment.
    pub fn with_min_final(mut self, min_final_words: usize) -> Self {
        self.min_final_words = min_final_words;
        self
    }

    /// Set pseudo-sentence size.
    pub fn with_unit_words(mut self, unit_words: usize) -> Self {
        self.unit_words = unit_words;
        self
    }

    /// Check `overlap < target <= max` and that units are non-empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_words == 0 || self.unit_words == 0 || self.min_final_words == 0 {
            return Err(ConfigError::InvalidBounds(
                "target_words, unit_words and min_final_words must be positive".into(),
            ));
        }
        if self.target_words > self.max_words {
            return Err(ConfigError::InvalidBounds(format!(
                "target_words ({}) exceeds max_words ({})",
                self.target_words, self.max_words
            )));
        }
        if self.overlap_words >= self.target_words {
            return Err(ConfigError::InvalidBounds(format!(
                "overlap_words ({}) must be below target_words ({})",
                self.overlap_words, self.target_words
            )));
        }
        Ok(())
    }
}

/// Bounds for fixed-interval time segmentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationSegmentConfig {
    /// Interval length. Segment `k` starts at `k * target_duration`.
    ///
    /// Default: 40 minutes.
    pub target_duration: Duration,

    /// Extra time each interval reaches into the next.
    ///
    /// Default: 60 seconds.
    pub overlap_duration: Duration,

    /// A final interval whose own span is shorter than this is merged into the previous one.
    ///
    /// Default: 20 minutes.
    pub min_final_duration: Duration,
}

impl Default for DurationSegmentConfig {
    fn default() -> Self {
        Self {
            target_duration: Duration::from_secs(40 * 60),
            overlap_duration: Duration::from_secs(60),
            min_final_duration: Duration::from_secs(20 * 60),
        }
    }
}

impl DurationSegmentConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target(mut self, target: Duration) -> Self {
        self.target_duration = target;
        self
    }

    pub fn with_overlap(mut self, overlap: Duration) -> Self {
        self.overlap_duration = overlap;
        self
    }

    pub fn with_min_final(mut self, min_final: Duration) -> Self {
        self.min_final_duration = min_final;
        self
    }

    /// Check the interval is at least one millisecond and longer than the overlap.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_duration.as_millis() == 0 {
            return Err(ConfigError::InvalidBounds(
                "target_duration must be at least 1ms".into(),
            ));
        }
        if self.overlap_duration >= self.target_duration {
            return Err(ConfigError::InvalidBounds(format!(
                "overlap_duration ({:?}) must be below target_duration ({:?})",
                self.overlap_duration, self.target_duration
            )));
        }
        Ok(())
    }
}

/// Settings for generating AI fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// Model identifier passed through to the generator.
    pub model: String,

    /// Sampling temperature.
    pub temperature: f32,

    /// Retries after a rate-limited attempt. Other failures are never retried.
    pub max_retries: u32,

    /// Backoff before retry `n` is `initial_wait * 2^n`.
    pub initial_wait: Duration,

    /// Segments in flight at once.
    pub workers: usize,

    /// Generate the fields of one segment concurrently.
    ///
    /// When true, outstanding calls are bounded by `workers * fields`.
    pub field_fan_out: bool,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4.1-nano".to_string(),
            temperature: 0.5,
            max_retries: 3,
            initial_wait: Duration::from_secs(5),
            workers: 5,
            field_fan_out: true,
        }
    }
}

impl EnrichmentConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_retries(mut self, max_retries: u32, initial_wait: Duration) -> Self {
        self.max_retries = max_retries;
        self.initial_wait = initial_wait;
        self
    }

    /// Set worker pool width. Zero is treated as one.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_field_fan_out(mut self, enabled: bool) -> Self {
        self.field_fan_out = enabled;
        self
    }
}

/// Which segmenter handles caption input.
///
/// Plain text always goes through the word segmenter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentationStrategy {
    /// Word-count bounds over the caption text
    #[default]
    Words,
    /// Fixed media-time intervals
    Duration,
}

impl FromStr for SegmentationStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "words" | "word" => Ok(Self::Words),
            "duration" | "time" => Ok(Self::Duration),
            other => Err(format!("unknown strategy: {other}")),
        }
    }
}

impl FromStr for ContentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "video" => Ok(Self::Video),
            "book" => Ok(Self::Book),
            other => Err(format!("unknown content kind: {other}")),
        }
    }
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub strategy: SegmentationStrategy,
    pub content_kind: ContentKind,
    pub words: WordSegmentConfig,
    pub duration: DurationSegmentConfig,
    pub enrichment: EnrichmentConfig,
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_strategy(mut self, strategy: SegmentationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_content_kind(mut self, kind: ContentKind) -> Self {
        self.content_kind = kind;
        self
    }

    pub fn with_words(mut self, words: WordSegmentConfig) -> Self {
        self.words = words;
        self
    }

    pub fn with_duration(mut self, duration: DurationSegmentConfig) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_enrichment(mut self, enrichment: EnrichmentConfig) -> Self {
        self.enrichment = enrichment;
        self
    }

    /// Validate every segmentation bound.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.words.validate()?;
        self.duration.validate()
    }

    /// Load from environment variables, reading `.env` first if present.
    ///
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let vars = EnvVars { lookup: &lookup };

        if let Some(strategy) = vars.parse("SEGMENT_STRATEGY")? {
            config.strategy = strategy;
        }
        if let Some(kind) = vars.parse("SEGMENT_CONTENT_KIND")? {
            config.content_kind = kind;
        }

        if let Some(v) = vars.parse("SEGMENT_TARGET_WORDS")? {
            config.words.target_words = v;
        }
        if let Some(v) = vars.parse("SEGMENT_MAX_WORDS")? {
            config.words.max_words = v;
        }
        if let Some(v) = vars.parse("SEGMENT_OVERLAP_WORDS")? {
            config.words.overlap_words = v;
        }
        if let Some(v) = vars.parse("SEGMENT_MIN_FINAL_WORDS")? {
            config.words.min_final_words = v;
        }
        if let Some(v) = vars.parse("SEGMENT_UNIT_WORDS")? {
            config.words.unit_words = v;
        }

        if let Some(secs) = vars.parse("SEGMENT_TARGET_SECS")? {
            config.duration.target_duration = Duration::from_secs(secs);
        }
        if let Some(secs) = vars.parse("SEGMENT_OVERLAP_SECS")? {
            config.duration.overlap_duration = Duration::from_secs(secs);
        }
        if let Some(secs) = vars.parse("SEGMENT_MIN_FINAL_SECS")? {
            config.duration.min_final_duration = Duration::from_secs(secs);
        }

        if let Some(model) = lookup("ENRICH_MODEL").filter(|m| !m.trim().is_empty()) {
            config.enrichment.model = model;
        }
        if let Some(v) = vars.parse("ENRICH_TEMPERATURE")? {
            config.enrichment.temperature = v;
        }
        if let Some(v) = vars.parse("ENRICH_MAX_RETRIES")? {
            config.enrichment.max_retries = v;
        }
        if let Some(ms) = vars.parse("ENRICH_INITIAL_WAIT_MS")? {
            config.enrichment.initial_wait = Duration::from_millis(ms);
        }
        if let Some(v) = vars.parse::<usize>("ENRICH_WORKERS")? {
            config.enrichment.workers = v.max(1);
        }
        if let Some(v) = vars.parse("ENRICH_FIELD_FAN_OUT")? {
            config.enrichment.field_fan_out = v;
        }

        config.validate()?;
        Ok(config)
    }
}

struct EnvVars<'a, F: Fn(&str) -> Option<String>> {
    lookup: &'a F,
}

impl<F: Fn(&str) -> Option<String>> EnvVars<'_, F> {
    fn parse<T: FromStr>(&self, name: &str) -> Result<Option<T>, ConfigError> {
        match (self.lookup)(name) {
            None => Ok(None),
            Some(raw) if raw.trim().is_empty() => Ok(None),
            Some(raw) => raw
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| ConfigError::InvalidEnv {
                    name: name.to_string(),
                    value: raw,
                }),
        }
    }
}
