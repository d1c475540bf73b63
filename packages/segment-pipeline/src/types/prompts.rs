//! Prompt templates for per-field enrichment.
//!
//! Each field gets its own prompt and output budget. Video segments carry a
//! short title plus three analysis fields; book sections already have a
//! chapter title, so their prompt set omits it.

use serde::{Deserialize, Serialize};

use crate::types::segment::FieldName;

/// Placeholder replaced with the segment text when a prompt is rendered.
pub const TEXT_PLACEHOLDER: &str = "{segment_text}";

/// Output budget for the title field.
pub const MAX_TOKENS_TITLE: u32 = 50;

/// Output budget for the analysis fields.
pub const MAX_TOKENS_OTHER: u32 = 200;

pub const VIDEO_PROMPT_TITLE: &str = "Create a concise title (max 10 words) that captures the main topic of this video segment.

Segment text:
{segment_text}

Generate only the title, no additional text.";

pub const VIDEO_PROMPT_SUMMARY: &str = "Provide a high-level summary (2-3 sentences) of this video segment.

Segment text:
{segment_text}

Focus on the main ideas and key takeaways.";

pub const VIDEO_PROMPT_KEY_POINTS: &str = "List the key points discussed in this video segment as bullet points.

Segment text:
{segment_text}

Provide 3-5 bullet points, each focusing on a distinct idea or fact mentioned.";

pub const VIDEO_PROMPT_TOPICS: &str = "Identify the main topics or themes covered in this video segment.

Segment text:
{segment_text}

Provide a comma-separated list of 3-5 topics or themes.";

pub const BOOK_PROMPT_SUMMARY: &str = "Provide a comprehensive summary (2-3 sentences) of this book chapter section.

Chapter section:
{segment_text}

Focus on the main concepts, arguments, or narrative developments presented.";

pub const BOOK_PROMPT_CONCEPTS: &str = "Identify and explain the important concepts, definitions, or ideas in this book chapter section.

Chapter section:
{segment_text}

List 3-5 key concepts as bullet points, with brief explanations where relevant.";

pub const BOOK_PROMPT_INSIGHTS: &str = "Extract the key insights, lessons, or takeaways from this book chapter section.

Chapter section:
{segment_text}

Provide 3-5 actionable insights or important lessons that a reader should remember.";

/// What kind of content a document holds. Selects the prompt set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// Transcribed video (subtitles)
    #[default]
    Video,
    /// Book chapter text
    Book,
}

/// Prompt for one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldPrompt {
    /// Field this prompt fills
    pub field: FieldName,

    /// Human-readable label
    pub label: String,

    /// Template containing [`TEXT_PLACEHOLDER`]
    pub template: String,

    /// Maximum output tokens
    pub max_tokens: u32,
}

impl FieldPrompt {
    /// Create a field prompt.
    pub fn new(
        field: FieldName,
        label: impl Into<String>,
        template: impl Into<String>,
        max_tokens: u32,
    ) -> Self {
        Self {
            field,
            label: label.into(),
            template: template.into(),
            max_tokens,
        }
    }

    /// Render the prompt for a segment.
    ///
    /// Templates without the placeholder get the text appended after a
    /// `Text:` header.
    pub fn render(&self, text: &str) -> String {
        if self.template.contains(TEXT_PLACEHOLDER) {
            self.template.replace(TEXT_PLACEHOLDER, text)
        } else {
            format!("{}\n\nText:\n{}", self.template, text)
        }
    }
}

/// The ordered set of field prompts used for one enrichment run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptSet {
    prompts: Vec<FieldPrompt>,
}

impl PromptSet {
    /// Build a prompt set. A later prompt for the same field replaces an earlier one.
    pub fn new(prompts: impl IntoIterator<Item = FieldPrompt>) -> Self {
        let mut set: Vec<FieldPrompt> = Vec::new();
        for prompt in prompts {
            match set.iter_mut().find(|p| p.field == prompt.field) {
                Some(existing) => *existing = prompt,
                None => set.push(prompt),
            }
        }
        Self { prompts: set }
    }

    /// Prompts for video segments (title + three fields).
    pub fn video() -> Self {
        Self::new([
            FieldPrompt::new(
                FieldName::Title,
                "Short Title",
                VIDEO_PROMPT_TITLE,
                MAX_TOKENS_TITLE,
            ),
            FieldPrompt::new(
                FieldName::Field1,
                "High-Level Summary",
                VIDEO_PROMPT_SUMMARY,
                MAX_TOKENS_OTHER,
            ),
            FieldPrompt::new(
                FieldName::Field2,
                "Key Points",
                VIDEO_PROMPT_KEY_POINTS,
                MAX_TOKENS_OTHER,
            ),
            FieldPrompt::new(
                FieldName::Field3,
                "Topics/Themes",
                VIDEO_PROMPT_TOPICS,
                MAX_TOKENS_OTHER,
            ),
        ])
    }

    /// Prompts for book sections (no title).
    pub fn book() -> Self {
        Self::new([
            FieldPrompt::new(
                FieldName::Field1,
                "Chapter Summary",
                BOOK_PROMPT_SUMMARY,
                MAX_TOKENS_OTHER,
            ),
            FieldPrompt::new(
                FieldName::Field2,
                "Important Concepts",
                BOOK_PROMPT_CONCEPTS,
                MAX_TOKENS_OTHER,
            ),
            FieldPrompt::new(
                FieldName::Field3,
                "Key Insights",
                BOOK_PROMPT_INSIGHTS,
                MAX_TOKENS_OTHER,
            ),
        ])
    }

    /// Default prompt set for a content kind.
    pub fn for_kind(kind: ContentKind) -> Self {
        match kind {
            ContentKind::Video => Self::video(),
            ContentKind::Book => Self::book(),
        }
    }

    /// Override the output budget of every prompt for `field`.
    pub fn with_max_tokens(mut self, field: FieldName, max_tokens: u32) -> Self {
        for prompt in self.prompts.iter_mut().filter(|p| p.field == field) {
            prompt.max_tokens = max_tokens;
        }
        self
    }

    /// Fields this set produces; a segment is processed once all are set.
    pub fn required_fields(&self) -> Vec<FieldName> {
        self.prompts.iter().map(|p| p.field).collect()
    }

    pub fn get(&self, field: FieldName) -> Option<&FieldPrompt> {
        self.prompts.iter().find(|p| p.field == field)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldPrompt> {
        self.prompts.iter()
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }
}
