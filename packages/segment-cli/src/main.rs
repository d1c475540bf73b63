//! Segmentation CLI
//!
//! Segments text or subtitle files and prints the result as JSON on stdout.
//! `run` also enriches the segments through OpenAI (needs `OPENAI_API_KEY`).
//! Logs go to stderr; configure with `RUST_LOG`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use segment_pipeline::{
    parse_srt, remove_fillers, segment_source, ContentKind, EnrichFilter, MemoryStore,
    OpenAIGenerator, Pipeline, PipelineConfig, RunReport, Segment, SegmentDraft,
    SegmentationStrategy, SourceDocument,
};

#[derive(Parser)]
#[command(name = "segment")]
#[command(about = "Segment transcripts and chapters, optionally enriching them with AI fields")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Segment a plain text file by word count
    Words {
        file: PathBuf,

        /// Strip spoken filler words first
        #[arg(long)]
        remove_fillers: bool,

        #[command(flatten)]
        bounds: WordBounds,
    },

    /// Segment an SRT subtitle file
    Srt {
        file: PathBuf,

        /// `duration` (fixed time intervals) or `words`
        #[arg(long, default_value = "duration")]
        strategy: SegmentationStrategy,

        #[command(flatten)]
        bounds: WordBounds,
    },

    /// Segment, enrich and optionally reorder a document in memory
    Run {
        file: PathBuf,

        /// Treat the file as SRT subtitles
        #[arg(long)]
        srt: bool,

        /// Strategy for SRT input: `words` or `duration`
        #[arg(long)]
        strategy: Option<SegmentationStrategy>,

        /// `video` or `book`; selects the prompt set
        #[arg(long)]
        kind: Option<ContentKind>,

        /// Document id used in logs
        #[arg(long, default_value = "cli")]
        doc_id: String,

        /// Reorder after enrichment, e.g. `3,1,4,2`
        #[arg(long, value_delimiter = ',')]
        reorder: Option<Vec<i64>>,

        #[command(flatten)]
        bounds: WordBounds,
    },
}

/// Overrides for the word segmenter. Unset flags keep the env/default value.
#[derive(Args)]
struct WordBounds {
    #[arg(long)]
    target_words: Option<usize>,

    #[arg(long)]
    max_words: Option<usize>,

    #[arg(long)]
    overlap_words: Option<usize>,

    #[arg(long)]
    min_final_words: Option<usize>,
}

impl WordBounds {
    fn apply(&self, mut config: PipelineConfig) -> Result<PipelineConfig> {
        let words = &mut config.words;
        words.target_words = self.target_words.unwrap_or(words.target_words);
        words.max_words = self.max_words.unwrap_or(words.max_words);
        words.overlap_words = self.overlap_words.unwrap_or(words.overlap_words);
        words.min_final_words = self.min_final_words.unwrap_or(words.min_final_words);

        config.validate().context("Invalid segmentation bounds")?;
        Ok(config)
    }
}

#[derive(Serialize)]
struct SegmentsOutput {
    segments: Vec<SegmentDraft>,
}

#[derive(Serialize)]
struct RunOutput {
    summary: String,
    report: RunReport,
    segments: Vec<Segment>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,segment_pipeline=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = PipelineConfig::from_env().context("Failed to load pipeline config")?;

    match cli.command {
        Commands::Words {
            file,
            remove_fillers: strip,
            bounds,
        } => {
            let config = bounds.apply(config)?;
            let mut text = read_file(&file)?;
            if strip {
                text = remove_fillers(&text);
            }

            let segments = segment_source(&SourceDocument::Text(text), &config);
            print_json(&SegmentsOutput { segments })
        }

        Commands::Srt {
            file,
            strategy,
            bounds,
        } => {
            let config = bounds.apply(config.with_strategy(strategy))?;
            let source = SourceDocument::Captions(parse_srt(&read_file(&file)?));

            let segments = segment_source(&source, &config);
            print_json(&SegmentsOutput { segments })
        }

        Commands::Run {
            file,
            srt,
            strategy,
            kind,
            doc_id,
            reorder,
            bounds,
        } => {
            let mut config = bounds.apply(config)?;
            if let Some(kind) = kind {
                config = config.with_content_kind(kind);
            }
            if let Some(strategy) = strategy {
                config = config.with_strategy(strategy);
            }

            let content = read_file(&file)?;
            let source = if srt {
                SourceDocument::Captions(parse_srt(&content))
            } else {
                SourceDocument::Text(content)
            };

            let generator = OpenAIGenerator::from_env().context("OpenAI is not configured")?;
            let pipeline = Pipeline::new(Arc::new(MemoryStore::new()), Arc::new(generator), config)
                .context("Failed to build pipeline")?;

            let mut report = pipeline
                .full(&doc_id, &source)
                .await
                .with_context(|| format!("Pipeline failed for {}", file.display()))?;
            tracing::info!(doc_id = %doc_id, "{}", report.summary());

            if !report.enrichment.is_success() {
                tracing::info!(doc_id = %doc_id, "retrying unprocessed segments");
                let retry = pipeline
                    .enrich_only(&doc_id, EnrichFilter::Unprocessed)
                    .await
                    .context("Retry of unprocessed segments failed")?;
                report.enrichment.merge_retry(retry);
            }

            if let Some(order) = reorder {
                pipeline
                    .reorder(&doc_id, &order)
                    .await
                    .context("Reorder failed")?;
            }

            let segments = pipeline.segments(&doc_id).await?;
            print_json(&RunOutput {
                summary: report.summary(),
                report,
                segments,
            })
        }
    }
}

fn read_file(path: &Path) -> Result<String> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    if content.trim().is_empty() {
        bail!("{} is empty", path.display());
    }
    Ok(content)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
