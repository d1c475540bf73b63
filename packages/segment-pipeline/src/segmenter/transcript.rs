//! Subtitle parsing and transcript cleanup.
//!
//! Turns SRT subtitles into caption entries or plain text, and optionally
//! strips spoken filler before word segmentation.

use std::sync::LazyLock;
use std::time::Duration;

use regex::{Captures, Regex};

use crate::types::caption::CaptionEntry;

static RE_TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(\d{1,2}):(\d{2}):(\d{2})[,.](\d{1,3})\s*-->\s*(\d{1,2}):(\d{2}):(\d{2})[,.](\d{1,3})",
    )
    .expect("timestamp regex")
});
static RE_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag regex"));
static RE_SPEAKER_MARK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r">>\s*").expect("speaker regex"));
static RE_CENSORED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[ __ \] *").expect("censored regex"));

/// Fillers removed outright, matched case-insensitively on word boundaries.
const FILLER_PATTERNS: &[&str] = &[
    r"\buh+\b",
    r"\bum+\b",
    r"\buhm+\b",
    r"\bah+\b",
    r"\beh+\b",
    r"\ber+\b",
    r"\bhmm+\b",
    r"\byou know\b",
    r"\bI mean\b",
    r"\bkind of\b",
    r"\bsort of\b",
    r"\bbasically\b",
    r"\bactually\b",
    r"\bliterally\b",
    r"\bpretty much\b",
    r"\bmore or less\b",
    r"\bat the end of the day\b",
    r"\bto be honest\b",
    r"\bto tell you the truth\b",
    r"\bif you will\b",
    r"\bso to speak\b",
    r"\bwell,?\s+",
    r"\balright,?\s+",
    r"\bokay,?\s+",
    r"\bright,?\s+",
    r"\blet me see\b",
    r"\blet's see\b",
    r"\bwhat else\b",
];

static RE_FILLERS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    FILLER_PATTERNS
        .iter()
        .map(|p| Regex::new(&format!("(?i){p}")).expect("filler regex"))
        .collect()
});

// "like" survives before "to"; "so" survives before a question word or "that".
static RE_LIKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\blike\b(\s+\w+)?").expect("like regex"));
static RE_SO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bso,?\s+(\w*)").expect("so regex"));

const SO_KEEPS: &[&str] = &["that", "what", "when", "where", "who", "why", "how"];

/// Parse SRT subtitles into caption entries.
///
/// Blocks without a timing line are ignored. Markup, `>>` speaker marks and
/// line breaks inside a cue are flattened.
pub fn parse_srt(content: &str) -> Vec<CaptionEntry> {
    let normalized = content.replace("\r\n", "\n");
    let mut entries = Vec::new();

    for block in normalized.split("\n\n") {
        let mut lines = block.lines().map(str::trim).skip_while(|l| l.is_empty());
        let Some((start, end)) = lines.by_ref().find_map(parse_timing) else {
            continue;
        };

        let text = clean_line(&lines.collect::<Vec<_>>().join(" "));
        if !text.is_empty() {
            entries.push(CaptionEntry::new(start, end, text));
        }
    }

    entries
}

/// Flatten caption entries into plain text, dropping consecutive duplicate lines.
///
/// Auto-generated captions often repeat the previous line as a new cue.
pub fn captions_to_text(entries: &[CaptionEntry]) -> String {
    dedupe_join(entries.iter().map(|e| clean_line(&e.text)))
}

/// Strip an SRT file down to its spoken text.
///
/// Removes sequence numbers, timing lines, markup and `>>` marks, then
/// collapses whitespace.
pub fn clean_srt_text(content: &str) -> String {
    let lines = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter(|l| !l.chars().all(|c| c.is_ascii_digit()))
        .filter(|l| !RE_TIMESTAMP.is_match(l))
        .map(clean_line);

    dedupe_join(lines)
}

/// Remove verbal fillers, hedges and stutters from a transcript.
pub fn remove_fillers(text: &str) -> String {
    let mut out = text.to_string();

    for re in RE_FILLERS.iter() {
        out = re.replace_all(&out, "").into_owned();
    }

    out = RE_LIKE
        .replace_all(&out, |caps: &Captures| match caps.get(1) {
            Some(next) if next.as_str().trim().eq_ignore_ascii_case("to") => caps[0].to_string(),
            Some(next) => next.as_str().to_string(),
            None => String::new(),
        })
        .into_owned();

    out = RE_SO
        .replace_all(&out, |caps: &Captures| {
            let next = caps.get(1).map_or("", |m| m.as_str());
            if SO_KEEPS.iter().any(|k| k.eq_ignore_ascii_case(next)) {
                caps[0].to_string()
            } else {
                next.to_string()
            }
        })
        .into_owned();

    out = RE_CENSORED.replace_all(&out, "").into_owned();

    collapse_stutter(&out)
}

/// Collapse immediately repeated words ("the the the" -> "the").
///
/// Trailing punctuation on the last repeat is kept.
fn collapse_stutter(text: &str) -> String {
    let mut kept: Vec<String> = Vec::new();

    for token in text.split_whitespace() {
        let core = token.trim_end_matches(|c: char| !c.is_alphanumeric() && c != '_');
        let suffix = &token[core.len()..];

        if let Some(last) = kept.last_mut() {
            let is_word = !last.is_empty() && last.chars().all(|c| c.is_alphanumeric() || c == '_');
            if is_word && !core.is_empty() && core.eq_ignore_ascii_case(last) {
                last.push_str(suffix);
                continue;
            }
        }
        kept.push(token.to_string());
    }

    kept.join(" ")
}

fn clean_line(line: &str) -> String {
    let no_tags = RE_TAG.replace_all(line, "");
    let no_marks = RE_SPEAKER_MARK.replace_all(&no_tags, "");
    no_marks.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn dedupe_join(lines: impl Iterator<Item = String>) -> String {
    let mut out: Vec<String> = Vec::new();
    for line in lines {
        if line.is_empty() || out.last() == Some(&line) {
            continue;
        }
        out.push(line);
    }
    out.join(" ")
}

fn parse_timing(line: &str) -> Option<(Duration, Duration)> {
    let caps = RE_TIMESTAMP.captures(line)?;
    let part = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u64>().ok());

    let start = timestamp(part(1)?, part(2)?, part(3)?, caps.get(4)?.as_str())?;
    let end = timestamp(part(5)?, part(6)?, part(7)?, caps.get(8)?.as_str())?;
    Some((start, end))
}

fn timestamp(hours: u64, minutes: u64, seconds: u64, fraction: &str) -> Option<Duration> {
    // "5" means 500ms, "05" means 50ms
    let millis = format!("{fraction:0<3}").parse::<u64>().ok()?;
    Some(Duration::from_millis(
        ((hours * 60 + minutes) * 60 + seconds) * 1000 + millis,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "1\r\n00:00:01,000 --> 00:00:04,500\r\n>> Hello <i>there</i>\r\n\r\n2\r\n00:00:04,500 --> 00:00:07,250\r\nHello there\r\n\r\n3\r\n00:00:07,250 --> 00:00:09,000\r\nnext line\r\nwraps here\r\n";

    #[test]
    fn test_parse_srt_entries() {
        let entries = parse_srt(SAMPLE);

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].start, Duration::from_millis(1000));
        assert_eq!(entries[0].end, Duration::from_millis(4500));
        assert_eq!(entries[0].text, "Hello there");
        assert_eq!(entries[2].text, "next line wraps here");
    }

    #[test]
    fn test_captions_to_text_drops_repeats() {
        let entries = parse_srt(SAMPLE);
        assert_eq!(captions_to_text(&entries), "Hello there next line wraps here");
    }

    #[test]
    fn test_clean_srt_text() {
        assert_eq!(clean_srt_text(SAMPLE), "Hello there next line wraps here");
    }

    #[test]
    fn test_remove_fillers() {
        assert_eq!(
            remove_fillers("Um, I would like to say that uh the the plan works"),
            ", I would like to say that the plan works"
        );
        assert_eq!(remove_fillers("so what happens"), "so what happens");
        assert_eq!(remove_fillers("so we start"), "we start");
        assert_eq!(remove_fillers("it was like huge"), "it was huge");
    }

    #[test]
    fn test_stutter_keeps_punctuation() {
        assert_eq!(collapse_stutter("I I think the the."), "I think the.");
    }
}
