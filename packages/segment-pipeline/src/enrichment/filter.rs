//! Post-processing applied to every generated value before it is stored.

use crate::types::segment::FieldName;

/// Clean a raw model response for one field.
///
/// Returns `None` when nothing usable remains.
pub fn filter_response(field: FieldName, raw: &str) -> Option<String> {
    let trimmed = raw.trim();

    let cleaned = match field {
        FieldName::Title => strip_wrapping_quotes(trimmed).trim(),
        _ => trimmed,
    };

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

fn strip_wrapping_quotes(text: &str) -> &str {
    const PAIRS: &[(char, char)] = &[('"', '"'), ('\'', '\''), ('\u{201c}', '\u{201d}')];

    for (open, close) in PAIRS {
        if let Some(inner) = text
            .strip_prefix(*open)
            .and_then(|rest| rest.strip_suffix(*close))
        {
            return inner;
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_loses_quotes() {
        assert_eq!(
            filter_response(FieldName::Title, "  \"Budget Debate Opens\"\n"),
            Some("Budget Debate Opens".to_string())
        );
        assert_eq!(
            filter_response(FieldName::Title, "\u{201c}Curly\u{201d}"),
            Some("Curly".to_string())
        );
    }

    #[test]
    fn test_body_fields_keep_quotes() {
        assert_eq!(
            filter_response(FieldName::Field2, "\"quoted\" start"),
            Some("\"quoted\" start".to_string())
        );
    }

    #[test]
    fn test_blank_is_rejected() {
        assert_eq!(filter_response(FieldName::Field1, "   \n"), None);
        assert_eq!(filter_response(FieldName::Title, "\"\""), None);
    }
}
