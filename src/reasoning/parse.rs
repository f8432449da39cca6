//! Lenient JSON extraction from model output
//!
//! Models wrap JSON in fences, prepend chatter or leave trailing commas.
//! Parsing tries, in order: the outermost `{...}` span, the same span after
//! light repairs, then the first balanced object in the text.

use super::ReasoningError;
use crate::util::truncate_str;
use serde::de::DeserializeOwned;

/// Strip markdown code fences from a response
fn strip_markdown_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let clean = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let clean = clean.strip_suffix("```").unwrap_or(clean);
    clean.trim()
}

/// Span between the first `open` and the last `close`
fn extract_json_fragment(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    if start <= end {
        Some(&text[start..=end])
    } else {
        None
    }
}

/// First brace-balanced object, skipping braces inside string literals.
fn extract_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Repair the mistakes models make most often
fn fix_json_issues(json: &str) -> String {
    let mut fixed = json.to_string();

    // Trailing commas before ] or }
    for (from, to) in [(",]", "]"), (",}", "}"), (",\n]", "\n]"), (",\n}", "\n}")] {
        fixed = fixed.replace(from, to);
    }

    // Smart quotes
    fixed = fixed.replace(['\u{201C}', '\u{201D}'], "\"");
    fixed = fixed.replace(['\u{2018}', '\u{2019}'], "'");

    fixed
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}

/// Parse a JSON object of type `T` out of a model response.
pub fn parse_json_object<T>(response: &str, context: &str) -> Result<T, ReasoningError>
where
    T: DeserializeOwned,
{
    let clean = strip_markdown_fences(response);
    let fragment = extract_json_fragment(clean, '{', '}').ok_or_else(|| {
        ReasoningError::Malformed(format!(
            "no JSON object in {} response: {}",
            context,
            truncate_str(clean, 200)
        ))
    })?;

    let initial_error = match serde_json::from_str::<T>(fragment) {
        Ok(parsed) => return Ok(parsed),
        Err(err) => err,
    };

    let fixed = fix_json_issues(fragment);
    if let Ok(parsed) = serde_json::from_str::<T>(&fixed) {
        return Ok(parsed);
    }

    if let Some(balanced) = extract_balanced_object(clean) {
        if let Ok(parsed) = serde_json::from_str::<T>(&fix_json_issues(balanced)) {
            return Ok(parsed);
        }
    }

    Err(ReasoningError::Malformed(format!(
        "invalid JSON in {} response ({}): {}",
        context,
        initial_error,
        truncate_str(fragment, 200)
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        name: String,
        #[serde(default)]
        items: Vec<u32>,
    }

    #[test]
    fn test_plain_object() {
        let sample: Sample = parse_json_object(r#"{"name": "a", "items": [1]}"#, "test").unwrap();
        assert_eq!(sample.name, "a");
        assert_eq!(sample.items, vec![1]);
    }

    #[test]
    fn test_fenced_with_chatter() {
        let response = "Here you go:\n```json\n{\"name\": \"b\"}\n```";
        let sample: Sample = parse_json_object(response, "test").unwrap();
        assert_eq!(sample.name, "b");
    }

    #[test]
    fn test_trailing_commas_and_smart_quotes() {
        let response = "{\u{201C}name\u{201D}: \"c\", \"items\": [1, 2,],}";
        let sample: Sample = parse_json_object(response, "test").unwrap();
        assert_eq!(sample.items, vec![1, 2]);
    }

    #[test]
    fn test_balanced_object_before_trailing_noise() {
        let response = r#"{"name": "d {x}"} and also {"other": true}"#;
        let sample: Sample = parse_json_object(response, "test").unwrap();
        assert_eq!(sample.name, "d {x}");
    }

    #[test]
    fn test_no_object_is_malformed() {
        let err = parse_json_object::<Sample>("I cannot help with that", "analysis").unwrap_err();
        assert!(matches!(err, ReasoningError::Malformed(_)));
        assert!(err.to_string().contains("analysis"));
    }
}
