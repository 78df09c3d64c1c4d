//! Pull a JSON document out of free-form model text.
//!
//! Models frequently wrap their answer in Markdown fences or surround it with
//! prose. Candidates are located by a fixed list of strategies, first match wins:
//! a fence labelled `json`, then any fence, then the raw text itself.

use serde_json::Value;

const FENCE: &str = "```";

/// How a JSON candidate was located in the model response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStrategy {
    /// Interior of a ```` ```json ```` fenced block.
    FencedJson,
    /// Interior of the first fenced block with no or another label.
    FencedGeneric,
    /// The whole response, unmodified.
    Raw,
}

impl ExtractionStrategy {
    /// Strategies in the order they are tried.
    pub const ORDER: [ExtractionStrategy; 3] = [Self::FencedJson, Self::FencedGeneric, Self::Raw];

    /// Apply this strategy, returning the candidate text if it is applicable.
    pub fn apply<'a>(&self, text: &'a str) -> Option<&'a str> {
        match self {
            Self::FencedJson => fenced_json(text),
            Self::FencedGeneric => fenced_generic(text),
            Self::Raw => Some(text),
        }
    }
}

/// Find the first fence whose label is exactly `json` (any case).
///
/// The label may run straight into the body when the body opens with `{` or `[`.
fn fenced_json(text: &str) -> Option<&str> {
    let mut search_from = 0usize;
    while let Some(rel) = text[search_from..].find(FENCE) {
        let open = search_from + rel;
        let after_fence = open + FENCE.len();
        let rest = &text[after_fence..];
        let labelled = rest
            .get(..4)
            .is_some_and(|label| label.eq_ignore_ascii_case("json"))
            && rest[4..]
                .chars()
                .next()
                .map_or(true, |c| c.is_whitespace() || c == '{' || c == '[');
        if labelled {
            let body_start = after_fence + 4;
            let close = text[body_start..].find(FENCE)?;
            return Some(&text[body_start..body_start + close]);
        }
        search_from = after_fence;
    }
    None
}

/// Find the first fenced block and skip an info-string label on its opening line.
fn fenced_generic(text: &str) -> Option<&str> {
    let open = text.find(FENCE)?;
    let body_start = open + FENCE.len();
    let close = text[body_start..].find(FENCE)?;
    let body = &text[body_start..body_start + close];

    if let Some(newline) = body.find('\n') {
        let first_line = body[..newline].trim();
        let is_label = !first_line.is_empty()
            && !first_line.starts_with(['{', '['])
            && !first_line.contains(char::is_whitespace);
        if is_label {
            return Some(&body[newline + 1..]);
        }
    }
    Some(body)
}

/// Locate the JSON candidate in `text`, trimmed of surrounding whitespace.
pub fn extract_candidate(text: &str) -> (ExtractionStrategy, &str) {
    for strategy in ExtractionStrategy::ORDER {
        if let Some(candidate) = strategy.apply(text) {
            return (strategy, candidate.trim());
        }
    }
    (ExtractionStrategy::Raw, text.trim())
}

/// Extract and parse the JSON candidate from `text`.
///
/// Parse failures are returned, never raised, so callers can treat them as retryable.
pub fn parse_candidate(text: &str) -> Result<(ExtractionStrategy, Value), serde_json::Error> {
    let (strategy, candidate) = extract_candidate(text);
    let value = serde_json::from_str::<Value>(candidate)?;
    Ok((strategy, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prefers_json_labelled_fence() {
        let text = "prefix text\n```json\n{\"a\":1}\n```\nsuffix";
        let (strategy, value) = parse_candidate(text).unwrap();
        assert_eq!(strategy, ExtractionStrategy::FencedJson);
        assert_eq!(value, json!({"a": 1}));
    }

    #[test]
    fn json_fence_wins_over_earlier_generic_fence() {
        let text = "```text\nnot json\n```\nthen\n```JSON\n{\"b\": true}\n```";
        let (strategy, value) = parse_candidate(text).unwrap();
        assert_eq!(strategy, ExtractionStrategy::FencedJson);
        assert_eq!(value, json!({"b": true}));
    }

    #[test]
    fn json_label_may_touch_the_body() {
        assert_eq!(
            extract_candidate("```json{\"a\":1}```"),
            (ExtractionStrategy::FencedJson, "{\"a\":1}")
        );
        let (strategy, value) = parse_candidate("Here:\n```JSON[1, 2]\n```").unwrap();
        assert_eq!(strategy, ExtractionStrategy::FencedJson);
        assert_eq!(value, serde_json::json!([1, 2]));
    }

    #[test]
    fn jsonc_label_is_not_a_json_fence() {
        let text = "```jsonc\n{\"a\": 1}\n```";
        assert_eq!(
            extract_candidate(text),
            (ExtractionStrategy::FencedGeneric, "{\"a\": 1}")
        );
    }

    #[test]
    fn generic_fence_without_label() {
        let text = "Here you go:\n```\n{\"a\": [1, 2]}\n```";
        let (strategy, value) = parse_candidate(text).unwrap();
        assert_eq!(strategy, ExtractionStrategy::FencedGeneric);
        assert_eq!(value, json!({"a": [1, 2]}));
    }

    #[test]
    fn generic_fence_with_inline_body() {
        let (strategy, candidate) = extract_candidate("```{\"a\": 1}```");
        assert_eq!(strategy, ExtractionStrategy::FencedGeneric);
        assert_eq!(candidate, "{\"a\": 1}");
    }

    #[test]
    fn unclosed_fence_falls_back_to_raw() {
        let (strategy, candidate) = extract_candidate("  ```json\n{\"a\": 1}  ");
        assert_eq!(strategy, ExtractionStrategy::Raw);
        assert_eq!(candidate, "```json\n{\"a\": 1}");
    }

    #[test]
    fn bare_json_uses_raw_text() {
        let (strategy, value) = parse_candidate("\n  {\"a\": \"x\"}\n").unwrap();
        assert_eq!(strategy, ExtractionStrategy::Raw);
        assert_eq!(value, json!({"a": "x"}));
    }

    #[test]
    fn prose_is_a_parse_error() {
        assert!(parse_candidate("I cannot analyse this image.").is_err());
    }
}
