use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::EstimationError;

/// Strips a surrounding Markdown code fence (with or without a language tag).
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

/// Returns the first balanced `{...}` or `[...]` block in `text`, honoring string
/// literals and escapes.
fn first_balanced_block(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_quote = false;
    let mut escape = false;
    let mut start = None;

    for (i, c) in text.char_indices() {
        if escape {
            escape = false;
            continue;
        }
        if in_quote {
            match c {
                '\\' => escape = true,
                '"' => in_quote = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' if start.is_some() => in_quote = true,
            '{' | '[' => {
                if start.is_none() {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' | ']' if start.is_some() => {
                depth -= 1;
                if depth == 0 {
                    return start.map(|s| &text[s..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Pulls a JSON value out of model output: first the whole (fence-stripped) text,
/// then the first balanced object or array inside it.
pub fn extract_json(text: &str) -> Option<Value> {
    let body = strip_code_fence(text);
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        return Some(value);
    }
    first_balanced_block(body).and_then(|block| serde_json::from_str(block).ok())
}

/// Extracts and deserializes model output into `T`. Anything that is not valid JSON
/// of the expected shape is a [`EstimationError::MalformedExternalResponse`].
pub fn parse_llm_json<T: DeserializeOwned>(text: &str) -> Result<T, EstimationError> {
    let value = extract_json(text)
        .ok_or_else(|| EstimationError::MalformedExternalResponse("no JSON found in response".to_string()))?;
    serde_json::from_value(value).map_err(|e| EstimationError::MalformedExternalResponse(e.to_string()))
}
