//! Lenient decoding of model output into the shapes cognition needs.
//!
//! Models wrap JSON in code fences or chatter around it even in JSON mode,
//! so every parser first cuts the outermost JSON value out of the text.

use serde_json::{Map, Value};

use reverie_core::Triple;

use crate::error::LlmError;
use crate::types::{FocalPointsResponse, PoignancyResponse, ThoughtResponse, TripleResponse};

/// Return the outermost JSON object or array in `text`.
///
/// # Errors
///
/// [`LlmError::ParseError`] when no bracketed span exists.
pub fn extract_json(text: &str) -> Result<&str, LlmError> {
    let start = text
        .find(['{', '['])
        .ok_or_else(|| LlmError::ParseError(format!("no JSON in response: '{text}'")))?;
    let close = if text[start..].starts_with('{') { '}' } else { ']' };
    let end = text
        .rfind(close)
        .filter(|end| *end > start)
        .ok_or_else(|| LlmError::ParseError(format!("unterminated JSON in response: '{text}'")))?;
    Ok(&text[start..=end])
}

fn decode<T: serde::de::DeserializeOwned>(text: &str) -> Result<T, LlmError> {
    let json = extract_json(text)?;
    serde_json::from_str(json).map_err(|e| LlmError::ParseError(format!("{e}: '{json}'")))
}

/// Focal points from `{"focal_points": [...]}` or a bare array, trimmed,
/// blanks dropped, at most `n`.
///
/// # Errors
///
/// Parse failure, or no usable statement.
pub fn focal_points(text: &str, n: usize) -> Result<Vec<String>, LlmError> {
    let json = extract_json(text)?;
    let raw = if json.starts_with('[') {
        serde_json::from_str::<Vec<String>>(json)
    } else {
        serde_json::from_str::<FocalPointsResponse>(json).map(|r| r.focal_points)
    }
    .map_err(|e| LlmError::ParseError(format!("{e}: '{json}'")))?;

    let points: Vec<String> = raw
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .take(n)
        .collect();
    if points.is_empty() {
        return Err(LlmError::SchemaValidation("no focal points".into()));
    }
    Ok(points)
}

/// The insight mapping, with evidence written as `"1, 5, 3"` converted
/// to an index array. Entry validation happens in the reflection engine.
///
/// # Errors
///
/// Parse failure, or a top-level value that is not an object.
pub fn insights(text: &str) -> Result<Value, LlmError> {
    let value: Value = decode(text)?;
    let Value::Object(map) = value else {
        return Err(LlmError::SchemaValidation(format!("insights must be an object, got {value}")));
    };

    let normalized: Map<String, Value> = map
        .into_iter()
        .map(|(insight, evidence)| {
            let evidence = match evidence {
                Value::String(list) => index_list(&list).unwrap_or(Value::String(list)),
                other => other,
            };
            (insight, evidence)
        })
        .collect();
    Ok(Value::Object(normalized))
}

fn index_list(list: &str) -> Option<Value> {
    list.split(',')
        .map(|part| part.trim().parse::<u64>().ok().map(Value::from))
        .collect::<Option<Vec<_>>>()
        .map(Value::Array)
}

/// A triple with every part non-blank.
///
/// # Errors
///
/// Parse failure, or a blank part.
pub fn triple(text: &str) -> Result<Triple, LlmError> {
    let r: TripleResponse = decode(text)?;
    let parts = [r.subject.trim(), r.predicate.trim(), r.object.trim()];
    if parts.iter().any(|p| p.is_empty()) {
        return Err(LlmError::SchemaValidation(format!("blank triple part in {parts:?}")));
    }
    Ok(Triple::new(parts[0], parts[1], parts[2]))
}

/// A poignancy rating clamped to `1..=10`.
///
/// # Errors
///
/// Parse failure.
pub fn poignancy(text: &str) -> Result<u32, LlmError> {
    let r: PoignancyResponse = decode(text)?;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let score = r.poignancy.clamp(1, 10) as u32;
    Ok(score)
}

/// A non-blank thought sentence.
///
/// # Errors
///
/// Parse failure, or a blank thought.
pub fn thought(text: &str) -> Result<String, LlmError> {
    let r: ThoughtResponse = decode(text)?;
    let thought = r.thought.trim();
    if thought.is_empty() {
        return Err(LlmError::SchemaValidation("blank thought".into()));
    }
    Ok(thought.to_string())
}
