//! Multi-strategy parser for LLM responses: direct JSON, fenced code block,
//! or the first balanced brace/bracket region, validated against a JSON Schema.

use jsonschema::JSONSchema;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseFailureKind {
    /// No strategy produced a parseable value.
    ParseFailure,
    /// A value parsed but failed schema validation.
    SchemaFailure,
}

#[derive(Debug)]
pub struct ParseError {
    pub kind: ParseFailureKind,
    pub detail: String,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.detail)
    }
}

impl std::error::Error for ParseError {}

/// Attempts, in order: a direct parse of the whole response, extraction from
/// the first fenced code block, then extraction of the first balanced
/// brace/bracket region. Returns the first strategy that yields valid JSON.
pub fn extract_json(response: &str) -> Result<Value, ParseError> {
    if let Ok(value) = serde_json::from_str::<Value>(response.trim()) {
        return Ok(value);
    }

    if let Some(fenced) = extract_fenced_block(response) {
        if let Ok(value) = serde_json::from_str::<Value>(&fenced) {
            return Ok(value);
        }
    }

    if let Some(region) = extract_balanced_region(response) {
        if let Ok(value) = serde_json::from_str::<Value>(&region) {
            return Ok(value);
        }
    }

    Err(ParseError {
        kind: ParseFailureKind::ParseFailure,
        detail: "no strategy produced parseable structured data".to_string(),
    })
}

/// Parses and validates `response` against `schema`. Parse failures and
/// schema violations are both returned as [`ParseError`] so the caller can
/// decide whether to retry in strict mode.
pub fn parse_and_validate(response: &str, schema: &Value) -> Result<Value, ParseError> {
    let value = extract_json(response)?;

    let compiled = JSONSchema::compile(schema).map_err(|e| ParseError {
        kind: ParseFailureKind::SchemaFailure,
        detail: format!("invalid schema: {e}"),
    })?;

    if let Err(errors) = compiled.validate(&value) {
        let detail = errors
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(ParseError {
            kind: ParseFailureKind::SchemaFailure,
            detail,
        });
    }

    Ok(value)
}

fn extract_fenced_block(text: &str) -> Option<String> {
    let fence_start = text.find("```")?;
    let after_fence = &text[fence_start + 3..];
    // Skip an optional language tag (e.g. "json") up to the first newline.
    let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_fence[body_start..];
    let fence_end = body.find("```")?;
    Some(body[..fence_end].trim().to_string())
}

/// Finds the first region delimited by a balanced pair of `{}` or `[]`,
/// scanning for whichever opening delimiter appears first.
fn extract_balanced_region(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    let start = bytes.iter().position(|&b| b == b'{' || b == b'[')?;
    let (open, close) = match bytes[start] {
        b'{' => (b'{', b'}'),
        _ => (b'[', b']'),
    };

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b if b == open => depth += 1,
            b if b == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start..start + offset + 1].to_string());
                }
            }
            _ => {}
        }
    }
    None
}
