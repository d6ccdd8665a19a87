//! Best-effort extraction of a structured value from free-form model text.
//! Never fails the run: any parse or validation failure just yields `None`.

use jsonschema::JSONSchema;
use serde_json::Value;

/// Looks for a fenced ```json block first, then falls back to the first
/// balanced `{...}` region; parses and validates against `schema` if one
/// was configured.
pub fn coerce_structured_output(schema: &Option<Value>, content: &str) -> Option<Value> {
    let schema = schema.as_ref()?;
    let compiled = JSONSchema::compile(schema).ok()?;

    let candidate = extract_fenced_json(content).or_else(|| extract_balanced_braces(content))?;
    let value: Value = serde_json::from_str(&candidate).ok()?;

    if compiled.is_valid(&value) {
        Some(value)
    } else {
        None
    }
}

fn extract_fenced_json(content: &str) -> Option<String> {
    let start_marker = content.find("```json")?;
    let after_marker = start_marker + "```json".len();
    let rest = &content[after_marker..];
    let end = rest.find("```")?;
    Some(rest[..end].trim().to_string())
}

/// Finds the first `{` and its matching `}`, tracking nesting depth so
/// braces inside string literals or nested objects don't terminate early.
fn extract_balanced_braces(content: &str) -> Option<String> {
    let bytes = content.as_bytes();
    let start = content.find('{')?;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        let ch = byte as char;
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(content[start..start + offset + 1].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {"answer": {"type": "string"}},
            "required": ["answer"],
        })
    }

    #[test]
    fn extracts_from_fenced_block_in_preference_to_trailing_prose() {
        let content = "Here you go:\n```json\n{\"answer\": \"42\"}\n```\nHope that helps.";
        let value = coerce_structured_output(&Some(schema()), content).unwrap();
        assert_eq!(value["answer"], "42");
    }

    #[test]
    fn falls_back_to_balanced_braces_without_fencing() {
        let content = "The result is {\"answer\": \"yes\"} as requested.";
        let value = coerce_structured_output(&Some(schema()), content).unwrap();
        assert_eq!(value["answer"], "yes");
    }

    #[test]
    fn no_schema_means_no_coercion_attempted() {
        assert!(coerce_structured_output(&None, "{\"answer\": \"42\"}").is_none());
    }

    #[test]
    fn malformed_json_never_fails_just_yields_none() {
        let content = "{ this is not json }}}";
        assert!(coerce_structured_output(&Some(schema()), content).is_none());
    }

    #[test]
    fn schema_mismatch_yields_none() {
        let content = "{\"wrong_field\": 1}";
        assert!(coerce_structured_output(&Some(schema()), content).is_none());
    }
}
