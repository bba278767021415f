//! Produces the text listings the meta-tools return.
//! Not on the hot path, so this favors readability over allocation count,
//! using `indoc!` for the multi-line tool descriptions.

use indoc::formatdoc;
use serde_json::Value;

use crate::discovery::{ServerEntry, ToolEntry};

/// Formats the `list-servers` meta-tool's output.
pub fn format_server_list(entries: &[ServerEntry]) -> String {
    if entries.is_empty() {
        return "No upstream MCP servers are connected in this session.".to_owned();
    }

    let mut out = String::from("Connected upstream MCP servers:\n\n");

    for entry in entries {
        match &entry.info {
            Ok(info) => {
                out.push_str(&formatdoc! {r#"
                    - {id} ({name} {version})
                "#, id = entry.lua_identifier, name = info.name, version = info.version});

                if let Some(instructions) = &info.instructions {
                    out.push_str(&format!("  instructions: {}\n", truncate(instructions, 200)));
                }
            }
            Err(message) => {
                out.push_str(&format!("- {} (unavailable: {message})\n", entry.lua_identifier));
            }
        }
    }

    out
}

/// Formats the error shown when `list-server-tools`/`tool-details` is asked
/// about an upstream not present in the session.
pub fn format_server_not_found<'a>(lua_server_name: &str, available: impl Iterator<Item = &'a str>) -> String {
    let available: Vec<&str> = available.collect();

    let available = if available.is_empty() {
        "none".to_owned()
    } else {
        available.join(", ")
    };

    format!("no upstream server named '{lua_server_name}' in this session; available: {available}")
}

/// Formats the `list-server-tools` meta-tool's output.
pub fn format_server_tools(server_name: &str, tools: &[ToolEntry]) -> String {
    if tools.is_empty() {
        return format!("'{server_name}' exposes no tools to this session.");
    }

    let mut out = format!("Tools exposed by '{server_name}':\n\n");

    for tool in tools {
        match &tool.description {
            Some(description) => out.push_str(&format!("- {}: {description}\n", tool.lua_name)),
            None => out.push_str(&format!("- {}\n", tool.lua_name)),
        }
    }

    out
}

/// Formats the error shown when `tool-details`/`inspect-tool-response` is
/// asked about a tool not present on the named upstream.
pub fn format_tool_not_found<'a>(lua_server_name: &str, lua_tool_name: &str, available: impl Iterator<Item = &'a str>) -> String {
    let available: Vec<&str> = available.collect();

    let available = if available.is_empty() {
        "none".to_owned()
    } else {
        available.join(", ")
    };

    format!("no tool named '{lua_tool_name}' on server '{lua_server_name}'; available: {available}")
}

/// Formats the `tool-details` meta-tool's output: the tool's schema plus a
/// generated usage example built from the schema's declared properties.
pub fn format_tool_details(server_name: &str, tool_name: &str, description: Option<&str>, schema: &Value) -> String {
    let mut out = format!("Tool '{tool_name}' on server '{server_name}'\n\n");

    if let Some(description) = description {
        out.push_str(description);
        out.push_str("\n\n");
    }

    out.push_str("Input schema:\n");
    out.push_str(&pretty(schema));
    out.push_str("\n\nExample call arguments:\n");
    out.push_str(&pretty(&generate_example(schema)));
    out.push('\n');

    out
}

/// Formats the `inspect-tool-response` meta-tool's output: a shape view of
/// one sample invocation's response, so the caller can write a follow-up
/// script that only extracts the fields it needs.
pub fn format_inspect_tool_response(server_name: &str, tool_name: &str, sample_args: &Value, response: &Value) -> String {
    formatdoc! {r#"
        Sample call to '{tool_name}' on server '{server_name}':

        arguments:
        {args}

        response shape:
        {shape}
    "#, args = pretty(sample_args), shape = pretty(&shape_of(response))}
}

/// Walks a tool input schema's `properties` and builds a plausible example
/// argument object — one placeholder value per declared type.
fn generate_example(schema: &Value) -> Value {
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Value::Object(Default::default());
    };

    let mut example = serde_json::Map::new();

    for (name, prop) in properties {
        let value = match prop.get("type").and_then(Value::as_str) {
            Some("string") => Value::String(format!("<{name}>")),
            Some("number") | Some("integer") => Value::from(0),
            Some("boolean") => Value::Bool(false),
            Some("array") => Value::Array(Vec::new()),
            Some("object") => Value::Object(Default::default()),
            _ => Value::Null,
        };

        example.insert(name.clone(), value);
    }

    Value::Object(example)
}

/// Reduces a JSON value to a description of its shape: object field names
/// with their types, array element shape, or the scalar's type name.
fn shape_of(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(map.iter().map(|(k, v)| (k.clone(), Value::String(type_name(v)))).collect()),
        Value::Array(items) => match items.first() {
            Some(first) => serde_json::json!([shape_of(first)]),
            None => serde_json::json!([]),
        },
        other => Value::String(type_name(other)),
    }
}

fn type_name(value: &Value) -> String {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
    .to_owned()
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Collapses internal whitespace and hard-truncates at `max_len` code units
/// on a word boundary, appending `...` when truncated.
pub(crate) fn truncate(text: &str, max_len: usize) -> String {
    let collapsed: String = text.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.len() <= max_len {
        return collapsed;
    }

    let mut cut = max_len;

    while cut > 0 && !collapsed.is_char_boundary(cut) {
        cut -= 1;
    }

    let truncated = match collapsed[..cut].rfind(' ') {
        Some(boundary) => &collapsed[..boundary],
        None => &collapsed[..cut],
    };

    format!("{truncated}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_collapses_whitespace() {
        assert_eq!(truncate("hello   world", 200), "hello world");
    }

    #[test]
    fn truncate_cuts_on_word_boundary() {
        let text = "a ".repeat(150);
        let truncated = truncate(&text, 200);
        assert!(truncated.ends_with("..."));
        assert!(truncated.len() <= 204);
    }

    #[test]
    fn generate_example_covers_declared_types() {
        let schema = serde_json::json!({
            "properties": {
                "query": {"type": "string"},
                "limit": {"type": "integer"}
            }
        });

        let example = generate_example(&schema);
        assert_eq!(example["query"], serde_json::json!("<query>"));
        assert_eq!(example["limit"], serde_json::json!(0));
    }

    #[test]
    fn shape_of_reduces_to_types() {
        let value = serde_json::json!({"name": "a", "count": 1, "items": [{"x": 1}]});
        let shape = shape_of(&value);
        assert_eq!(shape["name"], serde_json::json!("string"));
        assert_eq!(shape["count"], serde_json::json!("number"));
    }
}
