//! Expression resolution for workflow node data.
//!
//! Node data may contain `{{ path.to.value }}` tokens that are resolved
//! against the run context before a handler sees them. Paths are dot
//! separated identifiers and non-negative array indices. No functions,
//! no operators, no filters.
//!
//! Resolution never fails: an unresolved path yields `null` (or an empty
//! string when embedded in surrounding text). Both entry points are pure
//! and safe to call from any task.

use std::sync::LazyLock;

use serde_json::{Map, Value};

static TOKEN: LazyLock<regex::Regex> =
  LazyLock::new(|| regex::Regex::new(r"\{\{(.+?)\}\}").expect("token pattern"));

static WHOLE_TOKEN: LazyLock<regex::Regex> =
  LazyLock::new(|| regex::Regex::new(r"^\{\{(.+?)\}\}$").expect("whole-token pattern"));

/// Resolve a single dotted path like `trigger.body.email` against the context.
///
/// Objects are traversed by key, arrays by non-negative integer index. Any
/// other intermediate value, a missing key, an unparsable index, or an
/// explicit `null` all resolve to `None`.
pub fn resolve_path<'a>(path: &str, context: &'a Map<String, Value>) -> Option<&'a Value> {
  let mut segments = path.split('.').map(str::trim);

  let mut current = context.get(segments.next()?)?;
  for segment in segments {
    current = match current {
      Value::Object(map) => map.get(segment)?,
      Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
      _ => return None,
    };
  }

  if current.is_null() { None } else { Some(current) }
}

/// Interpolate all expression tokens in a template against the context.
///
/// A string that is exactly one token resolves to the referenced value with
/// its native type preserved: `{{a.count}}` stays a number, `{{a.output}}`
/// stays an object. Strings with embedded tokens get each token substituted
/// by the string form of its value (missing values become empty strings).
/// Objects and arrays are walked recursively; everything else passes
/// through unchanged.
pub fn interpolate(template: &Value, context: &Map<String, Value>) -> Value {
  match template {
    Value::String(s) => interpolate_string(s, context),
    Value::Object(map) => Value::Object(
      map
        .iter()
        .map(|(key, value)| (key.clone(), interpolate(value, context)))
        .collect(),
    ),
    Value::Array(items) => {
      Value::Array(items.iter().map(|item| interpolate(item, context)).collect())
    }
    other => other.clone(),
  }
}

/// Interpolate every entry of a node-data map, preserving the map shape.
pub fn interpolate_map(template: &Map<String, Value>, context: &Map<String, Value>) -> Map<String, Value> {
  template
    .iter()
    .map(|(key, value)| (key.clone(), interpolate(value, context)))
    .collect()
}

fn interpolate_string(template: &str, context: &Map<String, Value>) -> Value {
  // The entire string is a single token: return the value as-is so
  // downstream nodes can consume structured data, not its rendering.
  if let Some(whole) = WHOLE_TOKEN.captures(template) {
    return resolve_path(&whole[1], context)
      .cloned()
      .unwrap_or(Value::Null);
  }

  let replaced = TOKEN.replace_all(template, |caps: &regex::Captures| {
    match resolve_path(&caps[1], context) {
      Some(Value::String(s)) => s.clone(),
      Some(value) => value.to_string(),
      None => String::new(),
    }
  });

  Value::String(replaced.into_owned())
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn context() -> Map<String, Value> {
    let Value::Object(map) = json!({
      "trigger": {
        "body": { "email": "bob@example.com", "count": 3, "flag": true },
        "type": "manual",
      },
      "node1": {
        "output": { "items": ["first", "second"], "nested": { "deep": "value" } },
      },
      "empty": null,
    }) else {
      unreachable!()
    };
    map
  }

  #[test]
  fn resolves_nested_object_path() {
    let ctx = context();
    assert_eq!(
      resolve_path("trigger.body.email", &ctx),
      Some(&json!("bob@example.com"))
    );
  }

  #[test]
  fn resolves_array_index() {
    let ctx = context();
    assert_eq!(
      resolve_path("node1.output.items.1", &ctx),
      Some(&json!("second"))
    );
  }

  #[test]
  fn non_integer_array_segment_is_absent() {
    let ctx = context();
    assert_eq!(resolve_path("node1.output.items.first", &ctx), None);
  }

  #[test]
  fn out_of_range_index_is_absent() {
    let ctx = context();
    assert_eq!(resolve_path("node1.output.items.9", &ctx), None);
  }

  #[test]
  fn missing_key_is_absent() {
    let ctx = context();
    assert_eq!(resolve_path("trigger.body.missing", &ctx), None);
    assert_eq!(resolve_path("nope.at.all", &ctx), None);
  }

  #[test]
  fn null_resolves_to_absent() {
    let ctx = context();
    assert_eq!(resolve_path("empty", &ctx), None);
  }

  #[test]
  fn path_through_scalar_is_absent() {
    let ctx = context();
    assert_eq!(resolve_path("trigger.type.anything", &ctx), None);
  }

  #[test]
  fn whitespace_around_segments_is_ignored() {
    let ctx = context();
    assert_eq!(
      resolve_path(" trigger . body . email ", &ctx),
      Some(&json!("bob@example.com"))
    );
  }

  #[test]
  fn whole_token_preserves_native_type() {
    let ctx = context();
    assert_eq!(interpolate(&json!("{{trigger.body.count}}"), &ctx), json!(3));
    assert_eq!(interpolate(&json!("{{trigger.body.flag}}"), &ctx), json!(true));
    assert_eq!(
      interpolate(&json!("{{node1.output.nested}}"), &ctx),
      json!({ "deep": "value" })
    );
  }

  #[test]
  fn whole_token_missing_becomes_null() {
    let ctx = context();
    assert_eq!(interpolate(&json!("{{not.here}}"), &ctx), Value::Null);
  }

  #[test]
  fn embedded_tokens_substitute_string_forms() {
    let ctx = context();
    assert_eq!(
      interpolate(&json!("from {{trigger.body.email}} x{{trigger.body.count}}"), &ctx),
      json!("from bob@example.com x3")
    );
  }

  #[test]
  fn embedded_missing_token_becomes_empty_string() {
    let ctx = context();
    assert_eq!(interpolate(&json!("a {{nope}} b"), &ctx), json!("a  b"));
  }

  #[test]
  fn recurses_into_objects_and_arrays() {
    let ctx = context();
    let template = json!({
      "who": "{{trigger.body.email}}",
      "list": ["{{trigger.body.count}}", "plain"],
    });
    assert_eq!(
      interpolate(&template, &ctx),
      json!({ "who": "bob@example.com", "list": [3, "plain"] })
    );
  }

  #[test]
  fn token_free_template_is_unchanged() {
    let ctx = context();
    for template in [json!("plain text"), json!(42), json!(null), json!({"a": [1, 2]})] {
      assert_eq!(interpolate(&template, &ctx), template);
    }
  }
}
