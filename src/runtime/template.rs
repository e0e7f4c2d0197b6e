/// Template placeholder resolution
///
/// Node configuration strings may embed `{{$path.to.value}}` placeholders. Paths are
/// dotted and support list indices (`items.0`, `items[0]`) and bracketed keys
/// (`user['name']`). A surrounding pair of double quotes is consumed with the
/// placeholder, so `"{{$a}}"` inside a JSON-ish string becomes the bare value.
///
/// Resolution never fails: a placeholder that cannot be resolved is left as-is and
/// reported as a [`TemplateWarning`].

use regex::{Captures, Regex};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::OnceLock;

fn template_regex() -> &'static Regex {
    static TEMPLATE_REGEX: OnceLock<Regex> = OnceLock::new();
    TEMPLATE_REGEX
        .get_or_init(|| Regex::new(r#""?\{\{\s*\$([^}]+?)\s*\}\}"?"#).expect("valid regex"))
}

/// One placeholder occurrence inside a string
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateMatch {
    /// Matched text including braces and any consumed quotes
    pub full: String,
    /// Path expression without the leading `$`
    pub expression: String,
    /// Byte offset of `full` in the source string
    pub offset: usize,
}

/// Why a placeholder stayed literal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unresolved {
    MissingKey(String),
    IndexOutOfRange(usize),
    NotAContainer(String),
    NullValue,
}

impl std::fmt::Display for Unresolved {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Unresolved::MissingKey(k) => write!(f, "missing key '{}'", k),
            Unresolved::IndexOutOfRange(i) => write!(f, "index {} out of range", i),
            Unresolved::NotAContainer(seg) => write!(f, "cannot descend into '{}'", seg),
            Unresolved::NullValue => f.write_str("value is null"),
        }
    }
}

/// Non-fatal resolution miss for a single placeholder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateWarning {
    pub placeholder: String,
    pub reason: Unresolved,
}

/// Whether `s` contains at least one placeholder
pub fn has_template(s: &str) -> bool {
    template_regex().is_match(s)
}

/// All placeholders in `s`, in order of appearance
pub fn extract_templates(s: &str) -> Vec<TemplateMatch> {
    template_regex()
        .captures_iter(s)
        .filter_map(|caps| {
            let full = caps.get(0)?;
            Some(TemplateMatch {
                full: full.as_str().to_string(),
                expression: caps[1].trim().to_string(),
                offset: full.start(),
            })
        })
        .collect()
}

/// Resolve every placeholder in `value` against `context`, logging each miss
pub fn resolve(value: &Value, context: &Map<String, Value>) -> Value {
    let (resolved, warnings) = resolve_with_warnings(value, context);
    for warning in &warnings {
        tracing::warn!(
            placeholder = %warning.placeholder,
            "⚠️ Failed to resolve template: {}",
            warning.reason
        );
    }
    resolved
}

/// Like [`resolve`] but hands the misses back instead of logging them
pub fn resolve_with_warnings(
    value: &Value,
    context: &Map<String, Value>,
) -> (Value, Vec<TemplateWarning>) {
    let mut warnings = Vec::new();
    let resolved = resolve_value(value, context, &mut warnings);
    (resolved, warnings)
}

fn resolve_value(value: &Value, context: &Map<String, Value>, warnings: &mut Vec<TemplateWarning>) -> Value {
    match value {
        Value::String(s) => Value::String(resolve_string(s, context, warnings)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| resolve_value(item, context, warnings))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_value(v, context, warnings)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn resolve_string(s: &str, context: &Map<String, Value>, warnings: &mut Vec<TemplateWarning>) -> String {
    template_regex()
        .replace_all(s, |caps: &Captures| {
            let expression = caps[1].trim();
            match lookup(expression, context) {
                Ok(found) => stringify(found),
                Err(reason) => {
                    warnings.push(TemplateWarning {
                        placeholder: caps[0].to_string(),
                        reason,
                    });
                    caps[0].to_string()
                }
            }
        })
        .into_owned()
}

/// Strings are inserted raw, everything else as compact JSON
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Walk a dotted path through the context
pub fn lookup<'a>(expression: &str, context: &'a Map<String, Value>) -> Result<&'a Value, Unresolved> {
    let mut cursor = Cursor::Root(context);

    for part in expression.split('.') {
        let part = part.trim();
        cursor = match part.split_once('[') {
            Some((prop, index_part)) => {
                let cursor = if prop.is_empty() { cursor } else { cursor.step(prop)? };
                let index_part = index_part.replace(']', "");
                let index_part = index_part.trim();
                if is_index(index_part) {
                    cursor.index(index_part)?
                } else {
                    cursor.key(index_part.trim_matches(|c| c == '\'' || c == '"'))?
                }
            }
            None => cursor.step(part)?,
        };
    }

    match cursor {
        Cursor::Root(_) => Err(Unresolved::NotAContainer(expression.to_string())),
        Cursor::Value(Value::Null) => Err(Unresolved::NullValue),
        Cursor::Value(v) => Ok(v),
    }
}

fn is_index(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

#[derive(Clone, Copy)]
enum Cursor<'a> {
    Root(&'a Map<String, Value>),
    Value(&'a Value),
}

impl<'a> Cursor<'a> {
    /// Plain segment: key on objects, numeric index on arrays
    fn step(self, segment: &str) -> Result<Cursor<'a>, Unresolved> {
        match self {
            Cursor::Value(Value::Array(_)) if is_index(segment) => self.index(segment),
            _ => self.key(segment),
        }
    }

    fn key(self, key: &str) -> Result<Cursor<'a>, Unresolved> {
        let map = match self {
            Cursor::Root(map) => map,
            Cursor::Value(Value::Object(map)) => map,
            Cursor::Value(Value::Null) => return Err(Unresolved::NullValue),
            Cursor::Value(_) => return Err(Unresolved::NotAContainer(key.to_string())),
        };
        map.get(key)
            .map(Cursor::Value)
            .ok_or_else(|| Unresolved::MissingKey(key.to_string()))
    }

    fn index(self, raw: &str) -> Result<Cursor<'a>, Unresolved> {
        let Cursor::Value(Value::Array(items)) = self else {
            return Err(Unresolved::NotAContainer(raw.to_string()));
        };
        let idx: usize = raw
            .parse()
            .map_err(|_| Unresolved::IndexOutOfRange(usize::MAX))?;
        items
            .get(idx)
            .map(Cursor::Value)
            .ok_or(Unresolved::IndexOutOfRange(idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn resolves_dotted_path() {
        let out = resolve(&json!("{{$a.b}}"), &ctx(json!({"a": {"b": 5}})));
        assert_eq!(out, json!("5"));
    }

    #[test]
    fn leaves_missing_path_literal() {
        let context = ctx(json!({"a": {}}));
        let (out, warnings) = resolve_with_warnings(&json!("{{$a.b}}"), &context);
        assert_eq!(out, json!("{{$a.b}}"));
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].reason, Unresolved::MissingKey("b".into()));
    }

    #[test]
    fn bracket_and_plain_indices() {
        let context = ctx(json!({"items": ["x", "y", "z"], "user": {"tags": ["a", "b"]}}));
        assert_eq!(resolve(&json!("{{$items[1]}}"), &context), json!("y"));
        assert_eq!(resolve(&json!("{{$items.2}}"), &context), json!("z"));
        assert_eq!(resolve(&json!("{{$user.tags[0]}}"), &context), json!("a"));
        assert_eq!(resolve(&json!("{{$items[7]}}"), &context), json!("{{$items[7]}}"));
    }

    #[test]
    fn bracketed_keys_strip_quotes() {
        let context = ctx(json!({"form-trigger": {"user": {"first name": "Ada"}}}));
        let out = resolve(&json!("Hi {{$form-trigger.user['first name']}}!"), &context);
        assert_eq!(out, json!("Hi Ada!"));
    }

    #[test]
    fn strings_without_placeholders_are_untouched() {
        let context = ctx(json!({"a": 1}));
        for s in ["", "plain text", "{{not a template}}", "{ {$a} }", "$a.b"] {
            assert_eq!(resolve(&json!(s), &context), json!(s));
        }
    }

    #[test]
    fn surrounding_quotes_are_consumed() {
        let context = ctx(json!({"t": {"n": 3}}));
        let out = resolve(&json!(r#"{"count": "{{$t.n}}"}"#), &context);
        assert_eq!(out, json!(r#"{"count": 3}"#));
    }

    #[test]
    fn non_string_values_render_as_json() {
        let context = ctx(json!({"r": {"obj": {"k": true}, "list": [1, 2]}}));
        assert_eq!(resolve(&json!("{{$r.obj}}"), &context), json!(r#"{"k":true}"#));
        assert_eq!(resolve(&json!("{{$r.list}}"), &context), json!("[1,2]"));
    }

    #[test]
    fn null_values_stay_literal() {
        let context = ctx(json!({"a": {"b": null}}));
        let (out, warnings) = resolve_with_warnings(&json!("{{$a.b}}"), &context);
        assert_eq!(out, json!("{{$a.b}}"));
        assert_eq!(warnings[0].reason, Unresolved::NullValue);
    }

    #[test]
    fn recurses_into_containers_and_keeps_scalars() {
        let context = ctx(json!({"f": {"name": "Amresh", "age": 30}}));
        let config = json!({
            "url": "https://api.example.com/{{$f.name}}",
            "headers": [{"key": "X-Age", "value": "{{$f.age}}", "enabled": true}],
            "retries": 3,
            "verbose": false,
            "missing": "{{$f.nope}}"
        });
        let out = resolve(&config, &context);
        assert_eq!(out["url"], json!("https://api.example.com/Amresh"));
        assert_eq!(out["headers"][0]["value"], json!("30"));
        assert_eq!(out["headers"][0]["enabled"], json!(true));
        assert_eq!(out["retries"], json!(3));
        assert_eq!(out["missing"], json!("{{$f.nope}}"));
    }

    #[test]
    fn multiple_placeholders_resolve_independently() {
        let context = ctx(json!({"a": "1"}));
        let (out, warnings) = resolve_with_warnings(&json!("{{$a}}-{{$b}}-{{ $a }}"), &context);
        assert_eq!(out, json!("1-{{$b}}-1"));
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn extract_reports_offsets_and_expressions() {
        let found = extract_templates(r#"x {{$a.b}} and "{{ $c[0] }}""#);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].expression, "a.b");
        assert_eq!(found[0].offset, 2);
        assert_eq!(found[1].full, r#""{{ $c[0] }}""#);
        assert_eq!(found[1].expression, "c[0]");
        assert!(has_template("{{$x}}"));
        assert!(!has_template("{{x}}"));
    }
}
