//! Sandboxed parameter templates
//!
//! Module parameters of string type are compiled once at actor construction
//! and re-rendered against each consumed event. The grammar is deliberately
//! finite: `{{ a.b.c }}` resolves a dotted path in the event dump,
//! `{{ name() }}` calls a registered lookup, everything else is literal text.
//! There is no expression evaluator.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::lookup::Lookup;

/// Lookup functions exposed to templates, keyed by their configured instance
/// name.
pub type Lookups = HashMap<String, Arc<dyn Lookup>>;

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Path(String),
    Call(String),
}

/// One compiled template string.
#[derive(Debug, Clone)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    /// Compiles `input`. Malformed placeholders stay literal text.
    pub fn compile(input: &str) -> Self {
        let mut segments = Vec::new();
        let mut rest = input;
        while let Some(open) = rest.find("{{") {
            let Some(close) = rest[open..].find("}}") else {
                break;
            };
            let close = open + close;
            if open > 0 {
                segments.push(Segment::Literal(rest[..open].to_string()));
            }
            let inner = rest[open + 2..close].trim();
            segments.push(Self::classify(inner, &rest[open..close + 2]));
            rest = &rest[close + 2..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }
        Self { segments }
    }

    fn classify(inner: &str, raw: &str) -> Segment {
        if let Some(name) = inner.strip_suffix("()") {
            let name = name.trim();
            if is_identifier(name) {
                return Segment::Call(name.to_string());
            }
        }
        if is_path(inner) {
            return Segment::Path(inner.to_string());
        }
        Segment::Literal(raw.to_string())
    }

    /// Whether the template contains anything to substitute.
    pub fn is_static(&self) -> bool {
        self.segments
            .iter()
            .all(|s| matches!(s, Segment::Literal(_)))
    }

    /// Renders against `context` (an event dump). Missing paths and unknown
    /// lookups render empty, matching the forgiving behavior templates had in
    /// the bootstrap files this grammar replaces.
    pub fn render(&self, context: &Value, lookups: &Lookups) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Path(path) => {
                    if let Some(value) = resolve_path(context, path) {
                        out.push_str(&stringify(value));
                    }
                }
                Segment::Call(name) => {
                    if let Some(lookup) = lookups.get(name) {
                        out.push_str(&stringify(&lookup.lookup()));
                    }
                }
            }
        }
        out
    }
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_path(s: &str) -> bool {
    !s.is_empty()
        && s.split('.')
            .all(|seg| !seg.is_empty() && seg.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'))
}

fn resolve_path<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    let mut cursor = context;
    for segment in path.split('.') {
        cursor = cursor.as_object()?.get(segment)?;
    }
    Some(cursor)
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A module's parameter set: string parameters compiled to templates,
/// everything else passed through untouched.
#[derive(Debug, Clone, Default)]
pub struct Kwargs {
    specs: HashMap<String, KwargSpec>,
}

#[derive(Debug, Clone)]
enum KwargSpec {
    Template(Template),
    Literal(Value),
}

impl Kwargs {
    pub fn compile(arguments: &Map<String, Value>) -> Self {
        let mut specs = HashMap::new();
        for (name, value) in arguments {
            let spec = match value {
                Value::String(s) => KwargSpec::Template(Template::compile(s)),
                other => KwargSpec::Literal(other.clone()),
            };
            specs.insert(name.clone(), spec);
        }
        Self { specs }
    }

    /// Renders every parameter against `context`.
    pub fn render(&self, context: &Value, lookups: &Lookups) -> RenderedKwargs {
        let mut values = Map::new();
        for (name, spec) in &self.specs {
            let value = match spec {
                KwargSpec::Template(template) => {
                    Value::String(template.render(context, lookups))
                }
                KwargSpec::Literal(value) => value.clone(),
            };
            values.insert(name.clone(), value);
        }
        RenderedKwargs { values }
    }

    /// Initial render against an empty context, used at construction time for
    /// parameters read before the first event arrives.
    pub fn render_static(&self, lookups: &Lookups) -> RenderedKwargs {
        self.render(&Value::Object(Map::new()), lookups)
    }
}

/// Parameter values rendered against one particular event.
#[derive(Debug, Clone, Default)]
pub struct RenderedKwargs {
    values: Map<String, Value>,
}

impl RenderedKwargs {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Value::as_str)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.values.get(name).and_then(Value::as_bool)
    }

    pub fn get_u64(&self, name: &str) -> Option<u64> {
        self.values.get(name).and_then(Value::as_u64)
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.values.get(name).and_then(Value::as_f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn no_lookups() -> Lookups {
        Lookups::new()
    }

    #[test]
    fn literal_passes_through() {
        let template = Template::compile("plain text");
        assert!(template.is_static());
        assert_eq!(template.render(&json!({}), &no_lookups()), "plain text");
    }

    #[test]
    fn path_resolves_against_context() {
        let template = Template::compile("value: {{ data.field }}");
        let context = json!({"data": {"field": "deep"}});
        assert_eq!(template.render(&context, &no_lookups()), "value: deep");
    }

    #[test]
    fn missing_path_renders_empty() {
        let template = Template::compile("[{{ data.absent }}]");
        assert_eq!(template.render(&json!({"data": {}}), &no_lookups()), "[]");
    }

    #[test]
    fn call_invokes_lookup() {
        struct Fixed;
        impl Lookup for Fixed {
            fn lookup(&self) -> Value {
                json!(42)
            }
        }
        let mut lookups = Lookups::new();
        lookups.insert("answer".to_string(), Arc::new(Fixed));
        let template = Template::compile("{{ answer() }}");
        assert_eq!(template.render(&json!({}), &lookups), "42");
    }

    #[test]
    fn malformed_placeholder_stays_literal() {
        let template = Template::compile("{{ not a path }}");
        assert_eq!(
            template.render(&json!({}), &no_lookups()),
            "{{ not a path }}"
        );
    }

    #[test]
    fn kwargs_keep_non_string_types() {
        let arguments = json!({"interval": 5, "payload": "{{ data }}"});
        let kwargs = Kwargs::compile(arguments.as_object().unwrap());
        let rendered = kwargs.render(&json!({"data": "x"}), &no_lookups());
        assert_eq!(rendered.get_u64("interval"), Some(5));
        assert_eq!(rendered.get_str("payload"), Some("x"));
    }
}
