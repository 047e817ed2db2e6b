//! Declarative decision documents evaluated against JSON input.
//!
//! A document is an ordered list of rules:
//!
//! ```json
//! {
//!   "rules": [
//!     {
//!       "name": "product",
//!       "when": [{ "path": "/input/uri", "matches": "^/product/(?P<id>[^/]+)/?$" }],
//!       "decision": { "uri": "/product/index.html", "querystring": "productId={id}" }
//!     }
//!   ]
//! }
//! ```
//!
//! Conditions address the evaluation document `{"input": .., "data": ..}` by
//! JSON pointer. The first rule whose conditions all hold decides; a `null`
//! decision means "no decision". Decision strings interpolate regex captures
//! (`{1}`, `{id}`) and pointers (`{/input/querystring}`), and
//! `{"join": "&", "parts": [..]}` joins the parts that render non-empty.

use crate::error::AppError;
use regex::{Captures, Regex};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;

/// A decision engine: one input, an ordered list of decisions.
pub trait Policy: Send + Sync {
    fn evaluate(&self, input: &Value) -> Result<Vec<Value>, AppError>;
}

#[derive(Deserialize)]
struct PolicyDocument {
    rules: Vec<RuleSource>,
}

#[derive(Deserialize)]
struct RuleSource {
    #[serde(default)]
    name: String,
    #[serde(default)]
    when: Vec<ConditionSource>,
    #[serde(default)]
    decision: Value,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ConditionSource {
    path: String,
    matches: Option<String>,
    equals: Option<Value>,
    contains: Option<Value>,
}

enum Test {
    Exists,
    Matches(Regex),
    Equals(Value),
    Contains(Value),
}

struct Condition {
    path: String,
    test: Test,
}

struct Rule {
    name: String,
    conditions: Vec<Condition>,
    decision: Value,
}

type Bindings = HashMap<String, String>;

pub struct RulePolicy {
    rules: Vec<Rule>,
    data: Value,
    placeholder: Regex,
}

impl RulePolicy {
    /// Compiles `source`; `data` is exposed to rules under `/data`.
    pub fn from_json(source: &str, data: Option<Value>) -> Result<Self, AppError> {
        let document: PolicyDocument = serde_json::from_str(source)
            .map_err(|err| AppError::invalid_config(format!("unreadable policy: {err}")))?;
        let rules = document
            .rules
            .into_iter()
            .enumerate()
            .map(|(index, rule)| compile_rule(index, rule))
            .collect::<Result<Vec<_>, _>>()?;
        let placeholder = Regex::new(r"\{([^{}]+)\}")
            .map_err(|err| AppError::unknown(format!("placeholder pattern: {err}")))?;
        Ok(Self {
            rules,
            data: data.unwrap_or_else(|| Value::Object(Map::new())),
            placeholder,
        })
    }

    fn holds(&self, condition: &Condition, document: &Value, bindings: &mut Bindings) -> bool {
        let value = document.pointer(&condition.path);
        match &condition.test {
            Test::Exists => value.is_some_and(|value| !value.is_null()),
            Test::Matches(pattern) => {
                let Some(subject) = value.and_then(Value::as_str) else {
                    return false;
                };
                let Some(captures) = pattern.captures(subject) else {
                    return false;
                };
                bind(pattern, &captures, bindings);
                true
            }
            Test::Equals(expected) => {
                let expected = self.render(expected, document, bindings);
                value.is_some_and(|value| *value == expected)
            }
            Test::Contains(needle) => {
                let needle = self.render(needle, document, bindings);
                match (value, &needle) {
                    (Some(Value::Array(items)), _) => items.contains(&needle),
                    (Some(Value::String(haystack)), Value::String(needle)) => {
                        haystack.contains(needle.as_str())
                    }
                    _ => false,
                }
            }
        }
    }

    fn render(&self, template: &Value, document: &Value, bindings: &Bindings) -> Value {
        match template {
            Value::String(text) => self.render_str(text, document, bindings),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.render(item, document, bindings))
                    .collect(),
            ),
            Value::Object(fields) => match (fields.get("join"), fields.get("parts")) {
                (Some(Value::String(separator)), Some(Value::Array(parts))) => Value::String(
                    parts
                        .iter()
                        .map(|part| text_of(&self.render(part, document, bindings)))
                        .filter(|part| !part.is_empty())
                        .collect::<Vec<_>>()
                        .join(separator),
                ),
                _ => Value::Object(
                    fields
                        .iter()
                        .map(|(key, value)| (key.clone(), self.render(value, document, bindings)))
                        .collect(),
                ),
            },
            other => other.clone(),
        }
    }

    fn render_str(&self, text: &str, document: &Value, bindings: &Bindings) -> Value {
        // A lone pointer placeholder keeps the JSON type of what it points at.
        if let Some(captures) = self.placeholder.captures(text) {
            if captures.get(0).is_some_and(|whole| whole.as_str() == text) && text.starts_with("{/") {
                return document
                    .pointer(&text[1..text.len() - 1])
                    .cloned()
                    .unwrap_or(Value::Null);
            }
        }
        let rendered = self.placeholder.replace_all(text, |captures: &Captures| {
            let key = &captures[1];
            if key.starts_with('/') {
                document.pointer(key).map(text_of).unwrap_or_default()
            } else {
                bindings.get(key).cloned().unwrap_or_default()
            }
        });
        Value::String(rendered.into_owned())
    }
}

impl Policy for RulePolicy {
    fn evaluate(&self, input: &Value) -> Result<Vec<Value>, AppError> {
        let document = json!({ "input": input, "data": self.data });
        for rule in &self.rules {
            let mut bindings = Bindings::new();
            if rule
                .conditions
                .iter()
                .all(|condition| self.holds(condition, &document, &mut bindings))
            {
                log::debug!("policy rule matched: {}", rule.name);
                if rule.decision.is_null() {
                    return Ok(Vec::new());
                }
                return Ok(vec![self.render(&rule.decision, &document, &bindings)]);
            }
        }
        Ok(Vec::new())
    }
}

fn compile_rule(index: usize, rule: RuleSource) -> Result<Rule, AppError> {
    let name = if rule.name.is_empty() {
        format!("rule {index}")
    } else {
        rule.name
    };
    let conditions = rule
        .when
        .into_iter()
        .map(|condition| compile_condition(&name, condition))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Rule {
        name,
        conditions,
        decision: rule.decision,
    })
}

fn compile_condition(rule: &str, source: ConditionSource) -> Result<Condition, AppError> {
    if !source.path.is_empty() && !source.path.starts_with('/') {
        return Err(AppError::invalid_config(format!(
            "{rule}: path {:?} is not a JSON pointer",
            source.path
        )));
    }
    let test = match (source.matches, source.equals, source.contains) {
        (None, None, None) => Test::Exists,
        (Some(pattern), None, None) => Test::Matches(Regex::new(&pattern).map_err(|err| {
            AppError::invalid_config(format!("{rule}: invalid pattern {pattern:?}: {err}"))
        })?),
        (None, Some(expected), None) => Test::Equals(expected),
        (None, None, Some(needle)) => Test::Contains(needle),
        _ => {
            return Err(AppError::invalid_config(format!(
                "{rule}: a condition takes one of matches, equals or contains"
            )))
        }
    };
    Ok(Condition {
        path: source.path,
        test,
    })
}

fn bind(pattern: &Regex, captures: &Captures, bindings: &mut Bindings) {
    for (index, name) in pattern.capture_names().enumerate().skip(1) {
        let Some(group) = captures.get(index) else {
            continue;
        };
        bindings.insert(index.to_string(), group.as_str().to_string());
        if let Some(name) = name {
            bindings.insert(name.to_string(), group.as_str().to_string());
        }
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
