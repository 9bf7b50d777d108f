//! Tool-call argument validation
//!
//! Raw JSON arguments from the model are checked against a tool's parameter
//! specs and coerced into typed [`ArgValue`]s before any command is rendered.
//! Models are loose with types, so numeric strings count as numbers and
//! numbers count as strings; everything else that does not fit is rejected.

use std::collections::HashMap;

use serde_json::{Map, Value};

use bach_protocol::validate_llll;

use super::catalog::{ParamSpec, ParamType};

/// One validated argument
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Notes(Vec<NoteSpec>),
}

impl ArgValue {
    /// Host rendering: ints as ints, floats with at least one decimal,
    /// booleans as 1/0
    pub fn render(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => format_float(*f),
            Self::Bool(true) => "1".to_string(),
            Self::Bool(false) => "0".to_string(),
            Self::Notes(notes) => notes
                .iter()
                .map(NoteSpec::render)
                .collect::<Vec<_>>()
                .join(" "),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(s) => s.is_empty(),
            Self::Notes(n) => n.is_empty(),
            _ => false,
        }
    }

    pub fn as_bool(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Text(s) => !s.is_empty(),
            Self::Notes(n) => !n.is_empty(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }
}

/// Slot numbers the host uses for per-note markings
const DYNAMICS_SLOT: u32 = 20;
const ARTICULATION_SLOT: u32 = 22;
const NOTEHEAD_SLOT: u32 = 23;

/// One note of an `add_notes` call
#[derive(Debug, Clone, PartialEq)]
pub struct NoteSpec {
    pub onset_ms: f64,
    /// Midicents, 6000 = middle C
    pub pitch: i64,
    pub duration_ms: f64,
    pub velocity: i64,
    pub dynamics: Option<String>,
    pub articulation: Option<String>,
    pub notehead: Option<String>,
}

impl NoteSpec {
    /// `[pitch duration velocity [slots ...] 0]`
    pub fn render(&self) -> String {
        let mut slots = Vec::new();
        if let Some(dynamics) = &self.dynamics {
            slots.push(format!("[{DYNAMICS_SLOT} {dynamics}]"));
        }
        if let Some(articulation) = &self.articulation {
            slots.push(format!("[{ARTICULATION_SLOT} {articulation}]"));
        }
        if let Some(notehead) = self.notehead.as_deref().filter(|h| *h != "default") {
            slots.push(format!("[{NOTEHEAD_SLOT} {notehead}]"));
        }

        let slots = if slots.is_empty() {
            String::new()
        } else {
            format!(" [slots {}]", slots.join(" "))
        };
        format!(
            "[{} {} {}{} 0]",
            self.pitch,
            format_float(self.duration_ms),
            self.velocity,
            slots
        )
    }

    /// Single-note chord: `[onset note 0]`
    pub fn render_chord(&self) -> String {
        format!("[{:.1} {} 0]", self.onset_ms, self.render())
    }
}

/// Validated arguments of one tool call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArgs {
    values: HashMap<&'static str, ArgValue>,
}

impl ToolArgs {
    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.values.get(name)
    }

    /// Present and non-empty
    pub fn present(&self, name: &str) -> Option<&ArgValue> {
        self.get(name).filter(|v| !v.is_empty())
    }

    pub fn flag(&self, name: &str) -> bool {
        self.get(name).is_some_and(ArgValue::as_bool)
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(ArgValue::as_f64)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn insert(&mut self, name: &'static str, value: ArgValue) {
        self.values.insert(name, value);
    }
}

/// Check `raw` against `params`
///
/// Unknown keys are ignored and `null` counts as absent. Errors are plain
/// messages; the caller wraps them with the tool name.
pub fn validate(params: &'static [ParamSpec], raw: &Map<String, Value>) -> Result<ToolArgs, String> {
    let mut values = HashMap::new();

    for param in params {
        let value = match raw.get(param.name) {
            None | Some(Value::Null) => None,
            Some(value) => Some(
                coerce(param.ty, value).map_err(|e| format!("argument '{}': {e}", param.name))?,
            ),
        };

        match value {
            Some(value) if !(param.required && value.is_empty()) => {
                values.insert(param.name, value);
            }
            _ if param.required => {
                return Err(format!("missing required argument '{}'", param.name));
            }
            _ => {}
        }
    }

    Ok(ToolArgs { values })
}

fn coerce(ty: ParamType, value: &Value) -> Result<ArgValue, String> {
    match ty {
        ParamType::String => text(value).map(ArgValue::Text),
        ParamType::Integer => integer(value).map(ArgValue::Int),
        ParamType::Number => number(value).map(ArgValue::Float),
        ParamType::Boolean => boolean(value).map(ArgValue::Bool),
        ParamType::Llll => {
            let text = llll_text(value)?;
            if !text.is_empty() {
                validate_llll(&text).map_err(|e| e.to_string())?;
            }
            Ok(ArgValue::Text(text))
        }
        ParamType::Score => {
            let text = text(value)?;
            let body = strip_roll(&text);
            if body.is_empty() {
                return Err("score is empty".into());
            }
            validate_llll(body).map_err(|e| e.to_string())?;
            Ok(ArgValue::Text(text))
        }
        ParamType::NoteList => notes(value).map(ArgValue::Notes),
    }
}

fn text(value: &Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s.trim().to_string()),
        Value::Number(n) => Ok(n.to_string()),
        // `[1, 3]` for a space separated list
        Value::Array(items) if items.iter().all(is_scalar) => {
            Ok(items.iter().map(scalar_text).collect::<Vec<_>>().join(" "))
        }
        other => Err(format!("expected a string, got {}", type_name(other))),
    }
}

fn integer(value: &Value) -> Result<i64, String> {
    let n = match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Ok(i);
            }
            n.as_f64()
        }
        Value::String(s) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                return Ok(i);
            }
            s.parse::<f64>().ok()
        }
        _ => None,
    };

    match n {
        Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(f as i64),
        Some(f) => Err(format!("expected an integer, got {f}")),
        None => Err(format!("expected an integer, got {}", type_name(value))),
    }
}

fn number(value: &Value) -> Result<f64, String> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match n {
        Some(f) if f.is_finite() => Ok(f),
        _ => Err(format!("expected a number, got {}", type_name(value))),
    }
}

fn boolean(value: &Value) -> Result<bool, String> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) if n.as_i64() == Some(0) => Ok(false),
        Value::Number(n) if n.as_i64() == Some(1) => Ok(true),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" | "" => Ok(false),
            other => Err(format!("expected a boolean, got '{other}'")),
        },
        other => Err(format!("expected a boolean, got {}", type_name(other))),
    }
}

/// llll given as a string, or as nested JSON arrays
fn llll_text(value: &Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s.trim().to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Array(_) => json_to_llll(value),
        other => Err(format!("expected an llll string, got {}", type_name(other))),
    }
}

fn json_to_llll(value: &Value) -> Result<String, String> {
    match value {
        Value::Array(items) => {
            let inner = items
                .iter()
                .map(json_to_llll)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(format!("[{}]", inner.join(" ")))
        }
        Value::String(s) => Ok(s.trim().to_string()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(format!("{} cannot appear in an llll", type_name(other))),
    }
}

fn notes(value: &Value) -> Result<Vec<NoteSpec>, String> {
    let items = match value {
        Value::Array(items) => items,
        other => return Err(format!("expected a list of notes, got {}", type_name(other))),
    };

    items
        .iter()
        .enumerate()
        .map(|(i, item)| note(item).map_err(|e| format!("note {}: {e}", i + 1)))
        .collect()
}

fn note(value: &Value) -> Result<NoteSpec, String> {
    let Value::Object(map) = value else {
        return Err(format!("expected an object, got {}", type_name(value)));
    };

    let field = |name: &str| map.get(name).filter(|v| !v.is_null());
    let required = |name: &str| field(name).ok_or_else(|| format!("missing '{name}'"));
    let marking = |name: &str| -> Result<Option<String>, String> {
        match field(name) {
            None => Ok(None),
            Some(v) => text(v).map(|s| Some(s).filter(|s| !s.is_empty())),
        }
    };

    let onset_ms = number(required("onset_ms")?)?;
    let pitch = number(required("pitch")?)?.trunc() as i64;
    let duration_ms = number(required("duration")?)?;
    let velocity = match field("velocity") {
        Some(v) => integer(v)?,
        None => 100,
    };

    if duration_ms <= 0.0 {
        return Err("duration must be > 0".into());
    }
    if !(0..=127).contains(&velocity) {
        return Err("velocity must be between 0 and 127".into());
    }

    Ok(NoteSpec {
        onset_ms,
        pitch,
        duration_ms,
        velocity,
        dynamics: marking("dynamics")?,
        articulation: marking("articulation")?,
        notehead: marking("notehead")?,
    })
}

/// Body of a score string without its leading `roll` selector
pub fn strip_roll(score: &str) -> &str {
    let trimmed = score.trim();
    match trimmed.get(..4) {
        Some(head) if head.eq_ignore_ascii_case("roll") => trimmed[4..].trim_start(),
        _ => trimmed,
    }
}

/// `1000.0`, `0.35`, `-2.5`
pub fn format_float(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_))
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
