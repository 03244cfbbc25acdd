use serde_json::Value;
use std::fmt::{self, Display};

/// One step of a path into a JSON document
#[derive(Debug, PartialEq, Clone)]
pub enum Element {
    Field(String),
    StaticField(&'static str),
    /// Array item whose `key` field equals the value, e.g. `containers[name="web"]`
    Select(String, Value),
}

impl Element {
    pub fn field(name: impl Into<String>) -> Self {
        Self::Field(name.into())
    }

    pub fn select(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Select(key.into(), Value::String(value.into()))
    }
}

fn write_field(f: &mut fmt::Formatter<'_>, n: &str) -> fmt::Result {
    if n.contains(|c| c == '"' || c == '.' || c == '/') {
        write!(f, ".\"{}\"", n.replace('"', "\\\""))
    } else {
        write!(f, ".{}", n)
    }
}

impl Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StaticField(field) => write_field(f, field),
            Self::Field(field) => write_field(f, field),
            Self::Select(key, value) => write!(f, "[{}={}]", key, value),
        }
    }
}
