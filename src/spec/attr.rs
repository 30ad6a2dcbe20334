//! Attribute lookup on a node of the cluster document.
//!
//! Every entity spec in the document is a plain mapping. Lookups go through
//! [`resolve`], which knows the built-in defaults, descends into `auth`
//! sub-mappings, and converts interval-typed attributes to microseconds.

use crate::Result;
use crate::error::invalid;
use crate::spec::interval::parse_interval;
use serde_yaml::{Mapping, Value};

/// One entity spec from the document.
pub type Spec = Mapping;

/// Attributes looked up inside the endpoint's `auth` sub-mapping.
const AUTH_ATTRS: [&str; 2] = ["auth", "conf"];

/// Attributes holding time intervals; never rendered as generic `key=value`.
pub const INTERVAL_ATTRS: [&str; 4] = ["interval", "offset", "reconnect", "flush"];

pub const DEFAULT_XPRT: &str = "sock";
pub const DEFAULT_INTERVAL_US: i64 = 1_000_000;
pub const DEFAULT_AUTH: &str = "none";
pub const DEFAULT_MODE: &str = "static";

/// Attribute marking an endpoint as the daemon's control channel.
pub const CONTROL_ATTR: &str = "maestro_comm";

fn default_for(attr: &str) -> Option<Value> {
    match attr {
        CONTROL_ATTR => Some(Value::Bool(false)),
        "xprt" => Some(Value::from(DEFAULT_XPRT)),
        "interval" => Some(Value::from(DEFAULT_INTERVAL_US)),
        "auth" => Some(Value::from(DEFAULT_AUTH)),
        "mode" => Some(Value::from(DEFAULT_MODE)),
        _ => None,
    }
}

pub fn is_interval_attr(attr: &str) -> bool {
    INTERVAL_ATTRS.contains(&attr)
}

/// Look up an optional attribute, applying defaults.
///
/// Returns `Ok(None)` when the attribute is absent and has no default.
pub fn resolve(attr: &str, spec: &Spec) -> Result<Option<Value>> {
    let mut key = attr;
    let mut container = spec;
    if AUTH_ATTRS.contains(&attr) {
        if attr == "auth" {
            key = "name";
        }
        match spec.get("auth") {
            Some(Value::Mapping(auth)) => container = auth,
            // Shorthand `auth: munge` names the domain directly.
            Some(Value::String(name)) if attr == "auth" => {
                return Ok(Some(Value::from(name.clone())));
            }
            _ => {}
        }
    }

    match container.get(key) {
        Some(Value::Null) | None => Ok(default_for(attr)),
        Some(value) if is_interval_attr(attr) => Ok(Some(Value::from(parse_interval(value)?))),
        Some(value) => Ok(Some(value.clone())),
    }
}

/// Fail unless every attribute in `attrs` is present in `spec`.
pub fn require(attrs: &[&str], spec: &Spec, container: &str) -> Result<()> {
    for attr in attrs {
        if !spec.contains_key(*attr) {
            invalid!("The '{}' attribute is required in a {}", attr, container);
        }
    }
    Ok(())
}

pub fn resolve_str(attr: &str, spec: &Spec) -> Result<Option<String>> {
    match resolve(attr, spec)? {
        None => Ok(None),
        Some(value) => match scalar_text(&value) {
            Some(text) => Ok(Some(text)),
            None => invalid!("attribute '{}' must be a scalar, got {:?}", attr, value),
        },
    }
}

pub fn resolve_interval(attr: &str, spec: &Spec) -> Result<Option<i64>> {
    match resolve(attr, spec)? {
        None => Ok(None),
        Some(value) => parse_interval(&value).map(Some),
    }
}

/// YAML-ish truthiness: `true`, `"true"` and `"True"` only.
pub fn resolve_bool(attr: &str, spec: &Spec) -> Result<bool> {
    Ok(match resolve(attr, spec)? {
        Some(Value::Bool(b)) => b,
        Some(Value::String(s)) => s == "true" || s == "True",
        _ => false,
    })
}

/// Text form of a scalar value; `None` for sequences, mappings and null.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Tagged(tagged) => scalar_text(&tagged.value),
        Value::Null | Value::Sequence(_) | Value::Mapping(_) => None,
    }
}

/// Mapping key as text; document keys are expected to be scalars.
pub fn key_text(key: &Value) -> Result<String> {
    match scalar_text(key) {
        Some(text) => Ok(text),
        None => invalid!("mapping key {:?} must be a scalar", key),
    }
}
