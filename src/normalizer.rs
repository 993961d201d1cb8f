//! # Field Normalizer
//!
//! Converts a weakly typed request payload into strongly typed field values
//! before validation. Clients submit the same logical field in different
//! shapes (repeated form fields, JSON-encoded strings, comma separated text,
//! native JSON lists); everything here reduces those shapes to one canonical
//! value per field.
//!
//! Parse failures never raise. A field that cannot be read takes its fallback
//! value and the request carries on.

use serde_json::Value;
use std::collections::BTreeMap;

/// Suffix marking the explicit repeated-field convention (`tags[]=a&tags[]=b`).
const REPEATED_SUFFIX: &str = "[]";

const TRUTHY: [&str; 4] = ["1", "true", "yes", "on"];

/// One submitted value. Form fields arrive as text, JSON bodies as values.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Text(String),
    Json(Value),
}

impl RawValue {
    /// String rendering used by the text based coercions.
    fn as_text(&self) -> String {
        match self {
            RawValue::Text(s) => s.clone(),
            RawValue::Json(Value::String(s)) => s.clone(),
            RawValue::Json(Value::Null) => String::new(),
            RawValue::Json(other) => other.to_string(),
        }
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl From<Value> for RawValue {
    fn from(value: Value) -> Self {
        RawValue::Json(value)
    }
}

/// Transport-neutral request payload: every key maps to the values submitted
/// under it, in submission order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawPayload {
    fields: BTreeMap<String, Vec<RawValue>>,
}

impl RawPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<RawValue>) {
        self.fields.entry(key.into()).or_default().push(value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<RawValue>) -> Self {
        self.push(key, value);
        self
    }

    /// Builds a payload from a JSON object body. Non-object bodies yield an
    /// empty payload.
    pub fn from_json(body: Value) -> Self {
        let mut payload = Self::new();
        if let Value::Object(map) = body {
            for (key, value) in map {
                payload.push(key, RawValue::Json(value));
            }
        }
        payload
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key) || self.fields.contains_key(&repeated_key(key))
    }

    pub fn get_all(&self, key: &str) -> &[RawValue] {
        self.fields.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Last value submitted under `key`.
    pub fn last(&self, key: &str) -> Option<&RawValue> {
        self.get_all(key).last()
    }

    pub fn text(&self, key: &str) -> Option<String> {
        self.last(key).map(RawValue::as_text)
    }
}

fn repeated_key(key: &str) -> String {
    format!("{}{}", key, REPEATED_SUFFIX)
}

fn coerce_element(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn coerce_list(items: &[Value]) -> Vec<String> {
    items.iter().filter_map(coerce_element).collect()
}

fn split_text_list(text: &str) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(trimmed) {
        return coerce_list(&items);
    }
    trimmed
        .split(',')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

/// Normalizes a list-valued field such as `tags`.
///
/// Precedence:
/// 1. Repeated values (`key[]` at any count, or `key` submitted more than
///    once) are collected as-is; a lone `key` is ignored when `key[]` exists
/// 2. A single JSON list has its elements coerced to strings
/// 3. A single string is trimmed, then read as a JSON array if it parses as
///    one, else split on commas with empty segments dropped
/// 4. Anything else yields an empty list
pub fn normalize_list(payload: &RawPayload, key: &str) -> Vec<String> {
    let repeated = payload.get_all(&repeated_key(key));
    if !repeated.is_empty() {
        return repeated.iter().map(RawValue::as_text).collect();
    }

    let values = payload.get_all(key);
    if values.len() > 1 {
        return values.iter().map(RawValue::as_text).collect();
    }

    match values.first() {
        Some(RawValue::Json(Value::Array(items))) => coerce_list(items),
        Some(RawValue::Json(Value::String(text))) | Some(RawValue::Text(text)) => split_text_list(text),
        _ => Vec::new(),
    }
}

/// Boolean coercion. Native booleans pass through, absent values take
/// `default`, anything else is matched case-insensitively against
/// `1`, `true`, `yes`, `on`.
pub fn coerce_bool(value: Option<&RawValue>, default: bool) -> bool {
    match value {
        None => default,
        Some(RawValue::Json(Value::Bool(b))) => *b,
        Some(other) => {
            let text = other.as_text().trim().to_ascii_lowercase();
            TRUTHY.contains(&text.as_str())
        }
    }
}

/// Integer coercion. Returns `None` when the value is absent or unreadable,
/// leaving the fallback to the caller.
pub fn coerce_int(value: Option<&RawValue>) -> Option<i64> {
    match value? {
        RawValue::Json(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        other => other.as_text().trim().parse::<i64>().ok(),
    }
}

/// Nested JSON coercion. Structured values pass through, strings are parsed,
/// and any failure (or JSON `null`) yields `None`.
pub fn coerce_json(value: Option<&RawValue>) -> Option<Value> {
    let parsed = match value? {
        RawValue::Json(Value::String(text)) | RawValue::Text(text) => {
            serde_json::from_str::<Value>(text.trim()).ok()?
        }
        RawValue::Json(v) => v.clone(),
    };
    if parsed.is_null() {
        None
    } else {
        Some(parsed)
    }
}

fn optional_text(payload: &RawPayload, key: &str) -> Option<String> {
    payload
        .text(key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Whether absent fields take their defaults or stay untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizeMode {
    /// Create and full update: every field is resolved, absent ones to defaults.
    Complete,
    /// Partial update: only fields present in the payload are resolved.
    Partial,
}

/// Defaults applied in [`NormalizeMode::Complete`].
#[derive(Debug, Clone, Copy)]
pub struct FieldDefaults {
    pub is_public: bool,
}

/// Normalized asset fields. `None` at the outer level means "not supplied";
/// for nullable fields the inner `Option` is the supplied value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetFields {
    pub name: Option<String>,
    pub description: Option<String>,
    pub file_type: Option<String>,
    pub file_size: Option<i64>,
    pub tags: Option<Vec<String>>,
    pub keywords: Option<String>,
    pub category: Option<Option<String>>,
    pub is_public: Option<bool>,
    pub preview_url: Option<Option<String>>,
    pub polygon_count: Option<Option<i64>>,
    pub dimensions: Option<Option<Value>>,
}

/// Runs every loosely typed asset field through its coercion. Keys the
/// server owns (`id`, `owner`, `user`, timestamps) are never read.
pub fn normalize_asset_fields(payload: &RawPayload, mode: NormalizeMode, defaults: FieldDefaults) -> AssetFields {
    let resolve = |key: &str| mode == NormalizeMode::Complete || payload.contains(key);

    AssetFields {
        name: resolve("name").then(|| payload.text("name").unwrap_or_default().trim().to_string()),
        description: resolve("description").then(|| payload.text("description").unwrap_or_default()),
        file_type: resolve("file_type").then(|| {
            optional_text(payload, "file_type").unwrap_or_else(|| "other".to_string())
        }),
        file_size: resolve("file_size").then(|| coerce_int(payload.last("file_size")).unwrap_or(0)),
        tags: resolve("tags").then(|| normalize_list(payload, "tags")),
        keywords: resolve("keywords").then(|| payload.text("keywords").unwrap_or_default()),
        category: resolve("category").then(|| optional_text(payload, "category")),
        is_public: resolve("is_public").then(|| coerce_bool(payload.last("is_public"), defaults.is_public)),
        preview_url: resolve("preview_url").then(|| optional_text(payload, "preview_url")),
        polygon_count: resolve("polygon_count").then(|| coerce_int(payload.last("polygon_count"))),
        dimensions: resolve("dimensions").then(|| coerce_json(payload.last("dimensions"))),
    }
}
