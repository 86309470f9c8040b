use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ScriptFile {
    pub version: u8,
    #[serde(default)]
    pub name: Option<String>,
    pub cache: CacheSpec,
    #[serde(default)]
    pub input: Option<InputSpec>,
    #[serde(default)]
    pub ops: Vec<OpRecord>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct CacheSpec {
    pub capacity: i64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct InputSpec {
    pub format: InputFormat,
    pub csv: Option<CsvInput>,
    pub json: Option<JsonInput>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InputFormat {
    Csv,
    Json,
}

fn default_true() -> bool {
    true
}

fn default_delimiter() -> String {
    ",".to_string()
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct CsvInput {
    #[serde(default = "default_true")]
    pub has_header: bool,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    pub columns: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct JsonInput {
    pub records_path: Option<String>,
}

/// One operation, either written inline in the script or read from input.
///
/// `value` and `expect` keep an explicit `null` apart from an omitted field:
/// `Some(Null)` is a null value or an expectation of absence, `None` means
/// the field was not given.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct OpRecord {
    pub op: String,
    #[serde(default)]
    pub key: Option<JsonValue>,
    #[serde(default, deserialize_with = "present")]
    pub value: Option<JsonValue>,
    #[serde(default, deserialize_with = "present")]
    pub expect: Option<JsonValue>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<JsonValue>, D::Error>
where
    D: Deserializer<'de>,
{
    JsonValue::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Put,
    Get,
    Peek,
    Remove,
}

impl OpKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "put" => Some(OpKind::Put),
            "get" => Some(OpKind::Get),
            "peek" => Some(OpKind::Peek),
            "remove" => Some(OpKind::Remove),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::Put => "put",
            OpKind::Get => "get",
            OpKind::Peek => "peek",
            OpKind::Remove => "remove",
        }
    }
}

/// Text form of a scalar key. Objects, arrays and null have none.
///
/// Keys are strings: `7`, `7.0` and `"7"` name the same entry, as do `true`
/// and `"true"`.
pub fn key_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(text) => Some(text.clone()),
        JsonValue::Number(number) => Some(number_key(number)),
        JsonValue::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn number_key(number: &serde_json::Number) -> String {
    if number.is_f64() {
        if let Some(float) = number.as_f64() {
            if float.fract() == 0.0 && float.abs() < 9_007_199_254_740_992.0 {
                return format!("{}", float as i64);
            }
        }
    }
    number.to_string()
}
