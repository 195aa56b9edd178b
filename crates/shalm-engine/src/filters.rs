//! Kubernetes-oriented template filters

use base64::Engine as _;
use minijinja::{Error, ErrorKind, Value};

/// Convert a value to YAML format
///
/// Usage: {{ values.config | toyaml }}
pub fn toyaml(value: Value) -> Result<String, Error> {
    let json_value: serde_json::Value = serde_json::to_value(&value)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))?;

    let yaml = serde_yaml::to_string(&json_value)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))?;

    Ok(yaml.trim_start_matches("---\n").trim_end().to_string())
}

/// Convert a value to JSON format
///
/// Usage: {{ values.config | tojson }}
pub fn tojson(value: Value) -> Result<String, Error> {
    let json_value: serde_json::Value = serde_json::to_value(&value)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))?;

    serde_json::to_string(&json_value)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))
}

/// Base64 encode a string
///
/// Usage: {{ secret | b64encode }}
#[must_use]
pub fn b64encode(value: String) -> String {
    base64::engine::general_purpose::STANDARD.encode(value.as_bytes())
}

/// Base64 decode a string
///
/// Usage: {{ encoded | b64decode }}
pub fn b64decode(value: String) -> Result<String, Error> {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(value.as_bytes())
        .map_err(|e| {
            Error::new(
                ErrorKind::InvalidOperation,
                format!("base64 decode error: {}", e),
            )
        })?;

    String::from_utf8(decoded).map_err(|e| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("UTF-8 decode error: {}", e),
        )
    })
}

/// Quote a string with double quotes
///
/// Usage: {{ name | quote }}
#[must_use]
pub fn quote(value: Value) -> String {
    let s = match value.as_str() {
        Some(str_val) => str_val.to_string(),
        None => value.to_string(),
    };
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Indent text with a newline prefix (like Helm's nindent)
///
/// Usage: {{ content | nindent(4) }}
#[must_use]
pub fn nindent(value: String, spaces: usize) -> String {
    format!("\n{}", indent(value, spaces))
}

/// Indent text without newline prefix
///
/// Usage: {{ content | indent(4) }}
#[must_use]
pub fn indent(value: String, spaces: usize) -> String {
    let indent_str = " ".repeat(spaces);

    value
        .lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{}{}", indent_str, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Require a value, fail if undefined or empty
///
/// Usage: {{ values.required_field | required("field is required") }}
pub fn required(value: Value, message: Option<String>) -> Result<Value, Error> {
    if value.is_undefined() || value.is_none() {
        let msg = message.unwrap_or_else(|| "required value is missing".to_string());
        return Err(Error::new(ErrorKind::InvalidOperation, msg));
    }
    if value.as_str().is_some_and(str::is_empty) {
        let msg = message.unwrap_or_else(|| "required value is empty".to_string());
        return Err(Error::new(ErrorKind::InvalidOperation, msg));
    }
    Ok(value)
}

/// SHA256 hash of a string
///
/// Usage: {{ value | sha256 }}
#[must_use]
pub fn sha256sum(value: String) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Truncate a string to a maximum length
///
/// Usage: {{ name | trunc(63) }}
#[must_use]
pub fn trunc(value: String, length: usize) -> String {
    value.chars().take(length).collect()
}

/// Fail with a custom error message
///
/// Usage: {{ fail("Something went wrong") }}
pub fn fail(message: String) -> Result<Value, Error> {
    Err(Error::new(ErrorKind::InvalidOperation, message))
}
