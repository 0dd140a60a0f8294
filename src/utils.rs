use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

pub static RUNTIME: Lazy<tokio::runtime::Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build Tokio runtime")
});

pub fn spawn_async<F>(fut: F)
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(fut);
        }
        Err(_) => {
            RUNTIME.spawn(fut);
        }
    }
}

pub fn normalize_url(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.trim_end_matches('/').to_string()
    } else {
        format!("https://{}", trimmed.trim_end_matches('/'))
    }
}

pub fn is_absolute_url(path: &str) -> bool {
    let lower = path.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Joins a base URL and a request path without doubling or dropping slashes.
pub fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path.is_empty() {
        return base.to_string();
    }
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

/// Unwraps the `{ data: ... }` / `{ Data: ... }` / `{ result: ... }` envelopes the
/// backend services put around payloads. Returns the value untouched otherwise.
pub fn unwrap_data(value: Value) -> Value {
    match value {
        Value::Object(mut map) => {
            for key in ["data", "Data", "result", "Result"] {
                if let Some(inner) = map.remove(key) {
                    if !inner.is_null() {
                        return inner;
                    }
                }
            }
            Value::Object(map)
        }
        other => other,
    }
}

/// Pulls a list out of a response that is either a bare array or an object
/// wrapping one under a handful of common keys.
pub fn unwrap_list(value: Value) -> Vec<Value> {
    match unwrap_data(value) {
        Value::Array(items) => items,
        Value::Object(mut map) => {
            for key in ["items", "Items", "records", "Records", "list", "List"] {
                if let Some(Value::Array(items)) = map.remove(key) {
                    return items;
                }
            }
            Vec::new()
        }
        _ => Vec::new(),
    }
}

/// First string found under any of `keys`.
pub fn pick_str<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| value.get(*k))
        .find_map(|v| v.as_str().filter(|s| !s.is_empty()))
}

/// Accepts ids sent either as JSON numbers or as numeric strings.
pub fn de_id<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    Ok(value_to_i64(&raw).unwrap_or_default())
}

pub fn de_opt_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(value_to_i64))
}

/// Treats an explicit `null` like a missing key.
pub fn de_null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accepts string ids, numeric ids and nulls; numbers become their decimal text.
pub fn de_string_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    })
}

pub fn value_to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}…", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalize_url_adds_scheme_and_strips_slash() {
        assert_eq!(normalize_url("api.example.com/"), "https://api.example.com");
        assert_eq!(normalize_url(" http://localhost:5000/ "), "http://localhost:5000");
        assert_eq!(normalize_url(""), "");
    }

    #[test]
    fn join_url_handles_slashes() {
        assert_eq!(join_url("http://a/", "/Exams"), "http://a/Exams");
        assert_eq!(join_url("http://a", "Exams"), "http://a/Exams");
    }

    #[test]
    fn unwrap_list_accepts_envelopes() {
        assert_eq!(unwrap_list(json!([1, 2])).len(), 2);
        assert_eq!(unwrap_list(json!({"data": [1]})).len(), 1);
        assert_eq!(unwrap_list(json!({"Data": {"Items": [1, 2, 3]}})).len(), 3);
        assert!(unwrap_list(json!({"message": "x"})).is_empty());
    }

    #[test]
    fn pick_str_skips_empty_values() {
        let v = json!({"message": "", "Message": "Lỗi"});
        assert_eq!(pick_str(&v, &["message", "Message"]), Some("Lỗi"));
    }
}
