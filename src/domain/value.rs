use serde_json::Value;

/// Recursively coerce numeric strings into JSON numbers.
///
/// Devices deliver most leaf values as strings ("1500", "0.25"). Integer
/// parse is tried first so "42" stays an integer; strings that only parse
/// as a finite float become floats; everything else is left untouched.
/// Already-numeric values pass through, so the coercion is idempotent.
pub fn coerce(value: Value) -> Value {
    match value {
        Value::String(s) => coerce_str(s),
        Value::Object(map) => Value::Object(map.into_iter().map(|(k, v)| (k, coerce(v))).collect()),
        Value::Array(items) => Value::Array(items.into_iter().map(coerce).collect()),
        other => other,
    }
}

fn coerce_str(s: String) -> Value {
    if let Ok(i) = s.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = s.parse::<f64>() {
        // from_f64 rejects NaN and infinities; those stay strings.
        if let Some(n) = serde_json::Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    Value::String(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_coerce_integer_string() {
        assert_eq!(coerce(json!("42")), json!(42));
        assert_eq!(coerce(json!("-7")), json!(-7));
        assert_eq!(coerce(json!("0")), json!(0));
    }

    #[test]
    fn test_coerce_float_string() {
        assert_eq!(coerce(json!("0.25")), json!(0.25));
        assert_eq!(coerce(json!("-3.5")), json!(-3.5));
        assert_eq!(coerce(json!("1e3")), json!(1000.0));
    }

    #[test]
    fn test_non_numeric_string_unchanged() {
        assert_eq!(coerce(json!("enable")), json!("enable"));
        assert_eq!(coerce(json!("")), json!(""));
        assert_eq!(coerce(json!("1500 bytes")), json!("1500 bytes"));
    }

    #[test]
    fn test_non_finite_stays_string() {
        assert_eq!(coerce(json!("inf")), json!("inf"));
        assert_eq!(coerce(json!("NaN")), json!("NaN"));
    }

    #[test]
    fn test_coerce_nested() {
        let input = json!({
            "statistics": {"in-octets": "1104", "out-octets": "0"},
            "oper-state": "up",
            "queues": ["3", "nope", {"depth": "0.5"}],
        });
        let expected = json!({
            "statistics": {"in-octets": 1104, "out-octets": 0},
            "oper-state": "up",
            "queues": [3, "nope", {"depth": 0.5}],
        });
        assert_eq!(coerce(input), expected);
    }

    #[test]
    fn test_coerce_idempotent() {
        let input = json!({"a": "1", "b": ["2.5", true], "c": null});
        let once = coerce(input);
        assert_eq!(coerce(once.clone()), once);
    }

    #[test]
    fn test_booleans_and_null_untouched() {
        assert_eq!(coerce(json!(true)), json!(true));
        assert_eq!(coerce(json!(null)), json!(null));
        assert_eq!(coerce(json!(12)), json!(12));
    }
}
