//! HS-002: Template type names to value types, and type coercion checks.

use super::types::ValueType;

/// Literals accepted for boolean parameters (compared case-insensitively).
const BOOLEAN_LITERALS: [&str; 12] = [
    "true", "false", "t", "f", "yes", "no", "y", "n", "on", "off", "1", "0",
];

/// Map a template-declared type name to a value type.
///
/// Total: unknown, empty and absent names all map to [`ValueType::String`].
pub fn map_type(type_name: Option<&str>) -> ValueType {
    let normalized = type_name.map(|t| t.trim().to_ascii_lowercase());
    match normalized.as_deref() {
        Some("number") => ValueType::Number,
        Some("boolean") => ValueType::Boolean,
        Some("comma_delimited_list") => ValueType::CommaDelimitedList,
        Some("json") => ValueType::Json,
        _ => ValueType::String,
    }
}

impl ValueType {
    /// Whether `value` can be read as this type.
    pub fn accepts(self, value: &str) -> bool {
        match self {
            Self::String | Self::CommaDelimitedList => true,
            Self::Number => parse_number(value).is_some(),
            Self::Boolean => {
                let v = value.trim().to_ascii_lowercase();
                BOOLEAN_LITERALS.contains(&v.as_str())
            }
            Self::Json => serde_json::from_str::<serde_json::Value>(value).is_ok(),
        }
    }

    /// Range and length constraints do not apply to booleans or JSON.
    pub fn is_measurable(self) -> bool {
        !matches!(self, Self::Boolean | Self::Json)
    }
}

/// Numeric form of a value, if it has one.
pub fn parse_number(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Items of a comma-delimited list value.
pub fn list_items(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|item| !item.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_hs002_known_names() {
        assert_eq!(map_type(Some("string")), ValueType::String);
        assert_eq!(map_type(Some("number")), ValueType::Number);
        assert_eq!(map_type(Some("boolean")), ValueType::Boolean);
        assert_eq!(
            map_type(Some("comma_delimited_list")),
            ValueType::CommaDelimitedList
        );
        assert_eq!(map_type(Some("json")), ValueType::Json);
    }

    #[test]
    fn test_hs002_case_and_whitespace() {
        assert_eq!(map_type(Some("  Number ")), ValueType::Number);
        assert_eq!(map_type(Some("JSON")), ValueType::Json);
    }

    #[test]
    fn test_hs002_absent_empty_unknown_default_to_string() {
        assert_eq!(map_type(None), ValueType::String);
        assert_eq!(map_type(Some("")), ValueType::String);
        assert_eq!(map_type(Some("integer")), ValueType::String);
    }

    #[test]
    fn test_hs002_accepts_number() {
        assert!(ValueType::Number.accepts("42"));
        assert!(ValueType::Number.accepts(" -1.5 "));
        assert!(!ValueType::Number.accepts("forty"));
        assert!(!ValueType::Number.accepts("NaN"));
        assert!(!ValueType::Number.accepts("inf"));
    }

    #[test]
    fn test_hs002_accepts_boolean() {
        for v in ["true", "False", "yes", "OFF", "1", "n"] {
            assert!(ValueType::Boolean.accepts(v), "{v} should be boolean");
        }
        assert!(!ValueType::Boolean.accepts("maybe"));
    }

    #[test]
    fn test_hs002_accepts_json() {
        assert!(ValueType::Json.accepts(r#"{"a": [1, 2]}"#));
        assert!(!ValueType::Json.accepts("{a: 1"));
    }

    #[test]
    fn test_hs002_list_items() {
        let items: Vec<_> = list_items(" a, b ,,c ").collect();
        assert_eq!(items, vec!["a", "b", "c"]);
        assert_eq!(list_items("").count(), 0);
    }

    #[test]
    fn test_hs002_measurable() {
        assert!(ValueType::String.is_measurable());
        assert!(ValueType::Number.is_measurable());
        assert!(ValueType::CommaDelimitedList.is_measurable());
        assert!(!ValueType::Boolean.is_measurable());
        assert!(!ValueType::Json.is_measurable());
    }

    proptest! {
        #[test]
        fn prop_hs002_map_type_total(name in ".*") {
            let ty = map_type(Some(&name));
            let known = ["number", "boolean", "comma_delimited_list", "json"];
            if !known.contains(&name.trim().to_ascii_lowercase().as_str()) {
                prop_assert_eq!(ty, ValueType::String);
            }
        }

        #[test]
        fn prop_hs002_strings_always_accepted(value in ".*") {
            prop_assert!(ValueType::String.accepts(&value));
            prop_assert!(ValueType::CommaDelimitedList.accepts(&value));
        }
    }
}
