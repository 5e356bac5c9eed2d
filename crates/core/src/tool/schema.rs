//! Validation of tool arguments against a parameter schema.
//!
//! Only the JSON Schema keywords that tool definitions actually use are
//! understood: `type`, `properties`, `required`, `additionalProperties`,
//! `enum`, `const`, `minimum`/`maximum` (and their exclusive forms),
//! `items`, `allOf`/`anyOf`/`oneOf`, and local `$ref`s into `$defs` or
//! `definitions`. Other keywords are ignored.

use std::error::Error as StdError;
use std::fmt::{self, Display};

use serde_json::{Map, Value};

const MAX_DEPTH: usize = 32;

/// A schema violation, located by the path of the offending value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchemaViolation {
    path: String,
    message: String,
}

impl SchemaViolation {
    /// Returns the path of the offending field, e.g. `ticker` or
    /// `items[2].name`. Empty for the arguments object itself.
    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns what is wrong with the value.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "arguments {}", self.message)
        } else {
            write!(f, "field '{}' {}", self.path, self.message)
        }
    }
}

impl StdError for SchemaViolation {}

/// Validates `instance` against `schema`.
///
/// A schema that is neither an object nor a boolean accepts everything.
pub fn validate(
    schema: &Value,
    instance: &Value,
) -> Result<(), SchemaViolation> {
    let validator = Validator { root: schema };
    let mut path = vec![];
    validator.check(schema, instance, &mut path, 0)
}

enum Segment<'a> {
    Key(&'a str),
    Index(usize),
}

struct Validator<'s> {
    root: &'s Value,
}

impl<'s> Validator<'s> {
    fn check<'i>(
        &self,
        schema: &'s Value,
        instance: &'i Value,
        path: &mut Vec<Segment<'i>>,
        depth: usize,
    ) -> Result<(), SchemaViolation> {
        let schema = match schema {
            Value::Bool(true) => return Ok(()),
            Value::Bool(false) => {
                return Err(violation(path, "is not allowed".to_owned()));
            }
            Value::Object(schema) => schema,
            _ => return Ok(()),
        };
        if depth > MAX_DEPTH {
            warn!("schema nesting is too deep, skipping the rest");
            return Ok(());
        }

        if let Some(target) = schema.get("$ref").and_then(Value::as_str) {
            match self.resolve(target) {
                Some(target) => self.check(target, instance, path, depth + 1)?,
                None => debug!("unresolved schema reference: {target}"),
            }
        }

        if let Some(subschemas) = array(schema, "allOf") {
            for subschema in subschemas {
                self.check(subschema, instance, path, depth + 1)?;
            }
        }
        if let Some(subschemas) = array(schema, "anyOf") {
            self.check_any_of(subschemas, instance, path, depth)?;
        }
        if let Some(subschemas) = array(schema, "oneOf") {
            let len = path.len();
            let mut matched = 0;
            for subschema in subschemas {
                if self.check(subschema, instance, path, depth + 1).is_ok() {
                    matched += 1;
                }
                path.truncate(len);
            }
            if matched != 1 {
                return Err(violation(
                    path,
                    format!(
                        "must match exactly one allowed form, matched {matched}"
                    ),
                ));
            }
        }

        if let Some(expected) = schema.get("type") {
            check_type(expected, instance, path)?;
        }
        if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
            if !allowed.contains(instance) {
                return Err(violation(
                    path,
                    format!("must be one of {}", list_values(allowed)),
                ));
            }
        }
        if let Some(expected) = schema.get("const") {
            if expected != instance {
                return Err(violation(path, format!("must be {expected}")));
            }
        }
        if let Some(number) = instance.as_f64() {
            check_range(schema, number, path)?;
        }

        match instance {
            Value::Object(object) => {
                self.check_object(schema, object, path, depth)
            }
            Value::Array(items) => {
                if let Some(item_schema) = schema.get("items") {
                    for (idx, item) in items.iter().enumerate() {
                        path.push(Segment::Index(idx));
                        self.check(item_schema, item, path, depth + 1)?;
                        path.pop();
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn check_any_of<'i>(
        &self,
        subschemas: &'s [Value],
        instance: &'i Value,
        path: &mut Vec<Segment<'i>>,
        depth: usize,
    ) -> Result<(), SchemaViolation> {
        let len = path.len();
        let mut first_err = None;
        for subschema in subschemas {
            let result = self.check(subschema, instance, path, depth + 1);
            path.truncate(len);
            match result {
                Ok(()) => return Ok(()),
                Err(err) => {
                    first_err.get_or_insert(err);
                }
            }
        }
        // Report the first alternative, which is the most specific one
        // for `Option<T>` fields.
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn check_object<'i>(
        &self,
        schema: &'s Map<String, Value>,
        object: &'i Map<String, Value>,
        path: &mut Vec<Segment<'i>>,
        depth: usize,
    ) -> Result<(), SchemaViolation> {
        if let Some(required) = array(schema, "required") {
            for name in required.iter().filter_map(Value::as_str) {
                if !object.contains_key(name) {
                    let mut err = violation(path, "is required".to_owned());
                    push_key(&mut err.path, name);
                    return Err(err);
                }
            }
        }

        let properties = schema.get("properties").and_then(Value::as_object);
        let additional = schema.get("additionalProperties");
        for (name, value) in object {
            path.push(Segment::Key(name.as_str()));
            match properties.and_then(|p| p.get(name)) {
                Some(property) => self.check(property, value, path, depth + 1)?,
                None => match additional {
                    Some(Value::Bool(false)) => {
                        return Err(violation(
                            path,
                            "is not a recognized parameter".to_owned(),
                        ));
                    }
                    Some(additional) => {
                        self.check(additional, value, path, depth + 1)?
                    }
                    None => {}
                },
            }
            path.pop();
        }
        Ok(())
    }

    fn resolve(&self, target: &str) -> Option<&'s Value> {
        let pointer = target.strip_prefix('#')?;
        if pointer.is_empty() {
            return Some(self.root);
        }
        self.root.pointer(pointer)
    }
}

fn check_type(
    expected: &Value,
    instance: &Value,
    path: &[Segment<'_>],
) -> Result<(), SchemaViolation> {
    let (matches, expected) = match expected {
        Value::String(name) => (type_matches(name, instance), name.clone()),
        Value::Array(names) => {
            let names: Vec<&str> =
                names.iter().filter_map(Value::as_str).collect();
            let matches = names.iter().any(|name| type_matches(name, instance));
            (matches, names.join(" or "))
        }
        _ => return Ok(()),
    };
    if matches {
        return Ok(());
    }
    Err(violation(
        path,
        format!("expected {expected}, got {}", type_name(instance)),
    ))
}

fn type_matches(name: &str, instance: &Value) -> bool {
    match name {
        "null" => instance.is_null(),
        "boolean" => instance.is_boolean(),
        "object" => instance.is_object(),
        "array" => instance.is_array(),
        "string" => instance.is_string(),
        "number" => instance.is_number(),
        "integer" => is_integer(instance),
        _ => true,
    }
}

fn array<'s>(schema: &'s Map<String, Value>, keyword: &str) -> Option<&'s Vec<Value>> {
    schema.get(keyword).and_then(Value::as_array)
}

fn is_integer(instance: &Value) -> bool {
    match instance {
        Value::Number(n) => {
            n.is_i64()
                || n.is_u64()
                || n.as_f64().is_some_and(|f| f.fract() == 0.0)
        }
        _ => false,
    }
}

fn type_name(instance: &Value) -> &'static str {
    match instance {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) if is_integer(instance) => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn check_range(
    schema: &Map<String, Value>,
    number: f64,
    path: &[Segment<'_>],
) -> Result<(), SchemaViolation> {
    let bound = |key: &str| schema.get(key).and_then(Value::as_f64);
    if let Some(min) = bound("minimum").filter(|min| number < *min) {
        return Err(violation(path, format!("must be at least {min}")));
    }
    if let Some(max) = bound("maximum").filter(|max| number > *max) {
        return Err(violation(path, format!("must be at most {max}")));
    }
    if let Some(min) = bound("exclusiveMinimum").filter(|min| number <= *min) {
        return Err(violation(path, format!("must be greater than {min}")));
    }
    if let Some(max) = bound("exclusiveMaximum").filter(|max| number >= *max) {
        return Err(violation(path, format!("must be less than {max}")));
    }
    Ok(())
}

fn list_values(values: &[Value]) -> String {
    values
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn violation(path: &[Segment<'_>], message: String) -> SchemaViolation {
    let mut rendered = String::new();
    for segment in path {
        match segment {
            Segment::Key(key) => push_key(&mut rendered, key),
            Segment::Index(idx) => rendered.push_str(&format!("[{idx}]")),
        }
    }
    SchemaViolation {
        path: rendered,
        message,
    }
}

#[inline]
fn push_key(path: &mut String, key: &str) {
    if !path.is_empty() {
        path.push('.');
    }
    path.push_str(key);
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn ticker_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "ticker": {"type": "string"},
                "count": {"type": ["integer", "null"], "minimum": 0}
            },
            "required": ["ticker"],
            "additionalProperties": false
        })
    }

    #[test]
    fn test_valid_arguments() {
        let schema = ticker_schema();
        assert!(validate(&schema, &json!({"ticker": "AAPL"})).is_ok());
        assert!(
            validate(&schema, &json!({"ticker": "AAPL", "count": 5})).is_ok()
        );
        assert!(
            validate(&schema, &json!({"ticker": "AAPL", "count": null})).is_ok()
        );
    }

    #[test]
    fn test_wrong_type() {
        let err =
            validate(&ticker_schema(), &json!({"ticker": 123})).unwrap_err();
        assert_eq!(err.path(), "ticker");
        assert_eq!(
            err.to_string(),
            "field 'ticker' expected string, got integer"
        );
    }

    #[test]
    fn test_missing_required() {
        let err = validate(&ticker_schema(), &json!({"count": 1})).unwrap_err();
        assert_eq!(err.path(), "ticker");
        assert_eq!(err.to_string(), "field 'ticker' is required");
    }

    #[test]
    fn test_additional_properties() {
        let instance = json!({"ticker": "A", "symbol": "A"});
        let err = validate(&ticker_schema(), &instance).unwrap_err();
        assert_eq!(err.path(), "symbol");
    }

    #[test]
    fn test_minimum() {
        let instance = json!({"ticker": "A", "count": -1});
        let err = validate(&ticker_schema(), &instance).unwrap_err();
        assert_eq!(err.path(), "count");
        assert_eq!(err.message(), "must be at least 0");
    }

    #[test]
    fn test_root_type() {
        let err = validate(&ticker_schema(), &json!(["AAPL"])).unwrap_err();
        assert_eq!(err.path(), "");
        assert_eq!(err.to_string(), "arguments expected object, got array");
    }

    #[test]
    fn test_enum_through_ref() {
        // The shape `schemars` emits for an optional enum field.
        let schema = json!({
            "type": "object",
            "properties": {
                "period": {
                    "anyOf": [{"$ref": "#/$defs/Period"}, {"type": "null"}]
                },
                "tickers": {"type": "array", "items": {"type": "string"}}
            },
            "$defs": {
                "Period": {"type": "string", "enum": ["1d", "5d", "1mo"]}
            }
        });
        assert!(validate(&schema, &json!({"period": "1mo"})).is_ok());
        assert!(validate(&schema, &json!({"period": null})).is_ok());

        let err = validate(&schema, &json!({"period": "2w"})).unwrap_err();
        assert_eq!(err.path(), "period");
        assert_eq!(err.message(), r#"must be one of "1d", "5d", "1mo""#);

        let err = validate(&schema, &json!({"tickers": ["A", 1]})).unwrap_err();
        assert_eq!(err.path(), "tickers[1]");
    }

    #[test]
    fn test_one_of() {
        let schema = json!({
            "oneOf": [{"type": "string"}, {"type": "integer"}]
        });
        assert!(validate(&schema, &json!("x")).is_ok());
        assert!(validate(&schema, &json!(true)).is_err());
    }

    #[test]
    fn test_non_schema_accepts_everything() {
        assert!(validate(&Value::Null, &json!({"anything": [1, 2]})).is_ok());
        assert!(validate(&json!(true), &json!(1)).is_ok());
        assert!(validate(&json!(false), &json!(1)).is_err());
    }
}
