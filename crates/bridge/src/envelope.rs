use serde_json::{Map, Value, json};

/// The uniform response document of the data-fetch service.
#[derive(Clone, Debug, PartialEq)]
pub enum Envelope {
    /// `{"ok": true, "operation": ..., "data": ...}`
    Success {
        /// The operation that produced the data.
        operation: String,
        /// The payload, passed through untouched.
        data: Value,
    },
    /// `{"ok": false, "operation": ... | null, "error": {"type", "message"}}`
    Failure {
        /// The operation, when the service got far enough to know it.
        operation: Option<String>,
        /// The error category reported by the service.
        error_type: String,
        /// The human-readable error message.
        message: String,
    },
}

impl Envelope {
    /// Parses a response document, returning `None` when it matches
    /// neither envelope shape.
    pub fn parse(text: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(text.trim()).ok()?;
        Self::from_value(&value)
    }

    fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        if obj.get("ok")?.as_bool()? {
            let operation = obj.get("operation")?.as_str()?.to_owned();
            let data = obj.get("data")?.clone();
            return Some(Envelope::Success { operation, data });
        }

        let operation = match obj.get("operation") {
            None | Some(Value::Null) => None,
            Some(Value::String(operation)) => Some(operation.clone()),
            Some(_) => return None,
        };
        let error = obj.get("error")?.as_object()?;
        Some(Envelope::Failure {
            operation,
            error_type: string_field(error, "type")?,
            message: string_field(error, "message")?,
        })
    }

    /// Returns `true` for a success envelope.
    #[inline]
    pub fn is_ok(&self) -> bool {
        matches!(self, Envelope::Success { .. })
    }

    /// Renders the envelope back into its JSON document.
    pub fn to_value(&self) -> Value {
        match self {
            Envelope::Success { operation, data } => json!({
                "ok": true,
                "operation": operation,
                "data": data,
            }),
            Envelope::Failure {
                operation,
                error_type,
                message,
            } => json!({
                "ok": false,
                "operation": operation,
                "error": {"type": error_type, "message": message},
            }),
        }
    }
}

#[inline]
fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)?.as_str().map(ToOwned::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_success() {
        let line = json!({
            "ok": true,
            "operation": "get_ticker_fast_info",
            "data": {"lastPrice": 189.5}
        });
        let envelope = Envelope::parse(&format!("{line}\n")).unwrap();
        assert_eq!(
            envelope,
            Envelope::Success {
                operation: "get_ticker_fast_info".to_owned(),
                data: json!({"lastPrice": 189.5}),
            }
        );
        assert!(envelope.is_ok());
    }

    #[test]
    fn test_parse_failure() {
        let line = json!({
            "ok": false,
            "operation": null,
            "error": {
                "type": "YFinanceServiceError",
                "message": "Unknown operation: foo"
            }
        });
        let envelope = Envelope::parse(&line.to_string()).unwrap();
        assert_eq!(
            envelope,
            Envelope::Failure {
                operation: None,
                error_type: "YFinanceServiceError".to_owned(),
                message: "Unknown operation: foo".to_owned(),
            }
        );
        assert_eq!(
            envelope.to_value(),
            json!({
                "ok": false,
                "operation": null,
                "error": {
                    "type": "YFinanceServiceError",
                    "message": "Unknown operation: foo"
                }
            })
        );
    }

    #[test]
    fn test_parse_rejects_other_shapes() {
        for text in [
            "",
            "not json",
            "[1, 2]",
            r#"{"ok":"yes"}"#,
            r#"{"ok":true,"data":{}}"#,
            r#"{"ok":true,"operation":"x"}"#,
            r#"{"ok":false,"operation":"x"}"#,
            r#"{"ok":false,"operation":1,"error":{"type":"E","message":"m"}}"#,
            r#"{"ok":false,"error":{"type":"E"}}"#,
        ] {
            assert_eq!(Envelope::parse(text), None, "{text}");
        }
    }
}
