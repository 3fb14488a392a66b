//! Structured model responses
//!
//! Both model round trips (SQL analysis and chart selection) ask for a call
//! to one declared function. The reply is decoded here into
//! [`Structured::Result`] when the model called the function, or
//! [`Structured::FreeText`] when it answered in prose.

mod chart;
mod sql;

pub use chart::*;
pub use sql::*;

use crate::error::{Error, Result};
use crate::llm::{ChatMessage, CompletionRequest, CompletionService, FunctionSpec, ModelReply};
use serde::de::DeserializeOwned;
use tracing::debug;

/// A function the model is asked to call, with the fields its arguments must carry
#[derive(Debug, Clone)]
pub struct StructuredSchema {
    pub function: FunctionSpec,
    /// Alternative field sets; the arguments must carry every field of at least one
    pub required: &'static [&'static [&'static str]],
}

/// A decoded function-call payload
pub trait StructuredPayload: DeserializeOwned {
    /// Checks beyond field presence; the message becomes a [`Error::MalformedResponse`]
    fn validate(&self) -> std::result::Result<(), String> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Structured<T> {
    Result(T),
    FreeText(String),
}

/// Decode a model reply against `schema`.
///
/// A call to a different function is [`Error::UnexpectedPayloadShape`]. A call
/// whose arguments are not a JSON object carrying one of the required field
/// sets, that does not deserialize into `T`, or that `T` fails to validate, is
/// [`Error::MalformedResponse`] with the arguments attached.
pub fn parse_reply<T: StructuredPayload>(
    reply: ModelReply,
    schema: &StructuredSchema,
) -> Result<Structured<T>> {
    let call = match reply {
        ModelReply::Text(text) => return Ok(Structured::FreeText(text)),
        ModelReply::FunctionCall(call) => call,
    };

    if call.name != schema.function.name {
        return Err(Error::UnexpectedPayloadShape {
            expected: schema.function.name.clone(),
            actual: call.name,
            raw: call.arguments,
        });
    }

    let value: serde_json::Value = match serde_json::from_str(&call.arguments) {
        Ok(v) => v,
        Err(e) => {
            return Err(Error::MalformedResponse {
                message: format!("arguments are not valid JSON: {}", e),
                raw: call.arguments,
            })
        }
    };

    let Some(object) = value.as_object() else {
        return Err(Error::MalformedResponse {
            message: "arguments are not a JSON object".to_string(),
            raw: call.arguments,
        });
    };

    let missing: Vec<Vec<&str>> = schema
        .required
        .iter()
        .map(|set| {
            set.iter()
                .copied()
                .filter(|field| object.get(*field).map_or(true, |v| v.is_null()))
                .collect::<Vec<_>>()
        })
        .collect();
    if !missing.is_empty() && missing.iter().all(|m| !m.is_empty()) {
        let sets: Vec<String> = missing.iter().map(|m| m.join(", ")).collect();
        return Err(Error::MalformedResponse {
            message: format!("missing required fields: {}", sets.join(" or ")),
            raw: call.arguments,
        });
    }

    let parsed: T = match serde_json::from_value(value) {
        Ok(parsed) => parsed,
        Err(e) => {
            return Err(Error::MalformedResponse {
                message: e.to_string(),
                raw: call.arguments,
            })
        }
    };

    if let Err(message) = parsed.validate() {
        return Err(Error::MalformedResponse {
            message,
            raw: call.arguments,
        });
    }
    Ok(Structured::Result(parsed))
}

/// Send `messages` with `schema` declared and decode the reply
pub async fn ask_structured<T: StructuredPayload>(
    completion: &dyn CompletionService,
    messages: Vec<ChatMessage>,
    schema: &StructuredSchema,
    force: bool,
) -> Result<Structured<T>> {
    debug!(
        function = %schema.function.name,
        model = %completion.model_name(),
        force,
        "Requesting structured reply"
    );
    let reply = completion
        .complete(CompletionRequest {
            messages,
            function: Some(schema.function.clone()),
            force_function: force,
        })
        .await?;
    parse_reply(reply, schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::FunctionCall;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Pair {
        a: String,
        b: i64,
    }

    impl StructuredPayload for Pair {
        fn validate(&self) -> std::result::Result<(), String> {
            if self.b < 0 {
                return Err("b must not be negative".to_string());
            }
            Ok(())
        }
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Either {
        #[serde(default)]
        a: Option<String>,
        #[serde(default)]
        c: Option<String>,
    }

    impl StructuredPayload for Either {}

    fn schema() -> StructuredSchema {
        StructuredSchema {
            function: FunctionSpec {
                name: "pair".to_string(),
                description: "A pair".to_string(),
                parameters: json!({"type": "object"}),
            },
            required: &[&["a", "b"]],
        }
    }

    fn either_schema() -> StructuredSchema {
        StructuredSchema {
            required: &[&["a"], &["c"]],
            ..schema()
        }
    }

    fn call(name: &str, arguments: &str) -> ModelReply {
        ModelReply::FunctionCall(FunctionCall {
            name: name.to_string(),
            arguments: arguments.to_string(),
        })
    }

    #[test]
    fn test_structured_payload() {
        let parsed: Structured<Pair> = parse_reply(call("pair", r#"{"a": "x", "b": 2}"#), &schema()).unwrap();
        assert_eq!(
            parsed,
            Structured::Result(Pair {
                a: "x".to_string(),
                b: 2
            })
        );
    }

    #[test]
    fn test_free_text() {
        let parsed: Structured<Pair> =
            parse_reply(ModelReply::Text("no idea".to_string()), &schema()).unwrap();
        assert_eq!(parsed, Structured::FreeText("no idea".to_string()));
    }

    #[test]
    fn test_wrong_function_name() {
        let err = parse_reply::<Pair>(call("other", "{}"), &schema()).unwrap_err();
        assert!(matches!(
            err,
            Error::UnexpectedPayloadShape { ref expected, ref actual, .. } if expected == "pair" && actual == "other"
        ));
    }

    #[test]
    fn test_malformed_payloads_keep_raw() {
        for raw in [
            "{not json",
            "[1, 2]",
            r#"{"a": "x"}"#,
            r#"{"a": "x", "b": null}"#,
            r#"{"a": "x", "b": "two"}"#,
            r#"{"a": "x", "b": -1}"#,
        ] {
            let err = parse_reply::<Pair>(call("pair", raw), &schema()).unwrap_err();
            match err {
                Error::MalformedResponse { raw: kept, .. } => assert_eq!(kept, raw),
                other => panic!("unexpected error for {}: {:?}", raw, other),
            }
        }
    }

    #[test]
    fn test_missing_fields_are_named() {
        let err = parse_reply::<Pair>(call("pair", "{}"), &schema()).unwrap_err();
        assert!(err.to_string().contains("missing required fields: a, b"));
    }

    #[test]
    fn test_alternative_field_sets() {
        let parsed: Structured<Either> = parse_reply(call("pair", r#"{"c": "y"}"#), &either_schema()).unwrap();
        assert_eq!(
            parsed,
            Structured::Result(Either {
                a: None,
                c: Some("y".to_string())
            })
        );

        let err = parse_reply::<Either>(call("pair", r#"{"b": 1}"#), &either_schema()).unwrap_err();
        assert!(err.to_string().contains("missing required fields: a or c"));
    }

    #[test]
    fn test_validation_failure_keeps_raw() {
        let raw = r#"{"a": "x", "b": -3}"#;
        let err = parse_reply::<Pair>(call("pair", raw), &schema()).unwrap_err();
        assert!(matches!(
            err,
            Error::MalformedResponse { ref message, raw: ref kept } if message.contains("negative") && kept == raw
        ));
    }
}
