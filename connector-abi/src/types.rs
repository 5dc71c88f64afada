use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Terminal protocol error: an HTTP status plus a reason message.
///
/// Never converted into a 2xx response; the dispatcher serializes it as the
/// status code with the message as a plain-text body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpError {
    pub status: u16,
    pub message: String,
}

impl HttpError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(400, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(401, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(500, message)
    }
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.status, self.message)
    }
}

impl std::error::Error for HttpError {}

/// Raw response content that bypasses JSON wrapping (image payloads).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawReply {
    pub content_type: String,
    pub body: Vec<u8>,
}

impl RawReply {
    pub fn new(content_type: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            content_type: content_type.into(),
            body,
        }
    }
}

/// Successful output of a protocol command before HTTP serialization.
#[derive(Clone, Debug)]
pub enum CommandReply {
    /// Serialized as `text/json`.
    Json(Value),
    /// Emitted verbatim with its own content type.
    Raw(RawReply),
    /// Emitted as `text/json` when the string parses as JSON, `text/plain`
    /// otherwise.
    Text(String),
}

pub type CommandResult = Result<CommandReply, HttpError>;

/// Payload delivered to a trigger or action at invocation time.
///
/// Built by projecting the recognized top-level fields out of the request's
/// `data` object; anything else is dropped.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct FunctionInput {
    #[serde(default)]
    pub input_data: Option<Value>,
    #[serde(default)]
    pub form_data: Option<Value>,
    #[serde(default)]
    pub saved_data: Option<Value>,
    #[serde(default)]
    pub authentication: Option<Value>,
}

/// Result of invoking a trigger or action.
///
/// `status_code` 0 means success; any other value is an application-defined
/// domain condition reported inside an HTTP 200, not an HTTP error.
#[derive(Clone, Debug, Serialize)]
pub struct FunctionOutput {
    pub status_code: i64,
    pub status_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_to_save: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debugger: Option<Value>,
}

impl Default for FunctionOutput {
    fn default() -> Self {
        Self {
            status_code: 0,
            status_message: "Ok".to_string(),
            output_data: None,
            data_to_save: None,
            debugger: None,
        }
    }
}

impl FunctionOutput {
    /// Domain outcome with a non-default status, no output data.
    pub fn status(status_code: i64, status_message: impl Into<String>) -> Self {
        Self {
            status_code,
            status_message: status_message.into(),
            ..Self::default()
        }
    }
}

pub type FunctionResult = Result<FunctionOutput, HttpError>;

pub type FunctionHandler = Box<dyn Fn(&FunctionInput) -> FunctionResult + Send + Sync>;

/// Outcome of a credentials-mode user authentication check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CredentialCheck {
    Invalid,
    Valid,
    /// Valid, and the carried value must be persisted by the platform and
    /// resupplied as `auth_saved_data` on later invocations.
    ValidWithData(Value),
}

/// Output of the first phase of a web user-auth handshake.
#[derive(Clone, Debug)]
pub struct BeginUserAuth {
    pub authentication_url: String,
    pub temp_data_to_save: Option<Value>,
}

/// Output of the second phase of a web user-auth handshake.
#[derive(Clone, Debug)]
pub struct EndUserAuth {
    pub valid_credentials: bool,
    pub user_id: Option<Value>,
    pub auth_data_to_save: Option<Value>,
}

impl EndUserAuth {
    pub fn invalid() -> Self {
        Self {
            valid_credentials: false,
            user_id: None,
            auth_data_to_save: None,
        }
    }

    pub fn valid(user_id: impl Into<Value>, auth_data_to_save: Option<Value>) -> Self {
        Self {
            valid_credentials: true,
            user_id: Some(user_id.into()),
            auth_data_to_save,
        }
    }
}

/// Values documented as "to save" leave the core as scalars: arrays and
/// objects are flattened to their JSON text so the platform can persist them
/// opaquely and hand them back verbatim.
pub fn json_if_structured(value: Value) -> Value {
    match value {
        Value::Array(_) | Value::Object(_) => {
            Value::String(serde_json::to_string(&value).unwrap_or_default())
        }
        other => other,
    }
}

/// True for non-null, non-empty scalar JSON values.
pub fn is_scalar(value: &Value) -> bool {
    match value {
        Value::Null | Value::Array(_) | Value::Object(_) => false,
        Value::String(text) => !text.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn structured_save_data_round_trips_through_json_text() {
        let original = json!({"cursor": 42, "seen": ["a", "b"]});
        let normalized = json_if_structured(original.clone());
        let Value::String(text) = normalized else {
            panic!("expected a string, got {normalized:?}");
        };
        let decoded: Value = serde_json::from_str(&text).expect("normalized text should parse");
        assert_eq!(decoded, original);
    }

    #[test]
    fn scalar_save_data_passes_through_unchanged() {
        assert_eq!(json_if_structured(json!(7)), json!(7));
        assert_eq!(json_if_structured(json!("plain")), json!("plain"));
        assert_eq!(json_if_structured(json!(true)), json!(true));
        assert_eq!(json_if_structured(Value::Null), Value::Null);
    }

    #[test]
    fn scalar_check_rejects_empty_and_structured_values() {
        assert!(is_scalar(&json!("user-1")));
        assert!(is_scalar(&json!(123)));
        assert!(is_scalar(&json!(false)));
        assert!(!is_scalar(&json!("")));
        assert!(!is_scalar(&Value::Null));
        assert!(!is_scalar(&json!(["user-1"])));
        assert!(!is_scalar(&json!({"id": "user-1"})));
    }

    #[test]
    fn function_output_defaults_report_success() {
        let output = FunctionOutput::default();
        assert_eq!(output.status_code, 0);
        assert_eq!(output.status_message, "Ok");

        let encoded = serde_json::to_value(&output).expect("output should serialize");
        assert_eq!(
            encoded,
            json!({"status_code": 0, "status_message": "Ok"})
        );
    }

    #[test]
    fn function_input_projection_drops_unknown_fields() {
        let body = json!({
            "input_data": {"title": "x"},
            "form_data": {"to": "a@b"},
            "extra_field": "ignored",
            "saved_data": "17"
        });
        let input: FunctionInput =
            serde_json::from_value(body).expect("projection should succeed");
        assert_eq!(input.input_data, Some(json!({"title": "x"})));
        assert_eq!(input.form_data, Some(json!({"to": "a@b"})));
        assert_eq!(input.saved_data, Some(json!("17")));
        assert!(input.authentication.is_none());
    }
}
