use std::collections::HashMap;

use connector_abi::{
    Application, CommandReply, CommandResult, FormContext, FunctionInput, FunctionKind, HttpError,
    UserAuthMode, json_if_structured,
};
use serde_json::{Map, Value};

use crate::server::{decode_data_object, require_param};

/// `process_trigger` and `do_action`, parameterized by the function kind.
pub(crate) fn invoke_function(
    app: &dyn Application,
    kind: FunctionKind,
    params: &HashMap<String, String>,
) -> CommandResult {
    let id = require_param(params, "id")?;
    let data = decode_data_object(params)?;

    let Some(entry) = app.functions().resolve(kind, id) else {
        return Err(HttpError::bad_request(format!("Unknown function '{id}'")));
    };

    if app.user_auth_mode() != UserAuthMode::None && !data.contains_key("authentication") {
        return Err(HttpError::unauthorized(
            "User authentication data not provided",
        ));
    }
    if kind == FunctionKind::Action && !data.contains_key("input_data") {
        return Err(HttpError::bad_request("'input_data' is missing in 'data'"));
    }

    // Project only the recognized top-level fields; anything else in the
    // body is dropped.
    let input = FunctionInput {
        input_data: data.get("input_data").cloned(),
        form_data: data.get("form_data").cloned(),
        saved_data: data.get("saved_data").cloned(),
        authentication: data.get("authentication").cloned(),
    };

    let mut output = entry.invoke(&input)?;
    if let Some(data_to_save) = output.data_to_save.take() {
        output.data_to_save = Some(json_if_structured(data_to_save));
    }

    match serde_json::to_value(&output) {
        Ok(value) => Ok(CommandReply::Json(value)),
        Err(_) => Err(HttpError::internal("Function output serialization failed")),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FormMode {
    Validate,
    Request,
}

/// Shared body of `validate_form_data` and `form_request`.
pub(crate) fn form_command(
    app: &dyn Application,
    params: &HashMap<String, String>,
    mode: FormMode,
) -> CommandResult {
    let id = require_param(params, "id")?;
    let data = decode_data_object(params)?;

    let Some(Value::String(language)) = data.get("language") else {
        return Err(HttpError::bad_request("language missing in data"));
    };
    let form_data = match data.get("form_data") {
        None => return Err(HttpError::bad_request("form_data missing in data")),
        Some(Value::Object(object)) => object,
        Some(_) => {
            return Err(HttpError::bad_request(
                "form_data is a scalar value, must be an object",
            ));
        }
    };
    let trigger_output_vars = match data.get("trigger_output_vars") {
        None => None,
        Some(Value::Object(object)) => Some(object),
        Some(_) => {
            return Err(HttpError::bad_request(
                "trigger_output_vars is a scalar value, must be an object",
            ));
        }
    };
    let authentication = match data.get("authentication") {
        None => None,
        Some(Value::Object(object)) => Some(object),
        Some(_) => {
            return Err(HttpError::bad_request(
                "authentication is a scalar value, must be an object",
            ));
        }
    };

    let input = if mode == FormMode::Request {
        Some(scalar_input(&data)?)
    } else {
        None
    };

    let context = FormContext {
        function: id,
        form_data,
        trigger_output_vars,
        language,
        authentication,
    };

    let mut output = Map::new();
    match mode {
        FormMode::Validate => {
            let errors = app.validate_form(&context)?;
            output.insert("valid_data".to_string(), Value::Bool(errors.is_empty()));
            if !errors.is_empty() {
                output.insert(
                    "error_messages".to_string(),
                    Value::Array(errors.into_iter().map(Value::String).collect()),
                );
            }
        }
        FormMode::Request => {
            let result = app.form_request(&context, input.as_deref().unwrap_or_default())?;
            output.insert("output".to_string(), Value::String(result));
        }
    }

    Ok(CommandReply::Json(Value::Object(output)))
}

fn scalar_input(data: &Map<String, Value>) -> Result<String, HttpError> {
    match data.get("input") {
        Some(Value::String(text)) => Ok(text.clone()),
        Some(Value::Number(number)) => Ok(number.to_string()),
        Some(Value::Bool(flag)) => Ok(flag.to_string()),
        _ => Err(HttpError::bad_request("input missing in data")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use connector_abi::{FunctionEntry, FunctionOutput, FunctionTable};
    use serde_json::json;

    struct EchoApp {
        user_auth_mode: UserAuthMode,
        functions: FunctionTable,
    }

    impl EchoApp {
        fn new(user_auth_mode: UserAuthMode) -> Self {
            Self {
                user_auth_mode,
                functions: FunctionTable::new(vec![
                    FunctionEntry::trigger(
                        "tick",
                        &[("count", "text")],
                        "1m",
                        None,
                        |input| {
                            let count = input
                                .saved_data
                                .as_ref()
                                .and_then(Value::as_str)
                                .and_then(|raw| raw.parse::<u64>().ok())
                                .unwrap_or(0)
                                + 1;
                            Ok(FunctionOutput {
                                output_data: Some(json!({"count": count.to_string()})),
                                data_to_save: Some(json!({"count": count})),
                                ..FunctionOutput::default()
                            })
                        },
                    ),
                    FunctionEntry::action("echo", &[("text", "text")], None, |input| {
                        Ok(FunctionOutput {
                            output_data: input.input_data.clone(),
                            ..FunctionOutput::default()
                        })
                    }),
                ]),
            }
        }
    }

    impl Application for EchoApp {
        fn identifier(&self) -> &str {
            "echo_app"
        }

        fn title(&self, _language: &str) -> String {
            "Echo".to_string()
        }

        fn supported_languages(&self) -> &[&'static str] {
            &["en"]
        }

        fn user_auth_mode(&self) -> UserAuthMode {
            self.user_auth_mode
        }

        fn functions(&self) -> &FunctionTable {
            &self.functions
        }

        fn validate_form(&self, context: &FormContext<'_>) -> Result<Vec<String>, HttpError> {
            if context.form_data.contains_key("text") {
                Ok(Vec::new())
            } else {
                Ok(vec!["text is mandatory".to_string()])
            }
        }

        fn form_request(
            &self,
            _context: &FormContext<'_>,
            input: &str,
        ) -> Result<String, HttpError> {
            Ok(format!("echo: {input}"))
        }
    }

    fn request_params(id: &str, data: Value) -> HashMap<String, String> {
        let mut params = HashMap::new();
        params.insert("id".to_string(), id.to_string());
        params.insert("data".to_string(), data.to_string());
        params
    }

    fn reply_json(result: CommandResult) -> Value {
        match result.expect("command should succeed") {
            CommandReply::Json(value) => value,
            other => panic!("expected a json reply, got {other:?}"),
        }
    }

    #[test]
    fn unknown_functions_are_rejected_before_payload_checks() {
        let app = EchoApp::new(UserAuthMode::Credentials);
        let params = request_params("missing_fn", json!({}));
        let error =
            invoke_function(&app, FunctionKind::Action, &params).expect_err("unknown function");
        assert_eq!(error.status, 400);
        assert_eq!(error.message, "Unknown function 'missing_fn'");
    }

    #[test]
    fn missing_authentication_yields_401_when_user_auth_is_required() {
        let app = EchoApp::new(UserAuthMode::Credentials);
        let params = request_params("tick", json!({"form_data": {}}));
        let error =
            invoke_function(&app, FunctionKind::Trigger, &params).expect_err("missing auth");
        assert_eq!(error.status, 401);
    }

    #[test]
    fn actions_require_input_data_but_triggers_do_not() {
        let app = EchoApp::new(UserAuthMode::None);
        let error = invoke_function(&app, FunctionKind::Action, &request_params("echo", json!({})))
            .expect_err("missing input_data");
        assert_eq!(error.message, "'input_data' is missing in 'data'");

        let output = reply_json(invoke_function(
            &app,
            FunctionKind::Trigger,
            &request_params("tick", json!({})),
        ));
        assert_eq!(output["status_code"], json!(0));
    }

    #[test]
    fn structured_data_to_save_leaves_as_a_json_string() {
        let app = EchoApp::new(UserAuthMode::None);
        let output = reply_json(invoke_function(
            &app,
            FunctionKind::Trigger,
            &request_params("tick", json!({"saved_data": "2"})),
        ));
        assert_eq!(output["output_data"]["count"], json!("3"));
        let saved = output["data_to_save"].as_str().expect("saved data is text");
        assert_eq!(
            serde_json::from_str::<Value>(saved).expect("saved data parses"),
            json!({"count": 3})
        );
    }

    #[test]
    fn form_validation_reports_errors_or_success() {
        let app = EchoApp::new(UserAuthMode::None);

        let valid = reply_json(form_command(
            &app,
            &request_params("echo", json!({"language": "en", "form_data": {"text": "x"}})),
            FormMode::Validate,
        ));
        assert_eq!(valid, json!({"valid_data": true}));

        let invalid = reply_json(form_command(
            &app,
            &request_params("echo", json!({"language": "en", "form_data": {}})),
            FormMode::Validate,
        ));
        assert_eq!(
            invalid,
            json!({"valid_data": false, "error_messages": ["text is mandatory"]})
        );
    }

    #[test]
    fn form_requests_require_a_scalar_input() {
        let app = EchoApp::new(UserAuthMode::None);

        let reply = reply_json(form_command(
            &app,
            &request_params(
                "echo",
                json!({"language": "en", "form_data": {}, "input": "ping"}),
            ),
            FormMode::Request,
        ));
        assert_eq!(reply, json!({"output": "echo: ping"}));

        let error = form_command(
            &app,
            &request_params(
                "echo",
                json!({"language": "en", "form_data": {}, "input": {"nested": true}}),
            ),
            FormMode::Request,
        )
        .expect_err("object input");
        assert_eq!(error.status, 400);
    }

    #[test]
    fn malformed_form_payloads_are_caller_errors() {
        let app = EchoApp::new(UserAuthMode::None);

        let missing_language = form_command(
            &app,
            &request_params("echo", json!({"form_data": {}})),
            FormMode::Validate,
        )
        .expect_err("missing language");
        assert_eq!(missing_language.message, "language missing in data");

        let scalar_form = form_command(
            &app,
            &request_params("echo", json!({"language": "en", "form_data": "nope"})),
            FormMode::Validate,
        )
        .expect_err("scalar form_data");
        assert_eq!(
            scalar_form.message,
            "form_data is a scalar value, must be an object"
        );

        let scalar_vars = form_command(
            &app,
            &request_params(
                "echo",
                json!({"language": "en", "form_data": {}, "trigger_output_vars": 5}),
            ),
            FormMode::Validate,
        )
        .expect_err("scalar trigger_output_vars");
        assert_eq!(scalar_vars.status, 400);
    }
}
