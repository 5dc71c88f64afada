use std::collections::HashMap;

use axum::http::{HeaderMap, header::AUTHORIZATION};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use connector_abi::{
    Application, CommandReply, CommandResult, CredentialCheck, HttpError, PlatformAuthMode,
    UserAuthMode, is_scalar, json_if_structured,
};
use serde_json::{Map, Value};

use crate::server::decode_data_object;

pub(crate) enum PlatformAuthRejection {
    /// No usable credentials; the response must carry the basic-auth
    /// challenge so the platform can retry.
    MissingCredentials,
    BadCredentials,
}

/// Platform-level gate, applied to every command before dispatch.
pub(crate) fn check_platform_auth(
    app: &dyn Application,
    headers: &HeaderMap,
) -> Result<(), PlatformAuthRejection> {
    match app.platform_auth_mode() {
        PlatformAuthMode::None => Ok(()),
        PlatformAuthMode::Basic => {
            let Some((user, password)) = basic_credentials(headers) else {
                return Err(PlatformAuthRejection::MissingCredentials);
            };
            if app.platform_credentials_valid(&user, &password) {
                Ok(())
            } else {
                Err(PlatformAuthRejection::BadCredentials)
            }
        }
    }
}

fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let header = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let encoded = header.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (user, password) = text.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}

/// Single-shot credentials-mode user authentication.
pub(crate) fn authenticate_user(
    app: &dyn Application,
    params: &HashMap<String, String>,
) -> CommandResult {
    if app.user_auth_mode() != UserAuthMode::Credentials {
        return Err(HttpError::bad_request(
            "This app does not support the credentials authentication mode",
        ));
    }

    let data = decode_data_object(params)?;
    let (Some(user_id), Some(password)) = (
        scalar_text(&data, "user_id"),
        scalar_text(&data, "password"),
    ) else {
        return Err(HttpError::bad_request(
            "User id or password missing in 'data'",
        ));
    };

    let mut output = Map::new();
    match app.check_user_credentials(user_id, password)? {
        CredentialCheck::Invalid => {
            output.insert("valid_credentials".to_string(), Value::Bool(false));
        }
        CredentialCheck::Valid => {
            output.insert("valid_credentials".to_string(), Value::Bool(true));
            output.insert("user_id".to_string(), Value::String(user_id.to_string()));
        }
        CredentialCheck::ValidWithData(extra) => {
            output.insert("valid_credentials".to_string(), Value::Bool(true));
            output.insert("user_id".to_string(), Value::String(user_id.to_string()));
            output.insert("auth_data_to_save".to_string(), json_if_structured(extra));
        }
    }

    Ok(CommandReply::Json(Value::Object(output)))
}

/// Web-mode handshake, phase one.
pub(crate) fn begin_authenticate_user(
    app: &dyn Application,
    params: &HashMap<String, String>,
) -> CommandResult {
    require_web_mode(app)?;

    let data = decode_data_object(params)?;
    let Some(callback) = scalar_text(&data, "callback") else {
        return Err(HttpError::bad_request("callback missing in 'data'"));
    };

    let result = app.begin_user_auth(callback)?;

    let mut output = Map::new();
    output.insert(
        "authentication_url".to_string(),
        Value::String(result.authentication_url),
    );
    if let Some(temp_data) = result.temp_data_to_save {
        output.insert(
            "temp_data_to_save".to_string(),
            json_if_structured(temp_data),
        );
    }

    Ok(CommandReply::Json(Value::Object(output)))
}

/// Web-mode handshake, phase two. The application's answer is validated
/// here: a success without a usable user id is a provider bug, not a caller
/// error.
pub(crate) fn end_authenticate_user(
    app: &dyn Application,
    params: &HashMap<String, String>,
) -> CommandResult {
    require_web_mode(app)?;

    let data = decode_data_object(params)?;
    let service_data = match data.get("service_data") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(object)) => object.clone(),
        Some(_) => {
            return Err(HttpError::bad_request("'service_data' must be an object"));
        }
    };
    let saved_temp_data = data.get("saved_temp_data").filter(|value| !value.is_null());

    let result = app.end_user_auth(&service_data, saved_temp_data)?;

    let mut output = Map::new();
    output.insert(
        "valid_credentials".to_string(),
        Value::Bool(result.valid_credentials),
    );
    if result.valid_credentials {
        let user_id = match result.user_id {
            Some(value) if is_scalar(&value) => value,
            Some(Value::Array(_)) | Some(Value::Object(_)) => {
                return Err(HttpError::internal(
                    "end_user_auth returned an array or object as user id",
                ));
            }
            _ => {
                return Err(HttpError::internal(
                    "end_user_auth returned an empty user id",
                ));
            }
        };
        output.insert("user_id".to_string(), user_id);
    }
    if let Some(auth_data) = result.auth_data_to_save {
        output.insert(
            "auth_data_to_save".to_string(),
            json_if_structured(auth_data),
        );
    }

    Ok(CommandReply::Json(Value::Object(output)))
}

fn require_web_mode(app: &dyn Application) -> Result<(), HttpError> {
    if app.user_auth_mode() != UserAuthMode::Web {
        return Err(HttpError::bad_request(
            "This app does not support the web authentication mode",
        ));
    }
    Ok(())
}

fn scalar_text<'a>(data: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    match data.get(key) {
        Some(Value::String(text)) if !text.is_empty() => Some(text),
        _ => None,
    }
}
