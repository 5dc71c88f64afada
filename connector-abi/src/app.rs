use serde_json::{Map, Value};

use crate::function::FunctionTable;
use crate::types::{BeginUserAuth, CredentialCheck, EndUserAuth, HttpError};

/// Authentication the orchestration platform must satisfy to call an
/// application at all.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlatformAuthMode {
    None,
    Basic,
}

/// Authentication an end user must complete before an application may act on
/// a third-party service on their behalf.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UserAuthMode {
    None,
    Credentials,
    Web,
}

impl UserAuthMode {
    pub fn as_str(self) -> &'static str {
        match self {
            UserAuthMode::None => "none",
            UserAuthMode::Credentials => "credentials",
            UserAuthMode::Web => "web",
        }
    }
}

/// Decoded request context handed to the form validation and form request
/// hooks.
pub struct FormContext<'a> {
    pub function: &'a str,
    pub form_data: &'a Map<String, Value>,
    /// Output variables of the task's trigger; present only when the form
    /// belongs to an action.
    pub trigger_output_vars: Option<&'a Map<String, Value>>,
    pub language: &'a str,
    pub authentication: Option<&'a Map<String, Value>>,
}

/// A registered integration exposing triggers and actions under one
/// identifier.
///
/// Instances are constructed once per incoming request and hold no
/// cross-request state; anything worth keeping is returned to the platform
/// through the `*_to_save` fields and resupplied on the next call.
///
/// Hooks guarded by an auth mode are only invoked when the application
/// declares that mode, so the defaults are safe for applications that do not
/// use them.
pub trait Application: Send + Sync {
    fn identifier(&self) -> &str;

    fn title(&self, language: &str) -> String;

    /// Protocol version the application was written against.
    fn api_version(&self) -> u32 {
        1
    }

    /// Non-empty, ordered; the first entry is the fallback language.
    fn supported_languages(&self) -> &[&'static str];

    /// Platform-relative path the platform fetches images from. When `None`,
    /// images are served through the `image` hook instead.
    fn images_path(&self) -> Option<&str> {
        None
    }

    fn platform_auth_mode(&self) -> PlatformAuthMode {
        PlatformAuthMode::None
    }

    fn platform_credentials_valid(&self, _user: &str, _password: &str) -> bool {
        true
    }

    fn user_auth_mode(&self) -> UserAuthMode {
        UserAuthMode::None
    }

    /// The capability table: every trigger and action, in registration order.
    fn functions(&self) -> &FunctionTable;

    fn function_disabled(&self, _function: &str) -> bool {
        false
    }

    fn function_caption(&self, function: &str, _language: &str) -> String {
        function.to_string()
    }

    /// Texts for the form of `function` in `language`, in display order.
    fn form_texts(&self, _function: &str, _language: &str) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Descriptions for a trigger's output variables in `language`.
    fn output_var_texts(&self, _function: &str, _language: &str) -> Vec<(String, String)> {
        Vec::new()
    }

    /// PNG contents for a named image, used only when `images_path` is
    /// `None`. `Ok(None)` means the image is unknown.
    fn image(&self, _name: &str) -> Result<Option<Vec<u8>>, HttpError> {
        Ok(None)
    }

    /// Credentials-mode check of a user id and password.
    fn check_user_credentials(
        &self,
        _user: &str,
        _password: &str,
    ) -> Result<CredentialCheck, HttpError> {
        Ok(CredentialCheck::Invalid)
    }

    /// Web-mode phase one: produce the provider URL the user's browser is
    /// sent to, plus any state to retain until phase two.
    fn begin_user_auth(&self, _callback: &str) -> Result<BeginUserAuth, HttpError> {
        Err(HttpError::internal("Web authentication is not implemented"))
    }

    /// Web-mode phase two: `service_data` carries the parameters the provider
    /// appended to the callback URL, `saved_temp_data` whatever phase one
    /// asked to retain.
    fn end_user_auth(
        &self,
        _service_data: &Map<String, Value>,
        _saved_temp_data: Option<&Value>,
    ) -> Result<EndUserAuth, HttpError> {
        Err(HttpError::internal("Web authentication is not implemented"))
    }

    /// Validate user-entered form values. An empty list means the data is
    /// valid; a non-empty list carries the error messages to display.
    fn validate_form(&self, _context: &FormContext<'_>) -> Result<Vec<String>, HttpError> {
        Ok(Vec::new())
    }

    /// Serve a javascript `form_request` call made from a configuration form.
    fn form_request(&self, _context: &FormContext<'_>, _input: &str) -> Result<String, HttpError> {
        Ok(String::new())
    }
}
