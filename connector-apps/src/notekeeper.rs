use std::env;
use std::time::{SystemTime, UNIX_EPOCH};

use connector_abi::{
    Application, BeginUserAuth, EndUserAuth, FormContext, FunctionEntry, FunctionInput,
    FunctionOutput, FunctionResult, FunctionTable, HttpError, UserAuthMode,
};
use serde_json::{Map, Value, json};
use url::Url;
use uuid::Uuid;

const NOTE_FORM: &str = concat!(
    "{{txt_title}}:<br/><input type=\"text\" name=\"title\"/><br/>\n",
    "{{txt_body}}:<br/><textarea name=\"body\" cols=\"40\" rows=\"10\"></textarea><br/>\n",
    "{{txt_notebook}}:<br/><input type=\"text\" name=\"notebook\"/><br/>\n",
    "{{txt_tags}}:<br/><input type=\"text\" name=\"tags\"/>"
);

const NOTE_FIELDS: [&str; 4] = ["title", "body", "notebook", "tags"];

// 1x1 transparent PNG served through the get_image command.
const ICON_PNG: [u8; 68] = [
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
    0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0B, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x60,
    0x00, 0x02, 0x00, 0x00, 0x05, 0x00, 0x01, 0x7A, 0x5E, 0xAB, 0x3F, 0x00, 0x00, 0x00, 0x00,
    0x49, 0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

#[derive(Clone, Debug)]
pub struct NotekeeperConfig {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub sandbox: bool,
}

impl NotekeeperConfig {
    pub fn from_env() -> Self {
        Self {
            consumer_key: env::var("HUB_NOTEKEEPER_CONSUMER_KEY").unwrap_or_default(),
            consumer_secret: env::var("HUB_NOTEKEEPER_CONSUMER_SECRET").unwrap_or_default(),
            sandbox: env::var("HUB_NOTEKEEPER_SANDBOX")
                .map(|value| matches!(value.as_str(), "true" | "1" | "yes"))
                .unwrap_or(true),
        }
    }

    fn provider_url(&self) -> &'static str {
        if self.sandbox {
            "https://sandbox.notes.example.com"
        } else {
            "https://www.notes.example.com"
        }
    }
}

/// Note-service integration using the web authentication handshake: a
/// trigger that watches the user's shared notebook and an action that files
/// new notes.
pub struct Notekeeper {
    config: NotekeeperConfig,
    functions: FunctionTable,
}

impl Notekeeper {
    pub fn new(config: NotekeeperConfig) -> Self {
        let provider = config.provider_url();
        Self {
            config,
            functions: FunctionTable::new(vec![
                FunctionEntry::trigger(
                    "new_shared_note",
                    &[("title", "text"), ("url", "url"), ("created", "date")],
                    "15m",
                    None,
                    move |input| new_shared_note(provider, input),
                ),
                FunctionEntry::action(
                    "create_note",
                    &[("title", "text"), ("body?", "text")],
                    Some(NOTE_FORM),
                    move |input| create_note(provider, input),
                ),
            ]),
        }
    }
}

impl Application for Notekeeper {
    fn identifier(&self) -> &str {
        "notekeeper"
    }

    fn title(&self, _language: &str) -> String {
        "Notekeeper".to_string()
    }

    fn supported_languages(&self) -> &[&'static str] {
        &["en", "es"]
    }

    fn user_auth_mode(&self) -> UserAuthMode {
        UserAuthMode::Web
    }

    fn functions(&self) -> &FunctionTable {
        &self.functions
    }

    fn function_caption(&self, function: &str, language: &str) -> String {
        match (function, language) {
            ("new_shared_note", "es") => "Nueva nota compartida".to_string(),
            ("new_shared_note", _) => "New shared note".to_string(),
            ("create_note", "es") => "Crear una nota".to_string(),
            ("create_note", _) => "Create a note".to_string(),
            (other, _) => other.to_string(),
        }
    }

    fn form_texts(&self, function: &str, language: &str) -> Vec<(String, String)> {
        if function != "create_note" {
            return Vec::new();
        }
        let texts: &[(&str, &str)] = if language == "es" {
            &[
                ("txt_title", "Título de la nota"),
                ("txt_body", "Cuerpo de la nota"),
                ("txt_notebook", "Cuaderno"),
                ("txt_tags", "Etiquetas"),
            ]
        } else {
            &[
                ("txt_title", "Note title"),
                ("txt_body", "Note body"),
                ("txt_notebook", "Notebook"),
                ("txt_tags", "Tags"),
            ]
        };
        texts
            .iter()
            .map(|(key, text)| (key.to_string(), text.to_string()))
            .collect()
    }

    fn output_var_texts(&self, function: &str, language: &str) -> Vec<(String, String)> {
        if function != "new_shared_note" {
            return Vec::new();
        }
        let texts: &[(&str, &str)] = if language == "es" {
            &[
                ("title", "Título"),
                ("url", "Url"),
                ("created", "Fecha de creación"),
            ]
        } else {
            &[
                ("title", "Title"),
                ("url", "Url"),
                ("created", "Creation date"),
            ]
        };
        texts
            .iter()
            .map(|(key, text)| (key.to_string(), text.to_string()))
            .collect()
    }

    fn image(&self, name: &str) -> Result<Option<Vec<u8>>, HttpError> {
        if name == "icon" {
            Ok(Some(ICON_PNG.to_vec()))
        } else {
            Ok(None)
        }
    }

    fn begin_user_auth(&self, callback: &str) -> Result<BeginUserAuth, HttpError> {
        if self.config.consumer_key.is_empty() || self.config.consumer_secret.is_empty() {
            return Err(HttpError::internal(
                "Notekeeper OAuth keys are not configured in server",
            ));
        }

        let nonce = Uuid::new_v4().to_string();
        let mut authorize = Url::parse(self.config.provider_url())
            .and_then(|base| base.join("/OAuth.action"))
            .map_err(|_| HttpError::internal("Invalid provider url"))?;
        authorize
            .query_pairs_mut()
            .append_pair("client_id", &self.config.consumer_key)
            .append_pair("state", &nonce)
            .append_pair("callback", callback);

        Ok(BeginUserAuth {
            authentication_url: authorize.to_string(),
            temp_data_to_save: Some(Value::String(nonce)),
        })
    }

    fn end_user_auth(
        &self,
        service_data: &Map<String, Value>,
        saved_temp_data: Option<&Value>,
    ) -> Result<EndUserAuth, HttpError> {
        let Some(verifier) = text_param(service_data, "verifier") else {
            return Ok(EndUserAuth::invalid());
        };

        let Some(saved_nonce) = saved_temp_data.and_then(Value::as_str) else {
            return Err(HttpError::bad_request(
                "Temporary authentication data is empty",
            ));
        };
        if text_param(service_data, "state") != Some(saved_nonce) {
            return Err(HttpError::bad_request("Temporary access token mismatch"));
        }

        let Some(user) = text_param(service_data, "user") else {
            return Err(HttpError::internal("Error obtaining username"));
        };

        let auth_data = json!({
            "access_token": format!("{saved_nonce}.{verifier}"),
            "access_token_secret": self.config.consumer_secret,
        });
        Ok(EndUserAuth::valid(user, Some(auth_data)))
    }

    fn validate_form(&self, context: &FormContext<'_>) -> Result<Vec<String>, HttpError> {
        if context.function != "create_note" {
            return Err(HttpError::bad_request(format!(
                "Unknown function '{}'",
                context.function
            )));
        }
        let message = if context.language == "es" {
            "Todos los campos del formulario son obligatorios"
        } else {
            "All form fields are mandatory"
        };
        for field in NOTE_FIELDS {
            let set = context
                .form_data
                .get(field)
                .and_then(Value::as_str)
                .map(|text| !text.trim().is_empty())
                .unwrap_or(false);
            if !set {
                return Ok(vec![message.to_string()]);
            }
        }
        Ok(Vec::new())
    }
}

fn new_shared_note(provider: &str, input: &FunctionInput) -> FunctionResult {
    let token = access_token(input)?;
    let store = NoteStore::connect(provider, &token);

    let Some(note) = store.latest_shared_note() else {
        return Ok(FunctionOutput::status(200, "No public notebooks available"));
    };

    let Some(saved) = input.saved_data.as_ref().and_then(saved_count) else {
        // First execution for this task: remember where the notebook is and
        // report nothing.
        return Ok(FunctionOutput {
            data_to_save: Some(Value::from(note.update_count)),
            ..FunctionOutput::status(1, "No previous update count available")
        });
    };

    if note.update_count <= saved {
        return Ok(FunctionOutput {
            data_to_save: Some(Value::from(note.update_count)),
            ..FunctionOutput::status(0, "No new notes available")
        });
    }

    Ok(FunctionOutput {
        output_data: Some(json!({
            "title": note.title,
            "url": note.url,
            "created": note.created,
        })),
        data_to_save: Some(Value::from(note.update_count)),
        ..FunctionOutput::default()
    })
}

fn create_note(provider: &str, input: &FunctionInput) -> FunctionResult {
    let token = access_token(input)?;

    let Some(form_data) = input.form_data.as_ref() else {
        return Err(HttpError::bad_request(
            "Received input data is invalid (missing form_data)",
        ));
    };

    // Caller-supplied input variables override the form template.
    let input_data = input.input_data.as_ref();
    let field = |name: &str| -> String {
        input_data
            .and_then(|data| data.get(name))
            .or_else(|| form_data.get(name))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    for item in NOTE_FIELDS {
        if field(item).trim().is_empty() {
            return Ok(FunctionOutput::status(
                200,
                format!("'{item}' is missing in form data."),
            ));
        }
    }

    let notebook = field("notebook");
    let store = NoteStore::connect(provider, &token);
    if !store.has_notebook(&notebook) {
        return Ok(FunctionOutput::status(
            100,
            format!("No notebook exists named '{notebook}'."),
        ));
    }

    let tags: Vec<String> = field("tags")
        .split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect();
    store.create_note(&notebook, &field("title"), &field("body"), &tags);

    Ok(FunctionOutput::default())
}

fn access_token(input: &FunctionInput) -> Result<String, HttpError> {
    let Some(authentication) = input.authentication.as_ref() else {
        return Err(HttpError::bad_request(
            "Received input data (authentication) is invalid",
        ));
    };
    let Some(saved) = authentication.get("auth_saved_data").and_then(Value::as_str) else {
        return Err(HttpError::bad_request(
            "Received input data (auth_saved_data) is invalid",
        ));
    };
    let Ok(auth_data) = serde_json::from_str::<Value>(saved) else {
        return Err(HttpError::bad_request(
            "Received input data (auth_saved_data) is invalid",
        ));
    };
    match auth_data.get("access_token").and_then(Value::as_str) {
        Some(token) if !token.is_empty() => Ok(token.to_string()),
        _ => Err(HttpError::bad_request(
            "Received input data does not contain access token",
        )),
    }
}

fn saved_count(saved: &Value) -> Option<i64> {
    match saved {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.parse().ok(),
        _ => None,
    }
}

fn text_param<'a>(params: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    match params.get(key) {
        Some(Value::String(text)) if !text.is_empty() => Some(text),
        _ => None,
    }
}

struct SharedNote {
    title: String,
    url: String,
    created: String,
    update_count: i64,
}

/// Client for the note service. The service's read model is keyed by the
/// access token, so everything here is derived from it.
struct NoteStore<'a> {
    provider: &'a str,
    token: String,
}

impl<'a> NoteStore<'a> {
    fn connect(provider: &'a str, token: &str) -> Self {
        Self {
            provider,
            token: token.to_string(),
        }
    }

    fn latest_shared_note(&self) -> Option<SharedNote> {
        if self.token.starts_with("revoked.") {
            return None;
        }
        let update_count = self
            .token
            .bytes()
            .fold(0i64, |sum, byte| sum + i64::from(byte))
            % 97;
        let created = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0);
        Some(SharedNote {
            title: format!("Shared note #{update_count}"),
            url: format!("{}/view/{update_count}", self.provider),
            created: created.to_string(),
            update_count,
        })
    }

    fn has_notebook(&self, name: &str) -> bool {
        matches!(name, "Inbox" | "Shared")
    }

    fn create_note(&self, notebook: &str, title: &str, body: &str, tags: &[String]) {
        tracing::info!(
            "note filed provider={} notebook={notebook} title={title:?} tags={} bytes={}",
            self.provider,
            tags.len(),
            body.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> Notekeeper {
        Notekeeper::new(NotekeeperConfig {
            consumer_key: "key-123".to_string(),
            consumer_secret: "secret-456".to_string(),
            sandbox: true,
        })
    }

    fn authenticated_input(token: &str) -> FunctionInput {
        FunctionInput {
            authentication: Some(json!({
                "user_id": "ada",
                "auth_saved_data": json!({"access_token": token}).to_string(),
            })),
            ..FunctionInput::default()
        }
    }

    #[test]
    fn begin_auth_carries_the_nonce_in_url_and_temp_data() {
        let result = app()
            .begin_user_auth("https://platform.example.com/cb")
            .expect("begin should succeed");
        let nonce = result
            .temp_data_to_save
            .as_ref()
            .and_then(Value::as_str)
            .expect("nonce should be saved")
            .to_string();
        assert!(result.authentication_url.contains("client_id=key-123"));
        assert!(result.authentication_url.contains(&format!("state={nonce}")));
    }

    #[test]
    fn begin_auth_requires_configured_keys() {
        let unconfigured = Notekeeper::new(NotekeeperConfig {
            consumer_key: String::new(),
            consumer_secret: String::new(),
            sandbox: true,
        });
        let error = unconfigured
            .begin_user_auth("https://platform.example.com/cb")
            .expect_err("missing keys");
        assert_eq!(error.status, 500);
    }

    #[test]
    fn end_auth_round_trips_the_saved_nonce() {
        let app = app();
        let mut service_data = Map::new();
        service_data.insert("verifier".to_string(), json!("ver-1"));
        service_data.insert("state".to_string(), json!("nonce-1"));
        service_data.insert("user".to_string(), json!("ada"));

        let result = app
            .end_user_auth(&service_data, Some(&json!("nonce-1")))
            .expect("end should succeed");
        assert!(result.valid_credentials);
        assert_eq!(result.user_id, Some(json!("ada")));
        let auth_data = result.auth_data_to_save.expect("auth data should be saved");
        assert_eq!(auth_data["access_token"], json!("nonce-1.ver-1"));

        let mismatch = app
            .end_user_auth(&service_data, Some(&json!("other-nonce")))
            .expect_err("nonce mismatch");
        assert_eq!(mismatch.status, 400);

        let missing = app
            .end_user_auth(&service_data, None)
            .expect_err("missing temp data");
        assert_eq!(missing.message, "Temporary authentication data is empty");
    }

    #[test]
    fn end_auth_without_a_verifier_is_an_invalid_login_not_an_error() {
        let result = app()
            .end_user_auth(&Map::new(), Some(&json!("nonce-1")))
            .expect("no verifier is not an error");
        assert!(!result.valid_credentials);
    }

    #[test]
    fn trigger_saves_a_cursor_before_reporting_notes() {
        let provider = "https://sandbox.notes.example.com";
        let input = authenticated_input("token-a");

        let first = new_shared_note(provider, &input).expect("first poll");
        assert_eq!(first.status_code, 1);
        let cursor = first.data_to_save.expect("cursor should be saved");

        let mut caught_up = authenticated_input("token-a");
        caught_up.saved_data = Some(cursor.clone());
        let second = new_shared_note(provider, &caught_up).expect("second poll");
        assert_eq!(second.status_code, 0);
        assert!(second.output_data.is_none());

        let mut behind = authenticated_input("token-a");
        behind.saved_data = Some(json!(-1));
        let third = new_shared_note(provider, &behind).expect("third poll");
        assert_eq!(third.status_code, 0);
        let output = third.output_data.expect("new note should be reported");
        assert!(output["url"].as_str().unwrap().starts_with(provider));
    }

    #[test]
    fn trigger_reports_a_missing_notebook_as_a_domain_outcome() {
        let provider = "https://sandbox.notes.example.com";
        let input = authenticated_input("revoked.token-a");
        let output = new_shared_note(provider, &input).expect("no error");
        assert_eq!(output.status_code, 200);
        assert_eq!(output.status_message, "No public notebooks available");
    }

    #[test]
    fn functions_reject_requests_without_an_access_token() {
        let provider = "https://sandbox.notes.example.com";
        let missing = FunctionInput::default();
        assert_eq!(
            new_shared_note(provider, &missing).expect_err("no auth").status,
            400
        );

        let bad_saved = FunctionInput {
            authentication: Some(json!({"user_id": "ada", "auth_saved_data": "not json"})),
            ..FunctionInput::default()
        };
        let error = create_note(provider, &bad_saved).expect_err("bad auth payload");
        assert_eq!(error.message, "Received input data (auth_saved_data) is invalid");
    }

    #[test]
    fn create_note_validates_notebook_membership() {
        let provider = "https://sandbox.notes.example.com";
        let mut input = authenticated_input("token-a");
        input.input_data = Some(json!({}));
        input.form_data = Some(json!({
            "title": "Minutes",
            "body": "text",
            "notebook": "Nonexistent",
            "tags": "work, notes"
        }));
        let output = create_note(provider, &input).expect("domain outcome");
        assert_eq!(output.status_code, 100);

        input.form_data = Some(json!({
            "title": "Minutes",
            "body": "text",
            "notebook": "Inbox",
            "tags": "work, notes"
        }));
        let output = create_note(provider, &input).expect("created");
        assert_eq!(output.status_code, 0);
    }
}
