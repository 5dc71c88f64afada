use std::collections::HashMap;

use connector_abi::{
    Application, CommandReply, CommandResult, FunctionEntry, FunctionKind, HttpError, RawReply,
};
use serde_json::{Map, Value};

use crate::server::require_param;

/// `get_app_info`: the application-level capability document.
pub(crate) fn app_info(app: &dyn Application) -> CommandResult {
    let mut info = Map::new();
    info.insert("id".to_string(), Value::from(app.identifier()));
    info.insert("api_version".to_string(), Value::from(app.api_version()));
    info.insert(
        "function_count".to_string(),
        Value::from(app.functions().len()),
    );
    info.insert(
        "user_auth_mode".to_string(),
        Value::from(app.user_auth_mode().as_str()),
    );

    let mut texts = Map::new();
    for language in app.supported_languages() {
        let mut block = Map::new();
        block.insert("title".to_string(), Value::from(app.title(language)));
        texts.insert(language.to_string(), Value::Object(block));
    }
    info.insert("texts".to_string(), Value::Object(texts));

    if let Some(path) = app.images_path() {
        info.insert("images_path".to_string(), Value::from(path));
    }

    Ok(CommandReply::Json(Value::Object(info)))
}

/// `get_function_info`: the document for the function at the 1-based `fn`
/// index, in the stable enumeration order of the application's table.
pub(crate) fn function_info(
    app: &dyn Application,
    params: &HashMap<String, String>,
) -> CommandResult {
    let raw_index = require_param(params, "fn")?;
    let Ok(index) = raw_index.trim().parse::<usize>() else {
        return Err(HttpError::bad_request("'fn' parameter is invalid"));
    };
    let Some(entry) = app.functions().resolve_by_index(index) else {
        return Err(HttpError::bad_request("'fn' parameter is invalid"));
    };

    let mut info = Map::new();
    info.insert("app".to_string(), Value::from(app.identifier()));
    info.insert("type".to_string(), Value::from(entry.kind().as_str()));
    info.insert("id".to_string(), Value::from(entry.name()));
    info.insert(
        "disabled".to_string(),
        Value::Bool(app.function_disabled(entry.name())),
    );
    if let Some(form) = entry.form() {
        info.insert("form".to_string(), Value::from(form));
    }

    let mut texts = Map::new();
    for language in app.supported_languages() {
        texts.insert(
            language.to_string(),
            Value::Object(language_texts(app, entry, language)),
        );
    }
    info.insert("texts".to_string(), Value::Object(texts));

    if let Some(trigger) = entry.trigger_spec() {
        let mut trigger_data = Map::new();
        trigger_data.insert(
            "output_vars".to_string(),
            Value::Object(var_map(&trigger.output_vars)),
        );
        trigger_data.insert(
            "max_poll_interval".to_string(),
            Value::from(trigger.max_poll_interval.as_str()),
        );
        info.insert("trigger_data".to_string(), Value::Object(trigger_data));
    }
    if let Some(action) = entry.action_spec() {
        let mut action_data = Map::new();
        action_data.insert(
            "input_vars".to_string(),
            Value::Object(var_map(&action.input_vars)),
        );
        info.insert("action_data".to_string(), Value::Object(action_data));
    }

    Ok(CommandReply::Json(Value::Object(info)))
}

fn language_texts(app: &dyn Application, entry: &FunctionEntry, language: &str) -> Map<String, Value> {
    let mut block = Map::new();
    block.insert(
        "caption".to_string(),
        Value::from(app.function_caption(entry.name(), language)),
    );
    if entry.form().is_some() {
        let mut form_texts = Map::new();
        for (key, text) in app.form_texts(entry.name(), language) {
            form_texts.insert(key, Value::String(text));
        }
        block.insert("form".to_string(), Value::Object(form_texts));
    }
    if entry.kind() == FunctionKind::Trigger {
        let mut var_texts = Map::new();
        for (key, text) in app.output_var_texts(entry.name(), language) {
            var_texts.insert(key, Value::String(text));
        }
        block.insert("output_vars".to_string(), Value::Object(var_texts));
    }
    block
}

fn var_map(vars: &[(String, String)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (name, type_tag) in vars {
        map.insert(name.clone(), Value::String(type_tag.clone()));
    }
    map
}

/// `get_image`: serves the application's `image` hook; used by applications
/// that do not publish an `images_path`.
pub(crate) fn image(app: &dyn Application, params: &HashMap<String, String>) -> CommandResult {
    let name = require_param(params, "img")?;
    match app.image(name)? {
        Some(bytes) => Ok(CommandReply::Raw(RawReply::new("image/png", bytes))),
        None => Err(HttpError::new(404, "Not found")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use connector_abi::{FunctionOutput, FunctionTable, UserAuthMode};
    use serde_json::json;

    struct ShelfApp {
        functions: FunctionTable,
    }

    impl ShelfApp {
        fn new() -> Self {
            Self {
                functions: FunctionTable::new(vec![
                    FunctionEntry::trigger(
                        "new_book",
                        &[("title", "text"), ("author", "text")],
                        "30m",
                        Some("<input name=\"shelf\"/>"),
                        |_input| Ok(FunctionOutput::default()),
                    ),
                    FunctionEntry::action("shelve_book", &[("title", "text")], None, |_input| {
                        Ok(FunctionOutput::default())
                    }),
                ]),
            }
        }
    }

    impl Application for ShelfApp {
        fn identifier(&self) -> &str {
            "shelf"
        }

        fn title(&self, language: &str) -> String {
            match language {
                "es" => "Estanteria".to_string(),
                _ => "Shelf".to_string(),
            }
        }

        fn supported_languages(&self) -> &[&'static str] {
            &["en", "es"]
        }

        fn user_auth_mode(&self) -> UserAuthMode {
            UserAuthMode::None
        }

        fn functions(&self) -> &FunctionTable {
            &self.functions
        }

        fn form_texts(&self, function: &str, _language: &str) -> Vec<(String, String)> {
            if function == "new_book" {
                vec![("shelf".to_string(), "Shelf name".to_string())]
            } else {
                Vec::new()
            }
        }
    }

    fn reply_json(result: CommandResult) -> Value {
        match result.expect("command should succeed") {
            CommandReply::Json(value) => value,
            other => panic!("expected a json reply, got {other:?}"),
        }
    }

    #[test]
    fn app_info_lists_languages_in_declared_order() {
        let app = ShelfApp::new();
        let info = reply_json(app_info(&app));
        assert_eq!(info["id"], json!("shelf"));
        assert_eq!(info["api_version"], json!(1));
        assert_eq!(info["function_count"], json!(2));
        assert_eq!(info["user_auth_mode"], json!("none"));
        let languages: Vec<&String> = info["texts"].as_object().unwrap().keys().collect();
        assert_eq!(languages, ["en", "es"]);
        assert_eq!(info["texts"]["es"]["title"], json!("Estanteria"));
        assert!(info.get("images_path").is_none());
    }

    #[test]
    fn function_info_for_a_trigger_carries_trigger_data_only() {
        let app = ShelfApp::new();
        let mut params = HashMap::new();
        params.insert("fn".to_string(), "1".to_string());

        let info = reply_json(function_info(&app, &params));
        assert_eq!(info["type"], json!("trigger"));
        assert_eq!(info["id"], json!("new_book"));
        assert_eq!(info["disabled"], json!(false));
        assert_eq!(info["trigger_data"]["max_poll_interval"], json!("30m"));
        let vars: Vec<&String> = info["trigger_data"]["output_vars"]
            .as_object()
            .unwrap()
            .keys()
            .collect();
        assert_eq!(vars, ["title", "author"]);
        assert_eq!(info["texts"]["en"]["form"]["shelf"], json!("Shelf name"));
        assert!(info.get("action_data").is_none());
    }

    #[test]
    fn function_info_for_an_action_carries_action_data_only() {
        let app = ShelfApp::new();
        let mut params = HashMap::new();
        params.insert("fn".to_string(), "2".to_string());

        let info = reply_json(function_info(&app, &params));
        assert_eq!(info["type"], json!("action"));
        assert_eq!(info["id"], json!("shelve_book"));
        assert_eq!(info["action_data"]["input_vars"]["title"], json!("text"));
        assert!(info.get("trigger_data").is_none());
        assert!(info["texts"]["en"].get("output_vars").is_none());
        assert!(info["texts"]["en"].get("form").is_none());
    }

    #[test]
    fn function_info_rejects_bad_indexes() {
        let app = ShelfApp::new();
        for raw in ["0", "3", "-1", "two", ""] {
            let mut params = HashMap::new();
            params.insert("fn".to_string(), raw.to_string());
            let error = function_info(&app, &params).expect_err("index should be rejected");
            assert_eq!(error.status, 400, "fn={raw:?}");
        }

        let error = function_info(&app, &HashMap::new()).expect_err("missing fn");
        assert_eq!(error.message, "'fn' parameter is missing");
    }

    #[test]
    fn unknown_images_map_to_not_found() {
        let app = ShelfApp::new();
        let mut params = HashMap::new();
        params.insert("img".to_string(), "logo".to_string());
        let error = image(&app, &params).expect_err("hook returns no image");
        assert_eq!(error.status, 404);
    }
}
