use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Instant,
};

use axum::{
    Router,
    body::to_bytes,
    extract::{Request, State},
    http::{
        Method, StatusCode,
        header::{CONTENT_TYPE, WWW_AUTHENTICATE},
    },
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{any, get},
};
use connector_abi::{
    Application, CommandReply, CommandResult, FunctionKind, HttpError, Verb, command_by_name,
};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::auth::{self, PlatformAuthRejection, check_platform_auth};
use crate::logging::{category_access, category_command, method_label, status_label};
use crate::registry::AppRegistry;
use crate::{introspect, invoke};

const MAX_FORM_BYTES: usize = 1024 * 1024;

#[derive(Clone)]
pub struct HubState {
    registry: Arc<AppRegistry>,
    metrics: Arc<HubMetrics>,
}

impl HubState {
    pub fn new(registry: AppRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            metrics: Arc::new(HubMetrics::default()),
        }
    }
}

struct HubMetrics {
    started_at: Instant,
    commands_total: AtomicU64,
    request_errors_total: AtomicU64,
    auth_failures_total: AtomicU64,
    contract_errors_total: AtomicU64,
}

impl Default for HubMetrics {
    fn default() -> Self {
        Self {
            started_at: Instant::now(),
            commands_total: AtomicU64::new(0),
            request_errors_total: AtomicU64::new(0),
            auth_failures_total: AtomicU64::new(0),
            contract_errors_total: AtomicU64::new(0),
        }
    }
}

impl HubMetrics {
    fn record_status(&self, status: u16) {
        self.commands_total.fetch_add(1, Ordering::Relaxed);
        match status {
            401 => {
                self.auth_failures_total.fetch_add(1, Ordering::Relaxed);
            }
            400..=499 => {
                self.request_errors_total.fetch_add(1, Ordering::Relaxed);
            }
            500..=599 => {
                self.contract_errors_total.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }
}

#[derive(Clone, Debug, Serialize)]
struct StatusResponse {
    status: &'static str,
}

pub fn build_hub_app(state: HubState) -> Router {
    Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/metrics", get(metrics_handler))
        .fallback(any(command_entry_handler))
        .layer(middleware::from_fn(access_log_middleware))
        .with_state(state)
}

async fn access_log_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let started = Instant::now();
    let response = next.run(request).await;
    let elapsed_ms = started.elapsed().as_millis();
    let status = response.status();

    info!(
        "{} {} {} {} {}ms",
        category_access(),
        method_label(method.as_str()),
        status_label(status.as_u16()),
        uri,
        elapsed_ms
    );

    response
}

async fn healthz_handler() -> axum::Json<StatusResponse> {
    axum::Json(StatusResponse { status: "ok" })
}

async fn metrics_handler(State(state): State<HubState>) -> impl IntoResponse {
    let metrics = format!(
        concat!(
            "connector_hub_uptime_seconds {}\n",
            "connector_hub_registered_apps {}\n",
            "connector_hub_commands_total {}\n",
            "connector_hub_request_errors_total {}\n",
            "connector_hub_auth_failures_total {}\n",
            "connector_hub_contract_errors_total {}\n"
        ),
        state.metrics.started_at.elapsed().as_secs(),
        state.registry.len(),
        state.metrics.commands_total.load(Ordering::Relaxed),
        state.metrics.request_errors_total.load(Ordering::Relaxed),
        state.metrics.auth_failures_total.load(Ordering::Relaxed),
        state.metrics.contract_errors_total.load(Ordering::Relaxed),
    );
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics,
    )
}

/// The protocol endpoint. Every path not claimed by a service route lands
/// here; the command, not the path, selects the behavior.
async fn command_entry_handler(State(state): State<HubState>, request: Request) -> Response {
    let response = process_request(&state, request).await;
    state.metrics.record_status(response.status().as_u16());
    response
}

async fn process_request(state: &HubState, request: Request) -> Response {
    let verb = if request.method() == Method::GET {
        Verb::Get
    } else if request.method() == Method::POST {
        Verb::Post
    } else {
        return error_response(&HttpError::bad_request("Invalid HTTP verb"));
    };

    let headers = request.headers().clone();
    let params = match verb {
        Verb::Get => decode_params(request.uri().query().unwrap_or("")),
        Verb::Post => {
            let Ok(bytes) = to_bytes(request.into_body(), MAX_FORM_BYTES).await else {
                return error_response(&HttpError::bad_request("Request body too large"));
            };
            decode_params(&String::from_utf8_lossy(&bytes))
        }
    };

    let Some(command_name) = params.get("cmd") else {
        return error_response(&HttpError::bad_request("'cmd' parameter is missing"));
    };
    let Some(app_name) = params.get("app") else {
        return error_response(&HttpError::bad_request("'app' parameter is missing"));
    };
    let command_name = command_name.to_ascii_lowercase();

    let Some(app) = state.registry.instantiate(app_name) else {
        return error_response(&HttpError::bad_request("Unknown application"));
    };

    let Some(command) = command_by_name(&command_name) else {
        return error_response(&HttpError::bad_request("Unknown command"));
    };
    if command.verb != verb {
        return error_response(&HttpError::bad_request("Invalid HTTP verb for this command"));
    }

    if let Err(rejection) = check_platform_auth(app.as_ref(), &headers) {
        return match rejection {
            PlatformAuthRejection::MissingCredentials => challenge_response(app.identifier()),
            PlatformAuthRejection::BadCredentials => {
                error_response(&HttpError::unauthorized("Unauthorized"))
            }
        };
    }

    let result = dispatch(app.as_ref(), command.name, &params);
    let response = match &result {
        Ok(reply) => reply_response(reply),
        Err(error) => error_response(error),
    };

    info!(
        "{} app={} cmd={} status={}",
        category_command(),
        app.identifier(),
        command.name,
        status_label(response.status().as_u16())
    );

    response
}

fn dispatch(
    app: &dyn Application,
    command: &str,
    params: &HashMap<String, String>,
) -> CommandResult {
    match command {
        "get_app_info" => introspect::app_info(app),
        "get_function_info" => introspect::function_info(app, params),
        "get_image" => introspect::image(app, params),
        "process_trigger" => invoke::invoke_function(app, FunctionKind::Trigger, params),
        "do_action" => invoke::invoke_function(app, FunctionKind::Action, params),
        "authenticate_user" => auth::authenticate_user(app, params),
        "begin_authenticate_user" => auth::begin_authenticate_user(app, params),
        "end_authenticate_user" => auth::end_authenticate_user(app, params),
        "validate_form_data" => invoke::form_command(app, params, invoke::FormMode::Validate),
        "form_request" => invoke::form_command(app, params, invoke::FormMode::Request),
        _ => Err(HttpError::bad_request("Unknown command")),
    }
}

fn decode_params(raw: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(raw.as_bytes())
        .into_owned()
        .collect()
}

/// `data` is mandatory for payload commands and must decode to a JSON object.
pub(crate) fn decode_data_object(
    params: &HashMap<String, String>,
) -> Result<Map<String, Value>, HttpError> {
    let raw = require_param(params, "data")?;
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(object)) => Ok(object),
        _ => Err(HttpError::bad_request("'data' has no valid json data")),
    }
}

pub(crate) fn require_param<'a>(
    params: &'a HashMap<String, String>,
    name: &str,
) -> Result<&'a str, HttpError> {
    params
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| HttpError::bad_request(format!("'{name}' parameter is missing")))
}

fn reply_response(reply: &CommandReply) -> Response {
    match reply {
        CommandReply::Json(value) => match serde_json::to_string(value) {
            Ok(body) => (StatusCode::OK, [(CONTENT_TYPE, "text/json")], body).into_response(),
            Err(_) => error_response(&HttpError::internal("Response serialization failed")),
        },
        CommandReply::Raw(raw) => (
            StatusCode::OK,
            [(CONTENT_TYPE, raw.content_type.clone())],
            raw.body.clone(),
        )
            .into_response(),
        CommandReply::Text(text) => {
            let content_type = if serde_json::from_str::<Value>(text).is_ok() {
                "text/json"
            } else {
                "text/plain"
            };
            (
                StatusCode::OK,
                [(CONTENT_TYPE, content_type)],
                text.clone(),
            )
                .into_response()
        }
    }
}

/// Errors carry their reason as a plain-text body and never a JSON envelope.
fn error_response(error: &HttpError) -> Response {
    let status = StatusCode::from_u16(error.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        [(CONTENT_TYPE, "text/plain")],
        error.message.clone(),
    )
        .into_response()
}

fn challenge_response(realm: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [
            (WWW_AUTHENTICATE, format!("Basic realm=\"{realm}\"")),
            (CONTENT_TYPE, "text/plain".to_string()),
        ],
        "Unauthorized".to_string(),
    )
        .into_response()
}
