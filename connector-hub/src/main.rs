use std::{env, net::SocketAddr};

use apps::{Notekeeper, NotekeeperConfig, SentenceMail, SentenceMailConfig};
use hub::{AppRegistry, HubState, build_hub_app, init_logging};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if wants_flag("-V", "--version") {
        println!("{}", binary_version_text());
        return Ok(());
    }
    if wants_flag("-h", "--help") {
        print_cli_help();
        return Ok(());
    }

    init_logging()?;
    info!("{}", binary_version_text());

    let addr = parse_addr("HUB_ADDR", "0.0.0.0:8090")?;

    let state = HubState::new(build_registry());
    let app = build_hub_app(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("connector hub listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_registry() -> AppRegistry {
    let sentence_mail_config = SentenceMailConfig::from_env();
    let notekeeper_config = NotekeeperConfig::from_env();

    let mut registry = AppRegistry::new();
    registry.register(move || Box::new(SentenceMail::new(sentence_mail_config.clone())));
    registry.register(move || Box::new(Notekeeper::new(notekeeper_config.clone())));
    registry
}

fn parse_addr(key: &str, default: &str) -> Result<SocketAddr, Box<dyn std::error::Error>> {
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    Ok(value.parse()?)
}

fn wants_flag(short: &str, long: &str) -> bool {
    env::args()
        .skip(1)
        .any(|arg| arg == short || arg == long)
}

fn print_cli_help() {
    eprintln!(concat!(
        "Usage: connector-hub [options]\n\n",
        "Options:\n",
        "  -V, --version   Show version with git metadata\n",
        "  -h, --help      Show this help\n\n",
        "Environment:\n",
        "  HUB_ADDR                              Listen address (default: 0.0.0.0:8090)\n",
        "  HUB_SENTENCE_MAIL_PLATFORM_USER       Platform basic-auth user for sentence_mail\n",
        "  HUB_SENTENCE_MAIL_PLATFORM_PASSWORD   Platform basic-auth password for sentence_mail\n",
        "  HUB_SENTENCE_MAIL_USER                End-user id accepted by sentence_mail\n",
        "  HUB_SENTENCE_MAIL_PASSWORD            End-user password accepted by sentence_mail\n",
        "  HUB_NOTEKEEPER_CONSUMER_KEY           OAuth consumer key for notekeeper\n",
        "  HUB_NOTEKEEPER_CONSUMER_SECRET        OAuth consumer secret for notekeeper\n",
        "  HUB_NOTEKEEPER_SANDBOX                Use the provider sandbox (default: true)\n",
        "  RUST_LOG                              Log filter (default: info)\n"
    ));
}

fn binary_version_text() -> String {
    let binary = env!("CARGO_PKG_NAME");
    let git_tag = option_env!("CH_BUILD_GIT_TAG").unwrap_or("untagged");
    let git_commit = option_env!("CH_BUILD_GIT_COMMIT").unwrap_or("unknown");
    let git_dirty = option_env!("CH_BUILD_GIT_DIRTY").unwrap_or("false");
    let dirty = matches!(git_dirty, "true" | "1" | "yes" | "dirty");

    if dirty {
        format!("{binary} {git_tag} (dirty commit: {git_commit})")
    } else {
        format!("{binary} {git_tag}")
    }
}
