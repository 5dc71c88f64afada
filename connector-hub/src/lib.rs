mod auth;
mod introspect;
mod invoke;
mod logging;
mod registry;
mod server;

pub use logging::init as init_logging;
pub use registry::{AppFactory, AppRegistry};
pub use server::{HubState, build_hub_app};
