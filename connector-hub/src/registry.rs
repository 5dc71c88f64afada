use std::collections::BTreeMap;

use connector_abi::Application;
use tracing::info;

pub type AppFactory = Box<dyn Fn() -> Box<dyn Application> + Send + Sync>;

/// Identifier → constructor map for every application known to this process.
///
/// Built once at startup and shared read-only afterwards; applications
/// themselves are instantiated fresh for every request, so nothing in here
/// carries request state.
#[derive(Default)]
pub struct AppRegistry {
    factories: BTreeMap<String, AppFactory>,
}

impl AppRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a constructor under the identifier its applications report.
    /// Registering the same identifier twice replaces the earlier entry.
    pub fn register(&mut self, factory: impl Fn() -> Box<dyn Application> + Send + Sync + 'static) {
        let identifier = factory().identifier().to_string();
        info!("registered application id={identifier}");
        self.factories.insert(identifier, Box::new(factory));
    }

    /// Builds a fresh per-request instance, or `None` for unknown ids.
    pub fn instantiate(&self, identifier: &str) -> Option<Box<dyn Application>> {
        self.factories.get(identifier).map(|factory| factory())
    }

    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}
