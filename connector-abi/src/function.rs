use crate::types::{FunctionHandler, FunctionInput, FunctionResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FunctionKind {
    Trigger,
    Action,
}

impl FunctionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FunctionKind::Trigger => "trigger",
            FunctionKind::Action => "action",
        }
    }
}

/// Trigger-only metadata: the declared output-variable schema (name → type
/// tag, in declaration order) and the slowest polling cadence the platform
/// may use, as `<n>m|h|d`.
#[derive(Clone, Debug)]
pub struct TriggerSpec {
    pub output_vars: Vec<(String, String)>,
    pub max_poll_interval: String,
}

/// Action-only metadata: the declared input-variable schema. A variable name
/// ending in `?` marks it optional.
#[derive(Clone, Debug)]
pub struct ActionSpec {
    pub input_vars: Vec<(String, String)>,
}

enum FunctionSpec {
    Trigger(TriggerSpec),
    Action(ActionSpec),
}

/// One registered trigger or action: identity, metadata, and handler.
pub struct FunctionEntry {
    name: String,
    form: Option<String>,
    spec: FunctionSpec,
    handler: FunctionHandler,
}

impl FunctionEntry {
    pub fn trigger(
        name: impl Into<String>,
        output_vars: &[(&str, &str)],
        max_poll_interval: impl Into<String>,
        form: Option<&str>,
        handler: impl Fn(&FunctionInput) -> FunctionResult + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            form: form.map(str::to_string),
            spec: FunctionSpec::Trigger(TriggerSpec {
                output_vars: owned_pairs(output_vars),
                max_poll_interval: max_poll_interval.into(),
            }),
            handler: Box::new(handler),
        }
    }

    pub fn action(
        name: impl Into<String>,
        input_vars: &[(&str, &str)],
        form: Option<&str>,
        handler: impl Fn(&FunctionInput) -> FunctionResult + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            form: form.map(str::to_string),
            spec: FunctionSpec::Action(ActionSpec {
                input_vars: owned_pairs(input_vars),
            }),
            handler: Box::new(handler),
        }
    }

    pub fn kind(&self) -> FunctionKind {
        match self.spec {
            FunctionSpec::Trigger(_) => FunctionKind::Trigger,
            FunctionSpec::Action(_) => FunctionKind::Action,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn form(&self) -> Option<&str> {
        self.form.as_deref()
    }

    pub fn trigger_spec(&self) -> Option<&TriggerSpec> {
        match &self.spec {
            FunctionSpec::Trigger(spec) => Some(spec),
            FunctionSpec::Action(_) => None,
        }
    }

    pub fn action_spec(&self) -> Option<&ActionSpec> {
        match &self.spec {
            FunctionSpec::Action(spec) => Some(spec),
            FunctionSpec::Trigger(_) => None,
        }
    }

    pub fn invoke(&self, input: &FunctionInput) -> FunctionResult {
        (self.handler)(input)
    }
}

fn owned_pairs(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}

/// Ordered capability table of an application.
///
/// Enumeration order is the registration order, stable for the process
/// lifetime; the introspection protocol addresses entries by their 1-based
/// position in that order.
pub struct FunctionTable {
    entries: Vec<FunctionEntry>,
}

impl FunctionTable {
    pub fn new(entries: Vec<FunctionEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[FunctionEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn resolve(&self, kind: FunctionKind, name: &str) -> Option<&FunctionEntry> {
        self.entries
            .iter()
            .find(|entry| entry.kind() == kind && entry.name() == name)
    }

    /// 1-based lookup used by `get_function_info`.
    pub fn resolve_by_index(&self, index: usize) -> Option<&FunctionEntry> {
        if index == 0 {
            return None;
        }
        self.entries.get(index - 1)
    }
}
