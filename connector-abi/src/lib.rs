mod app;
mod command;
mod function;
mod types;

pub use app::{Application, FormContext, PlatformAuthMode, UserAuthMode};
pub use command::{COMMANDS, CommandSpec, Verb, command_by_name};
pub use function::{
    ActionSpec, FunctionEntry, FunctionKind, FunctionTable, TriggerSpec,
};
pub use types::{
    BeginUserAuth, CommandReply, CommandResult, CredentialCheck, EndUserAuth, FunctionHandler,
    FunctionInput, FunctionOutput, FunctionResult, HttpError, RawReply, is_scalar,
    json_if_structured,
};
