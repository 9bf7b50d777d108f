//! Tool catalog, argument validation and execution
//!
//! The catalog is static data: one [`ToolKind`] per host command the model
//! may call, each with its parameters and wire template. The executor turns
//! a model's tool call into wire lines and sends them through a
//! [`HostChannel`].

mod args;
mod catalog;
mod executor;
mod registry;
mod template;

pub use args::{format_float, strip_roll, ArgValue, NoteSpec, ToolArgs};
pub use catalog::{ParamSpec, ParamType, ReplyPolicy, ToolKind, ToolSpec, CATALOG};
pub use executor::{HostChannel, ToolExecutionResult, ToolExecutor, MAX_REPLY_TIMEOUT, TIMEOUT_ARG};
pub use registry::ToolRegistry;
pub use template::{Builder, Part, Template};
