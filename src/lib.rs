pub mod config;
pub mod source;
pub mod frame;
pub mod compiler;
pub mod entry_point;
pub mod invoker;
pub mod script_state;
pub mod state_machine;
pub mod document;
pub mod script_log;
pub mod script_diagnostics;
pub mod run_report;

pub mod cli;

pub use compiler::{CompiledUnit, ScriptCompiler};
pub use config::EngineConfig;
pub use document::{CompileHandle, ScriptDocument};
pub use frame::{FrameContext, RenderFrame};
pub use invoker::TickOutcome;
pub use script_diagnostics::{Diagnostic, DiagnosticKind};
pub use script_state::{MessageKey, ScriptState};
pub use source::ScriptSource;
pub use state_machine::{RequestError, ScriptStateMachine};
