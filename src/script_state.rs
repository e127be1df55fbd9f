//! Lifecycle state of one script document, and the message key each state shows.

use serde::Serialize;

use crate::script_diagnostics::{Diagnostic, DiagnosticKind};

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(tag = "state", content = "diagnostic", rename_all = "snake_case")]
pub enum ScriptState {
    #[default]
    NotCompiled,
    Compiling,
    CompileError(Diagnostic),
    CompiledOk,
    Running,
    RuntimeError(Diagnostic),
}

/// Keys into the dialog's fixed string table.
///
/// The dialog maps these to its labels; it needs no branching of its own.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKey {
    ScriptNotCompiled,
    Compiling,
    Error,
    NoMainMethod,
    MainNotCallable,
    CompileOk,
    Running,
}

impl MessageKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKey::ScriptNotCompiled => "SCRIPT_NOT_COMPILED",
            MessageKey::Compiling => "COMPILING",
            MessageKey::Error => "ERROR",
            MessageKey::NoMainMethod => "NO_MAIN_METHOD",
            MessageKey::MainNotCallable => "MAIN_NOT_CALLABLE",
            MessageKey::CompileOk => "COMPILE_OK",
            MessageKey::Running => "RUNNING",
        }
    }
}

impl ScriptState {
    pub fn message_key(&self) -> MessageKey {
        match self {
            ScriptState::NotCompiled => MessageKey::ScriptNotCompiled,
            ScriptState::Compiling => MessageKey::Compiling,
            ScriptState::CompileError(diag) => match diag.kind {
                DiagnosticKind::NoMainMethod => MessageKey::NoMainMethod,
                DiagnosticKind::MainNotCallable => MessageKey::MainNotCallable,
                DiagnosticKind::SyntaxError | DiagnosticKind::RuntimeFault => MessageKey::Error,
            },
            ScriptState::CompiledOk => MessageKey::CompileOk,
            ScriptState::Running => MessageKey::Running,
            ScriptState::RuntimeError(_) => MessageKey::Error,
        }
    }

    /// The diagnostic to show alongside the message key, if any.
    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        match self {
            ScriptState::CompileError(diag) | ScriptState::RuntimeError(diag) => Some(diag),
            _ => None,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, ScriptState::Running)
    }

    /// Whether the "Running" checkbox may be switched on.
    pub fn can_run(&self) -> bool {
        matches!(self, ScriptState::CompiledOk)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScriptState::NotCompiled => "NotCompiled",
            ScriptState::Compiling => "Compiling",
            ScriptState::CompileError(_) => "CompileError",
            ScriptState::CompiledOk => "CompiledOk",
            ScriptState::Running => "Running",
            ScriptState::RuntimeError(_) => "RuntimeError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_keys() {
        assert_eq!(ScriptState::NotCompiled.message_key(), MessageKey::ScriptNotCompiled);
        assert_eq!(ScriptState::CompiledOk.message_key(), MessageKey::CompileOk);
        assert_eq!(
            ScriptState::CompileError(Diagnostic::no_main_method("Main")).message_key(),
            MessageKey::NoMainMethod
        );
        assert_eq!(
            ScriptState::CompileError(Diagnostic::main_not_callable("Main", "x")).message_key(),
            MessageKey::MainNotCallable
        );
        assert_eq!(
            ScriptState::CompileError(Diagnostic::new(DiagnosticKind::SyntaxError, "bad")).message_key(),
            MessageKey::Error
        );
        assert_eq!(
            ScriptState::RuntimeError(Diagnostic::new(DiagnosticKind::RuntimeFault, "boom")).message_key(),
            MessageKey::Error
        );
    }

    #[test]
    fn test_message_key_serializes_like_as_str() {
        for key in [
            MessageKey::ScriptNotCompiled,
            MessageKey::Compiling,
            MessageKey::Error,
            MessageKey::NoMainMethod,
            MessageKey::MainNotCallable,
            MessageKey::CompileOk,
            MessageKey::Running,
        ] {
            assert_eq!(serde_json::to_value(key).unwrap(), key.as_str());
        }
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_value(ScriptState::Running).unwrap();
        assert_eq!(json["state"], "running");

        let json = serde_json::to_value(ScriptState::CompileError(Diagnostic::no_main_method("Main"))).unwrap();
        assert_eq!(json["state"], "compile_error");
        assert_eq!(json["diagnostic"]["kind"], "no_main_method");
    }

    #[test]
    fn test_only_compiled_ok_can_run() {
        assert!(ScriptState::CompiledOk.can_run());
        assert!(!ScriptState::Running.can_run());
        assert!(!ScriptState::NotCompiled.can_run());
        assert!(ScriptState::Running.is_running());
        assert!(ScriptState::default() == ScriptState::NotCompiled);
    }
}
