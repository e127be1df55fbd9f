//! Structured script diagnostics.
//!
//! Rhai reports parse and runtime failures with positions. These are wrapped into
//! a stable, JSON-serializable diagnostic that the dialog layer can show without
//! access to Rust logs. Exactly one diagnostic is attached to an error state.

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// The source failed to parse or its top-level statements failed to evaluate.
    SyntaxError,
    /// The script compiled but defines no `Main`.
    NoMainMethod,
    /// `Main` exists but is not something that can be invoked once per frame.
    MainNotCallable,
    /// `Main` failed while being invoked for a frame.
    RuntimeFault,
}

impl DiagnosticKind {
    pub fn is_compile_time(&self) -> bool {
        !matches!(self, DiagnosticKind::RuntimeFault)
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct ScriptLocation {
    /// 1-based line number in the user script.
    pub line: u32,
    /// 1-based column number.
    pub column: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub location: Option<ScriptLocation>,
    /// Raw engine error string (useful for bug reports).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            location: None,
            raw: None,
        }
    }

    pub fn no_main_method(entry_point: &str) -> Self {
        Self::new(
            DiagnosticKind::NoMainMethod,
            format!("Script does not define a `{entry_point}` function"),
        )
    }

    pub fn main_not_callable(entry_point: &str, reason: &str) -> Self {
        Self::new(
            DiagnosticKind::MainNotCallable,
            format!("`{entry_point}` is not callable: {reason}"),
        )
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(f, "{} (line {}, column {})", self.message, loc.line, loc.column),
            None => write!(f, "{}", self.message),
        }
    }
}

fn location_from(pos: rhai::Position) -> Option<ScriptLocation> {
    let line = pos.line().unwrap_or(0) as u32;
    if line == 0 {
        return None;
    }
    let column = pos.position().unwrap_or(0) as u32;
    Some(ScriptLocation {
        line,
        column: column.max(1),
    })
}

/// Strip Rhai's trailing " (line N, position M)" suffix; the location is carried separately.
fn strip_position_suffix(raw: &str) -> &str {
    match raw.rfind(" (line ") {
        Some(idx) if raw.ends_with(')') => &raw[..idx],
        _ => raw,
    }
}

pub fn from_parse_error(err: &rhai::ParseError) -> Diagnostic {
    let raw = err.to_string();
    Diagnostic {
        kind: DiagnosticKind::SyntaxError,
        message: strip_position_suffix(&raw).to_string(),
        location: location_from(err.position()),
        raw: Some(raw),
    }
}

pub fn from_eval_error(kind: DiagnosticKind, err: &rhai::EvalAltResult) -> Diagnostic {
    let raw = err.to_string();
    Diagnostic {
        kind,
        message: strip_position_suffix(&raw).to_string(),
        location: location_from(err.position()),
        raw: Some(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_location() {
        let engine = rhai::Engine::new();
        let err = engine.compile("let x = 1;\nlet y = ;\n").unwrap_err();
        let diag = from_parse_error(&err);

        assert_eq!(diag.kind, DiagnosticKind::SyntaxError);
        let loc = diag.location.expect("parse errors carry a position");
        assert_eq!(loc.line, 2);
        assert!(diag.raw.is_some());
        assert!(!diag.message.contains("(line"));
    }

    #[test]
    fn test_eval_error_kind_is_preserved() {
        let engine = rhai::Engine::new();
        let err = engine.run("throw \"boom\";").unwrap_err();
        let diag = from_eval_error(DiagnosticKind::RuntimeFault, &err);

        assert_eq!(diag.kind, DiagnosticKind::RuntimeFault);
        assert!(diag.message.contains("boom"));
    }

    #[test]
    fn test_display_includes_location() {
        let mut diag = Diagnostic::new(DiagnosticKind::SyntaxError, "unexpected token");
        assert_eq!(diag.to_string(), "unexpected token");

        diag.location = Some(ScriptLocation { line: 3, column: 7 });
        assert_eq!(diag.to_string(), "unexpected token (line 3, column 7)");
    }

    #[test]
    fn test_serializes_kind_as_snake_case() {
        let diag = Diagnostic::no_main_method("Main");
        let json = serde_json::to_value(&diag).unwrap();
        assert_eq!(json["kind"], "no_main_method");
        assert!(json.get("raw").is_none());
    }

    #[test]
    fn test_compile_time_kinds() {
        assert!(DiagnosticKind::SyntaxError.is_compile_time());
        assert!(DiagnosticKind::NoMainMethod.is_compile_time());
        assert!(DiagnosticKind::MainNotCallable.is_compile_time());
        assert!(!DiagnosticKind::RuntimeFault.is_compile_time());
    }
}
