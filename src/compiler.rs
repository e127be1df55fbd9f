//! Compiler adapter: turns a source snapshot into a [`CompiledUnit`].
//!
//! Compilation is two steps on the Rhai side: parse into an `AST`, then run the
//! top-level statements once so that globals (like `let Main = |ctx| ...;`) exist
//! in the unit's scope. A failure in either step is a `SyntaxError` diagnostic;
//! nothing from the engine escapes as an `Err` of its own type.

use std::borrow::Cow;
use std::fmt;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use rhai::{Dynamic, Engine, EvalAltResult, Scope, AST};

use crate::config::EngineConfig;
use crate::entry_point::{validate, EntryPoint};
use crate::script_diagnostics::{from_eval_error, from_parse_error, Diagnostic, DiagnosticKind};
use crate::script_log::ScriptLogger;
use crate::source::SourceSnapshot;

/// Runtime faults kept per unit; older ones are dropped.
const MAX_DIAGNOSTICS: usize = 32;

/// A compiled script together with the engine that compiled it.
///
/// Owns the entry point exclusively. Dropping the unit releases the AST, the
/// script's global scope and the entry point handle.
pub struct CompiledUnit {
    engine: Arc<Engine>,
    ast: AST,
    scope: Scope<'static>,
    entry_point: Option<EntryPoint>,
    source_revision: u64,
    source_digest: String,
    diagnostics: Vec<Diagnostic>,
}

impl fmt::Debug for CompiledUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledUnit")
            .field("entry_point", &self.entry_point)
            .field("source_revision", &self.source_revision)
            .field("source_digest", &self.source_digest)
            .field("diagnostics", &self.diagnostics)
            .finish_non_exhaustive()
    }
}

impl CompiledUnit {
    pub fn source_revision(&self) -> u64 {
        self.source_revision
    }

    pub fn source_digest(&self) -> &str {
        &self.source_digest
    }

    /// Runtime faults raised while this unit was running. Empty after a successful compile.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// The validated entry point, if validation has run and succeeded.
    pub fn entry_point(&self) -> Option<&EntryPoint> {
        self.entry_point.as_ref()
    }

    pub fn ast(&self) -> &AST {
        &self.ast
    }

    /// Value of a top-level variable or constant after the script's first run.
    pub fn global(&self, name: &str) -> Option<Dynamic> {
        self.scope.get_value::<Dynamic>(name)
    }

    pub(crate) fn set_entry_point(&mut self, entry_point: EntryPoint) {
        self.entry_point = Some(entry_point);
    }

    pub(crate) fn push_diagnostic(&mut self, diag: Diagnostic) {
        self.diagnostics.push(diag);
        if self.diagnostics.len() > MAX_DIAGNOSTICS {
            let excess = self.diagnostics.len() - MAX_DIAGNOSTICS;
            self.diagnostics.drain(0..excess);
        }
    }

    /// Call the entry point once. `None` if the unit was never validated.
    pub(crate) fn invoke(&mut self, ctx: Dynamic) -> Option<Result<Dynamic, Box<EvalAltResult>>> {
        let Self {
            engine,
            ast,
            scope,
            entry_point,
            ..
        } = self;
        let entry_point = entry_point.as_ref()?;
        Some(entry_point.call(engine, ast, scope, ctx))
    }
}

/// Compiles scripts with a sandboxed Rhai engine.
///
/// Cloning is cheap; clones share the engine and the script log limiter, which
/// lets a document hand a compiler to its worker thread.
#[derive(Clone)]
pub struct ScriptCompiler {
    engine: Arc<Engine>,
    config: Arc<EngineConfig>,
    logger: ScriptLogger,
}

impl fmt::Debug for ScriptCompiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptCompiler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ScriptCompiler {
    pub fn new(config: EngineConfig) -> Self {
        let logger = ScriptLogger::new(config.max_logs_per_frame);
        let mut engine = Engine::new();

        // Sandbox settings
        engine.set_max_expr_depths(config.max_expr_depth, config.max_function_expr_depth);
        engine.set_max_call_levels(config.max_call_levels);
        engine.set_max_operations(config.max_operations);
        engine.set_max_string_size(config.max_string_size);
        engine.set_max_array_size(config.max_array_size);
        engine.set_max_map_size(config.max_map_size);

        logger.register(&mut engine);

        Self {
            engine: Arc::new(engine),
            config: Arc::new(config),
            logger,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn logger(&self) -> &ScriptLogger {
        &self.logger
    }

    /// Parse and initialise a script. The returned unit has no entry point yet.
    pub fn compile(&self, snapshot: &SourceSnapshot) -> Result<CompiledUnit, Diagnostic> {
        let text = if self.config.function_keyword {
            normalize_function_keyword(&snapshot.text)
        } else {
            Cow::Borrowed(&*snapshot.text)
        };

        let ast = self
            .engine
            .compile(text.as_ref())
            .map_err(|e| from_parse_error(&e))?;

        // Top-level statements may log; they get a fresh frame budget.
        self.logger.reset_frame();
        let mut scope = Scope::new();
        self.engine
            .run_ast_with_scope(&mut scope, &ast)
            .map_err(|e| from_eval_error(DiagnosticKind::SyntaxError, &e))?;

        let unit = CompiledUnit {
            engine: Arc::clone(&self.engine),
            ast,
            scope,
            entry_point: None,
            source_revision: snapshot.revision,
            source_digest: snapshot.digest(),
            diagnostics: Vec::new(),
        };
        log::debug!(
            "Compiled revision {} ({} functions, digest {})",
            unit.source_revision,
            unit.ast.iter_functions().count(),
            &unit.source_digest[..12]
        );
        Ok(unit)
    }

    /// Compile, then check the entry-point contract.
    pub fn build(&self, snapshot: &SourceSnapshot) -> Result<CompiledUnit, Diagnostic> {
        let unit = self.compile(snapshot)?;
        validate(unit, &self.config.entry_point)
    }
}

impl Default for ScriptCompiler {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

fn function_keyword_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?m)^([ \t]*(?:private[ \t]+)?)function\b")
            .expect("function keyword pattern is valid")
    })
}

/// Where a scan of script text currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Lexical {
    #[default]
    Code,
    LineComment,
    /// Rhai block comments nest.
    BlockComment(u32),
    Quoted,
    Backtick,
    Char,
}

/// Tracks whether a position in the text is code or inside a literal or comment.
#[derive(Debug, Default)]
struct LiteralScanner {
    state: Lexical,
    escaped: bool,
    prev: Option<char>,
}

impl LiteralScanner {
    fn in_code(&self) -> bool {
        self.state == Lexical::Code
    }

    fn advance(&mut self, chunk: &str) {
        for c in chunk.chars() {
            let mut consumed_pair = false;
            self.state = match self.state {
                Lexical::Code => match (self.prev, c) {
                    (Some('/'), '/') => {
                        consumed_pair = true;
                        Lexical::LineComment
                    }
                    (Some('/'), '*') => {
                        consumed_pair = true;
                        Lexical::BlockComment(1)
                    }
                    (_, '"') => Lexical::Quoted,
                    (_, '`') => Lexical::Backtick,
                    (_, '\'') => Lexical::Char,
                    _ => Lexical::Code,
                },
                Lexical::LineComment if c == '\n' => Lexical::Code,
                Lexical::LineComment => Lexical::LineComment,
                Lexical::BlockComment(depth) => match (self.prev, c) {
                    (Some('/'), '*') => {
                        consumed_pair = true;
                        Lexical::BlockComment(depth + 1)
                    }
                    (Some('*'), '/') => {
                        consumed_pair = true;
                        if depth > 1 {
                            Lexical::BlockComment(depth - 1)
                        } else {
                            Lexical::Code
                        }
                    }
                    _ => Lexical::BlockComment(depth),
                },
                Lexical::Backtick if c == '`' => Lexical::Code,
                Lexical::Backtick => Lexical::Backtick,
                quoted @ (Lexical::Quoted | Lexical::Char) => {
                    let close = if quoted == Lexical::Quoted { '"' } else { '\'' };
                    if self.escaped {
                        self.escaped = false;
                        quoted
                    } else if c == '\\' {
                        self.escaped = true;
                        quoted
                    } else if c == close {
                        Lexical::Code
                    } else {
                        quoted
                    }
                }
            };
            self.prev = if consumed_pair { None } else { Some(c) };
        }
    }
}

/// Rewrite a line-leading `function` to `fn`, padded to the same width so that
/// diagnostic columns still match the user's text. Occurrences inside string
/// literals and comments are left alone.
pub fn normalize_function_keyword(text: &str) -> Cow<'_, str> {
    let pattern = function_keyword_pattern();
    if !pattern.is_match(text) {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len());
    let mut scanner = LiteralScanner::default();
    let mut copied = 0;
    let mut scanned = 0;
    for caps in pattern.captures_iter(text) {
        let (Some(whole), Some(prefix)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        scanner.advance(&text[scanned..whole.start()]);
        if scanner.in_code() {
            out.push_str(&text[copied..whole.start()]);
            out.push_str(prefix.as_str());
            out.push_str("fn      ");
            copied = whole.end();
        }
        scanner.advance(&text[whole.start()..whole.end()]);
        scanned = whole.end();
    }

    if copied == 0 {
        return Cow::Borrowed(text);
    }
    out.push_str(&text[copied..]);
    Cow::Owned(out)
}
