//! The script state machine: single owner and single writer of a document's
//! lifecycle state and of its compiled unit.
//!
//! Compilation is split into [`ScriptStateMachine::begin_compile`] and
//! [`ScriptStateMachine::finish_compile`] so the actual compile can happen
//! elsewhere (see `document`). Each job carries a generation number; only the
//! newest job's result is applied, and only if the source has not been edited
//! since its snapshot was taken.

use thiserror::Error;

use crate::compiler::{CompiledUnit, ScriptCompiler};
use crate::config::EngineConfig;
use crate::frame::FrameContext;
use crate::invoker::{ExecutionInvoker, InvokerStats, TickOutcome};
use crate::script_diagnostics::Diagnostic;
use crate::script_state::{MessageKey, ScriptState};
use crate::source::{ScriptSource, SourceSnapshot};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// The compiled unit was built from an older revision. The state has been
    /// reset to `NotCompiled`; a recompile resolves it.
    #[error("script was edited since it was compiled")]
    StaleCompile,
    #[error("script cannot run from state {state}")]
    NotRunnable { state: &'static str },
    #[error("script is already running")]
    AlreadyRunning,
    #[error("script is not running")]
    NotRunning,
}

/// Identifies one compile attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileTicket {
    pub generation: u64,
    pub revision: u64,
}

/// Everything a compile worker needs: what to compile and which attempt it is.
#[derive(Debug, Clone)]
pub struct CompileJob {
    pub ticket: CompileTicket,
    pub snapshot: SourceSnapshot,
}

#[derive(Debug)]
pub struct ScriptStateMachine {
    source: ScriptSource,
    compiler: ScriptCompiler,
    state: ScriptState,
    unit: Option<CompiledUnit>,
    in_flight: Option<CompileTicket>,
    generation: u64,
    invoker: ExecutionInvoker,
}

impl ScriptStateMachine {
    pub fn new(compiler: ScriptCompiler) -> Self {
        let invoker = ExecutionInvoker::new(compiler.logger().clone());
        Self {
            source: ScriptSource::default(),
            compiler,
            state: ScriptState::NotCompiled,
            unit: None,
            in_flight: None,
            generation: 0,
            invoker,
        }
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self::new(ScriptCompiler::new(config))
    }

    pub fn current_state(&self) -> &ScriptState {
        &self.state
    }

    pub fn message_key(&self) -> MessageKey {
        self.state.message_key()
    }

    pub fn source(&self) -> &ScriptSource {
        &self.source
    }

    pub fn compiler(&self) -> &ScriptCompiler {
        &self.compiler
    }

    pub fn compiled_unit(&self) -> Option<&CompiledUnit> {
        self.unit.as_ref()
    }

    pub fn stats(&self) -> InvokerStats {
        self.invoker.stats()
    }

    /// True when the held unit was compiled from an older revision.
    pub fn is_stale(&self) -> bool {
        self.unit
            .as_ref()
            .is_some_and(|unit| unit.source_revision() != self.source.revision())
    }

    /// Replace the script text. The state is left as is; staleness is detected
    /// by the next run or compile request.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.source.set_text(text);
        log::debug!("Script edited (revision {})", self.source.revision());
    }

    /// Replace the whole source, e.g. after loading a file.
    pub fn set_source(&mut self, source: ScriptSource) {
        let text = source.text().to_string();
        self.set_text(text);
    }

    fn transition(&mut self, next: ScriptState) {
        if self.state.name() != next.name() {
            log::info!("Script state {} -> {}", self.state.name(), next.name());
        }
        self.state = next;
    }

    /// Move to `Compiling` and hand out the job to compile. Any compile already in
    /// flight is superseded and the held unit is released.
    pub fn begin_compile(&mut self) -> CompileJob {
        if let Some(previous) = self.in_flight {
            log::debug!("Superseding compile generation {}", previous.generation);
        }
        self.unit = None;
        self.generation += 1;
        let snapshot = self.source.snapshot();
        let ticket = CompileTicket {
            generation: self.generation,
            revision: snapshot.revision,
        };
        self.in_flight = Some(ticket);
        self.transition(ScriptState::Compiling);
        CompileJob { ticket, snapshot }
    }

    /// Apply the result of a compile job. Returns false if the result was discarded.
    pub fn finish_compile(
        &mut self,
        ticket: CompileTicket,
        result: Result<CompiledUnit, Diagnostic>,
    ) -> bool {
        if self.in_flight != Some(ticket) {
            log::debug!(
                "Discarding result of superseded compile generation {}",
                ticket.generation
            );
            return false;
        }
        self.in_flight = None;

        if ticket.revision != self.source.revision() {
            log::debug!(
                "Discarding compile of revision {}; source is at revision {}",
                ticket.revision,
                self.source.revision()
            );
            self.transition(ScriptState::NotCompiled);
            return false;
        }

        match result {
            Ok(unit) => {
                self.unit = Some(unit);
                self.transition(ScriptState::CompiledOk);
            }
            Err(diag) => {
                log::warn!("Script compile failed: {}", diag);
                self.transition(ScriptState::CompileError(diag));
            }
        }
        true
    }

    /// Compile the current source on the calling thread.
    pub fn compile_now(&mut self) -> &ScriptState {
        let job = self.begin_compile();
        let result = self.compiler.build(&job.snapshot);
        self.finish_compile(job.ticket, result);
        &self.state
    }

    /// Demote a stale `CompiledOk` to `NotCompiled`. Returns true if it did.
    fn demote_if_stale(&mut self) -> bool {
        if matches!(self.state, ScriptState::CompiledOk) && self.is_stale() {
            self.unit = None;
            self.transition(ScriptState::NotCompiled);
            return true;
        }
        false
    }

    /// Switch the "Running" checkbox on. Only allowed from an up-to-date `CompiledOk`.
    pub fn request_run(&mut self) -> Result<(), RequestError> {
        if self.demote_if_stale() {
            log::warn!("Run rejected: script was edited since it was compiled");
            return Err(RequestError::StaleCompile);
        }
        match self.state {
            ScriptState::CompiledOk if self.unit.is_some() => {
                self.invoker.reset_stats();
                self.transition(ScriptState::Running);
                Ok(())
            }
            ScriptState::Running => Err(RequestError::AlreadyRunning),
            _ => {
                log::warn!("Run rejected in state {}", self.state.name());
                Err(RequestError::NotRunnable {
                    state: self.state.name(),
                })
            }
        }
    }

    /// Switch the "Running" checkbox off. The compiled unit is kept.
    pub fn request_stop(&mut self) -> Result<(), RequestError> {
        if !self.state.is_running() {
            return Err(RequestError::NotRunning);
        }
        self.transition(ScriptState::CompiledOk);
        Ok(())
    }

    /// One render-frame opportunity. Invokes the entry point only while `Running`;
    /// a fault moves the state to `RuntimeError` and is never propagated.
    pub fn tick(&mut self, ctx: &dyn FrameContext) -> TickOutcome {
        if !self.state.is_running() {
            return TickOutcome::Idle;
        }
        let Some(unit) = self.unit.as_mut() else {
            self.transition(ScriptState::NotCompiled);
            return TickOutcome::Idle;
        };

        match self.invoker.invoke(unit, ctx) {
            Ok(value) => TickOutcome::Completed(value),
            Err(diag) => {
                log::warn!("Script fault during tick: {}", diag);
                self.transition(ScriptState::RuntimeError(diag.clone()));
                TickOutcome::Faulted(diag)
            }
        }
    }
}

impl Default for ScriptStateMachine {
    fn default() -> Self {
        Self::new(ScriptCompiler::default())
    }
}
