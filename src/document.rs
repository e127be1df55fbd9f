//! Thread-safe handle to one script document.
//!
//! The dialog thread edits and compiles, the render thread ticks. All of it goes
//! through one mutex around the state machine. Compiles run on a worker thread
//! outside the lock, so `request_compile` returns immediately and a slow compile
//! never holds up a frame; while it runs the state is `Compiling` and ticks are idle.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crate::compiler::{CompiledUnit, ScriptCompiler};
use crate::config::EngineConfig;
use crate::frame::FrameContext;
use crate::invoker::{InvokerStats, TickOutcome};
use crate::script_diagnostics::{Diagnostic, DiagnosticKind};
use crate::script_state::{MessageKey, ScriptState};
use crate::source::ScriptSource;
use crate::state_machine::{CompileJob, RequestError, ScriptStateMachine};

fn lock(machine: &Mutex<ScriptStateMachine>) -> MutexGuard<'_, ScriptStateMachine> {
    machine.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Resets the tick flag even if the tick unwinds.
struct TickGuard<'a>(&'a AtomicBool);

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Completion handle for a background compile.
#[derive(Debug)]
pub struct CompileHandle {
    handle: Option<JoinHandle<bool>>,
    applied_inline: bool,
}

impl CompileHandle {
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Block until the compile finished. Returns true if its result was applied,
    /// false if it was superseded or went stale.
    pub fn wait(self) -> bool {
        match self.handle {
            Some(handle) => handle.join().unwrap_or_else(|_| {
                log::error!("Compile worker terminated abnormally");
                false
            }),
            None => self.applied_inline,
        }
    }
}

fn run_job(compiler: &ScriptCompiler, job: &CompileJob) -> Result<CompiledUnit, Diagnostic> {
    panic::catch_unwind(AssertUnwindSafe(|| compiler.build(&job.snapshot))).unwrap_or_else(|_| {
        Err(Diagnostic::new(
            DiagnosticKind::SyntaxError,
            "The script engine failed while compiling this script",
        ))
    })
}

#[derive(Debug, Clone)]
pub struct ScriptDocument {
    machine: Arc<Mutex<ScriptStateMachine>>,
    ticking: Arc<AtomicBool>,
}

impl ScriptDocument {
    pub fn new(config: EngineConfig) -> Self {
        Self::from_machine(ScriptStateMachine::with_config(config))
    }

    pub fn from_machine(machine: ScriptStateMachine) -> Self {
        Self {
            machine: Arc::new(Mutex::new(machine)),
            ticking: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn current_state(&self) -> ScriptState {
        lock(&self.machine).current_state().clone()
    }

    pub fn message_key(&self) -> MessageKey {
        lock(&self.machine).message_key()
    }

    pub fn stats(&self) -> InvokerStats {
        lock(&self.machine).stats()
    }

    /// Read access to the state machine under the lock.
    pub fn with_machine<R>(&self, f: impl FnOnce(&ScriptStateMachine) -> R) -> R {
        f(&lock(&self.machine))
    }

    pub fn set_text(&self, text: impl Into<String>) {
        lock(&self.machine).set_text(text);
    }

    pub fn set_source(&self, source: ScriptSource) {
        lock(&self.machine).set_source(source);
    }

    /// Start compiling the current text in the background. The state is
    /// `Compiling` when this returns; a compile already running is superseded.
    ///
    /// The compile itself never blocks the caller, but taking the snapshot needs
    /// the document lock, so this waits for at most one tick that is already
    /// executing `Main`.
    pub fn request_compile(&self) -> CompileHandle {
        let (job, compiler) = {
            let mut machine = lock(&self.machine);
            (machine.begin_compile(), machine.compiler().clone())
        };

        let machine = Arc::clone(&self.machine);
        let worker_job = job.clone();
        let worker_compiler = compiler.clone();
        let spawned = thread::Builder::new()
            .name("script-compile".to_string())
            .spawn(move || {
                let result = run_job(&worker_compiler, &worker_job);
                lock(&machine).finish_compile(worker_job.ticket, result)
            });

        match spawned {
            Ok(handle) => CompileHandle {
                handle: Some(handle),
                applied_inline: false,
            },
            Err(err) => {
                log::warn!("Could not spawn compile worker ({err}); compiling inline");
                let result = run_job(&compiler, &job);
                let applied = lock(&self.machine).finish_compile(job.ticket, result);
                CompileHandle {
                    handle: None,
                    applied_inline: applied,
                }
            }
        }
    }

    pub fn request_run(&self) -> Result<(), RequestError> {
        lock(&self.machine).request_run()
    }

    pub fn request_stop(&self) -> Result<(), RequestError> {
        lock(&self.machine).request_stop()
    }

    /// Called by the render pipeline once per frame. Never blocks on a compile
    /// and never starts while a previous tick is still executing.
    pub fn tick(&self, ctx: &dyn FrameContext) -> TickOutcome {
        if self.ticking.swap(true, Ordering::Acquire) {
            log::debug!("Tick dropped: previous invocation still running");
            return TickOutcome::Busy;
        }
        let _guard = TickGuard(&self.ticking);
        lock(&self.machine).tick(ctx)
    }
}

impl Default for ScriptDocument {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::RenderFrame;
    use std::sync::TryLockError;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_document_is_shareable() {
        assert_send_sync::<ScriptDocument>();
        assert_send_sync::<CompileHandle>();
    }

    #[test]
    fn test_background_compile() {
        let doc = ScriptDocument::default();
        doc.set_text("fn Main(ctx) { ctx.frame }");

        let handle = doc.request_compile();
        assert!(handle.wait());
        assert_eq!(doc.current_state(), ScriptState::CompiledOk);

        doc.request_run().unwrap();
        let outcome = doc.tick(&RenderFrame::new(9, 24.0, 8, 8));
        assert!(matches!(outcome, TickOutcome::Completed(ref v) if v.as_int().ok() == Some(9)));
    }

    #[test]
    fn test_latest_compile_wins() {
        let doc = ScriptDocument::default();
        doc.set_text("fn Helper() {}");
        let first = doc.request_compile();
        doc.set_text("fn Main() {}");
        let second = doc.request_compile();

        // the first result may land before the second request or be discarded
        first.wait();
        assert!(second.wait());
        assert_eq!(doc.current_state(), ScriptState::CompiledOk);
    }

    #[test]
    fn test_overlapping_tick_is_dropped() {
        let doc = ScriptDocument::default();
        doc.set_text("fn Main() {}");
        doc.request_compile().wait();
        doc.request_run().unwrap();

        doc.ticking.store(true, Ordering::Release);
        assert!(matches!(doc.tick(&RenderFrame::new(0, 24.0, 1, 1)), TickOutcome::Busy));
        assert_eq!(doc.stats().invocations, 0);

        doc.ticking.store(false, Ordering::Release);
        assert!(doc.tick(&RenderFrame::new(0, 24.0, 1, 1)).invoked());
        assert!(!doc.ticking.load(Ordering::Acquire));
    }

    #[test]
    fn test_ticks_from_another_thread() {
        let doc = ScriptDocument::default();
        doc.set_text("fn Main(ctx) { ctx.frame }");
        doc.request_compile().wait();
        doc.request_run().unwrap();

        let render = doc.clone();
        let invoked = thread::spawn(move || {
            (0..10)
                .filter(|n| render.tick(&RenderFrame::new(*n, 24.0, 1, 1)).invoked())
                .count()
        })
        .join()
        .unwrap();

        assert_eq!(invoked, 10);
        assert_eq!(doc.stats().invocations, 10);
    }

    #[test]
    fn test_compile_waits_for_running_tick() {
        let doc = ScriptDocument::default();
        doc.set_text("fn Main() { let n = 0; while n < 5000 { n += 1; } n }");
        doc.request_compile().wait();
        doc.request_run().unwrap();

        let render = doc.clone();
        let ticker = thread::spawn(move || render.tick(&RenderFrame::new(0, 24.0, 1, 1)));
        // wait until the tick holds the lock (or has already finished)
        while !ticker.is_finished() {
            if let Err(TryLockError::WouldBlock) = doc.machine.try_lock() {
                break;
            }
            thread::yield_now();
        }

        // the in-progress frame finishes untouched; the compile is applied after it
        let handle = doc.request_compile();
        let outcome = ticker.join().unwrap();
        assert!(matches!(outcome, TickOutcome::Completed(ref v) if v.as_int().ok() == Some(5000)));
        assert!(handle.wait());
        assert_eq!(doc.current_state(), ScriptState::CompiledOk);
    }

    #[test]
    fn test_with_machine_reads_unit() {
        let doc = ScriptDocument::default();
        doc.set_text("fn Main() {}");
        doc.request_compile().wait();

        let revision = doc.with_machine(|m| m.compiled_unit().map(|u| u.source_revision()));
        assert_eq!(revision, Some(1));
    }
}
