//! Execution invoker: one guarded call of the entry point per rendered frame.

use std::panic::{self, AssertUnwindSafe};

use rhai::Dynamic;

use crate::compiler::CompiledUnit;
use crate::frame::FrameContext;
use crate::script_diagnostics::{from_eval_error, Diagnostic, DiagnosticKind};
use crate::script_log::ScriptLogger;

/// What happened to a tick.
#[derive(Debug, Clone)]
pub enum TickOutcome {
    /// The script is not running; nothing was invoked.
    Idle,
    /// A previous tick had not returned yet; this one was dropped.
    Busy,
    /// The entry point returned this value.
    Completed(Dynamic),
    /// The entry point failed; the script is now in `RuntimeError`.
    Faulted(Diagnostic),
}

impl TickOutcome {
    pub fn invoked(&self) -> bool {
        matches!(self, TickOutcome::Completed(_) | TickOutcome::Faulted(_))
    }
}

/// Counters for the current run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvokerStats {
    pub invocations: u64,
    pub faults: u64,
}

#[derive(Debug)]
pub struct ExecutionInvoker {
    logger: ScriptLogger,
    stats: InvokerStats,
}

impl ExecutionInvoker {
    pub fn new(logger: ScriptLogger) -> Self {
        Self {
            logger,
            stats: InvokerStats::default(),
        }
    }

    pub fn stats(&self) -> InvokerStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = InvokerStats::default();
    }

    /// Invoke the unit's entry point with `ctx`. The unit is only borrowed for
    /// this call. Engine failures come back as `RuntimeFault` diagnostics, which
    /// are also recorded on the unit.
    pub fn invoke(
        &mut self,
        unit: &mut CompiledUnit,
        ctx: &dyn FrameContext,
    ) -> Result<Dynamic, Diagnostic> {
        self.logger.reset_frame();
        self.stats.invocations += 1;

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| unit.invoke(ctx.to_dynamic())));
        let result = match outcome {
            Ok(Some(Ok(value))) => return Ok(value),
            Ok(Some(Err(err))) => from_eval_error(DiagnosticKind::RuntimeFault, &err),
            Ok(None) => Diagnostic::new(
                DiagnosticKind::RuntimeFault,
                "No validated entry point to invoke",
            ),
            Err(_) => {
                log::error!("Script invocation panicked");
                Diagnostic::new(
                    DiagnosticKind::RuntimeFault,
                    "The script engine failed while running this frame",
                )
            }
        };

        self.stats.faults += 1;
        unit.push_diagnostic(result.clone());
        Err(result)
    }
}
