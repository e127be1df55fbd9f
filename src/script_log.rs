//! Script logging for Rhai scripts.
//!
//! Scripts get `log_info(value)`, `log_warn(value)` and `log_error(value)`, and
//! Rhai's built-in `print(value)` is routed to the info level. Messages go to the
//! `log` facade under the `script` target.
//!
//! Each compiler owns one limiter, so independent script documents do not share
//! their per-frame budget.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Default maximum number of log messages allowed per frame.
pub const DEFAULT_MAX_LOGS_PER_FRAME: u32 = 100;

/// Log level for script messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_log_level(&self) -> log::Level {
        match self {
            LogLevel::Info => log::Level::Info,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Error => log::Level::Error,
        }
    }
}

#[derive(Debug)]
struct FrameBudget {
    limit: u32,
    count: AtomicU32,
    warned: AtomicBool,
}

/// Per-frame rate-limited logger shared between the engine's registered
/// functions and the invoker that resets it every tick.
#[derive(Debug, Clone)]
pub struct ScriptLogger {
    budget: Arc<FrameBudget>,
}

impl ScriptLogger {
    pub fn new(max_logs_per_frame: u32) -> Self {
        Self {
            budget: Arc::new(FrameBudget {
                limit: max_logs_per_frame,
                count: AtomicU32::new(0),
                warned: AtomicBool::new(false),
            }),
        }
    }

    /// Reset the per-frame counter. Called at the start of each tick.
    pub fn reset_frame(&self) {
        self.budget.count.store(0, Ordering::Relaxed);
        self.budget.warned.store(false, Ordering::Relaxed);
    }

    /// Returns true while under the per-frame limit.
    fn can_log(&self) -> bool {
        let count = self.budget.count.fetch_add(1, Ordering::Relaxed);
        if count < self.budget.limit {
            return true;
        }
        // Only warn once per frame about exceeding the limit
        if !self.budget.warned.swap(true, Ordering::Relaxed) {
            emit_log(
                LogLevel::Warn,
                &format!(
                    "Script log limit exceeded ({} messages/frame). Further logs dropped.",
                    self.budget.limit
                ),
            );
        }
        false
    }

    /// Log a message from a script, respecting the per-frame limit.
    pub fn log(&self, level: LogLevel, message: &str) {
        if self.can_log() {
            emit_log(level, message);
        }
    }

    pub fn info(&self, value: rhai::Dynamic) {
        self.log(LogLevel::Info, &stringify_dynamic(&value));
    }

    pub fn warn(&self, value: rhai::Dynamic) {
        self.log(LogLevel::Warn, &stringify_dynamic(&value));
    }

    pub fn error(&self, value: rhai::Dynamic) {
        self.log(LogLevel::Error, &stringify_dynamic(&value));
    }

    /// Register the script-facing logging functions on `engine`.
    pub fn register(&self, engine: &mut rhai::Engine) {
        let info = self.clone();
        let warn = self.clone();
        let error = self.clone();
        let print = self.clone();
        engine
            .register_fn("log_info", move |value: rhai::Dynamic| info.info(value))
            .register_fn("log_warn", move |value: rhai::Dynamic| warn.warn(value))
            .register_fn("log_error", move |value: rhai::Dynamic| error.error(value));
        engine.on_print(move |text| print.log(LogLevel::Info, text));
    }
}

impl Default for ScriptLogger {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LOGS_PER_FRAME)
    }
}

fn emit_log(level: LogLevel, message: &str) {
    log::log!(target: "script", level.as_log_level(), "{}", message);
}

/// Convert a Rhai Dynamic value to a string safely.
/// Never panics, handles all types gracefully.
pub fn stringify_dynamic(value: &rhai::Dynamic) -> String {
    if let Ok(s) = value.clone().into_string() {
        return s;
    }

    if let Some(arr) = value.clone().try_cast::<rhai::Array>() {
        let parts: Vec<String> = arr.iter().map(stringify_dynamic).collect();
        return parts.join(" ");
    }

    if let Some(map) = value.clone().try_cast::<rhai::Map>() {
        let parts: Vec<String> = map
            .iter()
            .map(|(k, v)| format!("{}: {}", k, stringify_dynamic(v)))
            .collect();
        return format!("{{{}}}", parts.join(", "));
    }

    if let Ok(i) = value.as_int() {
        return i.to_string();
    }
    if let Ok(f) = value.as_float() {
        return format!("{}", f);
    }
    if let Ok(b) = value.as_bool() {
        return b.to_string();
    }
    if value.is_unit() {
        return "()".to_string();
    }

    format!("{:?}", value)
}
