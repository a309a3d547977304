//! Logging as capability injection: the context carries an optional `{function_pointer,
//! user_data}` sink (see the design notes on avoiding global state). The default sink instead
//! plugs into `tracing`, matching every `Drop`/recreate/recover call site elsewhere in this crate.

use std::ffi::c_void;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Trace,
}

/// Raw callback form, for embedders that cannot take a `tracing` dependency.
///
/// `user_data` is passed back unchanged on every call; the pointer's validity for the lifetime
/// of the owning [`crate::Context`] is the caller's responsibility.
#[derive(Clone, Copy)]
pub struct LogSink {
    callback: unsafe extern "C" fn(*mut c_void, LogLevel, *const std::os::raw::c_char),
    user_data: *mut c_void,
}

unsafe impl Send for LogSink {}
unsafe impl Sync for LogSink {}

impl LogSink {
    pub fn new(
        callback: unsafe extern "C" fn(*mut c_void, LogLevel, *const std::os::raw::c_char),
        user_data: *mut c_void,
    ) -> Self {
        Self { callback, user_data }
    }

    pub(crate) fn emit(&self, level: LogLevel, message: &str) {
        let Ok(c_message) = std::ffi::CString::new(message) else {
            return;
        };
        unsafe { (self.callback)(self.user_data, level, c_message.as_ptr()) };
    }
}

/// Emits through the sink if present, otherwise through `tracing` — the path every internal
/// call site in this crate goes through.
pub(crate) fn emit(sink: Option<&LogSink>, level: LogLevel, message: std::fmt::Arguments) {
    if let Some(sink) = sink {
        sink.emit(level, &message.to_string());
        return;
    }
    match level {
        LogLevel::Error => tracing::error!("{message}"),
        LogLevel::Warn => tracing::warn!("{message}"),
        LogLevel::Info => tracing::info!("{message}"),
        LogLevel::Trace => tracing::trace!("{message}"),
    }
}

macro_rules! ctx_log {
    ($ctx:expr, $level:expr, $($arg:tt)*) => {
        $crate::log::emit($ctx.log_sink(), $level, format_args!($($arg)*))
    };
}

pub(crate) use ctx_log;
