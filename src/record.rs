//! The snapshot taken when a fault is intercepted.
//!
//! A [`FaultRecord`] is built once per intercepted panic, lent to the
//! [`ReportingClient`](crate::ReportingClient) for the duration of its
//! `capture` call, and dropped afterwards. Clients that need to keep it
//! around clone it.

use std::{
    any::Any,
    fmt,
    panic::{Location, PanicHookInfo},
    time::SystemTime,
};

use faulthook_backtrace::CallStack;

use crate::client::Level;

/// Structured description of one intercepted fault.
///
/// # Examples
///
/// ```rust
/// use faulthook::FaultRecord;
///
/// fn summarize(record: &FaultRecord) -> String {
///     match record.reason() {
///         Some(reason) => format!("{}: {reason}", record.message()),
///         None => record.message().to_string(),
///     }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultRecord {
    message: String,
    reason: Option<String>,
    call_stack: CallStack,
    location: Option<FaultLocation>,
    thread: Option<String>,
    timestamp: SystemTime,
}

/// Source location the runtime reported for a fault.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FaultLocation {
    /// The source file path.
    pub file: String,
    /// The line number.
    pub line: u32,
    /// The column number.
    pub column: u32,
}

impl From<&Location<'_>> for FaultLocation {
    fn from(location: &Location<'_>) -> Self {
        Self {
            file: location.file().to_owned(),
            line: location.line(),
            column: location.column(),
        }
    }
}

impl fmt::Display for FaultLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Panic payload carried by faults synthesized through
/// [`raise`](crate::raise) and [`raise_with_reason`](crate::raise_with_reason).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaisedFault {
    /// Description of the fault.
    pub message: String,
    /// Optional underlying cause.
    pub reason: Option<String>,
}

impl fmt::Display for RaisedFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            Some(reason) => write!(f, "{}: {reason}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Decodes a panic payload into a message and an optional reason.
///
/// Payloads that are neither a [`RaisedFault`] nor a string are described the
/// way the standard library's default hook describes them.
pub(crate) fn describe_payload(payload: &(dyn Any + Send)) -> (String, Option<String>) {
    if let Some(raised) = payload.downcast_ref::<RaisedFault>() {
        (raised.message.clone(), raised.reason.clone())
    } else if let Some(s) = payload.downcast_ref::<&'static str>() {
        ((*s).to_owned(), None)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        (s.clone(), None)
    } else {
        ("Box<dyn Any>".to_owned(), None)
    }
}

impl FaultRecord {
    /// Builds the record for a panic that is being handled right now.
    pub(crate) fn from_panic(info: &PanicHookInfo<'_>, call_stack: CallStack) -> Self {
        let (message, reason) = describe_payload(info.payload());
        Self {
            message,
            reason,
            call_stack,
            location: info.location().map(FaultLocation::from),
            thread: std::thread::current().name().map(str::to_owned),
            timestamp: SystemTime::now(),
        }
    }

    /// Builds a record by hand, e.g. to exercise a client in tests.
    ///
    /// The timestamp is the current time.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            reason: None,
            call_stack: CallStack::default(),
            location: None,
            thread: None,
            timestamp: SystemTime::now(),
        }
    }

    /// Sets the underlying cause.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Sets the call stack.
    #[must_use]
    pub fn with_call_stack(mut self, call_stack: CallStack) -> Self {
        self.call_stack = call_stack;
        self
    }

    /// Sets the source location.
    #[must_use]
    pub fn with_location(mut self, location: FaultLocation) -> Self {
        self.location = Some(location);
        self
    }

    /// Sets the name of the faulting thread.
    #[must_use]
    pub fn with_thread(mut self, thread: impl Into<String>) -> Self {
        self.thread = Some(thread.into());
        self
    }

    /// Human-readable description of the fault.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Underlying cause, when the fault carried one.
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// The call stack at the point of the fault, innermost frame first.
    pub fn call_stack(&self) -> &CallStack {
        &self.call_stack
    }

    /// Where the runtime says the fault happened.
    pub fn location(&self) -> Option<&FaultLocation> {
        self.location.as_ref()
    }

    /// Name of the faulting thread, if it had one.
    pub fn thread(&self) -> Option<&str> {
        self.thread.as_deref()
    }

    /// When the record was captured.
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    /// Severity of the record. Intercepted faults are always fatal.
    pub fn level(&self) -> Level {
        Level::Fatal
    }

    /// Short `"<function> in <file>"` description of where the fault
    /// happened.
    ///
    /// Uses the innermost frame of the call stack, falling back to the
    /// reported location when no frame was captured.
    pub fn culprit(&self) -> Option<String> {
        if let Some(frame) = self.call_stack.innermost() {
            return Some(match frame.file_name() {
                Some(file) => format!("{} in {file}", frame.function()),
                None => frame.function().to_owned(),
            });
        }
        self.location.as_ref().map(|location| {
            let file = location
                .file
                .rsplit(['/', '\\'])
                .next()
                .unwrap_or(&location.file);
            format!("line {} in {file}", location.line)
        })
    }
}

impl fmt::Display for FaultRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(reason) = &self.reason {
            write!(f, ": {reason}")?;
        }
        if let Some(thread) = &self.thread {
            write!(f, " (thread '{thread}')")?;
        }
        if let Some(location) = &self.location {
            write!(f, " at {location}")?;
        }
        if !self.call_stack.is_empty() {
            write!(f, "\n{}", self.call_stack)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use faulthook_backtrace::{Frame, FramePath, StackEntry};

    use super::*;

    #[test]
    fn test_record_send_sync() {
        static_assertions::assert_impl_all!(FaultRecord: Send, Sync, Clone);
        static_assertions::assert_impl_all!(RaisedFault: Send, Sync);
    }

    #[test]
    fn test_describe_raised_payload() {
        let payload = RaisedFault {
            message: "index rebuild failed".to_owned(),
            reason: Some("No reason".to_owned()),
        };
        let (message, reason) = describe_payload(&payload);
        assert_eq!(message, "index rebuild failed");
        assert_eq!(reason.as_deref(), Some("No reason"));
    }

    #[test]
    fn test_describe_string_payloads() {
        let (message, reason) = describe_payload(&"index out of bounds");
        assert_eq!(message, "index out of bounds");
        assert_eq!(reason, None);

        let (message, reason) = describe_payload(&String::from("disk full"));
        assert_eq!(message, "disk full");
        assert_eq!(reason, None);
    }

    #[test]
    fn test_describe_opaque_payload() {
        let (message, reason) = describe_payload(&42u32);
        assert_eq!(message, "Box<dyn Any>");
        assert_eq!(reason, None);
    }

    #[test]
    fn test_culprit_prefers_innermost_frame() {
        let stack = CallStack {
            entries: vec![StackEntry::Frame(Frame {
                sym_demangled: "my_app::storage::flush".to_owned(),
                frame_path: Some(FramePath::from_raw("/build/src/storage.rs".to_owned())),
                lineno: Some(31),
            })],
            total_omitted_frames: 0,
            show_full_path: false,
        };
        let record = FaultRecord::new("disk full")
            .with_call_stack(stack)
            .with_location(FaultLocation {
                file: "src/main.rs".to_owned(),
                line: 3,
                column: 5,
            });
        assert_eq!(record.culprit().as_deref(), Some("flush in storage.rs"));
    }

    #[test]
    fn test_culprit_falls_back_to_location() {
        let record = FaultRecord::new("disk full").with_location(FaultLocation {
            file: "src/storage.rs".to_owned(),
            line: 12,
            column: 9,
        });
        assert_eq!(record.culprit().as_deref(), Some("line 12 in storage.rs"));
        assert_eq!(FaultRecord::new("disk full").culprit(), None);
    }

    #[test]
    fn test_display() {
        let record = FaultRecord::new("index rebuild failed")
            .with_reason("No reason")
            .with_thread("main")
            .with_location(FaultLocation {
                file: "src/main.rs".to_owned(),
                line: 12,
                column: 5,
            });
        assert_eq!(
            record.to_string(),
            "index rebuild failed: No reason (thread 'main') at src/main.rs:12:5"
        );
        assert_eq!(record.level(), Level::Fatal);
    }
}
