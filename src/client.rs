//! The capability the interceptor hands faults to.
//!
//! Transport, batching, retries and serialization all live behind
//! [`ReportingClient`]; the interceptor only ever makes one synchronous call
//! per fault.

use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::record::FaultRecord;

/// Severity attached to a reported event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    /// Diagnostic noise.
    Debug,
    /// Informational message.
    Info,
    /// Something unexpected that was handled.
    Warning,
    /// An error the application survived.
    Error,
    /// A fault that ends the process or thread.
    Fatal,
}

impl Level {
    /// The lowercase name collection services expect (`"debug"`, `"info"`,
    /// `"warning"`, `"error"`, `"fatal"`).
    pub const fn as_str(self) -> &'static str {
        match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warning => "warning",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives fault records from the interceptor.
///
/// `capture` runs inside the panic hook, on the panicking thread, while the
/// process may already be in a degraded state. Implementations must not
/// panic: a panic here is a panic while panicking, which aborts the process
/// before any previously installed hook gets to run. Delivery failures
/// should be dropped or logged locally.
///
/// # Examples
///
/// ```rust
/// use faulthook::{FaultRecord, ReportingClient};
///
/// struct StderrClient;
///
/// impl ReportingClient for StderrClient {
///     fn capture(&self, record: &FaultRecord) {
///         eprintln!("crash report: {record}");
///     }
/// }
/// ```
pub trait ReportingClient: Send + Sync + 'static {
    /// Submits an intercepted fault.
    fn capture(&self, record: &FaultRecord);

    /// Submits a free-form diagnostic message.
    ///
    /// The default implementation drops the message.
    fn capture_message(&self, message: &str, level: Level) {
        tracing::debug!(%level, message_len = message.len(), "reporting client dropped message");
    }
}

impl<C: ReportingClient + ?Sized> ReportingClient for Arc<C> {
    fn capture(&self, record: &FaultRecord) {
        (**self).capture(record);
    }

    fn capture_message(&self, message: &str, level: Level) {
        (**self).capture_message(message, level);
    }
}

impl<C: ReportingClient + ?Sized> ReportingClient for Box<C> {
    fn capture(&self, record: &FaultRecord) {
        (**self).capture(record);
    }

    fn capture_message(&self, message: &str, level: Level) {
        (**self).capture_message(message, level);
    }
}

/// Client backed by a closure. Created by [`from_fn`].
#[derive(Clone, Copy)]
pub struct FnClient<F>(F);

impl<F> fmt::Debug for FnClient<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnClient").finish_non_exhaustive()
    }
}

/// Wraps a closure as a [`ReportingClient`].
///
/// # Examples
///
/// ```rust
/// use faulthook::client;
///
/// let client = client::from_fn(|record| eprintln!("fault: {}", record.message()));
/// ```
pub fn from_fn<F>(f: F) -> FnClient<F>
where
    F: Fn(&FaultRecord) + Send + Sync + 'static,
{
    FnClient(f)
}

impl<F> ReportingClient for FnClient<F>
where
    F: Fn(&FaultRecord) + Send + Sync + 'static,
{
    fn capture(&self, record: &FaultRecord) {
        (self.0)(record);
    }
}

/// Client that keeps everything it receives in memory.
///
/// Meant for tests that check the wiring between the interceptor and a
/// client. Share it through an [`Arc`] to inspect it after registration.
///
/// # Examples
///
/// ```rust
/// use faulthook::{FaultRecord, Level, ReportingClient, client::RecordingClient};
///
/// let client = RecordingClient::new();
/// client.capture(&FaultRecord::new("disk full"));
/// client.capture_message("low memory", Level::Warning);
///
/// assert_eq!(client.records()[0].message(), "disk full");
/// assert_eq!(client.messages(), vec![("low memory".to_string(), Level::Warning)]);
/// ```
#[derive(Debug, Default)]
pub struct RecordingClient {
    records: Mutex<Vec<FaultRecord>>,
    messages: Mutex<Vec<(String, Level)>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RecordingClient {
    /// Creates an empty client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies of every captured record, in capture order.
    pub fn records(&self) -> Vec<FaultRecord> {
        lock(&self.records).clone()
    }

    /// Every captured message with its level, in capture order.
    pub fn messages(&self) -> Vec<(String, Level)> {
        lock(&self.messages).clone()
    }

    /// Number of captured records.
    pub fn record_count(&self) -> usize {
        lock(&self.records).len()
    }
}

impl ReportingClient for RecordingClient {
    fn capture(&self, record: &FaultRecord) {
        lock(&self.records).push(record.clone());
    }

    fn capture_message(&self, message: &str, level: Level) {
        lock(&self.messages).push((message.to_owned(), level));
    }
}
