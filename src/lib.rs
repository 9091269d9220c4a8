#![deny(
    missing_docs,
    unsafe_code,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::broken_intra_doc_links,
    missing_copy_implementations,
    unused_doc_comments
)]

//! Forward uncaught panics to a crash-reporting client before the process
//! goes down.
//!
//! ## Overview
//!
//! This crate installs one process-wide panic hook. When a panic reaches it,
//! the hook snapshots the fault into a [`FaultRecord`] (message, optional
//! reason, call stack, location, thread, timestamp), hands the record to the
//! [`ReportingClient`] you registered, and then runs whatever hook was
//! installed before, so the usual panic message and any other crash handler
//! still see the fault. Nothing is swallowed: the process unwinds or aborts
//! exactly as it would have without this crate.
//!
//! ## Quick Example
//!
//! ```rust
//! use faulthook::{FaultRecord, ReportingClient};
//!
//! struct Collector;
//!
//! impl ReportingClient for Collector {
//!     fn capture(&self, record: &FaultRecord) {
//!         // Hand the record to your transport here.
//!         eprintln!("reporting {:?} from {:?}", record.message(), record.culprit());
//!     }
//! }
//!
//! fn main() {
//!     faulthook::register_handler(Collector).expect("fault handler registered twice");
//!     // ... run the application ...
//! }
//! ```
//!
//! ## Checking the wiring
//!
//! [`raise`] triggers a fault that goes through the real hook path, so an
//! integration test can confirm that the client receives a record:
//!
//! ```rust
//! use std::{panic, sync::Arc};
//!
//! use faulthook::client::RecordingClient;
//!
//! let client = Arc::new(RecordingClient::new());
//! faulthook::register_handler(Arc::clone(&client)).expect("registered twice");
//!
//! let _: std::thread::Result<()> = panic::catch_unwind(|| {
//!     faulthook::raise("disk full");
//! });
//! assert_eq!(client.records()[0].message(), "disk full");
//! ```
//!
//! ## Registration rules
//!
//! - Register once, as early as possible. Later registrations are rejected
//!   with [`AlreadyRegisteredError`].
//! - There is no unregistration; the handler stays until the process exits.
//! - [`ReportingClient::capture`] runs inside the panic hook and must not
//!   panic. A panic there aborts the process.
//!
//! ## Environment Variables
//!
//! - `RUST_BACKTRACE=full` - Keeps every frame past the panic runtime and
//!   this crate, with full paths
//! - `FAULTHOOK_BACKTRACE` - Comma-separated options: `off` to skip
//!   call-stack capture, `full_paths` to keep full file paths
//!
//! ## Logging
//!
//! The interceptor emits [`tracing`] events: `error` for every intercepted
//! fault and `debug` for registration and chaining. Nothing is printed
//! unless the application installs a subscriber.

pub mod client;
pub mod interceptor;
pub mod record;

pub use faulthook_backtrace::{CallStack, Frame, StackEntry, StackFilter};

pub use self::{
    client::{Level, ReportingClient},
    interceptor::{
        AlreadyRegisteredError, FaultInterceptor, Registration, capture_message, is_registered,
        raise, raise_with_reason, register_handler,
    },
    record::{FaultLocation, FaultRecord, RaisedFault},
};
