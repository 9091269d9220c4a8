//! Installation of the process-wide panic hook and the fault handoff.
//!
//! # Lifecycle
//!
//! The process starts out unregistered. [`register_handler`] (or
//! [`Registration::register`]) moves it to registered, which it stays in
//! until exit: there is no way to unregister. Only the first registration
//! takes effect; later ones return [`AlreadyRegisteredError`] and leave the
//! installed hook alone.
//!
//! # What happens on a fault
//!
//! 1. The runtime calls the installed trampoline, which forwards to
//!    [`FaultInterceptor::handle_fault`].
//! 2. A [`FaultRecord`] is built from the panic.
//! 3. The record is passed to [`ReportingClient::capture`].
//! 4. The hook that was installed before registration runs with the same
//!    [`PanicHookInfo`].
//! 5. The panic proceeds exactly as it would have without this crate.

use std::{
    panic::{self, PanicHookInfo},
    sync::{
        OnceLock,
        atomic::{AtomicBool, Ordering},
    },
};

use faulthook_backtrace::{CallStack, EnvOptions, StackFilter};

use crate::{
    client::{Level, ReportingClient},
    record::{FaultRecord, RaisedFault},
};

/// The hook that was installed before registration.
pub type PreviousHandler = Box<dyn Fn(&PanicHookInfo<'_>) + Sync + Send + 'static>;

/// Error returned when a fault handler is already registered for this
/// process.
///
/// Contains the client that was passed to the rejected registration, so it
/// can be recovered.
#[derive(thiserror::Error)]
#[error("a fault handler is already registered for this process")]
pub struct AlreadyRegisteredError(pub Box<dyn ReportingClient>);

impl std::fmt::Debug for AlreadyRegisteredError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlreadyRegisteredError").finish()
    }
}

/// Configuration for installing the fault handler.
///
/// # Examples
///
/// ```rust
/// use faulthook::{Registration, StackFilter, client::RecordingClient};
///
/// Registration::new(RecordingClient::new())
///     .stack_filter(StackFilter {
///         max_entry_count: 10,
///         ..StackFilter::DEFAULT
///     })
///     .register()
///     .expect("fault handler registered twice");
/// ```
pub struct Registration {
    client: Box<dyn ReportingClient>,
    chain_previous: bool,
    stack_filter: StackFilter,
    capture_call_stack: bool,
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("chain_previous", &self.chain_previous)
            .field("stack_filter", &self.stack_filter)
            .field("capture_call_stack", &self.capture_call_stack)
            .finish_non_exhaustive()
    }
}

impl Registration {
    /// Starts a registration for `client`.
    ///
    /// Defaults: the previous hook is chained, and call-stack capture follows
    /// `RUST_BACKTRACE` and `FAULTHOOK_BACKTRACE` (see
    /// [`StackFilter::from_env`]).
    pub fn new<C: ReportingClient>(client: C) -> Self {
        Self {
            client: Box::new(client),
            chain_previous: true,
            stack_filter: StackFilter::from_env(),
            capture_call_stack: EnvOptions::get().capture,
        }
    }

    /// Whether the hook installed before registration keeps running after
    /// ours. When `false` it is dropped.
    #[must_use]
    pub fn chain_previous(mut self, chain_previous: bool) -> Self {
        self.chain_previous = chain_previous;
        self
    }

    /// Filter applied to captured call stacks.
    #[must_use]
    pub fn stack_filter(mut self, stack_filter: StackFilter) -> Self {
        self.stack_filter = stack_filter;
        self
    }

    /// Whether a call stack is captured at all.
    #[must_use]
    pub fn capture_call_stack(mut self, capture_call_stack: bool) -> Self {
        self.capture_call_stack = capture_call_stack;
        self
    }

    /// Installs the fault handler for the rest of the process lifetime.
    ///
    /// Takes the currently installed panic hook (the standard library's
    /// default one if nothing else was set) as the hook to chain to, then
    /// installs the interceptor in its place.
    ///
    /// Returns [`AlreadyRegisteredError`] without touching the installed
    /// hook if a handler was registered before.
    pub fn register(self) -> Result<(), AlreadyRegisteredError> {
        if !INTERCEPTOR.claim() {
            tracing::debug!("fault handler already registered; rejecting registration");
            return Err(AlreadyRegisteredError(self.client));
        }

        let taken = panic::take_hook();
        let previous = if self.chain_previous {
            Some(taken)
        } else {
            drop(taken);
            None
        };

        INTERCEPTOR.publish(FaultInterceptor {
            client: self.client,
            previous,
            stack_filter: self.stack_filter,
            capture_call_stack: self.capture_call_stack,
        });
        panic::set_hook(Box::new(dispatch));

        tracing::debug!(
            chain_previous = self.chain_previous,
            capture_call_stack = self.capture_call_stack,
            "fault handler registered"
        );
        Ok(())
    }
}

/// Registers `client` to receive every uncaught fault of this process.
///
/// Shorthand for [`Registration::new(client).register()`](Registration).
/// Call it once, early in `main`.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
///
/// use faulthook::client::RecordingClient;
///
/// let client = Arc::new(RecordingClient::new());
/// faulthook::register_handler(Arc::clone(&client)).expect("registered twice");
/// ```
pub fn register_handler<C: ReportingClient>(client: C) -> Result<(), AlreadyRegisteredError> {
    Registration::new(client).register()
}

/// Returns `true` once a fault handler has been registered.
///
/// Becomes `true` as soon as a registration wins, so it already holds when a
/// concurrent registration is rejected with [`AlreadyRegisteredError`].
pub fn is_registered() -> bool {
    INTERCEPTOR.is_claimed()
}

/// Sends a free-form message to the registered client.
///
/// Returns `false` when no handler is registered.
pub fn capture_message(message: &str, level: Level) -> bool {
    match FaultInterceptor::current() {
        Some(interceptor) => {
            interceptor.client.capture_message(message, level);
            true
        }
        None => false,
    }
}

/// Triggers a fault carrying `message`, to check the wiring end to end.
///
/// The fault goes through the installed panic hook exactly like a genuine
/// panic. Outside of [`catch_unwind`](std::panic::catch_unwind) this unwinds
/// the calling thread, or aborts under `panic = "abort"`.
///
/// # Examples
///
/// ```rust,should_panic
/// faulthook::raise("disk full");
/// ```
#[track_caller]
#[inline(never)]
pub fn raise(message: impl Into<String>) -> ! {
    panic::panic_any(RaisedFault {
        message: message.into(),
        reason: None,
    })
}

/// Like [`raise`], with an underlying cause attached.
#[track_caller]
#[inline(never)]
pub fn raise_with_reason(message: impl Into<String>, reason: impl Into<String>) -> ! {
    panic::panic_any(RaisedFault {
        message: message.into(),
        reason: Some(reason.into()),
    })
}

/// The registered fault handler.
pub struct FaultInterceptor {
    client: Box<dyn ReportingClient>,
    previous: Option<PreviousHandler>,
    stack_filter: StackFilter,
    capture_call_stack: bool,
}

impl std::fmt::Debug for FaultInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultInterceptor")
            .field("chains_previous", &self.previous.is_some())
            .field("stack_filter", &self.stack_filter)
            .field("capture_call_stack", &self.capture_call_stack)
            .finish_non_exhaustive()
    }
}

impl FaultInterceptor {
    /// The interceptor registered for this process, if any.
    pub fn current() -> Option<&'static FaultInterceptor> {
        INTERCEPTOR.fetch()
    }

    /// Whether a previously installed hook will run after ours.
    pub fn chains_previous(&self) -> bool {
        self.previous.is_some()
    }

    /// Reports one fault and passes it on to the previous hook.
    ///
    /// This is what the installed panic hook runs. The client sees the
    /// record before the previous hook sees the fault.
    pub fn handle_fault(&self, info: &PanicHookInfo<'_>) {
        let call_stack = if self.capture_call_stack {
            CallStack::capture(&self.stack_filter)
        } else {
            CallStack::default()
        };
        let record = FaultRecord::from_panic(info, call_stack);

        tracing::error!(
            fault = %record.message(),
            reason = record.reason(),
            location = record.location().map(tracing::field::display),
            thread = record.thread(),
            "intercepted uncaught fault"
        );
        self.client.capture(&record);
        drop(record);

        if let Some(previous) = &self.previous {
            tracing::debug!("chaining to previous panic hook");
            previous(info);
        }
    }
}

/// Entry point the runtime calls; forwards to the registered interceptor.
fn dispatch(info: &PanicHookInfo<'_>) {
    if let Some(interceptor) = FaultInterceptor::current() {
        interceptor.handle_fault(info);
    }
}

struct GlobalInterceptor {
    /// Set by the first registration, before anything else happens. Never
    /// reset.
    claimed: AtomicBool,
    /// Written once by the claiming registration, before the hook is
    /// installed.
    interceptor: OnceLock<FaultInterceptor>,
}

impl GlobalInterceptor {
    const fn new() -> Self {
        Self {
            claimed: AtomicBool::new(false),
            interceptor: OnceLock::new(),
        }
    }

    /// Returns `true` for exactly one caller per process.
    fn claim(&self) -> bool {
        self.claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }

    /// Stores the interceptor. Only the caller that won [`claim`](Self::claim)
    /// calls this, so the cell is always empty here.
    fn publish(&self, interceptor: FaultInterceptor) {
        if self.interceptor.set(interceptor).is_err() {
            tracing::error!("fault interceptor published twice; keeping the first");
        }
    }

    fn fetch(&self) -> Option<&FaultInterceptor> {
        self.interceptor.get()
    }
}

static INTERCEPTOR: GlobalInterceptor = GlobalInterceptor::new();
