//! Runtime event dispatch
//!
//! The driver and runtime surface asynchronous anomalies (recovery actions,
//! timeouts, throttling, memory pressure) as events rather than as failures
//! of the call that happened to be in flight. One dispatcher instance serves
//! the whole process; components that want testable event flow take an
//! `Arc<RuntimeEventDispatcher>` instead of reaching for [`global`].
//!
//! At most one handler is registered at a time; registering a new one
//! replaces the old. Events below the configured minimum level are dropped
//! before they reach the handler. The handler reference is cloned under a
//! short-held lock and invoked outside it, so a slow handler never blocks
//! dispatching threads on the lock itself.
//!
//! [`global`]: RuntimeEventDispatcher::global

use std::sync::{Arc, Mutex, OnceLock};
use std::time::SystemTime;

/// Event severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u32)]
pub enum EventLevel {
    /// Informational messages for normal operation
    Info = 1,
    /// Potential issues that do not stop execution
    Warning = 2,
    /// Recoverable failures
    Error = 3,
    /// Errors that may leave the device unstable
    Critical = 4,
}

/// Event source category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum EventKind {
    /// NPU core operation events
    DeviceCore = 1000,
    /// Device status change events
    DeviceStatus = 1001,
    /// Input/output operation events
    DeviceIo = 1002,
    /// Memory management events
    DeviceMemory = 1003,
    /// Unclassified
    Unknown = 1004,
}

/// Specific event code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum EventCode {
    /// Input data write operation
    WriteInput = 2000,
    /// Output data read operation
    ReadOutput = 2001,
    /// Memory capacity exceeded
    MemoryOverflow = 2002,
    /// Memory allocation failure
    MemoryAllocation = 2003,
    /// General device notification
    DeviceEvent = 2004,
    /// Device recovery action taken
    RecoveryOccurred = 2005,
    /// Operation timeout
    TimeoutOccurred = 2006,
    /// Device throttling notification
    ThrottlingNotice = 2007,
    /// Device throttling emergency
    ThrottlingEmergency = 2008,
    /// Unclassified
    Unknown = 2009,
}

/// One dispatched runtime event
#[derive(Debug, Clone)]
pub struct RuntimeEvent {
    /// Severity
    pub level: EventLevel,
    /// Source category
    pub kind: EventKind,
    /// Specific code
    pub code: EventCode,
    /// Human-readable detail
    pub message: String,
    /// Wall-clock time of dispatch
    pub timestamp: SystemTime,
}

/// Registered handler callback
pub type EventHandler = Arc<dyn Fn(&RuntimeEvent) + Send + Sync>;

/// Process-wide runtime event dispatcher
pub struct RuntimeEventDispatcher {
    handler: Mutex<Option<EventHandler>>,
    min_level: Mutex<EventLevel>,
}

impl Default for RuntimeEventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeEventDispatcher {
    /// Create a dispatcher with the minimum level set to `Info`
    pub fn new() -> Self {
        Self {
            handler: Mutex::new(None),
            min_level: Mutex::new(EventLevel::Info),
        }
    }

    /// The process-wide dispatcher, created on first use.
    ///
    /// Lives for the rest of the process; there is no teardown.
    pub fn global() -> &'static Arc<Self> {
        static INSTANCE: OnceLock<Arc<RuntimeEventDispatcher>> = OnceLock::new();
        INSTANCE.get_or_init(|| Arc::new(Self::new()))
    }

    /// Register a handler, replacing any previous registration
    pub fn register_handler(&self, handler: impl Fn(&RuntimeEvent) + Send + Sync + 'static) {
        let mut slot = self.handler.lock().expect("event handler lock poisoned");
        if slot.is_some() {
            tracing::debug!("Replacing registered event handler");
        }
        *slot = Some(Arc::new(handler));
    }

    /// Remove the registered handler, if any
    pub fn clear_handler(&self) {
        *self.handler.lock().expect("event handler lock poisoned") = None;
    }

    /// Set the minimum level an event must have to reach the handler
    pub fn set_min_level(&self, level: EventLevel) {
        *self.min_level.lock().expect("event level lock poisoned") = level;
    }

    /// Current minimum level
    pub fn min_level(&self) -> EventLevel {
        *self.min_level.lock().expect("event level lock poisoned")
    }

    /// Dispatch an event.
    ///
    /// Events below the minimum level are suppressed. The event is logged,
    /// then handed to the registered handler (if any) on the calling
    /// thread.
    pub fn dispatch(
        &self,
        level: EventLevel,
        kind: EventKind,
        code: EventCode,
        message: impl Into<String>,
    ) {
        if level < self.min_level() {
            return;
        }

        let event = RuntimeEvent {
            level,
            kind,
            code,
            message: message.into(),
            timestamp: SystemTime::now(),
        };

        match level {
            EventLevel::Info => tracing::info!("[{kind:?}/{code:?}] {}", event.message),
            EventLevel::Warning => tracing::warn!("[{kind:?}/{code:?}] {}", event.message),
            EventLevel::Error | EventLevel::Critical => {
                tracing::error!("[{kind:?}/{code:?}] {}", event.message);
            }
        }

        // Clone the handler under a short-held lock, invoke outside it.
        let handler = self
            .handler
            .lock()
            .expect("event handler lock poisoned")
            .clone();
        if let Some(handler) = handler {
            handler(&event);
        }
    }
}

impl std::fmt::Debug for RuntimeEventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeEventDispatcher")
            .field("min_level", &self.min_level())
            .finish_non_exhaustive()
    }
}
