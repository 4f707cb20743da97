//! Shutdown signal handling with a deferrable critical section.
//!
//! Signals are read by a listener task and handed to the process's single
//! [`CriticalSectionGuard`]. Outside a critical section a signal cancels the
//! shared shutdown token straight away. Inside one it is only recorded, and
//! replayed the moment the section is released.

use async_trait::async_trait;
use snafu::prelude::*;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::emit;
use crate::metrics::events::SignalDeferred;

/// Signals that ask the worker to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

impl ShutdownSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShutdownSignal::Interrupt => "SIGINT",
            ShutdownSignal::Terminate => "SIGTERM",
        }
    }
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A signal recorded while the guard was armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceivedSignal {
    pub signal: ShutdownSignal,
    pub received_at: Instant,
}

/// Returned by [`CriticalSection::release`] when a signal was deferred.
#[derive(Debug, Snafu)]
#[snafu(display("{} received during critical section", received.signal))]
pub struct Interrupted {
    pub received: ReceivedSignal,
}

/// What the guard did with a delivered signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Shutdown was started.
    Honored,
    /// Recorded for replay when the critical section ends.
    Deferred,
}

/// Source of shutdown signals.
#[async_trait]
pub trait SignalSource: Send {
    /// Next signal, or `None` when the source is closed.
    async fn recv(&mut self) -> Option<ShutdownSignal>;
}

/// SIGINT and SIGTERM from the operating system.
#[cfg(unix)]
pub struct UnixSignals {
    sigint: tokio::signal::unix::Signal,
    sigterm: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl UnixSignals {
    /// Take over SIGINT and SIGTERM for the rest of the process.
    pub fn install() -> std::io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        Ok(Self {
            sigint: signal(SignalKind::interrupt())?,
            sigterm: signal(SignalKind::terminate())?,
        })
    }
}

#[cfg(unix)]
#[async_trait]
impl SignalSource for UnixSignals {
    async fn recv(&mut self) -> Option<ShutdownSignal> {
        tokio::select! {
            received = self.sigint.recv() => received.map(|()| ShutdownSignal::Interrupt),
            received = self.sigterm.recv() => received.map(|()| ShutdownSignal::Terminate),
        }
    }
}

/// Channel-fed source, for driving the guard without real signals.
#[async_trait]
impl SignalSource for mpsc::Receiver<ShutdownSignal> {
    async fn recv(&mut self) -> Option<ShutdownSignal> {
        mpsc::Receiver::recv(self).await
    }
}

#[derive(Debug, Default)]
struct GuardState {
    armed: bool,
    deferred: Option<ReceivedSignal>,
}

/// The process-wide switch between honoring and deferring shutdown signals.
///
/// Starts disarmed. Only one critical section may be open at a time.
#[derive(Debug)]
pub struct CriticalSectionGuard {
    state: Mutex<GuardState>,
    shutdown: CancellationToken,
}

impl CriticalSectionGuard {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            state: Mutex::new(GuardState::default()),
            shutdown,
        }
    }

    /// Token cancelled once a signal is honored.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    pub fn is_armed(&self) -> bool {
        self.lock().armed
    }

    /// The signal waiting for the current critical section to end, if any.
    pub fn deferred(&self) -> Option<ReceivedSignal> {
        self.lock().deferred
    }

    /// Open a critical section.
    ///
    /// Returns `None` if shutdown has already been requested, in which case
    /// nothing should be started.
    pub fn arm(&self) -> Option<CriticalSection<'_>> {
        let mut state = self.lock();
        if self.shutdown.is_cancelled() {
            return None;
        }
        if state.armed {
            error!("Critical section armed twice");
            debug_assert!(!state.armed, "critical section armed twice");
        }
        state.armed = true;
        Some(CriticalSection {
            guard: self,
            released: false,
        })
    }

    /// Hand a signal to the guard.
    pub fn deliver(&self, signal: ShutdownSignal) -> Delivery {
        let mut state = self.lock();
        if !state.armed {
            if self.shutdown.is_cancelled() {
                info!(signal = signal.as_str(), "Shutdown already in progress");
            } else {
                info!(message = "Signal received.", signal = signal.as_str());
            }
            // Cancelled under the lock so `arm` never races a honored signal.
            self.shutdown.cancel();
            return Delivery::Honored;
        }

        match state.deferred {
            Some(pending) => {
                info!(
                    signal = signal.as_str(),
                    pending = pending.signal.as_str(),
                    "Signal received during critical section, shutdown already deferred"
                );
            }
            None => {
                warn!(
                    signal = signal.as_str(),
                    "Signal received during critical section, deferring until it completes"
                );
                state.deferred = Some(ReceivedSignal {
                    signal,
                    received_at: Instant::now(),
                });
                emit!(SignalDeferred {
                    signal: signal.as_str()
                });
            }
        }
        Delivery::Deferred
    }

    fn disarm(&self) -> Result<(), Interrupted> {
        let mut state = self.lock();
        state.armed = false;
        match state.deferred.take() {
            Some(received) => {
                info!(
                    signal = received.signal.as_str(),
                    deferred_ms = received.received_at.elapsed().as_millis(),
                    "Critical section complete, replaying deferred signal"
                );
                self.shutdown.cancel();
                InterruptedSnafu { received }.fail()
            }
            None => Ok(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GuardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// An open critical section. Signals are deferred until it is released or
/// dropped.
#[must_use = "dropping a critical section ends it immediately"]
pub struct CriticalSection<'a> {
    guard: &'a CriticalSectionGuard,
    released: bool,
}

impl CriticalSection<'_> {
    /// Close the section, replaying a deferred signal as `Err(Interrupted)`.
    ///
    /// The shutdown token is already cancelled when this returns an error.
    pub fn release(mut self) -> Result<(), Interrupted> {
        self.released = true;
        self.guard.disarm()
    }
}

impl Drop for CriticalSection<'_> {
    fn drop(&mut self) {
        if !self.released {
            // A deferred signal still cancels the shutdown token.
            let _ = self.guard.disarm();
        }
    }
}

/// Forward every signal from `source` to `guard` until the source closes.
pub fn spawn_signal_listener<S>(mut source: S, guard: Arc<CriticalSectionGuard>) -> JoinHandle<()>
where
    S: SignalSource + 'static,
{
    tokio::spawn(async move {
        while let Some(signal) = source.recv().await {
            guard.deliver(signal);
        }
    })
}
