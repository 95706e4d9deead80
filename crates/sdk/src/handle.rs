//! The stable client handle and its locking discipline.
//!
//! [`ClientHandle`] is the one object the host application keeps across
//! cluster switches. It owns the reference to the *current* underlying
//! client behind a pointer lock that is held only for reference load/store —
//! never across network I/O — so a slow switch can never stall traffic and a
//! slow call can never stall a switch.
//!
//! In-flight calls hold their own `Arc` to whichever client was current when
//! they started; a swap retires the old client without revoking it, and the
//! old instance is dropped once the last in-flight call finishes.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::Notify;

use crate::error::{NotReadySnafu, Result, ShutdownSnafu, TimeoutSnafu};

/// A stable, swappable handle to the current underlying client.
///
/// Created once, usually empty, and populated by the first successful
/// discovery switch. All methods are safe to call from any thread.
#[derive(Debug)]
pub struct ClientHandle<C> {
    /// Pointer lock. Guards only the reference; network calls run outside it.
    current: RwLock<Option<Arc<C>>>,
    ready: Notify,
    is_ready: AtomicBool,
    closed: AtomicBool,
}

impl<C> Default for ClientHandle<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> ClientHandle<C> {
    /// Creates an empty handle; [`current`](Self::current) fails with
    /// `NotReady` until the first [`swap`](Self::swap).
    #[must_use]
    pub fn new() -> Self {
        Self {
            current: RwLock::new(None),
            ready: Notify::new(),
            is_ready: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Creates a handle with an initial client installed.
    #[must_use]
    pub fn with_client(client: C) -> Self {
        Self {
            current: RwLock::new(Some(Arc::new(client))),
            ready: Notify::new(),
            is_ready: AtomicBool::new(true),
            closed: AtomicBool::new(false),
        }
    }

    /// Returns the current client.
    ///
    /// The reference is loaded under the pointer lock; the caller then
    /// operates on its own `Arc`, outside any lock.
    ///
    /// # Errors
    ///
    /// `Shutdown` after [`close`](Self::close); `NotReady` before the first
    /// swap.
    pub fn current(&self) -> Result<Arc<C>> {
        if self.closed.load(Ordering::Acquire) {
            return ShutdownSnafu.fail();
        }
        match self.current.read().as_ref() {
            Some(client) => Ok(Arc::clone(client)),
            None => NotReadySnafu.fail(),
        }
    }

    /// Returns the current client without readiness errors.
    #[must_use]
    pub fn try_current(&self) -> Option<Arc<C>> {
        self.current.read().clone()
    }

    /// Forwards an operation to the current client.
    ///
    /// The client reference is read under the pointer lock; the operation
    /// itself runs outside it, so swaps are never blocked by slow calls. A
    /// call that races with a swap completes against the client that was
    /// current when it started.
    ///
    /// # Errors
    ///
    /// `Shutdown`/`NotReady` from the reference load; otherwise whatever the
    /// operation returns, unchanged.
    pub async fn call<Op, Fut, T>(&self, op: Op) -> Result<T>
    where
        Op: FnOnce(Arc<C>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let client = self.current()?;
        op(client).await
    }

    /// Installs `new_client` as current, returning the displaced client.
    ///
    /// Holds the pointer lock only for the reference store. Once this
    /// returns, every subsequent [`current`](Self::current) observes the new
    /// client. The caller decides whether and when to close the returned old
    /// client; in-flight calls against it complete undisturbed.
    ///
    /// Swapping into a closed handle is a no-op that hands the new client
    /// straight back as "displaced".
    pub fn swap(&self, new_client: Arc<C>) -> Option<Arc<C>> {
        if self.closed.load(Ordering::Acquire) {
            return Some(new_client);
        }
        let previous = {
            let mut guard = self.current.write();
            guard.replace(new_client)
        };
        self.is_ready.store(true, Ordering::Release);
        self.ready.notify_waiters();
        previous
    }

    /// Returns whether a client has been installed.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.is_ready.load(Ordering::Acquire)
    }

    /// Returns whether the handle has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Waits until the first client is installed.
    ///
    /// # Errors
    ///
    /// `Timeout` if no client is installed within `timeout`; `Shutdown` if
    /// the handle is closed while waiting.
    pub async fn wait_until_ready(&self, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.closed.load(Ordering::Acquire) {
                return ShutdownSnafu.fail();
            }
            if self.is_ready() {
                return Ok(());
            }

            let notified = self.ready.notified();
            tokio::pin!(notified);
            // Register interest before the re-check so a swap between the
            // check and the await cannot be missed.
            notified.as_mut().enable();
            if self.is_ready() || self.closed.load(Ordering::Acquire) {
                continue;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return TimeoutSnafu { duration_ms: timeout.as_millis() as u64 }.fail();
            }
        }
    }

    /// Closes the handle, returning the client that was current.
    ///
    /// Subsequent [`current`](Self::current) calls fail with `Shutdown`;
    /// waiters on [`wait_until_ready`](Self::wait_until_ready) are woken.
    pub fn close(&self) -> Option<Arc<C>> {
        self.closed.store(true, Ordering::Release);
        let previous = self.current.write().take();
        self.ready.notify_waiters();
        previous
    }
}
