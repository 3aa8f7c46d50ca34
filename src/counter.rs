//! Counting slot primitive shared by blocking threads and async tasks
//!
//! A [`SlotCounter`] is a semaphore without permit guards: `acquire` takes one
//! slot, `release` puts one back. Blocking callers park on a condition
//! variable, async callers suspend on a [`Notify`]; every release wakes one
//! waiter of each kind, so neither side ever polls.

use parking_lot::{Condvar, Mutex};
use std::future::Future;
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Wake, Waker};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Why a wait on a [`SlotCounter`] gave up without taking a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitError {
    Timeout,
    Cancelled,
}

struct State {
    slots: Mutex<usize>,
    condvar: Condvar,
    notify: Notify,
}

/// Wakes blocked threads when a cancellation token fires.
///
/// The flag is set before the lock is taken, which closes the gap between a
/// waiter checking it and parking on the condvar.
struct CancelWaker {
    state: Arc<State>,
    fired: AtomicBool,
}

impl Wake for CancelWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.fired.store(true, Ordering::Release);
        let _slots = self.state.slots.lock();
        self.state.condvar.notify_all();
    }
}

pub(crate) struct SlotCounter {
    state: Arc<State>,
}

impl SlotCounter {
    pub fn new(slots: usize) -> Self {
        Self {
            state: Arc::new(State {
                slots: Mutex::new(slots),
                condvar: Condvar::new(),
                notify: Notify::new(),
            }),
        }
    }

    /// Number of slots that could be taken right now.
    pub fn available(&self) -> usize {
        *self.state.slots.lock()
    }

    /// Take a slot if one is free, never waiting.
    pub fn try_acquire(&self) -> bool {
        let mut slots = self.state.slots.lock();
        if *slots == 0 {
            return false;
        }
        *slots -= 1;
        true
    }

    /// Give a slot back and wake one blocked thread and one suspended task.
    pub fn release(&self) {
        *self.state.slots.lock() += 1;
        self.wake_one();
    }

    /// Block the current thread until a slot is taken, the timeout elapses or
    /// the token is cancelled.
    ///
    /// `None` waits forever, `Some(Duration::ZERO)` checks exactly once.
    /// A failed wait leaves the slot count untouched.
    pub fn acquire_blocking(
        &self,
        timeout: Option<Duration>,
        cancel: Option<&CancellationToken>,
    ) -> Result<(), WaitError> {
        // An overflowing deadline is as good as no deadline.
        let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));
        let waker = Arc::new(CancelWaker {
            state: Arc::clone(&self.state),
            fired: AtomicBool::new(false),
        });

        // Registered once, before locking: the token must never be polled
        // while the slot lock is held, as cancelling wakes us under its own lock.
        let mut cancelled = pin!(cancel.map(CancellationToken::cancelled));
        if let Some(cancelled) = cancelled.as_mut().as_pin_mut() {
            let task_waker = Waker::from(Arc::clone(&waker));
            if cancelled.poll(&mut Context::from_waker(&task_waker)).is_ready() {
                return Err(WaitError::Cancelled);
            }
        }

        let mut slots = self.state.slots.lock();
        loop {
            if waker.fired.load(Ordering::Acquire) {
                return Err(WaitError::Cancelled);
            }

            if *slots > 0 {
                *slots -= 1;
                let more = *slots > 0;
                drop(slots);
                if more {
                    // We may have swallowed a wakeup meant for someone else.
                    self.wake_one();
                }
                return Ok(());
            }

            match deadline {
                None => self.state.condvar.wait(&mut slots),
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        return Err(WaitError::Timeout);
                    }
                    let _ = self.state.condvar.wait_until(&mut slots, deadline);
                }
            }
        }
    }

    /// Suspend the current task until a slot is taken, the timeout elapses or
    /// the token is cancelled.
    ///
    /// Cancel safe: a slot is only ever taken inside the poll that completes
    /// the future, so dropping it mid-wait never leaks a slot.
    pub async fn acquire(
        &self,
        timeout: Option<Duration>,
        cancel: Option<&CancellationToken>,
    ) -> Result<(), WaitError> {
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(WaitError::Cancelled);
        }
        if self.try_acquire() {
            return Ok(());
        }

        let wait = async {
            match timeout {
                None => {
                    self.acquire_forever().await;
                    Ok(())
                }
                Some(timeout) if timeout.is_zero() => Err(WaitError::Timeout),
                Some(timeout) => tokio::time::timeout(timeout, self.acquire_forever())
                    .await
                    .map_err(|_| WaitError::Timeout),
            }
        };

        match cancel {
            None => wait.await,
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(WaitError::Cancelled),
                result = wait => result,
            },
        }
    }

    async fn acquire_forever(&self) {
        loop {
            let mut notified = pin!(self.state.notify.notified());
            notified.as_mut().enable();

            {
                let mut slots = self.state.slots.lock();
                if *slots > 0 {
                    *slots -= 1;
                    let more = *slots > 0;
                    drop(slots);
                    if more {
                        self.wake_one();
                    }
                    return;
                }
            }

            notified.await;
        }
    }

    fn wake_one(&self) {
        self.state.condvar.notify_one();
        self.state.notify.notify_one();
    }
}
