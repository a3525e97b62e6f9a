//! Trailing-edge debounce with explicit cancel
//!
//! ```text
//!            call              timer elapses
//!   Idle ───────────▶ Pending ───────────────▶ Fired
//!    ▲                 │  ▲ │                    │
//!    └──── cancel ─────┘  └─┘ call (re-arm)      │
//!                                                │
//!   Fired ───── call ──▶ Pending  (cancel is a no-op once fired)
//! ```
//!
//! A zero timeout skips `Pending` and delivers inside `call`. Either way a
//! panicking delivery is caught and logged like a returned error.

use std::any::Any;
use std::mem;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{error, trace};

/// Receives debounced payloads; failures and panics are logged, not propagated
pub type Delivery<T> = Arc<dyn Fn(T) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Observable state of a [`Debouncer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Pending,
    Fired,
}

enum Slot<T> {
    Idle,
    Pending {
        deadline: Instant,
        payload: T,
        timer: JoinHandle<()>,
    },
    Fired,
}

struct Shared<T> {
    slot: Slot<T>,
    /// Bumped on every arm and cancel; a timer only fires for its own generation
    generation: u64,
}

pub struct Debouncer<T> {
    timeout: Duration,
    shared: Arc<Mutex<Shared<T>>>,
    deliver: Delivery<T>,
}

impl<T: Send + 'static> Debouncer<T> {
    pub fn new(timeout: Duration, deliver: Delivery<T>) -> Self {
        Self {
            timeout,
            shared: Arc::new(Mutex::new(Shared {
                slot: Slot::Idle,
                generation: 0,
            })),
            deliver,
        }
    }

    /// Deliver `payload` once the timeout passes without another call
    ///
    /// A later call replaces the payload and restarts the window.
    pub async fn call(&self, payload: T) {
        if self.timeout.is_zero() {
            lock(&self.shared).slot = Slot::Fired;
            run(&self.deliver, payload).await;
            return;
        }

        let mut shared = lock(&self.shared);
        shared.generation += 1;
        let generation = shared.generation;
        let deadline = Instant::now() + self.timeout;

        let timer = tokio::spawn(fire_at(
            self.shared.clone(),
            self.deliver.clone(),
            generation,
            deadline,
        ));

        let previous = mem::replace(
            &mut shared.slot,
            Slot::Pending {
                deadline,
                payload,
                timer,
            },
        );
        if let Slot::Pending { timer, .. } = previous {
            trace!("Re-arming debounce window");
            timer.abort();
        }
    }
}

impl<T> Debouncer<T> {
    /// Drop a pending delivery; returns whether one was pending
    pub fn cancel(&self) -> bool {
        let mut shared = lock(&self.shared);
        if !matches!(shared.slot, Slot::Pending { .. }) {
            return false;
        }
        shared.generation += 1;
        if let Slot::Pending { timer, .. } = mem::replace(&mut shared.slot, Slot::Idle) {
            timer.abort();
        }
        trace!("Cancelled pending debounced call");
        true
    }

    pub fn phase(&self) -> Phase {
        match lock(&self.shared).slot {
            Slot::Idle => Phase::Idle,
            Slot::Pending { .. } => Phase::Pending,
            Slot::Fired => Phase::Fired,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.phase() == Phase::Pending
    }

    /// When the pending delivery is due
    pub fn deadline(&self) -> Option<Instant> {
        match lock(&self.shared).slot {
            Slot::Pending { deadline, .. } => Some(deadline),
            _ => None,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn fire_at<T>(
    shared: Arc<Mutex<Shared<T>>>,
    deliver: Delivery<T>,
    generation: u64,
    deadline: Instant,
) {
    sleep_until(deadline).await;

    let payload = {
        let mut shared = lock(&shared);
        if shared.generation != generation || !matches!(shared.slot, Slot::Pending { .. }) {
            return;
        }
        match mem::replace(&mut shared.slot, Slot::Fired) {
            Slot::Pending { payload, .. } => payload,
            _ => return,
        }
    };

    run(&deliver, payload).await;
}

async fn run<T>(deliver: &Delivery<T>, payload: T) {
    let outcome = AssertUnwindSafe(async { deliver(payload).await })
        .catch_unwind()
        .await;
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "Trigger callback failed"),
        Err(panic) => error!(panic = panic_message(&*panic), "Trigger callback panicked"),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// The slot holds no invariants a panicking holder could break halfway
fn lock<T>(shared: &Mutex<Shared<T>>) -> MutexGuard<'_, Shared<T>> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
