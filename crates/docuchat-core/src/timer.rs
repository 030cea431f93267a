//! Cancellable fixed-cadence ticker.
//!
//! Both the answer reveal and simulated upload progress are driven by a
//! callback invoked at a fixed period until it asks to stop or its handle is
//! stopped. The handle is the only way to cancel; dropping it cancels too.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// What a tick callback wants to happen next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickControl {
    Continue,
    Stop,
}

/// Handle to a running ticker.
#[derive(Debug)]
pub struct TickerHandle {
    stopped: Arc<AtomicBool>,
    /// Held for the whole of each callback invocation.
    gate: Arc<Mutex<()>>,
    task: JoinHandle<()>,
}

impl TickerHandle {
    /// Stop the ticker. No callback runs after this returns.
    ///
    /// A callback already running on another worker is waited for. Called
    /// from inside the ticker's own callback, it returns without waiting.
    ///
    /// Returns `true` only for the call that actually stopped it; later calls,
    /// or calls after the callback stopped itself, return `false`.
    pub fn stop(&self) -> bool {
        let own_task = tokio::task::try_id() == Some(self.task.id());
        let _gate = if own_task {
            None
        } else {
            Some(self.gate.lock().unwrap_or_else(|e| e.into_inner()))
        };
        let first = !self.stopped.swap(true, Ordering::AcqRel);
        if first {
            self.task.abort();
        }
        first
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Whether the underlying task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for TickerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Spawn a ticker on the current tokio runtime.
///
/// `on_tick` receives the 1-based tick number. The first tick fires one
/// `period` after spawning. Must be called from within a runtime.
pub fn spawn_ticker<F>(period: Duration, mut on_tick: F) -> TickerHandle
where
    F: FnMut(u64) -> TickControl + Send + 'static,
{
    let stopped = Arc::new(AtomicBool::new(false));
    let gate = Arc::new(Mutex::new(()));
    let flag = Arc::clone(&stopped);
    let task_gate = Arc::clone(&gate);

    let task = tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut tick = 0u64;
        loop {
            interval.tick().await;
            let finished = {
                let _gate = task_gate.lock().unwrap_or_else(|e| e.into_inner());
                if flag.load(Ordering::Acquire) {
                    break;
                }
                tick += 1;
                let finished = on_tick(tick) == TickControl::Stop;
                if finished {
                    flag.store(true, Ordering::Release);
                }
                finished
            };
            if finished {
                tracing::trace!(tick, "Ticker stopped by callback");
                break;
            }
        }
    });

    TickerHandle { stopped, gate, task }
}
