//! Commit window scheduling
//!
//! Decides whether a successful operation commits now or rides along in the
//! open window. With a zero interval every operation commits. Otherwise the
//! first operation of a window records `window_start` and arms a deadline
//! timer; later operations commit only once the window has run its length.
//!
//! Each window owns its timer. Closing the window by any path aborts the
//! timer, and deadline messages carry the window id so one that was already
//! queued when its window closed is recognized as stale.

use chainstate_core::PhysicalTimeEffects;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Identifier of one commit window.
pub type WindowId = u64;

/// Deadline task for one window.
#[derive(Debug)]
struct DeadlineTimer {
    window: WindowId,
    fired: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl DeadlineTimer {
    fn arm(
        window: WindowId,
        interval_ms: u64,
        time: Arc<dyn PhysicalTimeEffects>,
        deadlines: mpsc::UnboundedSender<WindowId>,
    ) -> Self {
        let fired = Arc::new(AtomicBool::new(false));
        let task_fired = Arc::clone(&fired);
        let handle = tokio::spawn(async move {
            time.sleep_ms(interval_ms).await;
            task_fired.store(true, Ordering::Release);
            // Pipeline gone means nothing left to commit.
            let _ = deadlines.send(window);
        });
        Self {
            window,
            fired,
            handle,
        }
    }

    fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}

impl Drop for DeadlineTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Batching window state.
#[derive(Debug, Default)]
struct CommitWindow {
    /// Window length; `0` disables batching
    interval_ms: u64,
    /// When the open window started, if one is open
    window_start: Option<u64>,
    deadline: Option<DeadlineTimer>,
}

/// Time-window commit policy.
pub struct CommitScheduler {
    window: CommitWindow,
    next_window: WindowId,
    time: Arc<dyn PhysicalTimeEffects>,
    deadlines: mpsc::UnboundedSender<WindowId>,
}

impl CommitScheduler {
    /// Create a scheduler that reports deadlines on `deadlines`.
    pub fn new(
        interval_ms: u64,
        time: Arc<dyn PhysicalTimeEffects>,
        deadlines: mpsc::UnboundedSender<WindowId>,
    ) -> Self {
        Self {
            window: CommitWindow {
                interval_ms,
                ..CommitWindow::default()
            },
            next_window: 0,
            time,
            deadlines,
        }
    }

    /// Configured window length.
    pub fn interval_ms(&self) -> u64 {
        self.window.interval_ms
    }

    /// Whether batching is disabled.
    pub fn is_immediate(&self) -> bool {
        self.window.interval_ms == 0
    }

    /// Whether a window is open.
    pub fn is_open(&self) -> bool {
        self.window.window_start.is_some()
    }

    /// Open a window starting now and arm its deadline.
    ///
    /// No-op when batching is disabled or a window is already open.
    pub fn open_window(&mut self) -> Option<WindowId> {
        if self.is_immediate() || self.is_open() {
            return None;
        }

        let window = self.next_window;
        self.next_window += 1;
        let now = self.time.now_ms();
        self.window.window_start = Some(now);
        self.window.deadline = Some(DeadlineTimer::arm(
            window,
            self.window.interval_ms,
            Arc::clone(&self.time),
            self.deadlines.clone(),
        ));

        tracing::trace!(window, start_ms = now, interval_ms = self.window.interval_ms, "Opened commit window");
        Some(window)
    }

    /// Whether the operation that just completed must commit itself.
    ///
    /// True with batching disabled, with no window open, once the window has
    /// run its length, or once its deadline fired while the operation was
    /// still running.
    pub fn commit_due(&self) -> bool {
        let Some(start) = self.window.window_start else {
            return true;
        };
        if self.is_immediate() {
            return true;
        }
        if self
            .window
            .deadline
            .as_ref()
            .is_some_and(DeadlineTimer::has_fired)
        {
            return true;
        }
        self.time.now_ms().saturating_sub(start) >= self.window.interval_ms
    }

    /// Whether a deadline for `window` still refers to the open window.
    pub fn is_current(&self, window: WindowId) -> bool {
        self.window
            .deadline
            .as_ref()
            .is_some_and(|deadline| deadline.window == window)
    }

    /// Close the open window and disarm its timer.
    pub fn close_window(&mut self) {
        if let Some(deadline) = self.window.deadline.take() {
            tracing::trace!(window = deadline.window, "Closed commit window");
        }
        self.window.window_start = None;
    }
}

impl std::fmt::Debug for CommitScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitScheduler")
            .field("window", &self.window)
            .field("next_window", &self.next_window)
            .finish()
    }
}
