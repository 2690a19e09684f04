//! Cancellable countdown timers
//!
//! A [`Timer`] counts down a whole number of time-units and reports every
//! tick plus a final [`TimerEvent::Expired`] through a callback. Each run is
//! tagged with an epoch; [`Timer::cancel`] and [`Timer::start`] bump the
//! epoch, so a run that has been superseded stops at its next tick and any
//! signal it already delivered is rejected by [`Timer::accept`].

use crate::rt::{self, Duration};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// Which countdown a signal belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Search countdown; expiry aborts the search
    Countdown,
    /// Post-pairing countdown; expiry registers automatically
    AutoPlay,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimerEvent {
    /// `remaining` whole units left; `progress` is `remaining / total`
    Tick { remaining: u32, progress: f32 },
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimerSignal {
    pub kind: TimerKind,
    pub epoch: u64,
    pub event: TimerEvent,
}

pub struct Timer {
    kind: TimerKind,
    tick: Duration,
    epoch: Arc<AtomicU64>,
    active: Option<u64>,
}

impl Timer {
    pub fn new(kind: TimerKind, tick: Duration) -> Self {
        Self {
            kind,
            tick,
            epoch: Arc::new(AtomicU64::new(0)),
            active: None,
        }
    }

    pub fn kind(&self) -> TimerKind {
        self.kind
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// Start counting down `units` ticks, replacing any previous run.
    ///
    /// Returns the epoch of the new run.
    pub fn start<F>(&mut self, units: u32, on_signal: F) -> u64
    where
        F: Fn(TimerSignal) + Send + Sync + 'static,
    {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.active = Some(epoch);

        let kind = self.kind;
        let tick = self.tick;
        let current = self.epoch.clone();

        rt::spawn("timer", async move {
            let emit = |event| on_signal(TimerSignal { kind, epoch, event });

            for elapsed in 1..=units {
                rt::sleep(tick).await;
                if current.load(Ordering::SeqCst) != epoch {
                    trace!(?kind, epoch, "timer superseded");
                    return;
                }

                let remaining = units - elapsed;
                if remaining > 0 {
                    emit(TimerEvent::Tick {
                        remaining,
                        progress: remaining as f32 / units as f32,
                    });
                }
            }

            if current.load(Ordering::SeqCst) == epoch {
                emit(TimerEvent::Expired);
            }
        });

        epoch
    }

    /// Stop the current run. Safe to call repeatedly or when idle.
    pub fn cancel(&mut self) {
        if self.active.take().is_some() {
            self.epoch.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Whether `signal` comes from the live run. An accepted expiry ends the run.
    pub fn accept(&mut self, signal: &TimerSignal) -> bool {
        if signal.kind != self.kind || self.active != Some(signal.epoch) {
            return false;
        }
        if signal.event == TimerEvent::Expired {
            self.active = None;
        }
        true
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn harness(
        kind: TimerKind,
    ) -> (
        Timer,
        mpsc::UnboundedReceiver<TimerSignal>,
        impl Fn(TimerSignal) + Send + Sync + Clone + 'static,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = move |signal| {
            let _ = tx.send(signal);
        };
        (Timer::new(kind, Duration::from_secs(1)), rx, sink)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<TimerSignal>) -> Vec<TimerSignal> {
        let mut out = Vec::new();
        while let Ok(signal) = rx.try_recv() {
            out.push(signal);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn test_expires_exactly_once_after_all_units() {
        let (mut timer, mut rx, sink) = harness(TimerKind::AutoPlay);
        timer.start(5, sink);

        tokio::time::sleep(Duration::from_millis(4500)).await;
        let early = drain(&mut rx);
        assert_eq!(early.len(), 4);
        assert!(early.iter().all(|s| matches!(s.event, TimerEvent::Tick { .. })));

        tokio::time::sleep(Duration::from_secs(30)).await;
        let late = drain(&mut rx);
        assert_eq!(late.len(), 1);
        assert_eq!(late[0].event, TimerEvent::Expired);
        assert!(timer.accept(&late[0]));
        assert!(!timer.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_count_down_with_decreasing_progress() {
        let (mut timer, mut rx, sink) = harness(TimerKind::Countdown);
        timer.start(4, sink);
        tokio::time::sleep(Duration::from_secs(10)).await;

        let ticks: Vec<(u32, f32)> = drain(&mut rx)
            .into_iter()
            .filter_map(|s| match s.event {
                TimerEvent::Tick { remaining, progress } => Some((remaining, progress)),
                TimerEvent::Expired => None,
            })
            .collect();

        assert_eq!(ticks.iter().map(|t| t.0).collect::<Vec<_>>(), vec![3, 2, 1]);
        assert!(ticks.windows(2).all(|w| w[0].1 > w[1].1));
        assert!(ticks.iter().all(|t| (0.0..=1.0).contains(&t.1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_expiry_never_fires() {
        for units in [1, 2, 5, 20] {
            let (mut timer, mut rx, sink) = harness(TimerKind::Countdown);
            timer.start(units, sink);

            tokio::time::sleep(Duration::from_millis(u64::from(units) * 1000 - 500)).await;
            timer.cancel();
            timer.cancel();
            tokio::time::sleep(Duration::from_secs(60)).await;

            assert!(
                drain(&mut rx).iter().all(|s| s.event != TimerEvent::Expired),
                "expired after cancel for {units} units"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_supersedes_previous_run() {
        let (mut timer, mut rx, sink) = harness(TimerKind::Countdown);
        let first = timer.start(3, sink.clone());
        tokio::time::sleep(Duration::from_millis(1500)).await;
        let second = timer.start(3, sink);
        assert_ne!(first, second);

        tokio::time::sleep(Duration::from_secs(10)).await;
        let signals = drain(&mut rx);

        let expiries: Vec<_> = signals.iter().filter(|s| s.event == TimerEvent::Expired).collect();
        assert_eq!(expiries.len(), 1);
        assert_eq!(expiries[0].epoch, second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_signal_rejected_after_cancel() {
        let (mut timer, mut rx, sink) = harness(TimerKind::AutoPlay);
        timer.start(1, sink);
        tokio::time::sleep(Duration::from_secs(2)).await;

        // Expiry is already queued when the cancel arrives.
        timer.cancel();
        let signals = drain(&mut rx);
        assert_eq!(signals.len(), 1);
        assert!(!timer.accept(&signals[0]));
    }
}
