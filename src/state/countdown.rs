//! Live countdown derived from a server-supplied absolute deadline.
//!
//! The server sends one absolute `phase_end_time` per timed phase; every
//! client recomputes the remaining seconds on a local 1 Hz tick instead of
//! being fed a message per second. Only a fresh deadline from the server ever
//! extends the countdown.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

const LOG_TARGET: &str = "state::countdown";

/// Remaining whole seconds until `deadline` as seen at `now`, rounded to the
/// nearest second and floored at zero.
pub fn remaining_secs(deadline: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let millis = deadline.signed_duration_since(now).num_milliseconds();
    if millis <= 0 {
        0
    } else {
        ((millis as f64) / 1000.0).round() as u64
    }
}

/// A cancellable 1 Hz tick task publishing remaining seconds through a watch
/// channel. Owned by the phase state store: re-armed on every new deadline,
/// torn down when the deadline disappears or the store is dropped.
pub struct Countdown {
    remaining: Arc<watch::Sender<u64>>,
    task: Option<(CancellationToken, JoinHandle<()>)>,
}

impl Countdown {
    pub fn new() -> (Self, watch::Receiver<u64>) {
        let (tx, rx) = watch::channel(0);
        (
            Self {
                remaining: Arc::new(tx),
                task: None,
            },
            rx,
        )
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.remaining.subscribe()
    }

    /// Replaces any running tick task with one tracking `deadline`.
    pub fn arm(&mut self, deadline: DateTime<Utc>) {
        self.stop_task();
        debug!(target = LOG_TARGET, %deadline, "countdown armed");
        let _ = self.remaining.send(remaining_secs(deadline, Utc::now()));

        let token = CancellationToken::new();
        let tick_token = token.clone();
        let tx = Arc::clone(&self.remaining);
        let handle = tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(1));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick resolves immediately and duplicates the value
            // published at arm time
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = tick_token.cancelled() => break,
                    _ = ticker.tick() => {
                        let left = remaining_secs(deadline, Utc::now());
                        if tx.send(left).is_err() || left == 0 {
                            break;
                        }
                    }
                }
            }
        });
        self.task = Some((token, handle));
    }

    /// Stops the tick task and pins the published value at zero.
    pub fn disarm(&mut self) {
        if self.task.is_some() {
            debug!(target = LOG_TARGET, "countdown disarmed");
        }
        self.stop_task();
        let _ = self.remaining.send(0);
    }

    fn stop_task(&mut self) {
        if let Some((token, handle)) = self.task.take() {
            token.cancel();
            handle.abort();
        }
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.stop_task();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn five_seconds_out_reads_five() {
        assert_eq!(remaining_secs(at(1_000_005), at(1_000_000)), 5);
    }

    #[test]
    fn deadline_and_beyond_read_zero() {
        assert_eq!(remaining_secs(at(1_000_000), at(1_000_000)), 0);
        assert_eq!(remaining_secs(at(1_000_000), at(1_000_060)), 0);
    }

    #[test]
    fn sub_second_remainders_round() {
        let deadline = DateTime::from_timestamp_millis(1_000_000_600).unwrap();
        let now = DateTime::from_timestamp_millis(1_000_000_000).unwrap();
        assert_eq!(remaining_secs(deadline, now), 1);
    }

    #[tokio::test]
    async fn arm_publishes_an_initial_value() {
        let (mut countdown, rx) = Countdown::new();
        countdown.arm(Utc::now() + chrono::Duration::seconds(30));
        let value = *rx.borrow();
        assert!((29..=30).contains(&value), "got {value}");
    }

    #[tokio::test]
    async fn disarm_pins_zero() {
        let (mut countdown, rx) = Countdown::new();
        countdown.arm(Utc::now() + chrono::Duration::seconds(30));
        countdown.disarm();
        assert_eq!(*rx.borrow(), 0);
    }
}
