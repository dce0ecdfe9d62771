use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::models::{TimerEvent, TimerTick};

pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Background countdown for one quiz run.
///
/// Sends a tick every period; the owner applies it to the runtime. Dropping
/// the timer aborts the task.
#[derive(Debug)]
pub struct QuizTimer {
    exercise_id: u32,
    generation: u64,
    handle: JoinHandle<()>,
}

impl QuizTimer {
    /// Must be called from within a tokio runtime.
    pub fn start(
        exercise_id: u32,
        generation: u64,
        period: Duration,
        events: UnboundedSender<TimerEvent>,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately; the runtime already
            // accounted for it when the countdown started.
            interval.tick().await;
            loop {
                interval.tick().await;
                let event = TimerEvent::TimerTick(TimerTick {
                    exercise_id,
                    generation,
                    timestamp: Utc::now(),
                });
                if events.send(event).is_err() {
                    break;
                }
            }
        });
        tracing::debug!(exercise_id, generation, "quiz timer started");
        Self {
            exercise_id,
            generation,
            handle,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn cancel(&self) {
        if !self.handle.is_finished() {
            tracing::debug!(
                exercise_id = self.exercise_id,
                generation = self.generation,
                "quiz timer cancelled"
            );
        }
        self.handle.abort();
    }
}

impl Drop for QuizTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_ticks_carry_run_identity() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let timer = QuizTimer::start(5, 7, Duration::from_millis(10), tx);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_name(), "timer-tick");
        match event {
            TimerEvent::TimerTick(tick) => {
                assert_eq!(tick.exercise_id, 5);
                assert_eq!(tick.generation, 7);
            }
            other => panic!("unexpected event {:?}", other),
        }
        timer.cancel();
    }

    #[tokio::test]
    async fn test_dropping_stops_ticks() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let timer = QuizTimer::start(1, 1, Duration::from_millis(5), tx);
        drop(timer);
        // The aborted task drops its sender, closing the channel.
        while rx.recv().await.is_some() {}
    }
}
