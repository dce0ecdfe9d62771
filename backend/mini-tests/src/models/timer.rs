use chrono::{DateTime, Utc};

/// Events emitted by a running quiz countdown.
#[derive(Debug, Clone, PartialEq)]
pub enum TimerEvent {
    TimerTick(TimerTick),
    TimeExpired(TimeExpired),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimerTick {
    pub exercise_id: u32,
    /// Identifies the quiz run; ticks from a cancelled run are ignored.
    pub generation: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeExpired {
    pub exercise_id: u32,
    pub timestamp: DateTime<Utc>,
}

impl TimerEvent {
    pub fn exercise_id(&self) -> u32 {
        match self {
            TimerEvent::TimerTick(tick) => tick.exercise_id,
            TimerEvent::TimeExpired(expired) => expired.exercise_id,
        }
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            TimerEvent::TimerTick(_) => "timer-tick",
            TimerEvent::TimeExpired(_) => "time-expired",
        }
    }
}
