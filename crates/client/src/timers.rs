//! Fixed-slot timer registry.
//!
//! The session needs at most three timers at once, one per purpose.  Each
//! [`TimerAction`] maps to exactly one [`TimerKind`] slot, so arming a timer
//! always replaces whatever was pending for the same purpose.

use std::time::Duration;

use tokio::time::Instant;

use crate::types::DisconnectReason;

/// Timer slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Next connection attempt.
    Connect,
    /// Tear the connection down if the expected event does not arrive
    /// (open, handshake, heartbeat reply).
    Disconnect,
    /// Send a heartbeat after an idle period.
    Heartbeat,
}

impl TimerKind {
    const COUNT: usize = 3;

    fn index(self) -> usize {
        match self {
            Self::Connect => 0,
            Self::Disconnect => 1,
            Self::Heartbeat => 2,
        }
    }
}

/// What to do when a timer fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
    Reconnect,
    Disconnect {
        reason: DisconnectReason,
        waited: Duration,
    },
    Ping,
}

impl TimerAction {
    pub fn kind(&self) -> TimerKind {
        match self {
            Self::Reconnect => TimerKind::Connect,
            Self::Disconnect { .. } => TimerKind::Disconnect,
            Self::Ping => TimerKind::Heartbeat,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Timer {
    deadline: Instant,
    action: TimerAction,
}

#[derive(Debug, Default)]
pub struct Timers {
    slots: [Option<Timer>; TimerKind::COUNT],
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `action` to fire at `deadline`, cancelling the previous timer in
    /// the same slot.
    pub fn arm_at(&mut self, action: TimerAction, deadline: Instant) {
        self.slots[action.kind().index()] = Some(Timer { deadline, action });
    }

    pub fn arm(&mut self, action: TimerAction, after: Duration) {
        self.arm_at(action, Instant::now() + after);
    }

    pub fn cancel(&mut self, kind: TimerKind) {
        self.slots[kind.index()] = None;
    }

    pub fn clear(&mut self) {
        self.slots = [None; TimerKind::COUNT];
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.slots[kind.index()].is_some()
    }

    #[cfg(test)]
    pub fn armed(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.slots.iter().flatten().map(|t| t.deadline).min()
    }

    /// Remove and return the earliest timer whose deadline has passed.
    pub fn take_expired(&mut self, now: Instant) -> Option<TimerAction> {
        let slot = self
            .slots
            .iter_mut()
            .filter(|s| matches!(s, Some(t) if t.deadline <= now))
            .min_by_key(|s| s.map(|t| t.deadline))?;
        slot.take().map(|t| t.action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pong_timeout() -> TimerAction {
        TimerAction::Disconnect {
            reason: DisconnectReason::PongTimeout,
            waited: Duration::from_secs(3),
        }
    }

    #[test]
    fn arming_same_slot_replaces_previous_timer() {
        let now = Instant::now();
        let mut timers = Timers::new();
        timers.arm_at(
            TimerAction::Disconnect {
                reason: DisconnectReason::ConnectTimeout,
                waited: Duration::from_secs(16),
            },
            now + Duration::from_secs(16),
        );
        timers.arm_at(pong_timeout(), now + Duration::from_secs(3));

        assert_eq!(timers.armed(), 1);
        assert_eq!(timers.next_deadline(), Some(now + Duration::from_secs(3)));
        assert_eq!(
            timers.take_expired(now + Duration::from_secs(20)),
            Some(pong_timeout())
        );
        assert_eq!(timers.armed(), 0);
    }

    #[test]
    fn slots_are_independent() {
        let now = Instant::now();
        let mut timers = Timers::new();
        timers.arm_at(TimerAction::Ping, now + Duration::from_secs(10));
        timers.arm_at(pong_timeout(), now + Duration::from_secs(3));
        timers.arm_at(TimerAction::Reconnect, now + Duration::from_millis(300));

        assert_eq!(timers.armed(), 3);
        timers.cancel(TimerKind::Disconnect);
        assert!(!timers.is_armed(TimerKind::Disconnect));
        assert!(timers.is_armed(TimerKind::Heartbeat));
        assert!(timers.is_armed(TimerKind::Connect));
    }

    #[test]
    fn take_expired_returns_earliest_first() {
        let now = Instant::now();
        let mut timers = Timers::new();
        timers.arm_at(TimerAction::Ping, now + Duration::from_secs(2));
        timers.arm_at(TimerAction::Reconnect, now + Duration::from_secs(1));

        let later = now + Duration::from_secs(5);
        assert_eq!(timers.take_expired(later), Some(TimerAction::Reconnect));
        assert_eq!(timers.take_expired(later), Some(TimerAction::Ping));
        assert_eq!(timers.take_expired(later), None);
    }

    #[test]
    fn nothing_expires_early() {
        let now = Instant::now();
        let mut timers = Timers::new();
        timers.arm_at(TimerAction::Ping, now + Duration::from_secs(10));
        assert_eq!(timers.take_expired(now), None);
        assert!(timers.is_armed(TimerKind::Heartbeat));
    }

    #[test]
    fn clear_cancels_everything() {
        let mut timers = Timers::new();
        timers.arm(TimerAction::Ping, Duration::from_secs(10));
        timers.arm(TimerAction::Reconnect, Duration::from_secs(1));
        timers.clear();
        assert_eq!(timers.armed(), 0);
        assert_eq!(timers.next_deadline(), None);
    }

    #[test]
    fn action_kinds_are_fixed() {
        assert_eq!(TimerAction::Reconnect.kind(), TimerKind::Connect);
        assert_eq!(pong_timeout().kind(), TimerKind::Disconnect);
        assert_eq!(TimerAction::Ping.kind(), TimerKind::Heartbeat);
    }
}
