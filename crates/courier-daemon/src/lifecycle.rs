//! Connection lifecycle state machine.
//!
//! [`LifecycleManager`] owns the session state, the retry counter, and an
//! attempt epoch. Transitions are pure and return directives the service
//! loop interprets, so the whole machine is testable without a runtime or a
//! gateway.
//!
//! Retry policy: each close schedules one reconnect at the reason's delay
//! tier; once the counter reaches the ceiling the delay becomes the long
//! cooldown instead. The counter resets to zero only on reaching `Open`.

use std::time::Duration;

use courier_gateway::CloseReason;

use crate::signal::StatusToken;

/// Process-wide connection state. Single instance, lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Connecting,
    Open,
    Closed(CloseReason),
    /// Logged out. No further transitions.
    Terminated,
}

/// What the service loop must do after a close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDirective {
    /// Schedule one reconnect attempt after `delay`.
    Retry {
        delay: Duration,
        /// 1-based number of this attempt since the last `Open`.
        attempt: u32,
        /// Epoch the retry is valid for; see [`LifecycleManager::retry_is_current`].
        epoch: u64,
    },
    /// Terminal close. Publish status and exit cleanly.
    Terminate,
}

/// The connection lifecycle state machine.
pub struct LifecycleManager {
    state: LifecycleState,
    retry_count: u32,
    retry_ceiling: u32,
    long_cooldown: Duration,
    epoch: u64,
}

impl LifecycleManager {
    pub fn new(retry_ceiling: u32, long_cooldown: Duration) -> Self {
        Self {
            state: LifecycleState::Idle,
            retry_count: 0,
            retry_ceiling,
            long_cooldown,
            epoch: 0,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn is_open(&self) -> bool {
        self.state == LifecycleState::Open
    }

    /// Start a connection attempt. Bumps the epoch, invalidating any retry
    /// still scheduled for an earlier close.
    pub fn begin_connect(&mut self) -> u64 {
        self.state = LifecycleState::Connecting;
        self.epoch += 1;
        self.epoch
    }

    /// The session reached `Open`. Resets the retry counter.
    pub fn on_open(&mut self) {
        self.state = LifecycleState::Open;
        self.retry_count = 0;
    }

    /// The session closed. Returns the directive for the service loop.
    pub fn on_close(&mut self, reason: CloseReason) -> CloseDirective {
        self.epoch += 1;

        if reason.is_terminal() {
            self.state = LifecycleState::Terminated;
            return CloseDirective::Terminate;
        }

        self.state = LifecycleState::Closed(reason);

        let delay = if self.retry_count >= self.retry_ceiling {
            self.long_cooldown
        } else {
            // Non-terminal reasons always carry a delay tier.
            reason.retry_delay().unwrap_or(self.long_cooldown)
        };
        self.retry_count += 1;

        CloseDirective::Retry {
            delay,
            attempt: self.retry_count,
            epoch: self.epoch,
        }
    }

    /// Whether a retry scheduled with `epoch` is still the current one.
    ///
    /// A timer left over from an earlier close must not start a duplicate
    /// concurrent connection attempt.
    pub fn retry_is_current(&self, epoch: u64) -> bool {
        epoch == self.epoch && matches!(self.state, LifecycleState::Closed(_))
    }

    /// The status token published for the current state.
    pub fn status_token(&self) -> StatusToken {
        match self.state {
            LifecycleState::Idle | LifecycleState::Connecting => StatusToken::Connecting,
            LifecycleState::Open => StatusToken::Connected,
            LifecycleState::Closed(_) | LifecycleState::Terminated => StatusToken::Disconnected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COOLDOWN: Duration = Duration::from_secs(300);

    fn open_manager() -> LifecycleManager {
        let mut manager = LifecycleManager::new(5, COOLDOWN);
        manager.begin_connect();
        manager.on_open();
        manager
    }

    #[test]
    fn logged_out_terminates_without_retry() {
        let mut manager = open_manager();
        let directive = manager.on_close(CloseReason::LoggedOut);
        assert_eq!(directive, CloseDirective::Terminate);
        assert_eq!(manager.state(), LifecycleState::Terminated);
        assert_eq!(manager.status_token(), StatusToken::Disconnected);
    }

    #[test]
    fn connection_lost_schedules_one_fast_retry() {
        let mut manager = open_manager();
        let directive = manager.on_close(CloseReason::ConnectionLost);
        match directive {
            CloseDirective::Retry { delay, attempt, .. } => {
                assert_eq!(delay, Duration::from_secs(2));
                assert_eq!(attempt, 1);
            }
            other => panic!("expected Retry, got {other:?}"),
        }
        assert_eq!(manager.retry_count(), 1);
        assert_eq!(manager.state(), LifecycleState::Closed(CloseReason::ConnectionLost));
    }

    #[test]
    fn sixth_attempt_waits_for_the_long_cooldown() {
        let mut manager = open_manager();

        for expected_attempt in 1..=5u32 {
            let directive = manager.on_close(CloseReason::ConnectionLost);
            match directive {
                CloseDirective::Retry { delay, attempt, .. } => {
                    assert_eq!(attempt, expected_attempt);
                    assert_eq!(delay, Duration::from_secs(2));
                }
                other => panic!("expected Retry, got {other:?}"),
            }
            manager.begin_connect();
        }

        // Five attempts failed; the sixth gets the long cooldown.
        let directive = manager.on_close(CloseReason::ConnectionLost);
        match directive {
            CloseDirective::Retry { delay, attempt, .. } => {
                assert_eq!(attempt, 6);
                assert_eq!(delay, COOLDOWN);
            }
            other => panic!("expected Retry, got {other:?}"),
        }
        assert_eq!(manager.retry_count(), 6);

        // Only reaching Open resets the counter.
        manager.begin_connect();
        assert_eq!(manager.retry_count(), 6);
        manager.on_open();
        assert_eq!(manager.retry_count(), 0);
    }

    #[test]
    fn delay_tier_follows_the_reason() {
        let mut manager = open_manager();
        match manager.on_close(CloseReason::ConnectionReplaced) {
            CloseDirective::Retry { delay, .. } => assert_eq!(delay, Duration::from_secs(10)),
            other => panic!("expected Retry, got {other:?}"),
        }
        manager.begin_connect();
        match manager.on_close(CloseReason::Unknown) {
            CloseDirective::Retry { delay, .. } => assert_eq!(delay, Duration::from_secs(5)),
            other => panic!("expected Retry, got {other:?}"),
        }
    }

    #[test]
    fn stale_retry_epochs_are_rejected() {
        let mut manager = open_manager();
        let first = manager.on_close(CloseReason::ConnectionLost);
        let CloseDirective::Retry { epoch: stale, .. } = first else {
            panic!("expected Retry");
        };

        // A newer attempt started before the timer fired.
        manager.begin_connect();
        assert!(!manager.retry_is_current(stale));

        // The fresh close's own epoch is current until the next attempt.
        let second = manager.on_close(CloseReason::ConnectionClosed);
        let CloseDirective::Retry { epoch: fresh, .. } = second else {
            panic!("expected Retry");
        };
        assert!(manager.retry_is_current(fresh));
        assert!(!manager.retry_is_current(stale));
    }

    #[test]
    fn retry_not_current_once_open() {
        let mut manager = open_manager();
        let CloseDirective::Retry { epoch, .. } = manager.on_close(CloseReason::ConnectionLost)
        else {
            panic!("expected Retry");
        };
        manager.begin_connect();
        manager.on_open();
        assert!(!manager.retry_is_current(epoch));
    }

    #[test]
    fn status_tokens_track_state() {
        let mut manager = LifecycleManager::new(5, COOLDOWN);
        assert_eq!(manager.status_token(), StatusToken::Connecting);
        manager.begin_connect();
        assert_eq!(manager.status_token(), StatusToken::Connecting);
        manager.on_open();
        assert_eq!(manager.status_token(), StatusToken::Connected);
        manager.on_close(CloseReason::ConnectionLost);
        assert_eq!(manager.status_token(), StatusToken::Disconnected);
    }
}
