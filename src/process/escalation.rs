/*!
 * Kill Escalation
 *
 * Per-process timing state for deadline expiry and graceful-then-forceful
 * termination. Kept separate from `ProcessStatus`: a process can be
 * `running` while its escalation is already in the grace period.
 *
 *   Armed(deadline) --deadline--> Disarmed          (forceful kill, timeout)
 *   Armed --graceful request--> GracePeriod(min(now + grace, deadline))
 *   GracePeriod --until--> Disarmed                 (forceful kill)
 *
 * A grace period never outlasts the execution deadline. When the deadline
 * is what ends it, firing reports `DeadlineExpired`.
 *   any --forceful request / exit--> Disarmed
 */

use std::time::Duration;
use tokio::time::Instant;

/// Escalation state of a single process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    /// Waiting for the execution deadline
    Armed { deadline: Instant },
    /// Graceful termination sent; forceful kill due at `deadline`.
    /// `at_timeout` is set when the execution deadline cut the grace short.
    GracePeriod { deadline: Instant, at_timeout: bool },
    /// No timer pending
    Disarmed,
}

/// What the owner must do when a timer fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationAction {
    /// Execution deadline reached
    DeadlineExpired,
    /// Grace period elapsed without a voluntary exit
    GraceExpired,
}

impl Escalation {
    pub fn armed(deadline: Instant) -> Self {
        Escalation::Armed { deadline }
    }

    /// Next instant at which `fire` may act
    pub fn wakeup(&self) -> Option<Instant> {
        match *self {
            Escalation::Armed { deadline } | Escalation::GracePeriod { deadline, .. } => {
                Some(deadline)
            }
            Escalation::Disarmed => None,
        }
    }

    /// Enter the grace period. Returns false when a grace period is already
    /// running or escalation is over, so repeated graceful requests do not
    /// extend the wait.
    pub fn begin_grace(&mut self, now: Instant, grace: Duration) -> bool {
        match *self {
            Escalation::Armed { deadline } => {
                let until = now + grace;
                *self = if until < deadline {
                    Escalation::GracePeriod {
                        deadline: until,
                        at_timeout: false,
                    }
                } else {
                    Escalation::GracePeriod {
                        deadline,
                        at_timeout: true,
                    }
                };
                true
            }
            Escalation::GracePeriod { .. } | Escalation::Disarmed => false,
        }
    }

    /// Consume an expired timer
    pub fn fire(&mut self, now: Instant) -> Option<EscalationAction> {
        let action = match *self {
            Escalation::Armed { deadline } if now >= deadline => EscalationAction::DeadlineExpired,
            Escalation::GracePeriod {
                deadline,
                at_timeout,
            } if now >= deadline => {
                if at_timeout {
                    EscalationAction::DeadlineExpired
                } else {
                    EscalationAction::GraceExpired
                }
            }
            _ => return None,
        };
        *self = Escalation::Disarmed;
        Some(action)
    }

    pub fn disarm(&mut self) {
        *self = Escalation::Disarmed;
    }

    pub fn is_disarmed(&self) -> bool {
        matches!(self, Escalation::Disarmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SEC: Duration = Duration::from_secs(1);

    #[test]
    fn test_deadline_fires_once() {
        let start = Instant::now();
        let mut esc = Escalation::armed(start + SEC);

        assert_eq!(esc.wakeup(), Some(start + SEC));
        assert_eq!(esc.fire(start), None);
        assert_eq!(esc.fire(start + SEC), Some(EscalationAction::DeadlineExpired));
        assert!(esc.is_disarmed());
        assert_eq!(esc.fire(start + SEC * 10), None);
    }

    #[test]
    fn test_grace_replaces_deadline() {
        let start = Instant::now();
        let mut esc = Escalation::armed(start + SEC * 30);

        assert!(esc.begin_grace(start, SEC * 5));
        assert_eq!(esc.wakeup(), Some(start + SEC * 5));
        assert_eq!(esc.fire(start + SEC * 5), Some(EscalationAction::GraceExpired));
        assert!(esc.is_disarmed());
    }

    #[test]
    fn test_repeated_grace_does_not_extend() {
        let start = Instant::now();
        let mut esc = Escalation::armed(start + SEC * 30);

        assert!(esc.begin_grace(start, SEC * 5));
        assert!(!esc.begin_grace(start + SEC * 4, SEC * 5));
        assert_eq!(esc.wakeup(), Some(start + SEC * 5));
    }

    #[test]
    fn test_grace_is_cut_short_by_deadline() {
        let start = Instant::now();
        let mut esc = Escalation::armed(start + SEC);

        assert!(esc.begin_grace(start, SEC * 3));
        assert_eq!(esc.wakeup(), Some(start + SEC));
        assert_eq!(esc.fire(start + SEC), Some(EscalationAction::DeadlineExpired));
        assert!(esc.is_disarmed());
    }

    #[test]
    fn test_disarmed_ignores_everything() {
        let start = Instant::now();
        let mut esc = Escalation::armed(start + SEC);
        esc.disarm();

        assert!(!esc.begin_grace(start, SEC));
        assert_eq!(esc.wakeup(), None);
        assert_eq!(esc.fire(start + SEC * 100), None);
    }

    proptest! {
        #[test]
        fn prop_fire_never_acts_before_wakeup(deadline_ms in 1u64..100_000, probe_ms in 0u64..200_000) {
            let start = Instant::now();
            let mut esc = Escalation::armed(start + Duration::from_millis(deadline_ms));
            let probe = start + Duration::from_millis(probe_ms);
            let fired = esc.fire(probe).is_some();
            prop_assert_eq!(fired, probe_ms >= deadline_ms);
            prop_assert_eq!(esc.is_disarmed(), fired);
        }

        #[test]
        fn prop_grace_never_outlasts_deadline(
            deadline_ms in 1u64..100_000,
            request_ms in 0u64..100_000,
            grace_ms in 0u64..100_000,
        ) {
            let start = Instant::now();
            let deadline = start + Duration::from_millis(deadline_ms);
            let mut esc = Escalation::armed(deadline);

            esc.begin_grace(start + Duration::from_millis(request_ms), Duration::from_millis(grace_ms));
            let wakeup = esc.wakeup().unwrap();
            prop_assert!(wakeup <= deadline);

            let expected = if request_ms + grace_ms < deadline_ms {
                EscalationAction::GraceExpired
            } else {
                EscalationAction::DeadlineExpired
            };
            prop_assert_eq!(esc.fire(wakeup), Some(expected));
        }
    }
}
