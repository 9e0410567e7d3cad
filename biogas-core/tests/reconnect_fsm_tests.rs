//! Tests for the reconnection policy, driven through the state machine
//!
//! These tests verify:
//! 1. Delays never shrink between consecutive retries and stay capped
//! 2. The retry counter grows once per scheduled attempt, never past the budget
//! 3. Manual reconnect resets counter and delay and connects at once
//! 4. There is never more than one live link
//! 5. Disconnect suppresses any further retry
//! 6. Events from superseded links change nothing

use biogas_core::core::{ConnectionFsm, ConnectionStatus, Directive, Epoch, ReconnectPolicy};
use biogas_core::resilience::{BackoffConfig, RetryBackoff};
use std::time::Duration;

fn fsm(max_retries: u32, seed: u64) -> ConnectionFsm {
    ConnectionFsm::new(
        ReconnectPolicy {
            auto_reconnect: true,
            max_retries,
        },
        RetryBackoff::seeded(BackoffConfig::default(), seed),
    )
}

fn opened(directives: &[Directive]) -> Epoch {
    directives
        .iter()
        .find_map(|d| match d {
            Directive::OpenLink(epoch) => Some(*epoch),
            _ => None,
        })
        .expect("expected an OpenLink directive")
}

fn scheduled(directives: &[Directive]) -> Option<(Duration, u32)> {
    directives.iter().find_map(|d| match d {
        Directive::ScheduleRetry { delay, attempt } => Some((*delay, *attempt)),
        _ => None,
    })
}

/// Close every link as soon as it opens, collecting the scheduled retries
fn fail_repeatedly(fsm: &mut ConnectionFsm, closes: usize) -> Vec<(Duration, u32)> {
    let mut epoch = opened(&fsm.start());
    let mut retries = Vec::new();
    for _ in 0..closes {
        match scheduled(&fsm.on_close(epoch).unwrap()) {
            Some(retry) => {
                retries.push(retry);
                epoch = opened(&fsm.on_retry_due());
            }
            None => break,
        }
    }
    retries
}

mod backoff_growth {
    use super::*;

    #[test]
    fn test_delays_non_decreasing_and_capped() {
        for seed in 0..20 {
            let mut fsm = fsm(10, seed);
            let retries = fail_repeatedly(&mut fsm, 10);

            assert_eq!(retries.len(), 10);
            assert_eq!(retries[0].0, Duration::from_millis(1000));
            for pair in retries.windows(2) {
                assert!(pair[0].0 <= pair[1].0, "seed {}: {:?}", seed, retries);
            }
            assert!(retries.iter().all(|(delay, _)| *delay <= Duration::from_millis(30_000)));
        }
    }

    #[test]
    fn test_jitter_stays_within_bound() {
        let mut fsm = fsm(10, 99);
        let retries = fail_repeatedly(&mut fsm, 2);

        // second delay = 1000 * 2 + jitter(0..1000)
        let second = retries[1].0;
        assert!(second >= Duration::from_millis(2000));
        assert!(second <= Duration::from_millis(3000));
    }

    #[test]
    fn test_same_seed_same_schedule() {
        let a = fail_repeatedly(&mut fsm(10, 5), 10);
        let b = fail_repeatedly(&mut fsm(10, 5), 10);
        assert_eq!(a, b);
    }
}

mod retry_budget {
    use super::*;

    #[test]
    fn test_counter_increments_once_per_attempt() {
        let mut fsm = fsm(10, 1);
        let retries = fail_repeatedly(&mut fsm, 4);

        let attempts: Vec<u32> = retries.iter().map(|(_, attempt)| *attempt).collect();
        assert_eq!(attempts, vec![1, 2, 3, 4]);
        assert_eq!(fsm.retry_count(), 4);
    }

    #[test]
    fn test_counter_never_exceeds_max_retries() {
        let mut fsm = fsm(3, 1);
        let retries = fail_repeatedly(&mut fsm, 10);

        assert_eq!(retries.len(), 3);
        assert_eq!(fsm.retry_count(), 3);
        assert_eq!(fsm.status(), ConnectionStatus::Disconnected);
        assert!(fsm.is_exhausted());
        assert!(!fsm.retry_pending());
    }

    #[test]
    fn test_zero_budget_never_retries() {
        let mut fsm = fsm(0, 1);
        assert!(fail_repeatedly(&mut fsm, 3).is_empty());
        assert_eq!(fsm.retry_count(), 0);
    }
}

mod manual_control {
    use super::*;

    #[test]
    fn test_reconnect_resets_and_connects_immediately() {
        let mut fsm = fsm(10, 3);
        fail_repeatedly(&mut fsm, 3);
        assert_eq!(fsm.retry_count(), 3);
        assert!(fsm.next_delay() > Duration::from_millis(1000));

        let directives = fsm.reconnect();

        assert_eq!(fsm.retry_count(), 0);
        assert_eq!(fsm.next_delay(), Duration::from_millis(1000));
        assert_eq!(fsm.status(), ConnectionStatus::Connecting);
        assert!(directives.iter().any(|d| matches!(d, Directive::OpenLink(_))));
    }

    #[test]
    fn test_reconnect_cancels_pending_retry() {
        let mut fsm = fsm(10, 3);
        let epoch = opened(&fsm.start());
        fsm.on_close(epoch).unwrap();
        assert!(fsm.retry_pending());

        let directives = fsm.reconnect();
        assert_eq!(directives[0], Directive::CancelRetry);
        assert!(!fsm.retry_pending());

        // The cancelled timer firing late does not open a second link
        assert!(fsm.on_retry_due().is_empty());
    }

    #[test]
    fn test_reconnect_after_exhaustion() {
        let mut fsm = fsm(2, 3);
        fail_repeatedly(&mut fsm, 5);
        assert!(fsm.is_exhausted());

        let epoch = opened(&fsm.reconnect());
        fsm.on_open(epoch).unwrap();
        assert!(fsm.status().is_connected());
        assert!(!fsm.is_exhausted());
    }

    #[test]
    fn test_disconnect_suppresses_retry() {
        let mut fsm = fsm(10, 3);
        let epoch = opened(&fsm.start());
        fsm.on_open(epoch).unwrap();

        let directives = fsm.disconnect();
        assert_eq!(directives, vec![Directive::CloseLink]);
        assert_eq!(fsm.status(), ConnectionStatus::Disconnected);

        // The torn-down link's close is stale and schedules nothing
        assert!(fsm.on_close(epoch).is_none());
        assert!(!fsm.retry_pending());
    }

    #[test]
    fn test_start_after_disconnect_restores_policy() {
        let mut fsm = fsm(10, 3);
        fsm.start();
        fsm.disconnect();
        assert!(!fsm.auto_reconnect_enabled());

        fsm.start();
        assert!(fsm.auto_reconnect_enabled());
    }
}

mod single_link {
    use super::*;

    #[test]
    fn test_every_open_preceded_by_close_of_live_link() {
        let mut fsm = fsm(10, 1);
        let mut live: Option<Epoch> = None;

        fn check(directives: Vec<Directive>, live: &mut Option<Epoch>) {
            for directive in directives {
                match directive {
                    Directive::CloseLink => *live = None,
                    Directive::OpenLink(epoch) => {
                        assert!(live.is_none(), "opened {} while {:?} was live", epoch, live);
                        *live = Some(epoch);
                    }
                    _ => {}
                }
            }
        }

        check(fsm.start(), &mut live);
        check(fsm.connect(), &mut live);
        check(fsm.reconnect(), &mut live);
        let epoch = live.unwrap();
        fsm.on_open(epoch).unwrap();
        check(fsm.reconnect(), &mut live);
        assert_ne!(live, Some(epoch));
        assert_eq!(fsm.live_epoch(), live);
    }

    #[test]
    fn test_stale_events_ignored() {
        let mut fsm = fsm(10, 1);
        let old = opened(&fsm.start());
        let new = opened(&fsm.reconnect());

        assert!(fsm.on_open(old).is_none());
        assert!(fsm.on_error(old).is_none());
        assert!(fsm.on_close(old).is_none());
        assert!(fsm.on_open_failed(old).is_none());

        assert_eq!(fsm.status(), ConnectionStatus::Connecting);
        assert_eq!(fsm.retry_count(), 0);
        assert!(fsm.is_current(new));
        assert_eq!(fsm.stats().closes, 0);
    }
}
