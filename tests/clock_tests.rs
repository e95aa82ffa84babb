mod common;

use chrono::Duration;
use common::t0;
use rtimeguard::core::clock::{ClockSignal, SessionClock, ThresholdLatch};
use rtimeguard::errors::AppError;
use rtimeguard::store::{KeyValueStore, MemoryStore, break_state_key, session_time_key};

fn running_clock(store: &dyn KeyValueStore) -> SessionClock {
    let mut clock = SessionClock::restore("s1", store);
    clock.start(t0()).unwrap();
    clock
}

#[test]
fn break_required_fires_once_at_two_hours() {
    let mut store = MemoryStore::new();
    store.set(&session_time_key("s1"), "7199").unwrap();
    let mut clock = running_clock(&store);

    let signals = clock.tick(&mut store);
    assert_eq!(
        signals,
        vec![ClockSignal::BreakRequired {
            continuous_seconds: 7200
        }]
    );
    assert_eq!(clock.break_latch(), ThresholdLatch::Fired);

    // latched: no second signal while still above the threshold
    assert!(clock.tick(&mut store).is_empty());
    assert_eq!(clock.continuous_seconds(), 7201);
}

#[test]
fn daily_limit_locks_out_and_fires_once() {
    let mut store = MemoryStore::new();
    let mut clock = running_clock(&store);
    assert!(clock.load_daily_total(14_399).is_none());

    let signals = clock.tick(&mut store);
    assert_eq!(
        signals,
        vec![ClockSignal::DailyLimitReached {
            daily_seconds: 14_400
        }]
    );
    assert!(clock.is_locked_out());
    assert!(!clock.is_active());
    assert_eq!(clock.remaining_daily_seconds(), 0);

    // locked out: ticks are ignored and nothing fires again
    assert!(clock.tick(&mut store).is_empty());
    assert_eq!(clock.daily_seconds(), 14_400);
    assert!(matches!(clock.start(t0()), Err(AppError::LockedOut)));
}

#[test]
fn loading_a_capped_day_locks_out_immediately() {
    let store = MemoryStore::new();
    let mut clock = SessionClock::restore("s1", &store);

    let signal = clock.load_daily_total(15_000);
    assert_eq!(
        signal,
        Some(ClockSignal::DailyLimitReached {
            daily_seconds: 15_000
        })
    );
    assert!(clock.is_locked_out());

    // the day total never moves backwards
    clock.load_daily_total(10);
    assert_eq!(clock.daily_seconds(), 15_000);
}

#[test]
fn roll_over_day_is_the_only_way_out_of_lockout() {
    let mut store = MemoryStore::new();
    let mut clock = running_clock(&store);
    clock.load_daily_total(14_400);
    assert!(clock.is_locked_out());

    clock.stop(&mut store);
    assert!(clock.is_locked_out());

    clock.roll_over_day();
    assert!(!clock.is_locked_out());
    assert_eq!(clock.daily_latch(), ThresholdLatch::Armed);
    assert!(clock.start(t0()).unwrap());
}

#[test]
fn paused_clock_does_not_count() {
    let mut store = MemoryStore::new();
    let mut clock = running_clock(&store);
    clock.tick(&mut store);

    assert!(clock.pause());
    assert!(!clock.pause());
    clock.tick(&mut store);
    assert_eq!(clock.continuous_seconds(), 1);
    assert!(clock.is_active());
    assert!(clock.is_paused());

    // time spent paused is not applied on resume
    assert!(clock.resume(t0() + Duration::seconds(3_600)));
    let signals = clock.advance(t0() + Duration::seconds(3_605), &mut store);
    assert!(signals.is_empty());
    assert_eq!(clock.continuous_seconds(), 6);
}

#[test]
fn start_twice_reports_already_active() {
    let store = MemoryStore::new();
    let mut clock = running_clock(&store);
    assert!(!clock.start(t0()).unwrap());
}

#[test]
fn every_tick_persists_session_time() {
    let mut store = MemoryStore::new();
    let mut clock = running_clock(&store);
    for _ in 0..3 {
        clock.tick(&mut store);
    }
    assert_eq!(
        store.get(&session_time_key("s1")).unwrap().as_deref(),
        Some("3")
    );

    let restored = SessionClock::restore("s1", &store);
    assert_eq!(restored.continuous_seconds(), 3);
    assert_eq!(restored.break_latch(), ThresholdLatch::Armed);
    assert!(!restored.is_active());
}

#[test]
fn restore_past_threshold_keeps_the_latch_fired() {
    let mut store = MemoryStore::new();
    store.set(&session_time_key("s1"), "8000").unwrap();
    let mut clock = running_clock(&store);

    assert_eq!(clock.break_latch(), ThresholdLatch::Fired);
    assert!(clock.tick(&mut store).is_empty());
}

#[test]
fn restore_ignores_garbage() {
    let mut store = MemoryStore::new();
    store.set(&session_time_key("s1"), "not-a-number").unwrap();
    let clock = SessionClock::restore("s1", &store);
    assert_eq!(clock.continuous_seconds(), 0);
}

#[test]
fn stop_clears_counters_and_purges_keys() {
    let mut store = MemoryStore::new();
    store.set(&break_state_key("s1"), "{}").unwrap();
    let mut clock = running_clock(&store);
    clock.tick(&mut store);
    clock.tick(&mut store);

    clock.stop(&mut store);
    assert_eq!(clock.continuous_seconds(), 0);
    assert_eq!(clock.daily_seconds(), 0);
    assert!(!clock.is_active());
    assert!(!store.contains(&session_time_key("s1")));
    assert!(!store.contains(&break_state_key("s1")));
}

#[test]
fn store_failures_never_stop_the_clock() {
    let mut store = MemoryStore::failing();
    let mut clock = running_clock(&store);
    clock.tick(&mut store);
    clock.tick(&mut store);
    assert_eq!(clock.continuous_seconds(), 2);
    assert!(clock.is_running());
}

#[test]
fn advance_applies_whole_seconds_only() {
    let mut store = MemoryStore::new();
    let mut clock = running_clock(&store);

    clock.advance(t0() + Duration::milliseconds(2_500), &mut store);
    assert_eq!(clock.continuous_seconds(), 2);

    // the half second carried over completes the third
    clock.advance(t0() + Duration::milliseconds(3_000), &mut store);
    assert_eq!(clock.continuous_seconds(), 3);
}

#[test]
fn advance_stops_at_the_break_signal() {
    let mut store = MemoryStore::new();
    store.set(&session_time_key("s1"), "7190").unwrap();
    let mut clock = running_clock(&store);

    let signals = clock.advance(t0() + Duration::seconds(60), &mut store);
    assert_eq!(
        signals,
        vec![ClockSignal::BreakRequired {
            continuous_seconds: 7200
        }]
    );
    assert_eq!(clock.continuous_seconds(), 7200);

    // still running: the remaining seconds come with the next call
    clock.advance(t0() + Duration::seconds(60), &mut store);
    assert_eq!(clock.continuous_seconds(), 7250);
}

#[test]
fn reset_continuous_rearms_the_break_latch() {
    let mut store = MemoryStore::new();
    store.set(&session_time_key("s1"), "7199").unwrap();
    let mut clock = running_clock(&store);
    clock.tick(&mut store);

    clock.reset_continuous(&mut store);
    assert_eq!(clock.continuous_seconds(), 0);
    assert_eq!(clock.break_latch(), ThresholdLatch::Armed);
    assert_eq!(clock.daily_seconds(), 1);
    assert!(!store.contains(&session_time_key("s1")));
}

#[test]
fn idle_timeout_pauses_without_counting_the_idle_tail() {
    let mut store = MemoryStore::new();
    let mut clock = running_clock(&store);

    assert!(clock.advance(t0() + Duration::seconds(900), &mut store).is_empty());
    assert!(clock.is_running());

    let signals = clock.advance(t0() + Duration::seconds(1_000), &mut store);
    assert_eq!(signals, vec![ClockSignal::Idle { idle_seconds: 1_000 }]);
    assert!(clock.is_paused());
    assert_eq!(clock.continuous_seconds(), 900);

    assert!(clock.advance(t0() + Duration::seconds(2_000), &mut store).is_empty());
    assert_eq!(clock.continuous_seconds(), 900);
}

#[test]
fn activity_pushes_the_idle_deadline_back() {
    let mut store = MemoryStore::new();
    let mut clock = running_clock(&store);

    clock.record_activity(t0() + Duration::seconds(800));
    // an older instant never moves the deadline earlier
    clock.record_activity(t0() + Duration::seconds(100));
    assert_eq!(clock.last_activity(), Some(t0() + Duration::seconds(800)));

    assert!(clock.advance(t0() + Duration::seconds(1_700), &mut store).is_empty());
    assert!(clock.is_running());
    assert_eq!(clock.continuous_seconds(), 1_700);

    let signals = clock.advance(t0() + Duration::seconds(1_701), &mut store);
    assert_eq!(signals, vec![ClockSignal::Idle { idle_seconds: 901 }]);
}

#[test]
fn stop_forgets_the_last_activity() {
    let mut store = MemoryStore::new();
    let mut clock = running_clock(&store);
    assert_eq!(clock.last_activity(), Some(t0()));

    clock.stop(&mut store);
    assert_eq!(clock.last_activity(), None);
}
