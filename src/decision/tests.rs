//! Tests for the update decision engine

use super::*;

fn engine() -> UpdateDecisionEngine {
    UpdateDecisionEngine::new(8, 20, Duration::minutes(60))
}

fn state(round_id: u64, answer: i128, age_minutes: i64) -> FeedState {
    FeedState {
        round_id,
        answer: I256::from(answer),
        started_at: Utc::now() - Duration::minutes(age_minutes),
    }
}

fn quote(price: &str) -> Quote {
    Quote::new(price, Utc::now())
}

#[test]
fn test_fixed_point_example() {
    assert_eq!(
        to_fixed_point("1.23456789", 8).unwrap(),
        I256::from(123_456_789i64)
    );
}

#[test]
fn test_fixed_point_is_deterministic() {
    let a = to_fixed_point("27123.456789123", 8).unwrap();
    let b = to_fixed_point("27123.456789123", 8).unwrap();
    assert_eq!(a, b);
    // truncated, not rounded
    assert_eq!(a, I256::from(2_712_345_678_912i64));
}

#[test]
fn test_fixed_point_variants() {
    assert_eq!(to_fixed_point("1", 8).unwrap(), I256::from(100_000_000i64));
    assert_eq!(to_fixed_point(" 0.5 ", 2).unwrap(), I256::from(50i64));
    assert_eq!(to_fixed_point("1.5e-3", 8).unwrap(), I256::from(150_000i64));
    assert_eq!(to_fixed_point("42", 0).unwrap(), I256::from(42i64));
}

#[test]
fn test_fixed_point_rejects_garbage() {
    for bad in ["", "abc", "1.2.3", "NaN", "0", "0.0", "-1.5", "0.000000001"] {
        let err = to_fixed_point(bad, 8).unwrap_err();
        assert!(
            matches!(err, ReporterError::InvalidPrice(_)),
            "{:?} should be rejected",
            bad
        );
    }
}

#[test]
fn test_fixed_point_unsupported_decimals() {
    assert!(to_fixed_point("1", 40).is_err());
}

#[test]
fn test_deviation_trigger() {
    // 1.00 -> 1.10 is a 9% move, above 1/20
    let decision = engine()
        .decide(&state(5, 100_000_000, 1), &quote("1.10"), Duration::minutes(1))
        .unwrap();
    assert!(decision.should_update);
    assert_eq!(decision.new_answer, I256::from(110_000_000i64));
    assert_eq!(decision.deviation, I256::from(10_000_000i64));
    assert_eq!(decision.trigger, Some(UpdateTrigger::Deviation));
    assert_eq!(decision.target_round, 6);
}

#[test]
fn test_deviation_trigger_downward() {
    let decision = engine()
        .decide(&state(5, 100_000_000, 1), &quote("0.90"), Duration::minutes(1))
        .unwrap();
    assert!(decision.should_update);
    assert_eq!(decision.new_answer, I256::from(90_000_000i64));
}

#[test]
fn test_deviation_threshold_is_inclusive() {
    // deviation * 20 == new answer exactly
    let decision = engine()
        .decide(&state(1, 95_000_000, 1), &quote("1.00"), Duration::minutes(1))
        .unwrap();
    assert!(decision.should_update);

    // one unit less is below the threshold
    let decision = engine()
        .decide(&state(1, 95_000_001, 1), &quote("1.00"), Duration::minutes(1))
        .unwrap();
    assert!(!decision.should_update);
}

#[test]
fn test_small_move_inside_heartbeat_is_noop() {
    let decision = engine()
        .decide(&state(9, 100_000_000, 10), &quote("1.01"), Duration::minutes(10))
        .unwrap();
    assert!(!decision.should_update);
    assert_eq!(decision.trigger, None);
}

#[test]
fn test_heartbeat_trigger_with_zero_deviation() {
    let decision = engine()
        .decide(&state(3, 100_000_000, 61), &quote("1.00"), Duration::minutes(61))
        .unwrap();
    assert!(decision.should_update);
    assert_eq!(decision.deviation, I256::zero());
    assert_eq!(decision.trigger, Some(UpdateTrigger::Heartbeat));
}

#[test]
fn test_heartbeat_window_is_exclusive() {
    let decision = engine()
        .decide(&state(3, 100_000_000, 60), &quote("1.00"), Duration::minutes(60))
        .unwrap();
    assert!(!decision.should_update);
}

#[test]
fn test_both_triggers() {
    let decision = engine()
        .decide(&state(3, 100_000_000, 120), &quote("2.00"), Duration::minutes(120))
        .unwrap();
    assert_eq!(decision.trigger, Some(UpdateTrigger::Both));
}

#[test]
fn test_unparsable_quote_never_updates() {
    // an empty feed (answer 0) would make any parsed price a huge deviation
    for bad in ["", "n/a", "0", "-3"] {
        let result = engine().decide(&state(0, 0, 600), &quote(bad), Duration::minutes(600));
        assert!(matches!(result, Err(ReporterError::InvalidPrice(_))));
    }
}

#[test]
fn test_end_to_end_heartbeat_scenario() {
    let now = Utc::now();
    let feed = FeedState {
        round_id: 5,
        answer: I256::from(100_000_000i64),
        started_at: now - Duration::minutes(90),
    };
    let decision = engine()
        .decide_at(&feed, &Quote::new("1.00000000", now), now)
        .unwrap();
    assert!(decision.should_update);
    assert_eq!(decision.deviation, I256::zero());
    assert_eq!(decision.new_answer, I256::from(100_000_000i64));
    assert_eq!(decision.target_round, 6);
}

#[test]
fn test_for_feed_overrides() {
    let policy = PolicyConfig::default();
    let feed = FeedConfig {
        name: "btc".to_string(),
        url: "http://localhost".to_string(),
        price: Default::default(),
        targets: vec![],
        decimals: Some(6),
        deviation_divisor: None,
        heartbeat_minutes: Some(15),
    };
    let engine = UpdateDecisionEngine::for_feed(&policy, &feed);
    assert_eq!(engine.decimals(), 6);
    assert_eq!(engine.heartbeat(), Duration::minutes(15));
}

#[test]
fn test_last_representable_round_is_an_error() {
    let err = engine()
        .decide(&state(u64::MAX, 100_000_000, 90), &quote("2.0"), Duration::minutes(90))
        .unwrap_err();
    assert!(matches!(err, ReporterError::Internal(_)));
}

#[test]
fn test_heartbeat_window_bounds() {
    assert_eq!(heartbeat_window(60), Some(Duration::minutes(60)));
    assert_eq!(heartbeat_window(u64::MAX), None);
    assert_eq!(heartbeat_window(i64::MAX as u64), None);
}
