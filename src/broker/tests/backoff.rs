use crate::broker::BackoffPolicy;
use std::time::Duration;

#[test]
fn test_default_policy() {
    let policy = BackoffPolicy::default();
    assert_eq!(policy.base_delay, Duration::from_millis(1000));
    assert_eq!(policy.max_delay, Duration::from_millis(30000));
    assert_eq!(policy.max_retries, 5);
}

#[test]
fn test_delay_doubles_until_capped() {
    let policy = BackoffPolicy::default();
    let delays: Vec<u128> = (1..=5).map(|n| policy.delay_for(n).as_millis()).collect();
    assert_eq!(delays, vec![2000, 4000, 8000, 16000, 30000]);
    assert_eq!(policy.delay_for(0), Duration::from_millis(1000));
}

#[test]
fn test_large_attempt_numbers_stay_at_max_delay() {
    let policy = BackoffPolicy::default();
    assert_eq!(policy.delay_for(31), policy.max_delay);
    assert_eq!(policy.delay_for(32), policy.max_delay);
    assert_eq!(policy.delay_for(u32::MAX), policy.max_delay);
}

#[test]
fn test_custom_policy() {
    let policy = BackoffPolicy {
        base_delay: Duration::from_millis(50),
        max_delay: Duration::from_millis(300),
        max_retries: 2,
    };
    assert_eq!(policy.delay_for(1), Duration::from_millis(100));
    assert_eq!(policy.delay_for(2), Duration::from_millis(200));
    assert_eq!(policy.delay_for(3), Duration::from_millis(300));
}
