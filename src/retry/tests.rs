use super::*;
use yare::parameterized;

fn endpoints(count: usize) -> Vec<Endpoint> {
    ["west", "east", "north", "south"]
        .iter()
        .take(count)
        .map(|region| Endpoint::parse(&format!("https://{region}.example.net/")).unwrap())
        .collect()
}

fn factory(options: RetryOptions, endpoint_count: usize) -> RetryPolicyFactory {
    RetryPolicyFactory::new(options, endpoints(endpoint_count))
}

fn policy() -> RetryPolicy {
    factory(RetryOptions::default(), 3).get_request_policy()
}

#[parameterized(
    throttled = { 429, None, FailureKind::Throttled },
    throttled_with_sub_status = { 429, Some(3200), FailureKind::Throttled },
    session = { 404, Some(1002), FailureKind::SessionStale },
    not_found = { 404, None, FailureKind::NonRetriable },
    not_found_zero = { 404, Some(0), FailureKind::NonRetriable },
    write_forbidden = { 403, Some(3), FailureKind::EndpointUnavailable },
    account_not_found = { 403, Some(1008), FailureKind::EndpointUnavailable },
    forbidden = { 403, None, FailureKind::NonRetriable },
    unauthorized = { 401, None, FailureKind::NonRetriable },
    bad_request = { 400, None, FailureKind::NonRetriable },
    conflict = { 409, None, FailureKind::NonRetriable },
    gone = { 410, None, FailureKind::EndpointUnavailable },
    unavailable = { 503, None, FailureKind::EndpointUnavailable },
    internal = { 500, None, FailureKind::NonRetriable },
)]
fn test_classify(status: u16, sub_status: Option<u32>, expected: FailureKind) {
    assert_eq!(FailureKind::classify(status, sub_status), expected);
}

#[test]
fn test_fresh_policy_is_idle() {
    let policy = policy();
    assert_eq!(policy.state(), RetryState::Idle);
    assert_eq!(policy.attempt_count(), 0);
    assert_eq!(policy.cumulative_backoff(), Duration::ZERO);
    assert_eq!(policy.last_failure(), None);
    assert_eq!(policy.current_endpoint().unwrap().host(), "west.example.net");
}

#[test]
fn test_throttle_with_hint_uses_hint() {
    let mut policy = policy();
    let decision = policy
        .on_failure(
            FailureKind::Throttled,
            Some(429),
            Some(Duration::from_millis(200)),
        )
        .unwrap();
    assert!(decision.should_retry);
    assert_eq!(decision.backoff, Duration::from_millis(200));
    assert_eq!(decision.target_endpoint, None);
    assert_eq!(policy.state(), RetryState::Retrying);
    assert_eq!(policy.cumulative_backoff(), Duration::from_millis(200));
}

#[test]
fn test_throttle_without_hint_backs_off_exponentially_up_to_cap() {
    let options = RetryOptions::default()
        .with_initial_backoff(Duration::from_millis(100))
        .with_max_retry_backoff(Duration::from_millis(500))
        .with_retry_budget(Duration::from_secs(60));
    let mut policy = factory(options, 1).get_request_policy();

    let backoffs: Vec<u128> = (0..5)
        .map(|_| {
            let decision = policy.on_failure(FailureKind::Throttled, Some(429), None).unwrap();
            assert!(policy.begin_attempt());
            decision.backoff.as_millis()
        })
        .collect();
    assert_eq!(backoffs, vec![100, 200, 400, 500, 500]);
}

#[test]
fn test_throttle_attempt_limit_exhausts() {
    let options = RetryOptions::default().with_max_retry_attempts(2);
    let mut policy = factory(options, 1).get_request_policy();

    for _ in 0..2 {
        let decision = policy.on_failure(FailureKind::Throttled, Some(429), None).unwrap();
        assert!(decision.should_retry);
        policy.begin_attempt();
    }
    let decision = policy.on_failure(FailureKind::Throttled, Some(429), None).unwrap();
    assert!(!decision.should_retry);
    assert_eq!(policy.state(), RetryState::Exhausted);
    assert_eq!(policy.attempt_count(), 3);
}

#[test]
fn test_budget_is_never_exceeded() {
    let options = RetryOptions::default()
        .with_max_retry_attempts(100)
        .with_retry_budget(Duration::from_millis(1_000));
    let mut policy = factory(options, 1).get_request_policy();

    let hint = Some(Duration::from_millis(300));
    for _ in 0..3 {
        let decision = policy.on_failure(FailureKind::Throttled, Some(429), hint).unwrap();
        assert!(decision.should_retry);
        assert!(policy.cumulative_backoff() <= Duration::from_millis(1_000));
        policy.begin_attempt();
    }

    let err = policy
        .on_failure(FailureKind::Throttled, Some(429), hint)
        .unwrap_err();
    assert_eq!(
        err,
        RequestError::RetryBudgetExceeded {
            attempts: 4,
            cumulative_backoff: Duration::from_millis(900),
        }
    );
    assert_eq!(policy.state(), RetryState::Exhausted);
    assert_eq!(policy.cumulative_backoff(), Duration::from_millis(900));
}

#[test]
fn test_backoff_exactly_at_budget_is_allowed() {
    let options = RetryOptions::default().with_retry_budget(Duration::from_millis(200));
    let mut policy = factory(options, 1).get_request_policy();
    let decision = policy
        .on_failure(
            FailureKind::Throttled,
            Some(429),
            Some(Duration::from_millis(200)),
        )
        .unwrap();
    assert!(decision.should_retry);
}

#[test]
fn test_failover_walks_ranked_endpoints_once() {
    let mut policy = policy();

    let first = policy
        .on_failure(FailureKind::EndpointUnavailable, None, None)
        .unwrap();
    assert_eq!(first.target_endpoint.unwrap().host(), "east.example.net");
    assert_eq!(first.backoff, Duration::ZERO);
    policy.begin_attempt();

    let second = policy
        .on_failure(FailureKind::EndpointUnavailable, Some(503), None)
        .unwrap();
    assert_eq!(second.target_endpoint.unwrap().host(), "north.example.net");
    assert_eq!(policy.current_endpoint().unwrap().host(), "north.example.net");
    policy.begin_attempt();

    let third = policy
        .on_failure(FailureKind::EndpointUnavailable, None, None)
        .unwrap();
    assert!(!third.should_retry);
    assert_eq!(policy.state(), RetryState::Exhausted);
}

#[test]
fn test_exhausted_policy_never_retries_again() {
    let mut policy = factory(RetryOptions::default(), 1).get_request_policy();
    let decision = policy
        .on_failure(FailureKind::EndpointUnavailable, None, None)
        .unwrap();
    assert!(!decision.should_retry);
    assert!(!policy.begin_attempt());

    for kind in [
        FailureKind::Throttled,
        FailureKind::SessionStale,
        FailureKind::EndpointUnavailable,
    ] {
        let decision = policy.on_failure(kind, None, None).unwrap();
        assert_eq!(decision, RetryDecision::stop());
    }
    assert_eq!(policy.state(), RetryState::Exhausted);
    assert_eq!(policy.attempt_count(), 1);
}

#[test]
fn test_failover_without_endpoints_exhausts() {
    let mut policy = factory(RetryOptions::default(), 0).get_request_policy();
    assert!(policy.current_endpoint().is_none());
    let decision = policy
        .on_failure(FailureKind::EndpointUnavailable, None, None)
        .unwrap();
    assert!(!decision.should_retry);
}

#[test]
fn test_failover_backoff_counts_against_budget() {
    let options = RetryOptions::default()
        .with_endpoint_failover_backoff(Duration::from_millis(600))
        .with_retry_budget(Duration::from_secs(1));
    let mut policy = factory(options, 3).get_request_policy();

    let decision = policy
        .on_failure(FailureKind::EndpointUnavailable, None, None)
        .unwrap();
    assert_eq!(decision.backoff, Duration::from_millis(600));
    policy.begin_attempt();
    assert!(matches!(
        policy.on_failure(FailureKind::EndpointUnavailable, None, None),
        Err(RequestError::RetryBudgetExceeded { attempts: 2, .. })
    ));
}

#[parameterized(
    not_found = { 404 },
    unauthorized = { 401 },
    bad_request = { 400 },
)]
fn test_non_retriable_at_idle_is_terminal(status: u16) {
    let mut policy = policy();
    let decision = policy
        .on_failure(FailureKind::classify(status, None), Some(status), None)
        .unwrap();
    assert!(!decision.should_retry);
    assert_eq!(policy.state(), RetryState::Terminal);
    assert_eq!(policy.attempt_count(), 1);
}

#[test]
fn test_session_retries_are_immediate_and_bounded() {
    let options = RetryOptions::default().with_max_session_retries(2);
    let mut policy = factory(options, 2).get_request_policy();

    for _ in 0..2 {
        let decision = policy
            .on_failure(FailureKind::SessionStale, Some(404), None)
            .unwrap();
        assert!(decision.should_retry);
        assert_eq!(decision.backoff, Duration::ZERO);
        assert_eq!(decision.target_endpoint, None);
        policy.begin_attempt();
    }
    let decision = policy
        .on_failure(FailureKind::SessionStale, Some(404), None)
        .unwrap();
    assert!(!decision.should_retry);
    assert_eq!(policy.state(), RetryState::Exhausted);
}

#[test]
fn test_session_retries_do_not_consume_throttle_attempts() {
    let options = RetryOptions::default()
        .with_max_retry_attempts(1)
        .with_max_session_retries(3);
    let mut policy = factory(options, 1).get_request_policy();

    for _ in 0..3 {
        assert!(
            policy
                .on_failure(FailureKind::SessionStale, Some(404), None)
                .unwrap()
                .should_retry
        );
        policy.begin_attempt();
    }
    let decision = policy
        .on_failure(FailureKind::Throttled, Some(429), None)
        .unwrap();
    assert!(decision.should_retry);
    assert_eq!(policy.attempt_count(), 4);
}

#[test]
fn test_configured_status_overrides_throttling() {
    let options = RetryOptions::default().with_non_retriable_status(429);
    let mut policy = factory(options, 2).get_request_policy();
    let decision = policy
        .on_failure(
            FailureKind::Throttled,
            Some(429),
            Some(Duration::from_millis(10)),
        )
        .unwrap();
    assert!(!decision.should_retry);
    assert_eq!(policy.state(), RetryState::Terminal);
}

#[test]
fn test_configured_status_overrides_failover() {
    let options = RetryOptions::default().with_non_retriable_status(503);
    let mut policy = factory(options, 3).get_request_policy();
    let decision = policy
        .on_failure(FailureKind::EndpointUnavailable, Some(503), None)
        .unwrap();
    assert!(!decision.should_retry);
    assert_eq!(policy.state(), RetryState::Terminal);
}

#[test]
fn test_cancel_is_final_and_side_effect_free() {
    let mut policy = policy();
    policy
        .on_failure(
            FailureKind::Throttled,
            Some(429),
            Some(Duration::from_millis(50)),
        )
        .unwrap();
    policy.cancel();
    assert_eq!(policy.state(), RetryState::Cancelled);
    assert!(!policy.begin_attempt());

    let decision = policy
        .on_failure(FailureKind::Throttled, Some(429), None)
        .unwrap();
    assert!(!decision.should_retry);
    assert_eq!(policy.attempt_count(), 1);
    assert_eq!(policy.cumulative_backoff(), Duration::from_millis(50));
}

#[test]
fn test_cancel_does_not_override_terminal() {
    let mut policy = policy();
    policy
        .on_failure(FailureKind::NonRetriable, Some(404), None)
        .unwrap();
    policy.cancel();
    assert_eq!(policy.state(), RetryState::Terminal);
}

#[test]
fn test_factory_policies_are_independent() {
    let factory = factory(RetryOptions::default().with_max_retry_attempts(1), 2);
    let mut first = factory.get_request_policy();
    first
        .on_failure(FailureKind::EndpointUnavailable, None, None)
        .unwrap();
    first.begin_attempt();
    first.on_failure(FailureKind::Throttled, Some(429), None).unwrap();
    first.begin_attempt();
    first.on_failure(FailureKind::Throttled, Some(429), None).unwrap();
    assert_eq!(first.state(), RetryState::Exhausted);

    let mut second = factory.clone().get_request_policy();
    assert_eq!(second.state(), RetryState::Idle);
    assert_eq!(second.current_endpoint().unwrap().host(), "west.example.net");
    let decision = second
        .on_failure(FailureKind::EndpointUnavailable, None, None)
        .unwrap();
    assert_eq!(decision.target_endpoint.unwrap().host(), "east.example.net");
}

#[test]
fn test_options_deserialize_with_defaults() {
    let options: RetryOptions = serde_json::from_value(serde_json::json!({
        "max_retry_attempts": 3,
        "retry_budget": { "secs": 10, "nanos": 0 }
    }))
    .unwrap();
    assert_eq!(options.max_retry_attempts, 3);
    assert_eq!(options.retry_budget, Duration::from_secs(10));
    assert_eq!(options.initial_backoff, RetryOptions::default().initial_backoff);
    assert!(options.non_retriable_statuses.is_empty());
}
