mod utils;
#[allow(unused)]
use utils::*;

use mock_service::MockConfig;
use stampede::prelude::*;
use stampede::{AbortReason, Metric, THRESHOLDS_FAILED_EXIT_CODE};
use std::collections::HashSet;
use std::time::Duration;
use vote_stress::vote::{PARTICIPANTS, STATUS_CHECK};

#[tokio::test(flavor = "multi_thread")]
#[ntest::timeout(30_000)]
async fn accepted_votes_pass() {
    init();
    let (voter, service) = mock(MockConfig::default()).await;

    let summary = vote_scenario(voter)
        .options(&short_workload(&[(1_000, 10), (1_000, 10), (500, 0)]))
        .unwrap()
        .await;

    assert!(summary.passed(), "{summary}");
    assert_eq!(summary.exit_code(), 0);
    assert!(summary.aborted.is_none());
    assert_eq!(summary.value(Metric::HttpReqFailed, "rate"), Some(0.));

    let check = &summary.checks[0];
    assert_eq!(check.name, STATUS_CHECK);
    assert_eq!(check.fails, 0);

    let votes = service.votes();
    assert_eq!(votes.len() as u64, check.passes);
    assert_eq!(
        summary.value(Metric::HttpReqs, "count"),
        Some(votes.len() as f64)
    );

    let mut sessions = HashSet::new();
    for vote in &votes {
        assert!(PARTICIPANTS.contains(&(vote.participant_id as u32)));

        let parts: Vec<_> = vote.session_id.split('-').collect();
        assert_eq!(parts.len(), 3, "{}", vote.session_id);
        assert_eq!(parts[0], "stress");
        let vu: u64 = parts[1].parse().unwrap();
        parts[2].parse::<u64>().unwrap();
        assert!((1..=10).contains(&vu));

        assert!(sessions.insert(vote.session_id.clone()), "{}", vote.session_id);
    }
}

#[tokio::test(flavor = "multi_thread")]
#[ntest::timeout(30_000)]
async fn failing_votes_fail_the_run() {
    init();
    let (voter, _service) = mock(MockConfig::default().fail_every(10)).await;

    let summary = vote_scenario(voter)
        .options(&short_workload(&[(500, 5), (1_500, 5), (500, 0)]))
        .unwrap()
        .await;

    let rate = summary.value(Metric::HttpReqFailed, "rate").unwrap();
    assert!((0.08..=0.12).contains(&rate), "rate = {rate}");
    assert!(!summary.passed());
    assert_eq!(summary.exit_code(), THRESHOLDS_FAILED_EXIT_CODE);

    for result in &summary.thresholds {
        match result.metric {
            Metric::HttpReqFailed => assert!(!result.passed),
            Metric::HttpReqDuration => assert!(result.passed),
            _ => unreachable!(),
        }
    }

    let check = &summary.checks[0];
    assert!(check.fails > 0);
    assert!(check.passes > check.fails);
}

#[tokio::test(flavor = "multi_thread")]
#[ntest::timeout(30_000)]
async fn slow_votes_fail_the_run() {
    init();
    let (voter, _service) = mock(MockConfig::default().delay(Duration::from_secs(2))).await;

    let summary = vote_scenario(voter)
        .options(&short_workload(&[(100, 5), (3_000, 5), (100, 0)]))
        .unwrap()
        .await;

    let p95 = summary.value(Metric::HttpReqDuration, "p(95)").unwrap();
    assert!(p95 >= 2_000., "p95 = {p95}");
    assert!(!summary.passed());
    assert_eq!(summary.exit_code(), THRESHOLDS_FAILED_EXIT_CODE);

    for result in &summary.thresholds {
        match result.metric {
            Metric::HttpReqDuration => assert!(!result.passed),
            Metric::HttpReqFailed => assert!(result.passed),
            _ => unreachable!(),
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
#[ntest::timeout(30_000)]
async fn ramp_reaches_its_target() {
    init();
    let (voter, _service) = mock(MockConfig::default().delay(Duration::from_millis(10))).await;

    let summary = vote_scenario(voter)
        .options(&short_workload(&[(2_000, 20)]))
        .unwrap()
        .await;

    assert!(summary.passed(), "{summary}");
    assert_eq!(summary.value(Metric::Vus, "max"), Some(20.));
    assert_eq!(summary.vus_max, 20);
}

#[tokio::test(flavor = "multi_thread")]
#[ntest::timeout(30_000)]
async fn abort_on_fail_stops_the_run() {
    init();
    let (voter, _service) = mock(MockConfig::default().fail_every(2)).await;

    let options = Options::from_json(
        r#"{
            "stages": [
                { "duration": "1s", "target": 5 },
                { "duration": "1m", "target": 5 }
            ],
            "thresholds": {
                "http_req_failed": [
                    { "threshold": "rate<0.05", "abortOnFail": true, "delayAbortEval": "500ms" }
                ]
            },
            "gracefulStop": "1s"
        }"#,
    )
    .unwrap();

    let summary = vote_scenario(voter).options(&options).unwrap().await;

    assert!(matches!(summary.aborted, Some(AbortReason::Threshold(_))));
    assert!(summary.elapsed < Duration::from_secs(10));
    assert!(summary.elapsed >= Duration::from_millis(500));
    assert_eq!(summary.exit_code(), THRESHOLDS_FAILED_EXIT_CODE);
}

#[tokio::test(flavor = "multi_thread")]
#[ntest::timeout(30_000)]
async fn unreachable_service_fails_checks_without_stopping() {
    init();
    // Bind then drop to get a port nothing listens on.
    let addr = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap();

    let summary = vote_scenario(client(addr))
        .options(&short_workload(&[(500, 2), (500, 2)]))
        .unwrap()
        .await;

    assert!(summary.aborted.is_none());
    assert_eq!(summary.value(Metric::HttpReqFailed, "rate"), Some(1.));
    assert_eq!(summary.checks[0].passes, 0);
    assert!(summary.checks[0].fails > 0);
    assert!(!summary.passed());
}

#[tokio::test(flavor = "multi_thread")]
#[ntest::timeout(30_000)]
async fn other_statuses_fail_the_check() {
    init();

    for status in [200, 400] {
        let (voter, service) = mock(MockConfig::default().respond_with(status)).await;

        let summary = vote_scenario(voter)
            .options(&short_workload(&[(200, 3), (500, 3)]))
            .unwrap()
            .await;

        let check = &summary.checks[0];
        assert_eq!(check.name, STATUS_CHECK);
        assert_eq!(check.passes, 0, "{status}");
        assert!(check.fails > 0, "{status}");
        assert_eq!(check.fails, service.requests());
        assert_eq!(summary.value(Metric::HttpReqFailed, "rate"), Some(1.));
        assert!(!summary.passed());
    }
}

#[cfg(feature = "integration")]
mod integration {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn one_minute_ramp_to_100() {
        init();
        let (voter, _service) = mock(MockConfig::default().delay(Duration::from_millis(50))).await;

        let summary = vote_scenario(voter)
            .options(&short_workload(&[(60_000, 100)]))
            .unwrap()
            .await;

        assert!(summary.passed(), "{summary}");
        assert_eq!(summary.value(Metric::Vus, "max"), Some(100.));
        assert!(summary.elapsed >= Duration::from_secs(60));
    }
}
