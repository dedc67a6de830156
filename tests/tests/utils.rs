use mock_service::{MockConfig, MockService};
use stampede::prelude::*;
use stampede::Scenario;
use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::error;
use tracing_subscriber::FmtSubscriber;
use vote_stress::{vote_workload, VoteClient};

#[allow(unused)]
pub fn init() {
    static ONCE_LOCK: OnceLock<()> = OnceLock::new();

    ONCE_LOCK.get_or_init(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            default_panic(info);
            error!("Panic occurred: {info:?}");
        }));

        let _ = FmtSubscriber::builder()
            .with_env_filter("stampede=debug,vote_stress=debug,mock_service=info")
            .try_init();
    });
}

/// Mock voting service on an ephemeral port, and a client pointed at it.
#[allow(unused)]
pub async fn mock(config: MockConfig) -> (VoteClient, MockService) {
    let (addr, service) = mock_service::spawn(config).await.unwrap();
    (client(addr), service)
}

#[allow(unused)]
pub fn client(addr: SocketAddr) -> VoteClient {
    VoteClient::new(
        format!("http://{addr}{}", mock_service::VOTE_ROUTE),
        Duration::from_secs(10),
    )
    .unwrap()
}

/// The vote workload cast by `voter`.
#[allow(unused)]
pub fn vote_scenario(voter: VoteClient) -> impl ConfigurableScenario<RunSummary> {
    Scenario::new("vote", move |iteration: Iteration| {
        let voter = voter.clone();
        async move {
            voter.cast(iteration).await;
        }
    })
}

/// The vote workload's thresholds over a shorter ramp.
#[allow(unused)]
pub fn short_workload(stages: &[(u64, usize)]) -> Options {
    Options {
        stages: stages
            .iter()
            .map(|(ms, target)| Stage::new(Duration::from_millis(*ms), *target))
            .collect(),
        ..vote_workload()
    }
}
