use rand::Rng;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use stampede::{check, transaction, Iteration};
use std::ops::RangeInclusive;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, trace};

/// Name of the check recorded for every vote.
pub const STATUS_CHECK: &str = "status é 202";

/// Participant ids votes are spread over.
pub const PARTICIPANTS: RangeInclusive<u32> = 1..=10;

/// Body of a vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    #[serde(rename = "participanteId")]
    pub participant_id: u32,
    pub session_id: String,
}

impl VoteRequest {
    /// A vote for a random participant, tagged with the VU and iteration that cast it.
    pub fn new<R: Rng + ?Sized>(iteration: Iteration, rng: &mut R) -> Self {
        Self {
            participant_id: rng.gen_range(PARTICIPANTS),
            session_id: session_id(iteration),
        }
    }
}

pub fn session_id(iteration: Iteration) -> String {
    format!("stress-{}-{}", iteration.vu, iteration.iteration)
}

#[derive(Debug, Error)]
pub enum VoteError {
    #[error("Vote request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Vote answered with {0} instead of 202 Accepted")]
    UnexpectedStatus(StatusCode),
}

impl VoteError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            VoteError::Transport(err) => err.status(),
            VoteError::UnexpectedStatus(status) => Some(*status),
        }
    }
}

/// Client casting votes against a single endpoint.
#[derive(Debug, Clone)]
pub struct VoteClient {
    client: Client,
    url: String,
}

impl VoteClient {
    /// `timeout` bounds each request as a whole, connection included.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, VoteError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// One iteration of the workload: a single vote, checked for `202 Accepted`.
    ///
    /// Failures are only recorded; they never stop the VU. Votes are not retried.
    #[instrument(level = "trace", skip(self))]
    pub async fn cast(&self, iteration: Iteration) -> bool {
        let request = VoteRequest::new(iteration, &mut rand::thread_rng());

        let res = self.submit(&request).await;
        if let Err(err) = &res {
            debug!(status = ?err.status(), "Vote {} failed: {err}", request.session_id);
        }

        check(STATUS_CHECK, res.is_ok())
    }

    /// POSTs the vote as JSON. Anything other than `202 Accepted` is an error.
    #[transaction]
    pub async fn submit(&self, request: &VoteRequest) -> Result<StatusCode, VoteError> {
        let response = self.client.post(&self.url).json(request).send().await?;

        match response.status() {
            StatusCode::ACCEPTED => {
                trace!("Vote {} accepted", request.session_id);
                Ok(StatusCode::ACCEPTED)
            }
            status => Err(VoteError::UnexpectedStatus(status)),
        }
    }
}
