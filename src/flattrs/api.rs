use async_trait::async_trait;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundFlattr {
    pub url: String,
}

/// How the remote API answered a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Success,
    /// Credentials were refused; the user has to log in again.
    AuthFailure,
    /// The subscription lapsed.
    PaymentRequired,
    /// Network trouble or a server error; try again later.
    Retryable,
    /// The batch was understood and refused. Resending will not help.
    Rejected,
}

/// Remote end of the outbound queue.
#[async_trait]
pub trait FlattrApi: Send + Sync {
    async fn submit(&self, batch: &[OutboundFlattr]) -> SubmitOutcome;
}
