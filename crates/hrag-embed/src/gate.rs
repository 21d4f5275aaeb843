//! Admission gate for outbound model calls.
//!
//! Every request holds a permit while in flight, so the number of
//! concurrent calls never exceeds the configured limit. Cancelling the
//! gate stops new admissions; calls already holding a permit run to
//! completion.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use hrag_core::ServiceError;

#[derive(Clone, Debug)]
pub struct CallGate {
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
    limit: usize,
}

impl CallGate {
    pub fn new(limit: usize) -> Self {
        Self::with_token(limit, CancellationToken::new())
    }

    pub fn with_token(limit: usize, cancel: CancellationToken) -> Self {
        let limit = limit.max(1);
        Self { semaphore: Arc::new(Semaphore::new(limit)), cancel, limit }
    }

    /// Wait for a free slot. Fails with `Cancelled` once the gate is cancelled.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, ServiceError> {
        if self.cancel.is_cancelled() {
            return Err(ServiceError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ServiceError::Cancelled),
            permit = self.semaphore.clone().acquire_owned() => permit.map_err(|_| ServiceError::Cancelled),
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }

    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn in_flight(&self) -> usize {
        self.limit - self.semaphore.available_permits()
    }
}
