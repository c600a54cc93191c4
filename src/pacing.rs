use std::time::Duration;

use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaceStep {
    BetweenTheaters,
    BetweenDates,
}

/// Paces requests to the showtime source, which rate-limits informally.
#[async_trait]
pub trait Pacer: Send + Sync {
    async fn pause(&self, step: PaceStep);
}

#[derive(Debug, Clone, Copy)]
pub struct FixedPacing {
    pub between_theaters: Duration,
    pub between_dates: Duration,
}

impl Default for FixedPacing {
    fn default() -> Self {
        Self {
            between_theaters: Duration::from_secs(1),
            between_dates: Duration::from_secs(2),
        }
    }
}

#[async_trait]
impl Pacer for FixedPacing {
    async fn pause(&self, step: PaceStep) {
        let delay = match step {
            PaceStep::BetweenTheaters => self.between_theaters,
            PaceStep::BetweenDates => self.between_dates,
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// No waiting at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPacing;

#[async_trait]
impl Pacer for NoPacing {
    async fn pause(&self, _step: PaceStep) {}
}
