//! Convergence polling for asynchronous container commands
//!
//! Engine commands return once accepted, not once the container settles. The
//! poller re-reads the container state at a fixed interval, for a bounded
//! number of attempts, until it lands in a success or failure state.

use crate::docker::{ContainerState, Docker};
use crate::errors::Result;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Bounds for a single convergence wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    /// Number of state reads before giving up
    pub max_attempts: u32,
    /// Delay before each read
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            interval: Duration::from_secs(1),
        }
    }
}

impl PollConfig {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// Poll bound with no delay between reads
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }
}

/// Result of waiting for a container to settle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// A success state was observed
    Converged(ContainerState),
    /// A failure state was observed; logs were fetched at that point
    Failed { state: ContainerState, logs: String },
    /// Attempts ran out first
    TimedOut {
        last_state: ContainerState,
        attempts: u32,
    },
}

/// Wait until the container named `name` reaches a state in `success` or
/// `failure`.
///
/// A missing container reads as [`ContainerState::Absent`], which only
/// resolves the wait when one of the sets contains it.
#[instrument(level = "debug", skip(docker, config))]
pub async fn await_state<D>(
    docker: &D,
    name: &str,
    success: &[ContainerState],
    failure: &[ContainerState],
    config: &PollConfig,
) -> Result<PollOutcome>
where
    D: Docker + ?Sized,
{
    let mut last_state = ContainerState::Absent;

    for attempt in 1..=config.max_attempts {
        tokio::time::sleep(config.interval).await;

        last_state = docker
            .inspect_container(name)
            .await?
            .map(|info| info.state)
            .unwrap_or(ContainerState::Absent);
        debug!(
            "Poll attempt {} of {}: {} is {}",
            attempt, config.max_attempts, name, last_state
        );

        if success.contains(&last_state) {
            return Ok(PollOutcome::Converged(last_state));
        }

        if failure.contains(&last_state) {
            let logs = docker.container_logs(name).await?;
            return Ok(PollOutcome::Failed {
                state: last_state,
                logs,
            });
        }
    }

    warn!(
        "{} did not converge after {} attempts, last state {}",
        name, config.max_attempts, last_state
    );
    Ok(PollOutcome::TimedOut {
        last_state,
        attempts: config.max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docker::mock::{MockContainer, MockDocker};
    use ContainerState::*;

    const FAILURE: &[ContainerState] = &[Exited, Dead];

    #[test]
    fn test_default_bounds() {
        let config = PollConfig::default();
        assert_eq!(config.max_attempts, 10);
        assert_eq!(config.interval, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_converges_on_third_read() {
        let mock = MockDocker::new();
        mock.script_states("bot", &[Absent, Created, Running]);

        let outcome = await_state(&mock, "bot", &[Running], FAILURE, &PollConfig::immediate(10))
            .await
            .unwrap();

        assert_eq!(outcome, PollOutcome::Converged(Running));
        assert_eq!(mock.inspect_count(), 3);
    }

    #[tokio::test]
    async fn test_times_out_when_attempts_run_out() {
        let mock = MockDocker::new();
        mock.script_states("bot", &[Absent, Created, Running]);

        let outcome = await_state(&mock, "bot", &[Running], FAILURE, &PollConfig::immediate(2))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            PollOutcome::TimedOut {
                last_state: Created,
                attempts: 2
            }
        );
        assert_eq!(mock.inspect_count(), 2);
    }

    #[tokio::test]
    async fn test_failure_state_returns_logs() {
        let mock = MockDocker::new();
        mock.add_container(
            MockContainer::new("bot", "trading-bot")
                .with_state(Created)
                .with_logs("Error: Config file not found at /app/data/dsl.txt\n"),
        );
        mock.script_states("bot", &[Created, Dead, Running]);

        let outcome = await_state(&mock, "bot", &[Running], FAILURE, &PollConfig::immediate(10))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            PollOutcome::Failed {
                state: Dead,
                logs: "Error: Config file not found at /app/data/dsl.txt\n".to_string()
            }
        );
        assert_eq!(mock.inspect_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_interval_before_each_read() {
        let mock = MockDocker::new();
        mock.add_container(MockContainer::new("bot", "trading-bot").with_state(Restarting));

        let started = tokio::time::Instant::now();
        let outcome = await_state(
            &mock,
            "bot",
            &[Running],
            FAILURE,
            &PollConfig::new(3, Duration::from_secs(1)),
        )
        .await
        .unwrap();

        assert!(matches!(outcome, PollOutcome::TimedOut { attempts: 3, .. }));
        assert!(started.elapsed() >= Duration::from_secs(3));
    }
}
