//! Broker availability probe
//!
//! Opens a short-lived connection and closes it again. Used by the `check`
//! command and before starting a durable backend.

use crate::broker::transport::{BrokerConnector, FailureSignal};
use crate::broker::{BrokerError, BrokerResult};
use crate::core::retry::{retry_async, RetryPolicy};
use std::time::Duration;

pub const DEFAULT_PROBE_ATTEMPTS: usize = 5;
pub const DEFAULT_PROBE_DELAY: Duration = Duration::from_secs(5);

/// Connect once and close the connection again
pub async fn check_broker(connector: &dyn BrokerConnector) -> BrokerResult<()> {
    let connection = connector.connect(FailureSignal::noop()).await?;
    if let Err(e) = connection.close().await {
        log::debug!("Ignoring error while closing probe connection: {}", e);
    }
    Ok(())
}

/// Probe the broker until it answers or `attempts` probes have failed
pub async fn wait_for_broker(
    connector: &dyn BrokerConnector,
    attempts: usize,
    delay: Duration,
) -> BrokerResult<()> {
    let endpoint = connector.endpoint();
    let policy = RetryPolicy {
        max_attempts: attempts,
        delay,
    };

    let result = retry_async("broker_probe", policy, |attempt| {
        let endpoint = endpoint.as_str();
        async move {
            log::info!(
                "Checking message broker at {} (attempt {}/{})",
                endpoint,
                attempt,
                attempts.max(1)
            );
            check_broker(connector).await
        }
    })
    .await;

    match result {
        Ok(()) => {
            log::info!("Message broker at {} is available", endpoint);
            Ok(())
        }
        Err(e) => {
            log::error!("Message broker at {} is not available: {}", endpoint, e);
            Err(BrokerError::connection(format!(
                "broker at {endpoint} unavailable after {} attempts: {e}",
                attempts.max(1)
            )))
        }
    }
}
