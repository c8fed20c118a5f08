//! Set-point actuation and bounded confirmation waits
//!
//! The gateway sends set points through an [`Actuator`] and can block until
//! the wallbox confirms the change. Waits poll the telemetry registers at a
//! fixed interval and always end at the timeout; they never fail. Time is
//! taken from an injectable [`Clock`] so tests can simulate minutes of
//! waiting without real delay.

use crate::connection::CHARGING_CODE;
use crate::error::Result;
use crate::logging::{StructuredLogger, get_logger};
use crate::telemetry::{TelemetryChannel, TelemetryStore};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

/// Sink for set-point commands
#[async_trait]
pub trait Actuator: Send + Sync {
    /// Publish the maximum charge current in amps
    async fn publish_setpoint(&self, amps: i32) -> Result<()>;

    /// Release the underlying connection
    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }
}

/// Monotonic time source used by the regulator
#[async_trait]
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock was created
    fn elapsed(&self) -> Duration;

    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by the tokio timer
#[derive(Debug, Clone)]
pub struct TokioClock {
    origin: tokio::time::Instant,
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

#[async_trait]
impl Clock for TokioClock {
    fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Issues set points and waits for the wallbox to follow
pub struct ActuatorGateway {
    actuator: Arc<dyn Actuator>,
    telemetry: Arc<TelemetryStore>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
    last_sent: AtomicI32,
    logger: StructuredLogger,
}

/// Marker stored in `last_sent` before the first command
const NOTHING_SENT: i32 = -1;

impl ActuatorGateway {
    pub fn new(
        actuator: Arc<dyn Actuator>,
        telemetry: Arc<TelemetryStore>,
        clock: Arc<dyn Clock>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            actuator,
            telemetry,
            clock,
            poll_interval: poll_interval.max(Duration::from_millis(1)),
            last_sent: AtomicI32::new(NOTHING_SENT),
            logger: get_logger("actuator"),
        }
    }

    /// Send a set point. Publish failures are logged and absorbed.
    pub async fn set_current(&self, amps: i32) {
        self.logger.debug(&format!("Adjusting current to {} A", amps));
        match self.actuator.publish_setpoint(amps).await {
            Ok(()) => self.last_sent.store(amps, Ordering::Relaxed),
            Err(e) => self
                .logger
                .error(&format!("Failed to publish set point {} A: {}", amps, e)),
        }
    }

    /// Last set point accepted by the actuator
    pub fn last_sent(&self) -> Option<i32> {
        match self.last_sent.load(Ordering::Relaxed) {
            NOTHING_SENT => None,
            amps => Some(amps),
        }
    }

    /// Poll the connection state until the wallbox reports charging.
    ///
    /// Returns whether charging started before `timeout`.
    pub async fn await_charging_started(&self, timeout: Duration) -> bool {
        self.logger
            .info(&format!("Waiting for charging to start (state {})", CHARGING_CODE));
        let telemetry = self.telemetry.clone();
        let waited = self
            .wait_until(timeout, move || telemetry.connection_code() == CHARGING_CODE)
            .await;

        match waited {
            Some(after) => {
                self.logger.info(&format!(
                    "Vehicle started charging after {} seconds",
                    after.as_secs()
                ));
                true
            }
            None => {
                self.logger
                    .warn("Timeout reached, vehicle did not start charging");
                false
            }
        }
    }

    /// Poll the consumption register until it differs from `previous`.
    ///
    /// Returns whether a change was observed before `timeout`.
    pub async fn await_consumption_change(&self, previous: f64, timeout: Duration) -> bool {
        let telemetry = self.telemetry.clone();
        let waited = self
            .wait_until(timeout, move || {
                telemetry.latest(TelemetryChannel::WallboxConsumption) != previous
            })
            .await;

        match waited {
            Some(after) => {
                self.logger.debug(&format!(
                    "Consumption changed from {} after {} seconds",
                    previous,
                    after.as_secs()
                ));
                true
            }
            None => {
                self.logger.warn(&format!(
                    "Timeout reached, consumption still {}",
                    previous
                ));
                false
            }
        }
    }

    /// Release the actuator connection
    pub async fn disconnect(&self) -> Result<()> {
        self.actuator.disconnect().await
    }

    /// Poll `condition` until it holds or `timeout` elapses. Returns the
    /// elapsed time on success.
    async fn wait_until<F>(&self, timeout: Duration, condition: F) -> Option<Duration>
    where
        F: Fn() -> bool + Send,
    {
        let start = self.clock.elapsed();
        loop {
            let waited = self.clock.elapsed().saturating_sub(start);
            if condition() {
                return Some(waited);
            }
            if waited >= timeout {
                return None;
            }
            let remaining = timeout - waited;
            self.clock.sleep(self.poll_interval.min(remaining)).await;
        }
    }
}
