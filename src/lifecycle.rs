//! Process lifecycle: shutdown signals and the guaranteed release
//!
//! Whatever ends the regulator (a signal, an error or a panic), the wallbox
//! must be left at 0 A with the transport closed. [`Lifecycle::release`]
//! does that exactly once.

use crate::actuator::Actuator;
use crate::logging::{StructuredLogger, get_logger};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::signal;

pub struct Lifecycle {
    actuator: Arc<dyn Actuator>,
    released: AtomicBool,
    logger: StructuredLogger,
}

impl Lifecycle {
    pub fn new(actuator: Arc<dyn Actuator>) -> Self {
        Self {
            actuator,
            released: AtomicBool::new(false),
            logger: get_logger("lifecycle"),
        }
    }

    /// Set point 0, disconnect, stop banner. Returns `false` if already done.
    pub async fn release(&self) -> bool {
        if self.released.swap(true, Ordering::SeqCst) {
            self.logger.debug("Release already performed");
            return false;
        }

        self.logger.info("------------ Stopping regulator ------------");
        if let Err(e) = self.actuator.publish_setpoint(0).await {
            self.logger
                .error(&format!("Failed to reset set point to 0 A: {}", e));
        }
        if let Err(e) = self.actuator.disconnect().await {
            self.logger.warn(&format!("Disconnect failed: {}", e));
        }
        true
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

/// Resolves on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let logger = get_logger("lifecycle");

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            logger.error(&format!("Ctrl+C handler failed: {}", e));
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                logger.error(&format!("SIGTERM handler failed: {}", e));
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! { _ = ctrl_c => {}, _ = terminate => {}, }
    logger.info("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingActuator {
        log: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Actuator for RecordingActuator {
        async fn publish_setpoint(&self, amps: i32) -> Result<()> {
            self.log.lock().unwrap().push(format!("set {}", amps));
            Ok(())
        }

        async fn disconnect(&self) -> Result<()> {
            self.log.lock().unwrap().push("disconnect".to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn release_runs_exactly_once() {
        let actuator = Arc::new(RecordingActuator::default());
        let lifecycle = Lifecycle::new(actuator.clone());

        assert!(!lifecycle.is_released());
        assert!(lifecycle.release().await);
        assert!(!lifecycle.release().await);
        assert!(lifecycle.is_released());
        assert_eq!(
            *actuator.log.lock().unwrap(),
            vec!["set 0".to_string(), "disconnect".to_string()]
        );
    }

    #[tokio::test]
    async fn concurrent_release_publishes_once() {
        let actuator = Arc::new(RecordingActuator::default());
        let lifecycle = Arc::new(Lifecycle::new(actuator.clone()));

        let a = tokio::spawn({
            let l = lifecycle.clone();
            async move { l.release().await }
        });
        let b = tokio::spawn({
            let l = lifecycle.clone();
            async move { l.release().await }
        });
        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        assert!(a ^ b);
        assert_eq!(actuator.log.lock().unwrap().len(), 2);
    }
}
