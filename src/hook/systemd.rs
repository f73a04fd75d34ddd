//! Service manager access

use crate::ProvisionError;
use async_trait::async_trait;
use tracing::{debug, warn};

/// Service manager seam
///
/// Starting an already running one-shot unit is left to the service manager.
#[async_trait]
pub trait ServiceController: Send + Sync {
    /// Name of this controller (e.g., "systemctl")
    fn name(&self) -> &'static str;

    /// Request that the service manager start a unit
    async fn start(&self, unit: &str) -> Result<(), ProvisionError>;
}

/// systemd via `systemctl`
pub struct Systemctl {
    program: String,
}

impl Systemctl {
    pub fn new() -> Self {
        Self {
            program: "systemctl".to_string(),
        }
    }

    /// Use a different `systemctl` binary (e.g., a wrapper)
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for Systemctl {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ServiceController for Systemctl {
    fn name(&self) -> &'static str {
        "systemctl"
    }

    async fn start(&self, unit: &str) -> Result<(), ProvisionError> {
        debug!("Running {} start {}", self.program, unit);

        let status = tokio::process::Command::new(&self.program)
            .args(["start", unit])
            .status()
            .await
            .map_err(|e| ProvisionError::Command(format!("{}: {}", self.program, e)))?;

        if !status.success() {
            warn!("{} start {} exited with {}", self.program, unit, status);
            return Err(ProvisionError::ServiceStart {
                unit: unit.to_string(),
                code: status.code(),
            });
        }

        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_start_success() {
        let controller = Systemctl::with_program("true");
        assert!(controller.start("corpdk-update-ddns.service").await.is_ok());
    }

    #[tokio::test]
    async fn test_start_failure_carries_exit_code() {
        let controller = Systemctl::with_program("false");
        let err = controller
            .start("corpdk-update-ddns.service")
            .await
            .unwrap_err();

        match err {
            ProvisionError::ServiceStart { unit, code } => {
                assert_eq!(unit, "corpdk-update-ddns.service");
                assert_eq!(code, Some(1));
            }
            other => panic!("Expected ServiceStart, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_program() {
        let controller = Systemctl::with_program("/nonexistent/systemctl");
        let err = controller.start("x.service").await.unwrap_err();
        assert!(matches!(err, ProvisionError::Command(_)));
    }
}
