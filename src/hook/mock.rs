//! Mock service controller for testing
//!
//! Records every unit start request instead of talking to systemd.

use async_trait::async_trait;
use std::sync::Mutex;

use super::ServiceController;
use crate::ProvisionError;

/// Mock service controller
///
/// # Example
/// ```
/// use corpdk_provision::hook::mock::MockServiceController;
///
/// let mock = MockServiceController::new().with_exit_code(3);
/// assert!(mock.started().is_empty());
/// ```
pub struct MockServiceController {
    started: Mutex<Vec<String>>,
    exit_code: Option<i32>,
}

impl MockServiceController {
    /// Create a controller whose starts always succeed
    pub fn new() -> Self {
        Self {
            started: Mutex::new(Vec::new()),
            exit_code: None,
        }
    }

    /// Make every start fail with the given exit code
    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    /// Units requested so far, in order
    pub fn started(&self) -> Vec<String> {
        self.started
            .lock()
            .map(|units| units.clone())
            .unwrap_or_default()
    }
}

impl Default for MockServiceController {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ServiceController for MockServiceController {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn start(&self, unit: &str) -> Result<(), ProvisionError> {
        if let Ok(mut units) = self.started.lock() {
            units.push(unit.to_string());
        }

        match self.exit_code {
            Some(code) => Err(ProvisionError::ServiceStart {
                unit: unit.to_string(),
                code: Some(code),
            }),
            None => Ok(()),
        }
    }
}
