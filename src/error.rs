//! Error types for corpdk-provision

use thiserror::Error;

/// Main error type for provisioning and DDNS operations
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Template error: {0}")]
    Template(String),

    #[error("{}", .0.join("\n"))]
    Validation(Vec<String>),

    #[error("DNS error for '{name}': {message}")]
    Dns { name: String, message: String },

    #[error("DDNS update failed:\n{}", .0.join("\n"))]
    UpdateFailed(Vec<String>),

    #[error("Could not find ipv6 address: {0}")]
    IpDiscovery(String),

    #[error("Failed to start unit '{unit}' (exit code {code:?})")]
    ServiceStart { unit: String, code: Option<i32> },

    #[error("Command execution failed: {0}")]
    Command(String),
}

impl ProvisionError {
    /// Create a DNS error
    pub fn dns(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Dns {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Process exit code for this error
    ///
    /// A failed unit start passes the service manager's own status through.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::ServiceStart {
                code: Some(code), ..
            } => u8::try_from(*code).unwrap_or(1),
            _ => 1,
        }
    }
}
