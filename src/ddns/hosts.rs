//! Hosts file handling
//!
//! The hosts file lists one FQDN per line. Blank lines and names that are
//! not valid domains are skipped.

use crate::ProvisionError;
use crate::validate::is_domain;
use std::path::Path;
use tracing::{debug, warn};

/// Default hosts file, relative to the working directory
pub const DEFAULT_HOSTS_FILE: &str = "ddns.hosts";

/// Parse hosts file content
pub fn parse_hosts(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| {
            let valid = is_domain(line);
            if !valid {
                warn!("Skipping invalid DDNS host: {}", line);
            }
            valid
        })
        .map(str::to_string)
        .collect()
}

/// Load hosts from a file
pub async fn load_hosts(path: impl AsRef<Path>) -> Result<Vec<String>, ProvisionError> {
    let path = path.as_ref();
    debug!("Reading DDNS hosts from {}", path.display());
    let content = tokio::fs::read_to_string(path).await?;
    Ok(parse_hosts(&content))
}

/// Zone a host belongs to: its last two labels
pub fn zone_name(host: &str) -> String {
    let labels: Vec<&str> = host.split('.').collect();
    labels[labels.len().saturating_sub(2)..].join(".")
}
