//! Machine identity generation
//!
//! Each machine gets a random DNS label under the machine network, e.g.
//! `rpi4-qzhtkwma.mac.corpdk.com`. A candidate is accepted only when it is a
//! valid domain and no `AAAA` record exists for it yet; the name is then
//! reserved with a placeholder `::1` record until the machine publishes its
//! real address.

use crate::ddns::{self, DnsProvider};
use crate::validate::{MAX_FQDN_LEN, MAX_LABEL_LEN, is_domain, is_label};
use crate::ProvisionError;
use rand::Rng;
use std::net::Ipv6Addr;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

/// Random part length used by the config generator
pub const DEFAULT_ID_LENGTH: usize = 8;

/// Setup script written next to the rendered documents
pub const SETUP_SCRIPT: &str = "setup.sh";

/// Candidates tried before giving up on finding a free name
const MAX_ATTEMPTS: usize = 100;

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz";

/// A generated machine identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineIdentity {
    /// Machine network, e.g. `mac.corpdk.com`
    pub base_domain: String,
    /// `<prefix>-<random>`, used as the machine id
    pub host_label: String,
    /// `<host_label>.<base_domain>`, used as the DDNS host
    pub fqdn: String,
}

impl MachineIdentity {
    pub fn new(prefix: &str, random_id: &str, base_domain: &str) -> Self {
        let host_label = format!("{}-{}", prefix, random_id);
        let fqdn = format!("{}.{}", host_label, base_domain);
        Self {
            base_domain: base_domain.to_string(),
            host_label,
            fqdn,
        }
    }

    pub fn machine_id(&self) -> &str {
        &self.host_label
    }

    pub fn ddns_host(&self) -> &str {
        &self.fqdn
    }

    /// Shell script exporting the identity
    pub fn setup_script(&self) -> String {
        format!(
            "#!/bin/bash\n\nexport MACHINE_NET={}\nexport MACHINE_ID={}\nexport DDNS_HOST={}\n",
            self.base_domain, self.host_label, self.fqdn
        )
    }

    /// Recreate `output_dir` and write [`SETUP_SCRIPT`] into it
    pub async fn write_setup(&self, output_dir: impl AsRef<Path>) -> Result<(), ProvisionError> {
        let output_dir = output_dir.as_ref();
        if output_dir.is_dir() {
            fs::remove_dir_all(output_dir).await?;
        }
        fs::create_dir_all(output_dir).await?;

        let script = output_dir.join(SETUP_SCRIPT);
        fs::write(&script, self.setup_script()).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).await?;
        }

        debug!("Wrote {}", script.display());
        Ok(())
    }

    /// Print the identity and the exports for the host's shell profile
    pub fn print(&self) {
        println!("GENERATED Machine ID: {}", self.host_label);
        println!("GENERATED FQDN: {}", self.fqdn);
        println!("Please add the following to your terminal profile file of the host machine:");
        println!();
        println!("\texport DDNS_HOST={}\n\texport MACHINE_ID={}", self.fqdn, self.host_label);
    }
}

/// Generates unique machine identities
#[derive(Debug, Clone)]
pub struct MachineIdGenerator {
    length: usize,
    network: Option<String>,
    prefix: Option<String>,
}

impl MachineIdGenerator {
    pub fn new(length: usize) -> Self {
        Self {
            length,
            network: None,
            prefix: None,
        }
    }

    /// Set the machine network (the base domain)
    pub fn with_network(mut self, network: Option<String>) -> Self {
        self.network = network;
        self
    }

    /// Set the label prefix
    pub fn with_prefix(mut self, prefix: Option<String>) -> Self {
        self.prefix = prefix;
        self
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// Random lowercase id of the configured length
    pub fn random_id(&self) -> String {
        let mut rng = rand::rng();
        (0..self.length)
            .map(|_| char::from(ALPHABET[rng.random_range(0..ALPHABET.len())]))
            .collect()
    }

    /// Checks on the machine network
    pub fn validate_network(&self) -> Vec<String> {
        let Some(network) = &self.network else {
            return vec!["Error: \"MACHINE_NETWORK\" not set".to_string()];
        };

        let mut errors = Vec::new();
        if !is_domain(network) {
            errors.push("Error: \"MACHINE_NETWORK\" not set to a proper FQDN".to_string());
        }
        let cap = MAX_FQDN_LEN - MAX_LABEL_LEN;
        if network.len() > cap {
            errors.push("Error: \"MACHINE_NETWORK\" length is too long".to_string());
            errors.push(format!(
                "Hint: For proper functioning cap \"MACHINE_NETWORK\" length to {}",
                cap
            ));
        }
        errors
    }

    /// Checks on the label prefix
    pub fn validate_prefix(&self) -> Vec<String> {
        let Some(prefix) = &self.prefix else {
            return vec!["Error: \"MACHINE_PREFIX\" not set".to_string()];
        };

        let mut errors = Vec::new();
        if !is_label(prefix) {
            errors.push(
                "Error: \"MACHINE_PREFIX\" not set to a proper \"hostname\" component".to_string(),
            );
        }
        if self.label_len(prefix) > MAX_LABEL_LEN {
            errors.push(
                "Error: generated \"label\" length will exceed the limit please reduce\n\t\
                 \"MACHINE_PREFIX\" to match the length requirements of a DNS label"
                    .to_string(),
            );
            errors.push(format!(
                "Hint: DNS Label length is capped at {} characters.\n\t\
                 \"MACHINE_PREFIX\" is capped at {} characters",
                MAX_LABEL_LEN,
                MAX_LABEL_LEN.saturating_sub(self.length.saturating_add(1))
            ));
        }
        errors
    }

    /// Validate all inputs, reporting every failure at once
    ///
    /// Returns the network and prefix on success.
    pub fn validate_input(&self) -> Result<(String, String), ProvisionError> {
        let mut errors = Vec::new();
        if self.length == 0 {
            errors.push("Error: random id length must be at least 1".to_string());
        } else if self.length >= MAX_LABEL_LEN {
            errors.push(format!(
                "Error: random id length must be less than {}",
                MAX_LABEL_LEN
            ));
        }
        errors.extend(self.validate_network());
        errors.extend(self.validate_prefix());

        if let (Some(network), Some(prefix)) = (&self.network, &self.prefix) {
            if !network.is_empty()
                && !prefix.is_empty()
                && self
                    .label_len(prefix)
                    .saturating_add(1)
                    .saturating_add(network.len())
                    > MAX_FQDN_LEN
            {
                errors.push(
                    "Error: generated \"hostname\" length will exceed the limit please reduce \
                     either or both of\n\t\"MACHINE_PREFIX\" or \"MACHINE_NETWORK\" to match \
                     the length requirements of a FQDN"
                        .to_string(),
                );
                errors.push(format!("Hint: FQDN length is capped at {} characters", MAX_FQDN_LEN));
            }
        }

        match (errors.is_empty(), &self.network, &self.prefix) {
            (true, Some(network), Some(prefix)) => Ok((network.clone(), prefix.clone())),
            _ => Err(ProvisionError::Validation(errors)),
        }
    }

    fn label_len(&self, prefix: &str) -> usize {
        prefix.len().saturating_add(1).saturating_add(self.length)
    }

    /// Print the configuration the generator runs with
    pub fn print_config(&self, zone_id: &str) {
        println!("Running Generator with following config:");
        println!("\tMACHINE_NETWORK: {}", self.network.as_deref().unwrap_or("None"));
        println!("\tMACHINE_PREFIX: {}", self.prefix.as_deref().unwrap_or("None"));
        println!("\tRANDOM LENGTH: {}", self.length);
        println!("\tCF ZONE ID: {}", zone_id);
    }

    /// Zone identifier: the explicit one if given (checked to exist),
    /// otherwise looked up from the network's last two labels
    pub async fn resolve_zone(
        &self,
        dns: &dyn DnsProvider,
        network: &str,
        zone_id: Option<&str>,
    ) -> Result<String, ProvisionError> {
        match zone_id.filter(|id| !id.is_empty()) {
            Some(id) => Ok(dns.get_zone(id).await?.id),
            None => ddns::resolve_zone(dns, &ddns::hosts::zone_name(network)).await,
        }
    }

    /// Generate a free identity and reserve it in DNS
    pub async fn generate(
        &self,
        dns: &dyn DnsProvider,
        zone_id: &str,
        network: &str,
        prefix: &str,
    ) -> Result<MachineIdentity, ProvisionError> {
        for attempt in 1..=MAX_ATTEMPTS {
            let identity = MachineIdentity::new(prefix, &self.random_id(), network);

            if !is_domain(&identity.fqdn) {
                debug!("Candidate {} is not a valid domain", identity.fqdn);
                continue;
            }
            if !dns.list_aaaa(zone_id, &identity.fqdn).await?.is_empty() {
                debug!("Candidate {} already taken (attempt {})", identity.fqdn, attempt);
                continue;
            }

            ddns::reconcile_host(dns, zone_id, &identity.fqdn, &Ipv6Addr::LOCALHOST).await?;
            info!("Reserved {}", identity.fqdn);
            return Ok(identity);
        }

        Err(ProvisionError::dns(
            network,
            format!("no free machine id after {} attempts", MAX_ATTEMPTS),
        ))
    }

    /// Full run: validate, resolve the zone, generate, write `setup.sh`
    pub async fn run(
        &self,
        dns: &dyn DnsProvider,
        zone_id: Option<&str>,
        output_dir: impl AsRef<Path>,
    ) -> Result<MachineIdentity, ProvisionError> {
        let (network, prefix) = self.validate_input()?;
        let zone_id = self.resolve_zone(dns, &network, zone_id).await?;
        self.print_config(&zone_id);

        let identity = self.generate(dns, &zone_id, &network, &prefix).await?;
        identity.print();
        identity.write_setup(output_dir).await?;

        Ok(identity)
    }
}
