//! Multi-device config generation
//!
//! For `n` devices, creates `device-01` .. `device-<n>` (zero-padded to one
//! more digit than `n` has), generates a machine identity for each and
//! renders the templates into its directory.

use crate::ProvisionError;
use crate::ddns::DnsProvider;
use crate::machine::{MachineIdGenerator, MachineIdentity};
use crate::template::{self, FIRST_BOOT_FILE, RenderContext};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

/// Output of one device
#[derive(Debug, Clone)]
pub struct DeviceOutput {
    pub dir: PathBuf,
    pub identity: MachineIdentity,
    pub files: Vec<String>,
}

/// Directory name for device `index` of `count`
pub fn device_dir_name(index: usize, count: usize) -> String {
    let width = count.to_string().len() + 1;
    format!("device-{:0width$}", index, width = width)
}

/// Generates per-device provisioning directories
pub struct ConfigGenerator {
    machine: MachineIdGenerator,
    zone_id: Option<String>,
    templates_dir: Option<PathBuf>,
}

impl ConfigGenerator {
    pub fn new(machine: MachineIdGenerator) -> Self {
        Self {
            machine,
            zone_id: None,
            templates_dir: None,
        }
    }

    /// Use a known zone id instead of looking it up by name
    pub fn with_zone_id(mut self, zone_id: Option<String>) -> Self {
        self.zone_id = zone_id;
        self
    }

    /// Render every `*.j2` in this directory instead of the embedded document
    pub fn with_templates_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.templates_dir = dir;
        self
    }

    /// Generate `devices` device directories under `output`
    pub async fn run(
        &self,
        dns: &dyn DnsProvider,
        devices: usize,
        values: &Path,
        output: &Path,
    ) -> Result<Vec<DeviceOutput>, ProvisionError> {
        let mut outputs = Vec::with_capacity(devices);

        for index in 1..=devices {
            let dir = output.join(device_dir_name(index, devices));
            info!("Generating {}", dir.display());

            let identity = self
                .machine
                .run(dns, self.zone_id.as_deref(), &dir)
                .await?;
            let files = self.render_device(&identity, values, &dir).await?;

            outputs.push(DeviceOutput {
                dir,
                identity,
                files,
            });
        }

        Ok(outputs)
    }

    /// Render the templates for one identity into `dir`
    ///
    /// `${MACHINE_ID}` and `${DDNS_HOST}` in the values file resolve to the
    /// identity before the process environment is consulted.
    pub async fn render_device(
        &self,
        identity: &MachineIdentity,
        values: &Path,
        dir: &Path,
    ) -> Result<Vec<String>, ProvisionError> {
        let mut vars = HashMap::new();
        vars.insert("machine_id".to_string(), identity.machine_id().to_string());
        vars.insert("ddns_host".to_string(), identity.ddns_host().to_string());

        let context = RenderContext::load(values, &vars)
            .await?
            .with_identity(identity.machine_id(), identity.ddns_host());

        let rendered = match &self.templates_dir {
            Some(templates) => template::render_dir(templates, &context).await?,
            None => {
                let mut rendered = BTreeMap::new();
                rendered.insert(
                    FIRST_BOOT_FILE.to_string(),
                    template::render_first_boot(&context)?,
                );
                rendered
            }
        };

        fs::create_dir_all(dir).await?;
        let mut files = Vec::with_capacity(rendered.len());
        for (name, content) in rendered {
            fs::write(dir.join(&name), content).await?;
            files.push(name);
        }

        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_dir_name_padding() {
        assert_eq!(device_dir_name(1, 2), "device-01");
        assert_eq!(device_dir_name(2, 2), "device-02");
        assert_eq!(device_dir_name(7, 12), "device-007");
        assert_eq!(device_dir_name(12, 12), "device-012");
        assert_eq!(device_dir_name(100, 100), "device-0100");
    }
}
