//! Cloud-config document model
//!
//! Typed view of the cloud-config keys the first-boot document emits. Used to
//! check that a rendered document is valid YAML of the expected shape before
//! it is handed to the provisioning agent.

use serde::{Deserialize, Serialize};

/// Header every cloud-config document starts with
pub const CLOUD_CONFIG_HEADER: &str = "#cloud-config";

/// Parsed first-boot document
///
/// Unknown keys are ignored; only what the document is expected to carry is
/// typed here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    /// Short host name, the machine id
    pub hostname: Option<String>,
    /// DDNS host of the machine
    pub fqdn: Option<String>,
    pub manage_etc_hosts: Option<bool>,

    /// Accounts in declaration order
    pub users: Vec<UserConfig>,

    pub packages: Vec<String>,
    pub package_upgrade: Option<bool>,
    pub package_update: Option<bool>,

    pub ssh_pwauth: Option<bool>,
    pub timezone: Option<String>,
    pub locale: Option<String>,
    pub keyboard: Option<KeyboardConfig>,
    pub random_seed: Option<RandomSeedConfig>,

    /// Post-boot commands, run in order
    pub runcmd: Vec<RunCmd>,
}

/// One entry of `users:`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    pub name: String,
    pub groups: Vec<String>,
    pub shell: Option<String>,
    pub sudo: Option<String>,
    pub lock_passwd: Option<bool>,
    pub passwd: Option<String>,
    pub ssh_import_id: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyboardConfig {
    pub layout: Option<String>,
    pub model: Option<String>,
    pub variant: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomSeedConfig {
    pub file: Option<String>,
    pub command: Vec<String>,
    pub command_required: Option<bool>,
}

/// A `runcmd` entry: a shell line or an argv list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RunCmd {
    Shell(String),
    Args(Vec<String>),
}

impl RunCmd {
    /// Command as a single shell line
    pub fn to_shell(&self) -> String {
        match self {
            RunCmd::Shell(cmd) => cmd.clone(),
            RunCmd::Args(args) => args.join(" "),
        }
    }
}

impl CloudConfig {
    /// Parse cloud-config from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        // Strip #cloud-config header if present
        let yaml = yaml.trim_start();
        let yaml = yaml
            .strip_prefix(CLOUD_CONFIG_HEADER)
            .map(|s| s.trim_start())
            .unwrap_or(yaml);

        // A header-only document is an empty config
        if yaml.lines().all(|l| l.trim().is_empty() || l.trim_start().starts_with('#')) {
            return Ok(Self::default());
        }

        serde_yaml::from_str(yaml)
    }

    /// Check if this looks like a cloud-config (starts with #cloud-config)
    pub fn is_cloud_config(data: &str) -> bool {
        data.trim_start().starts_with(CLOUD_CONFIG_HEADER)
    }

    /// Find a user entry by name
    pub fn user(&self, name: &str) -> Option<&UserConfig> {
        self.users.iter().find(|u| u.name == name)
    }
}
