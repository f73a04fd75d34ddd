//! Provisioning: rendering device configs and handing them to cloud-init
//!
//! The provisioning agent itself is cloud-init; this module only prepares its
//! input. [`ConfigGenerator`] produces one directory per device and
//! [`NoCloudSeed`] delivers a document through a NoCloud seed directory.

pub mod generator;

pub use generator::ConfigGenerator;

use crate::ProvisionError;
use crate::config::CloudConfig;
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

/// NoCloud seed directory cloud-init reads without a metadata service
pub const NOCLOUD_SEED_DIR: &str = "/var/lib/cloud/seed/nocloud";

/// A rendered first-boot document ready for delivery
#[derive(Debug, Clone)]
pub struct ProvisioningDocument {
    pub instance_id: String,
    pub local_hostname: Option<String>,
    pub user_data: String,
}

impl ProvisioningDocument {
    /// Wrap rendered user-data, checking that it is cloud-config
    pub fn new(
        instance_id: impl Into<String>,
        local_hostname: Option<String>,
        user_data: impl Into<String>,
    ) -> Result<Self, ProvisionError> {
        let user_data = user_data.into();
        if !CloudConfig::is_cloud_config(&user_data) {
            return Err(ProvisionError::Config(
                "document does not start with #cloud-config".to_string(),
            ));
        }
        CloudConfig::from_yaml(&user_data)?;

        Ok(Self {
            instance_id: instance_id.into(),
            local_hostname,
            user_data,
        })
    }

    /// NoCloud `meta-data` content
    pub fn meta_data(&self) -> Result<String, ProvisionError> {
        #[derive(Serialize)]
        #[serde(rename_all = "kebab-case")]
        struct MetaData<'a> {
            instance_id: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            local_hostname: Option<&'a str>,
        }

        Ok(serde_yaml::to_string(&MetaData {
            instance_id: &self.instance_id,
            local_hostname: self.local_hostname.as_deref(),
        })?)
    }
}

/// Provisioning agent seam
#[async_trait]
pub trait ProvisioningAgent: Send + Sync {
    /// Name of this agent (e.g., "NoCloud")
    fn name(&self) -> &'static str;

    /// Hand a document to the agent
    async fn apply(&self, document: &ProvisioningDocument) -> Result<(), ProvisionError>;
}

/// Delivers documents by writing a NoCloud seed directory
pub struct NoCloudSeed {
    seed_dir: PathBuf,
}

impl NoCloudSeed {
    pub fn new() -> Self {
        Self::with_dir(NOCLOUD_SEED_DIR)
    }

    /// Use a custom seed directory (e.g., a mounted SD card's rootfs)
    pub fn with_dir(seed_dir: impl AsRef<Path>) -> Self {
        Self {
            seed_dir: seed_dir.as_ref().to_path_buf(),
        }
    }

    pub fn seed_dir(&self) -> &Path {
        &self.seed_dir
    }
}

impl Default for NoCloudSeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProvisioningAgent for NoCloudSeed {
    fn name(&self) -> &'static str {
        "NoCloud"
    }

    async fn apply(&self, document: &ProvisioningDocument) -> Result<(), ProvisionError> {
        fs::create_dir_all(&self.seed_dir).await?;
        fs::write(self.seed_dir.join("user-data"), &document.user_data).await?;
        fs::write(self.seed_dir.join("meta-data"), document.meta_data()?).await?;

        info!(
            "Seeded {} for instance {}",
            self.seed_dir.display(),
            document.instance_id
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const USER_DATA: &str = "#cloud-config\nhostname: rpi4-abcdefgh\n";

    #[test]
    fn test_document_rejects_non_cloud_config() {
        assert!(ProvisioningDocument::new("id", None, "#!/bin/bash\necho hi\n").is_err());
        assert!(ProvisioningDocument::new("id", None, "#cloud-config\nusers: [\n").is_err());
    }

    #[test]
    fn test_meta_data() {
        let doc = ProvisioningDocument::new(
            "rpi4-abcdefgh",
            Some("rpi4-abcdefgh.mac.corpdk.com".to_string()),
            USER_DATA,
        )
        .unwrap();
        let meta = doc.meta_data().unwrap();
        assert!(meta.contains("instance-id: rpi4-abcdefgh"));
        assert!(meta.contains("local-hostname: rpi4-abcdefgh.mac.corpdk.com"));

        let doc = ProvisioningDocument::new("rpi4-abcdefgh", None, USER_DATA).unwrap();
        assert!(!doc.meta_data().unwrap().contains("local-hostname"));
    }

    #[tokio::test]
    async fn test_nocloud_seed_apply() {
        let temp_dir = TempDir::new().unwrap();
        let seed = NoCloudSeed::with_dir(temp_dir.path().join("nocloud"));
        let doc = ProvisioningDocument::new("rpi4-abcdefgh", None, USER_DATA).unwrap();

        seed.apply(&doc).await.unwrap();

        let user_data = std::fs::read_to_string(seed.seed_dir().join("user-data")).unwrap();
        assert_eq!(user_data, USER_DATA);
        let meta = std::fs::read_to_string(seed.seed_dir().join("meta-data")).unwrap();
        assert!(meta.contains("instance-id: rpi4-abcdefgh"));
    }
}
