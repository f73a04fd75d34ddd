//! corpdk-provision library
//!
//! Provisioning and dynamic DNS tooling for corpdk machines.
//!
//! # Pipeline
//!
//! - **Identity**: [`machine`] picks a free `<prefix>-<random>` name under
//!   the machine network and reserves it in DNS
//! - **Document**: [`template`] renders the first-boot cloud-config from a
//!   values file and the identity; [`provision`] writes device directories
//!   and NoCloud seeds
//! - **Runtime**: [`hook`] runs from the DHCP client and starts the DDNS
//!   unit, which runs [`ddns`] to publish the current IPv6 address

pub mod config;
pub mod ddns;
pub mod hook;
pub mod machine;
pub mod provision;
pub mod template;
pub mod validate;

mod error;

pub use error::ProvisionError;
