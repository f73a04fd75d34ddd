//! DHCP client hook that refreshes dynamic DNS
//!
//! The DHCP client calls the hook with the interface name and the reason for
//! the lifecycle event. Only an IPv6 lease change requests a refresh; the
//! refresh itself runs as a one-shot unit under the service manager.

pub mod mock;
pub mod systemd;

pub use systemd::{ServiceController, Systemctl};

use crate::ProvisionError;
use tracing::{debug, info};

/// Unit started when an IPv6 lease changes
pub const DDNS_UNIT: &str = "corpdk-update-ddns.service";

/// DHCP reason that requests a DDNS refresh
pub const TRIGGER_REASON: &str = "dhcp6-change";

/// Positional arguments passed by the DHCP client
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookArgs {
    pub interface: String,
    pub reason: String,
}

impl HookArgs {
    pub fn new(interface: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            reason: reason.into(),
        }
    }

    /// Build from raw positional arguments; missing values become empty
    pub fn from_positional<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut args = args.into_iter().map(Into::into);
        Self {
            interface: args.next().unwrap_or_default(),
            reason: args.next().unwrap_or_default(),
        }
    }
}

/// Outcome of a hook invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    NoOp,
    Triggered,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::NoOp => write!(f, "no-op"),
            Decision::Triggered => write!(f, "triggered"),
        }
    }
}

/// Decide whether the event requests a refresh
pub fn decide(args: &HookArgs) -> Decision {
    if args.reason == TRIGGER_REASON {
        Decision::Triggered
    } else {
        Decision::NoOp
    }
}

/// Diagnostic line emitted on every invocation
pub fn diagnostic_line(args: &HookArgs) -> String {
    format!(
        "corpdk ddns hook: interface='{}' reason='{}'",
        args.interface, args.reason
    )
}

/// Run the hook against a service controller
///
/// A failed start is returned as-is; there is no retry.
pub async fn run_hook(
    controller: &dyn ServiceController,
    args: &HookArgs,
) -> Result<Decision, ProvisionError> {
    info!("{}", diagnostic_line(args));

    let decision = decide(args);
    match decision {
        Decision::Triggered => {
            debug!("Requesting start of {} via {}", DDNS_UNIT, controller.name());
            controller.start(DDNS_UNIT).await?;
        }
        Decision::NoOp => {
            debug!("Reason '{}' does not request a refresh", args.reason);
        }
    }

    Ok(decision)
}
