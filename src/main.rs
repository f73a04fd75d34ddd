//! corpdk - provisioning and dynamic DNS tools for corpdk machines

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::level_filters::LevelFilter;
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use corpdk_provision::ddns::cloudflare::CLOUDFLARE_API_URL;
use corpdk_provision::ddns::hosts::{self, DEFAULT_HOSTS_FILE};
use corpdk_provision::ddns::{CloudflareClient, DdnsAgent, IpFinder};
use corpdk_provision::hook::{self, HookArgs, Systemctl};
use corpdk_provision::machine::{DEFAULT_ID_LENGTH, MachineIdGenerator};
use corpdk_provision::provision::{
    ConfigGenerator, NOCLOUD_SEED_DIR, NoCloudSeed, ProvisioningAgent, ProvisioningDocument,
};
use corpdk_provision::template::{self, RenderContext};
use corpdk_provision::validate::is_domain;
use corpdk_provision::ProvisionError;

#[derive(Parser)]
#[command(name = "corpdk")]
#[command(author, version, about = "corpdk provisioning and dynamic DNS tools", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CloudflareArgs {
    /// Cloudflare API token
    #[arg(long, env = "CLOUDFLARE_API_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Cloudflare API base URL
    #[arg(long, env = "CLOUDFLARE_API_URL", default_value = CLOUDFLARE_API_URL)]
    api_url: String,
}

impl CloudflareArgs {
    fn client(&self) -> Result<CloudflareClient, ProvisionError> {
        CloudflareClient::with_base_url(&self.api_url, self.token.clone())
    }
}

#[derive(Args)]
struct MachineArgs {
    /// Length of the random part of the machine id
    #[arg(long, default_value_t = DEFAULT_ID_LENGTH)]
    length: usize,

    /// Machine network (base domain), e.g. mac.corpdk.com
    #[arg(long, env = "MACHINE_NETWORK")]
    network: Option<String>,

    /// Label prefix, e.g. rpi4
    #[arg(long, env = "MACHINE_PREFIX")]
    prefix: Option<String>,

    /// Cloudflare zone id (looked up from the network when unset)
    #[arg(long, env = "CF_ZONE_ID")]
    zone_id: Option<String>,
}

impl MachineArgs {
    fn generator(&self) -> MachineIdGenerator {
        MachineIdGenerator::new(self.length)
            .with_network(self.network.clone())
            .with_prefix(self.prefix.clone())
    }
}

#[derive(Subcommand)]
enum Commands {
    /// DHCP client hook: start the DDNS unit on an IPv6 lease change
    Hook {
        /// Interface name
        interface: Option<String>,
        /// DHCP reason (e.g., dhcp6-change)
        reason: Option<String>,
    },
    /// Publish the current IPv6 address for the configured hosts
    Ddns {
        /// File listing one FQDN per line
        #[arg(long, default_value = DEFAULT_HOSTS_FILE)]
        hosts_file: PathBuf,

        /// Single host to update instead of the hosts file
        #[arg(long, env = "DDNS_HOST")]
        host: Option<String>,

        #[command(flatten)]
        cloudflare: CloudflareArgs,
    },
    /// Generate and reserve a machine id
    MachineId {
        #[command(flatten)]
        machine: MachineArgs,

        /// Directory for setup.sh
        #[arg(long, default_value = "output")]
        output: PathBuf,

        #[command(flatten)]
        cloudflare: CloudflareArgs,
    },
    /// Generate provisioning directories for several devices
    Generate {
        /// Number of devices
        #[arg(long)]
        devices: usize,

        /// Values file with users, timezone, ...
        #[arg(long, default_value = "input/values.yml")]
        values: PathBuf,

        /// Output directory
        #[arg(long, default_value = "output")]
        output: PathBuf,

        /// Directory of *.j2 templates (embedded first-boot document if unset)
        #[arg(long)]
        templates: Option<PathBuf>,

        #[command(flatten)]
        machine: MachineArgs,

        #[command(flatten)]
        cloudflare: CloudflareArgs,
    },
    /// Render the first-boot document without touching DNS
    Render {
        /// Values file
        #[arg(long)]
        values: PathBuf,

        #[arg(long, env = "MACHINE_ID")]
        machine_id: Option<String>,

        #[arg(long, env = "DDNS_HOST")]
        ddns_host: Option<String>,

        /// Write to a file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Deliver a rendered document through a NoCloud seed directory
    Seed {
        /// Rendered user-data document
        #[arg(long)]
        document: PathBuf,

        #[arg(long, default_value = NOCLOUD_SEED_DIR)]
        seed_dir: PathBuf,

        #[arg(long, env = "MACHINE_ID")]
        machine_id: String,

        #[arg(long, env = "DDNS_HOST")]
        ddns_host: Option<String>,
    },
}

/// The hook's diagnostic line is emitted whatever `RUST_LOG` asks for
const HOOK_TARGET: &str = "corpdk_provision::hook";

fn log_filter(verbosity: u8, env: &str) -> EnvFilter {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .parse_lossy(env);

    let hook = format!("{}={}", HOOK_TARGET, level.as_str().to_ascii_lowercase());
    match hook.parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    }
}

fn init_logging(verbosity: u8) {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_default();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(log_filter(verbosity, &env))
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => match err.downcast_ref::<ProvisionError>() {
            // The service manager already reported why the start failed
            Some(e @ ProvisionError::ServiceStart { .. }) => ExitCode::from(e.exit_code()),
            Some(e) => {
                error!("{:#}", err);
                ExitCode::from(e.exit_code())
            }
            None => {
                error!("{:#}", err);
                ExitCode::FAILURE
            }
        },
    }
}

async fn run(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Hook { interface, reason } => {
            let args = HookArgs::from_positional(interface.into_iter().chain(reason));
            hook::run_hook(&Systemctl::new(), &args).await?;
        }
        Commands::Ddns {
            hosts_file,
            host,
            cloudflare,
        } => {
            let hosts = match host.filter(|h| !h.is_empty()) {
                Some(host) if is_domain(&host) => vec![host],
                Some(_) => bail!("DDNS_HOST not set to a proper FQDN"),
                None => hosts::load_hosts(&hosts_file)
                    .await
                    .with_context(|| format!("reading {}", hosts_file.display()))?,
            };

            let dns = cloudflare.client()?;
            let finder = IpFinder::new()?;
            let outcomes = DdnsAgent::new(&dns, &finder).run(&hosts).await?;
            for (host, outcome) in outcomes {
                println!("{}: {}", outcome, host);
            }
        }
        Commands::MachineId {
            machine,
            output,
            cloudflare,
        } => {
            let dns = cloudflare.client()?;
            machine
                .generator()
                .run(&dns, machine.zone_id.as_deref(), &output)
                .await?;
        }
        Commands::Generate {
            devices,
            values,
            output,
            templates,
            machine,
            cloudflare,
        } => {
            let dns = cloudflare.client()?;
            let generator = ConfigGenerator::new(machine.generator())
                .with_zone_id(machine.zone_id.clone())
                .with_templates_dir(templates);

            let outputs = generator.run(&dns, devices, &values, &output).await?;
            for device in outputs {
                info!(
                    "{}: {} ({})",
                    device.dir.display(),
                    device.identity.fqdn,
                    device.files.join(", ")
                );
            }
        }
        Commands::Render {
            values,
            machine_id,
            ddns_host,
            out,
        } => {
            let mut vars = HashMap::new();
            if let Some(id) = &machine_id {
                vars.insert("machine_id".to_string(), id.clone());
            }
            if let Some(host) = &ddns_host {
                vars.insert("ddns_host".to_string(), host.clone());
            }

            let mut context = RenderContext::load(&values, &vars)
                .await
                .with_context(|| format!("loading {}", values.display()))?;
            if context.machine_id.is_none() {
                context.machine_id = machine_id;
            }
            if context.ddns_host.is_none() {
                context.ddns_host = ddns_host;
            }

            let document = template::render_first_boot(&context)?;
            match out {
                Some(path) => tokio::fs::write(&path, document)
                    .await
                    .with_context(|| format!("writing {}", path.display()))?,
                None => print!("{}", document),
            }
        }
        Commands::Seed {
            document,
            seed_dir,
            machine_id,
            ddns_host,
        } => {
            let content = tokio::fs::read_to_string(&document)
                .await
                .with_context(|| format!("reading {}", document.display()))?;
            let document = ProvisioningDocument::new(machine_id, ddns_host, content)?;
            NoCloudSeed::with_dir(seed_dir).apply(&document).await?;
        }
    }

    Ok(())
}
