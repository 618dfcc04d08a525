//! CLI argument parsing with clap derive.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use crate::agent::{Agent, UpdateOptions, VersionSpec};
use crate::output::{ConsoleReporter, Format, SharedReporter};
use crate::service::{CustomTls, LetsEncrypt, Service, ServiceConfig};
use crate::store::CredentialStore;
use crate::target;

/// Provision and maintain the Finch observability stack and its collector
/// agents.
#[derive(Parser)]
#[command(
    name = "finchctl",
    version,
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Progress output format
    #[arg(long, global = true, value_enum, default_value_t = Format::Progress)]
    pub format: Format,

    /// Report every step without touching the target
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Per-operation timeout in seconds
    #[arg(long, global = true, default_value_t = 300)]
    pub timeout: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Manage collector agents
    #[command(subcommand)]
    Agent(AgentCommand),

    /// Manage the observability service
    #[command(subcommand)]
    Service(ServiceCommand),
}

#[derive(Subcommand)]
pub enum AgentCommand {
    /// Install the collector on a host
    Deploy(AgentDeployArgs),

    /// Update the collector configuration and binary
    Update(AgentUpdateArgs),

    /// Remove the collector from a host
    Teardown(HostArg),
}

#[derive(Args)]
pub struct AgentDeployArgs {
    /// Collector configuration file
    #[arg(long)]
    pub config: PathBuf,

    /// Release tag to install instead of the latest, e.g. v1.4.2
    #[arg(long)]
    pub release: Option<String>,

    /// Target host, `[user@]host[:port]`
    pub host: String,
}

#[derive(Args)]
pub struct AgentUpdateArgs {
    /// Collector configuration file (required unless --skip-config)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Release tag to converge on instead of the latest
    #[arg(long)]
    pub release: Option<String>,

    /// Leave the installed configuration untouched
    #[arg(long)]
    pub skip_config: bool,

    /// Leave the installed binary untouched
    #[arg(long)]
    pub skip_install: bool,

    /// Target host, `[user@]host[:port]`
    pub host: String,
}

#[derive(Args)]
pub struct HostArg {
    /// Target host, `[user@]host[:port]`
    pub host: String,
}

#[derive(Subcommand)]
pub enum ServiceCommand {
    /// Deploy the observability stack
    Deploy(ServiceDeployArgs),

    /// Update a deployed stack in place
    Update(HostArg),

    /// Remove a deployed stack
    Teardown(HostArg),

    /// Register a deployed stack in the credential store
    Register(HostArg),

    /// Remove a stack from the credential store
    Deregister(HostArg),

    /// Replace a stack's mTLS material
    RotateCertificate(HostArg),

    /// Replace a stack's identity secret
    RotateSecret(HostArg),

    /// Show a deployed stack's identity
    Info(HostArg),
}

#[derive(Args)]
pub struct ServiceDeployArgs {
    /// Public hostname of the stack
    #[arg(long)]
    pub hostname: String,

    /// Basic-auth username for the stack's ingestion endpoints
    #[arg(long)]
    pub username: String,

    /// Basic-auth password for the stack's ingestion endpoints
    #[arg(long)]
    pub password: String,

    /// Obtain endpoint certificates via Let's Encrypt
    #[arg(long)]
    pub letsencrypt: bool,

    /// ACME account email
    #[arg(long, requires = "letsencrypt")]
    pub letsencrypt_email: Option<String>,

    /// Endpoint certificate file (custom TLS)
    #[arg(long, requires = "tls_key", conflicts_with = "letsencrypt")]
    pub tls_cert: Option<PathBuf>,

    /// Endpoint private key file (custom TLS)
    #[arg(long, requires = "tls_cert")]
    pub tls_key: Option<PathBuf>,

    /// Target host, `[user@]host[:port]`
    pub host: String,
}

impl Cli {
    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns the failing operation's error.
    pub async fn run(self) -> Result<()> {
        let reporter = ConsoleReporter::shared(self.format);
        let timeout = Duration::from_secs(self.timeout);
        match self.command {
            Command::Agent(cmd) => run_agent(cmd, reporter, self.dry_run, timeout).await,
            Command::Service(cmd) => run_service(cmd, reporter, self.dry_run, timeout).await,
        }
    }
}

async fn run_agent(
    cmd: AgentCommand,
    reporter: SharedReporter,
    dry_run: bool,
    timeout: Duration,
) -> Result<()> {
    match cmd {
        AgentCommand::Deploy(args) => {
            let target =
                target::connect(&args.host, reporter.clone(), dry_run, timeout).await?;
            let version = args.release.map_or(VersionSpec::Latest, VersionSpec::Pinned);
            let agent = Agent::new(target, args.config, version, reporter, dry_run);
            agent.deploy().await?;
        }
        AgentCommand::Update(args) => {
            let config = match (&args.config, args.skip_config) {
                (Some(path), _) => path.clone(),
                (None, true) => PathBuf::new(),
                (None, false) => {
                    anyhow::bail!("agent update requires --config unless --skip-config is set")
                }
            };
            let target =
                target::connect(&args.host, reporter.clone(), dry_run, timeout).await?;
            let version = args.release.map_or(VersionSpec::Latest, VersionSpec::Pinned);
            let agent = Agent::new(target, config, version, reporter, dry_run);
            agent
                .update(&UpdateOptions {
                    skip_config: args.skip_config,
                    skip_install: args.skip_install,
                })
                .await?;
        }
        AgentCommand::Teardown(args) => {
            let target =
                target::connect(&args.host, reporter.clone(), dry_run, timeout).await?;
            let agent = Agent::new(
                target,
                PathBuf::new(),
                VersionSpec::Latest,
                reporter,
                dry_run,
            );
            agent.teardown().await?;
        }
    }
    Ok(())
}

async fn run_service(
    cmd: ServiceCommand,
    reporter: SharedReporter,
    dry_run: bool,
    timeout: Duration,
) -> Result<()> {
    let store = CredentialStore::new()?;
    match cmd {
        ServiceCommand::Deploy(args) => {
            let config = ServiceConfig {
                hostname: args.hostname,
                username: args.username,
                password: args.password,
                letsencrypt: LetsEncrypt {
                    enabled: args.letsencrypt,
                    email: args.letsencrypt_email.unwrap_or_default(),
                },
                custom_tls: match (args.tls_cert, args.tls_key) {
                    (Some(cert_file), Some(key_file)) => CustomTls {
                        enabled: true,
                        cert_file,
                        key_file,
                    },
                    _ => CustomTls::default(),
                },
                lib_dir: lib_dir_from_env(),
            };
            let target =
                target::connect(&args.host, reporter.clone(), dry_run, timeout).await?;
            let service = Service::new(config, target, store, reporter, dry_run);
            service.deploy().await?;
        }
        ServiceCommand::Update(args) => {
            let mut service = deployed_service(&args.host, store, reporter, dry_run, timeout).await?;
            service.update().await?;
        }
        ServiceCommand::Teardown(args) => {
            let mut service = deployed_service(&args.host, store, reporter, dry_run, timeout).await?;
            service.teardown().await?;
        }
        ServiceCommand::Register(args) => {
            let mut service = deployed_service(&args.host, store, reporter, dry_run, timeout).await?;
            service.register().await?;
        }
        ServiceCommand::Deregister(args) => {
            let mut service = deployed_service(&args.host, store, reporter, dry_run, timeout).await?;
            service.deregister().await?;
        }
        ServiceCommand::RotateCertificate(args) => {
            let mut service = deployed_service(&args.host, store, reporter, dry_run, timeout).await?;
            service.rotate_certificate().await?;
        }
        ServiceCommand::RotateSecret(args) => {
            let mut service = deployed_service(&args.host, store, reporter, dry_run, timeout).await?;
            service.rotate_secret().await?;
        }
        ServiceCommand::Info(args) => {
            let mut service = deployed_service(&args.host, store, reporter, dry_run, timeout).await?;
            if let Some(info) = service.info().await? {
                println!("{}", serde_json::to_string_pretty(&info)?);
            }
        }
    }
    Ok(())
}

/// Build a service handle for operations that recover their configuration
/// from the deployed stack itself.
async fn deployed_service(
    host: &str,
    store: CredentialStore,
    reporter: SharedReporter,
    dry_run: bool,
    timeout: Duration,
) -> Result<Service<target::AnyTarget>> {
    let config = ServiceConfig {
        lib_dir: lib_dir_from_env(),
        ..ServiceConfig::default()
    };
    let target = target::connect(host, reporter.clone(), dry_run, timeout).await?;
    Ok(Service::new(config, target, store, reporter, dry_run))
}

fn lib_dir_from_env() -> String {
    std::env::var("FINCH_SERVICE_LIB")
        .unwrap_or_else(|_| crate::service::DEFAULT_LIB_DIR.to_string())
}
