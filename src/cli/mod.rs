//! Command-line interface definitions for the `stackfleet` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{Args, Parser, Subcommand};

/// Top-level CLI for the `stackfleet` binary.
#[derive(Debug, Parser)]
#[command(
    name = "stackfleet",
    about = "Automate OpenStack networks, instances and server fleets",
    arg_required_else_help = true
)]
pub(crate) struct Cli {
    /// Named cloud profile from the `[clouds]` table of stackfleet.toml.
    #[arg(long, global = true, value_name = "PROFILE")]
    pub(crate) cloud: Option<String>,
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Create a network, subnet and router to the external network.
    #[command(name = "infra")]
    Infra(InfraCommand),
    /// Create a security group allowing SSH, HTTP, HTTPS and ICMP.
    #[command(name = "security-group")]
    SecurityGroup(SecurityGroupCommand),
    /// Launch one server and wait until it is active.
    #[command(name = "launch")]
    Launch(LaunchCommand),
    /// Launch numbered servers sharing one instance definition.
    #[command(name = "batch-launch")]
    BatchLaunch(BatchLaunchCommand),
    /// Snapshot servers concurrently.
    #[command(name = "snapshot")]
    Snapshot(ServersArgs),
    /// Resize servers one at a time and confirm each resize.
    #[command(name = "resize")]
    Resize(ResizeCommand),
    /// Replace servers matching a prefix with ones booted from a new image.
    #[command(name = "rolling-update")]
    RollingUpdate(RollingUpdateCommand),
    /// Classify servers as healthy, unhealthy or unknown.
    #[command(name = "health")]
    Health(ServersArgs),
    /// Allocate a floating IP and bind it to a server.
    #[command(name = "floating-ip")]
    FloatingIp(FloatingIpCommand),
    /// Create or attach block storage volumes.
    #[command(name = "volume", subcommand)]
    Volume(VolumeCommand),
    /// Delete every resource whose name starts with a prefix.
    #[command(name = "cleanup")]
    Cleanup(CleanupCommand),
}

/// Arguments for `stackfleet infra`.
#[derive(Debug, Args)]
pub(crate) struct InfraCommand {
    /// Name of the network to create.
    #[arg(long, default_value = "auto-network")]
    pub(crate) name: String,
    /// IPv4 range of the subnet.
    #[arg(long, default_value = "10.0.100.0/24")]
    pub(crate) cidr: String,
}

/// Arguments for `stackfleet security-group`.
#[derive(Debug, Args)]
pub(crate) struct SecurityGroupCommand {
    /// Name of the security group to create.
    #[arg(long, default_value = "auto-security-group")]
    pub(crate) name: String,
}

/// Instance definition shared by `launch` and `batch-launch`.
#[derive(Debug, Args)]
pub(crate) struct InstanceArgs {
    /// Image name or identifier.
    #[arg(long, value_name = "IMAGE")]
    pub(crate) image: Option<String>,
    /// Flavor name or identifier.
    #[arg(long, value_name = "FLAVOR")]
    pub(crate) flavor: Option<String>,
    /// Network to attach, by name. Repeat for several networks.
    #[arg(long = "network", value_name = "NETWORK")]
    pub(crate) networks: Vec<String>,
    /// Security group applied to the server.
    #[arg(long, value_name = "GROUP")]
    pub(crate) security_group: Option<String>,
    /// Key pair injected into the server.
    #[arg(long, value_name = "KEY")]
    pub(crate) key_name: Option<String>,
    /// Boot script passed inline.
    #[arg(long, value_name = "SCRIPT", conflicts_with = "user_data_file")]
    pub(crate) user_data: Option<String>,
    /// Boot script read from a local file.
    #[arg(long, value_name = "PATH", conflicts_with = "user_data")]
    pub(crate) user_data_file: Option<String>,
    /// Skip the telemetry collector even when a license key is configured.
    #[arg(long)]
    pub(crate) no_telemetry: bool,
}

/// Arguments for `stackfleet launch`.
#[derive(Debug, Args)]
pub(crate) struct LaunchCommand {
    /// Server name.
    pub(crate) name: String,
    #[command(flatten)]
    pub(crate) instance: InstanceArgs,
}

/// Arguments for `stackfleet batch-launch`.
#[derive(Debug, Args)]
pub(crate) struct BatchLaunchCommand {
    /// Name prefix; servers are named `<prefix>-1` to `<prefix>-<count>`.
    #[arg(long)]
    pub(crate) prefix: String,
    /// Number of servers to launch.
    #[arg(long, default_value_t = 1)]
    pub(crate) count: usize,
    /// Launch one server at a time in order instead of concurrently.
    #[arg(long)]
    pub(crate) serial: bool,
    #[command(flatten)]
    pub(crate) instance: InstanceArgs,
}

/// Server names targeted by a batch command.
#[derive(Debug, Args)]
pub(crate) struct ServersArgs {
    /// Server names.
    #[arg(required = true, value_name = "SERVER")]
    pub(crate) servers: Vec<String>,
}

/// Arguments for `stackfleet resize`.
#[derive(Debug, Args)]
pub(crate) struct ResizeCommand {
    /// Target flavor name or identifier.
    #[arg(long, value_name = "FLAVOR")]
    pub(crate) flavor: String,
    #[command(flatten)]
    pub(crate) targets: ServersArgs,
}

/// Arguments for `stackfleet rolling-update`.
#[derive(Debug, Args)]
pub(crate) struct RollingUpdateCommand {
    /// Only servers whose name starts with this prefix are replaced.
    #[arg(long)]
    pub(crate) prefix: String,
    /// Image the replacement servers boot from.
    #[arg(long, value_name = "IMAGE")]
    pub(crate) image: String,
}

/// Arguments for `stackfleet floating-ip`.
#[derive(Debug, Args)]
pub(crate) struct FloatingIpCommand {
    /// Server receiving the address.
    pub(crate) server: String,
}

#[derive(Debug, Subcommand)]
pub(crate) enum VolumeCommand {
    /// Create a volume and wait until it is available.
    #[command(name = "create")]
    Create {
        /// Volume name.
        name: String,
        /// Size in GiB.
        #[arg(long, default_value_t = 10)]
        size: u32,
    },
    /// Attach an existing volume to a server.
    #[command(name = "attach")]
    Attach {
        /// Server name.
        server: String,
        /// Volume name.
        volume: String,
    },
}

/// Arguments for `stackfleet cleanup`.
#[derive(Debug, Args)]
pub(crate) struct CleanupCommand {
    /// Name prefix of the resources to delete.
    #[arg(long, default_value = "auto-")]
    pub(crate) prefix: String,
}
