//! Core library for the stackfleet OpenStack automation tool.
//!
//! The crate exposes a provider abstraction over compute, network and
//! volume services, single-target automation built on it (networks,
//! security groups, instances, volumes, floating IPs, cleanup), and a batch
//! orchestrator that runs launches, snapshots, resizes, rolling
//! replacements and health checks across many servers with per-unit failure
//! isolation. [`OpenStackProvider`] talks to a real cloud over REST.

pub mod automation;
pub mod batch;
pub mod boot_script;
pub mod config;
pub mod instance;
pub mod openstack;
pub mod profiles;
pub mod provider;
pub mod test_support;

pub use automation::{
    Automation, CleanupSummary, NetworkInfrastructure, SecurityGroupSetup, WaitPolicy,
};
pub use batch::{
    BatchOperations, ExecutionMode, HealthReport, HealthStatus, LaunchReport, ResizeReport,
    RollingReport, RolloutPhase, SnapshotReport, UnitError, UnitFailure,
};
pub use boot_script::{BootScriptError, resolve_boot_script};
pub use config::{BatchConfig, CloudConfig, ConfigError, Settings, TelemetryConfig};
pub use instance::{InstanceSpec, InstanceSpecBuilder, NetworkRef, SpecError};
pub use openstack::OpenStackProvider;
pub use profiles::{CloudProfile, ProfileError, ProfileStore};
pub use provider::{ComputeApi, ErrorClass, NetworkApi, Provider, ProviderError, VolumeApi};
