//! Binary entry point for the stackfleet CLI.

mod cli;

use std::io::{self, Write};
use std::process;
use std::sync::Arc;

use clap::Parser;
use serde::Serialize;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use stackfleet::{
    Automation, BatchConfig, BatchOperations, BootScriptError, CloudConfig, ConfigError,
    ExecutionMode, InstanceSpec, OpenStackProvider, ProfileError, ProfileStore, ProviderError,
    Settings, SpecError, TelemetryConfig, WaitPolicy, resolve_boot_script,
};

use cli::{Cli, Command, InstanceArgs, VolumeCommand};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("profile error: {0}")]
    Profile(#[from] ProfileError),
    #[error("invalid instance: {0}")]
    Spec(#[from] SpecError),
    #[error("boot script error: {0}")]
    BootScript(#[from] BootScriptError),
    #[error("{0}")]
    Provider(#[from] ProviderError),
    #[error("failed to write report: {0}")]
    Output(String),
}

type Fleet = BatchOperations<OpenStackProvider>;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn load_settings(profile: Option<String>) -> Result<Settings, CliError> {
    let cloud = CloudConfig::load_without_cli_args()?
        .apply_named_profile(&ProfileStore::new(), profile.as_deref())?;
    let settings = Settings {
        cloud,
        batch: BatchConfig::load_without_cli_args()?,
        telemetry: TelemetryConfig::load_without_cli_args()?,
    };
    settings.validate()?;
    Ok(settings)
}

fn build_fleet(settings: Settings) -> Fleet {
    let Settings {
        cloud,
        batch,
        telemetry,
    } = settings;
    let provider = Arc::new(OpenStackProvider::new(cloud));
    let automation = Automation::new(provider, WaitPolicy::from_batch(&batch), telemetry);
    BatchOperations::new(automation, batch)
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    let Cli { cloud, command } = cli;
    let fleet = build_fleet(load_settings(cloud)?);
    let automation = fleet.automation();

    match command {
        Command::Infra(args) => emit(
            &automation
                .create_network_infrastructure(&args.name, &args.cidr)
                .await?,
        ),
        Command::SecurityGroup(args) => emit(&automation.create_security_group(&args.name).await?),
        Command::Launch(args) => {
            let user_data = boot_script(&args.instance)?;
            let spec = instance_spec(args.name, &args.instance, user_data)?;
            emit(&automation.launch_instance(&spec).await?)
        }
        Command::BatchLaunch(args) => {
            let user_data = boot_script(&args.instance)?;
            let specs = (1..=args.count)
                .map(|index| {
                    instance_spec(
                        format!("{}-{index}", args.prefix),
                        &args.instance,
                        user_data.clone(),
                    )
                })
                .collect::<Result<Vec<_>, _>>()?;
            let mode = if args.serial {
                ExecutionMode::Serial
            } else {
                ExecutionMode::Parallel
            };
            emit(&fleet.launch(specs, mode).await)
        }
        Command::Snapshot(args) => emit(&fleet.snapshot(&args.servers).await),
        Command::Resize(args) => emit(&fleet.resize(&args.targets.servers, &args.flavor).await?),
        Command::RollingUpdate(args) => {
            emit(&fleet.rolling_update(&args.prefix, &args.image).await?)
        }
        Command::Health(args) => emit(&fleet.health_check(&args.servers).await),
        Command::FloatingIp(args) => emit(&automation.assign_floating_ip(&args.server).await?),
        Command::Volume(VolumeCommand::Create { name, size }) => {
            emit(&automation.create_volume(&name, size).await?)
        }
        Command::Volume(VolumeCommand::Attach { server, volume }) => {
            emit(&automation.attach_volume(&server, &volume).await?)
        }
        Command::Cleanup(args) => emit(&automation.cleanup_resources(&args.prefix).await?),
    }
}

fn boot_script(args: &InstanceArgs) -> Result<Option<String>, CliError> {
    Ok(resolve_boot_script(
        args.user_data.as_deref(),
        args.user_data_file.as_deref(),
    )?)
}

fn instance_spec(
    name: String,
    args: &InstanceArgs,
    user_data: Option<String>,
) -> Result<InstanceSpec, CliError> {
    let mut builder = InstanceSpec::builder(name)
        .security_group(args.security_group.clone())
        .key_name(args.key_name.clone())
        .user_data(user_data)
        .telemetry(!args.no_telemetry);
    if let Some(image) = &args.image {
        builder = builder.image(image.as_str());
    }
    if let Some(flavor) = &args.flavor {
        builder = builder.flavor(flavor.as_str());
    }
    for network in &args.networks {
        builder = builder.network(network.as_str());
    }
    Ok(builder.build()?)
}

fn emit<T: Serialize>(report: &T) -> Result<(), CliError> {
    write_report(io::stdout(), report)
}

fn write_report<T: Serialize>(mut target: impl Write, report: &T) -> Result<(), CliError> {
    let rendered =
        serde_json::to_string_pretty(report).map_err(|err| CliError::Output(err.to_string()))?;
    writeln!(target, "{rendered}").map_err(|err| CliError::Output(err.to_string()))
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
