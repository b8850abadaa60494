//! The wishbone bootstrap binary
//!
//! Thin glue over the library: start a router from a bootstrap file, list
//! the discovered components, or show the documentation of one.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info};

use wishbone::{
    ComponentRegistry, ConfigFile, LogStyle, MetricsInterval, QueueCapacity, Router,
};

#[derive(Parser)]
#[command(name = "wishbone", version, about = "Build event pipeline servers.")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogStyleArg {
    Stdout,
    Syslog,
}

impl From<LogStyleArg> for LogStyle {
    fn from(style: LogStyleArg) -> Self {
        match style {
            LogStyleArg::Stdout => Self::Stdout,
            LogStyleArg::Syslog => Self::Syslog,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Starts a pipeline from a bootstrap file and blocks until shutdown.
    Start {
        /// The bootstrap file to load.
        #[arg(long)]
        config: PathBuf,

        /// Where the log pipeline terminates.
        #[arg(long, value_enum, default_value = "stdout")]
        log_style: LogStyleArg,

        /// A string identifying this instance in log output.
        #[arg(long, default_value = "wishbone")]
        identification: String,

        /// The capacity of every module queue.
        #[arg(long, default_value_t = 100)]
        queue_size: usize,

        /// Seconds between metric sweeps.
        #[arg(long, default_value_t = 1)]
        frequency: u64,

        /// Disables ANSI colors on stdout logging.
        #[arg(long)]
        no_colors: bool,
    },

    /// Lists all discovered components.
    List,

    /// Shows the documentation of a component.
    Show {
        /// The qualified component name, e.g. wishbone.module.flow.funnel.
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("wishbone=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Start {
            config,
            log_style,
            identification,
            queue_size,
            frequency,
            no_colors,
        } => {
            start(
                config,
                log_style.into(),
                identification,
                queue_size,
                frequency,
                !no_colors,
            )
            .await
        }
        Command::List => {
            list();
            Ok(())
        }
        Command::Show { name } => show(&name),
    }
}

async fn start(
    config: PathBuf,
    log_style: LogStyle,
    identification: String,
    queue_size: usize,
    frequency: u64,
    colorize: bool,
) -> Result<()> {
    let pipeline = ConfigFile::new(log_style)
        .with_identification(identification)
        .with_colorized_stdout(colorize)
        .load(&config)?;

    let mut router = Router::new(ComponentRegistry::with_builtins())
        .with_size(QueueCapacity::try_new(queue_size)?)
        .with_frequency(MetricsInterval::try_new(frequency)?);
    router.initialize(&pipeline)?;
    router.start().await?;
    info!(config = %config.display(), "pipeline running");

    let router = Arc::new(router);
    let stopper = Arc::clone(&router);
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(%err, "cannot listen for shutdown signal");
            return;
        }
        info!("shutdown signal received");
        stopper.stop().await;
    });

    router.block().await;
    Ok(())
}

fn list() {
    let registry = ComponentRegistry::with_builtins();
    println!(
        "{:<45} {:<9} {}",
        "Component", "Version", "Description"
    );
    for component in registry.list() {
        println!(
            "{:<45} {:<9} {}",
            component.qualified_name(),
            component.version,
            component.title
        );
    }
}

fn show(name: &str) -> Result<()> {
    let registry = ComponentRegistry::with_builtins();
    let component = registry.get(name)?;
    println!("{}", component.qualified_name());
    println!();
    println!("{}", component.title);
    println!();
    println!("{}", component.doc);
    Ok(())
}
