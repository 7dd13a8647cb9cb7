/*!
 * Tether CLI
 *
 * Inspect the proxy tables generated for a set of model definitions, or issue
 * a single remote call through them.
 */

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tether::{
    config::{ConnectorConfig, LogLevel},
    connector::{load_models, Connector},
    error::{CallError, TetherError, EXIT_FATAL, EXIT_SUCCESS},
    logging, Model, Registry,
};

#[derive(Parser)]
#[command(name = "tether")]
#[command(version, about = "Model-to-remote-procedure bridge", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Endpoint address; overrides protocol/host/port/root
    #[arg(long, value_name = "URL", global = true)]
    url: Option<String>,

    /// Log level
    #[arg(long = "log-level", value_enum, global = true)]
    log_level: Option<LogLevelArg>,

    /// Write logs to FILE as JSON
    #[arg(long = "log", value_name = "FILE", global = true)]
    log: Option<PathBuf>,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the method and relation tables of every model
    Inspect {
        /// Model definitions (JSON array)
        #[arg(short = 'm', long, value_name = "FILE")]
        models: PathBuf,
    },

    /// Call one remote method and print the result
    Call {
        /// Model definitions (JSON array)
        #[arg(short = 'm', long, value_name = "FILE")]
        models: PathBuf,

        /// Method to call, as Model.method
        #[arg(value_name = "MODEL.METHOD")]
        target: String,

        /// Identity of the instance to call an instance method on
        #[arg(long, value_name = "ID")]
        id: Option<String>,

        /// Positional arguments, each parsed as JSON (plain strings allowed)
        #[arg(value_name = "ARGS")]
        args: Vec<String>,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LogLevel {
    fn from(arg: LogLevelArg) -> Self {
        match arg {
            LogLevelArg::Error => LogLevel::Error,
            LogLevelArg::Warn => LogLevel::Warn,
            LogLevelArg::Info => LogLevel::Info,
            LogLevelArg::Debug => LogLevel::Debug,
            LogLevelArg::Trace => LogLevel::Trace,
        }
    }
}

fn main() {
    let code = match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            exit_code(&e)
        }
    };
    std::process::exit(code);
}

fn exit_code(err: &anyhow::Error) -> i32 {
    if let Some(e) = err.downcast_ref::<CallError>() {
        e.exit_code()
    } else if let Some(e) = err.downcast_ref::<TetherError>() {
        e.exit_code()
    } else {
        EXIT_FATAL
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match cli.config {
        Some(ref path) => ConnectorConfig::from_file(path)?,
        None => ConnectorConfig::default(),
    };

    // CLI flags override the file
    if let Some(url) = cli.url.clone() {
        config.url = Some(url);
    }
    if let Some(level) = cli.log_level {
        config.log_level = level.into();
    }
    if cli.log.is_some() {
        config.log_file = cli.log.clone();
    }
    config.verbose |= cli.verbose;

    logging::init_logging(&config)?;

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;

    runtime.block_on(execute(cli.command, config))
}

async fn execute(command: Commands, config: ConnectorConfig) -> anyhow::Result<()> {
    match command {
        Commands::Inspect { models } => {
            let registry = connect(config, &models)?;
            inspect(&registry);
        }
        Commands::Call {
            models,
            target,
            id,
            args,
        } => {
            let registry = connect(config, &models)?;
            registry.ready().await;

            let value = call(&registry, &target, id.as_deref(), args).await?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }

    Ok(())
}

fn connect(config: ConnectorConfig, models: &Path) -> anyhow::Result<Registry> {
    let descriptors = load_models(models)?;

    let mut connector = Connector::new(config)?;
    connector.define_all(descriptors)?;
    Ok(connector.initialize()?)
}

fn inspect(registry: &Registry) {
    for name in registry.model_names() {
        let Ok(model) = registry.model(name) else {
            continue;
        };
        print_model(&model);
    }
}

fn print_model(model: &Model) {
    let def = model.def();
    println!(
        "{} (id: {})",
        model.name(),
        def.id_property().unwrap_or("-")
    );

    for (label, table) in [("static", def.statics()), ("prototype", def.prototype())] {
        for method in table.methods() {
            let aliases = if method.aliases().is_empty() {
                String::new()
            } else {
                format!(" [{}]", method.aliases().join(", "))
            };
            println!("  {:<9} {}{} -> {}", label, method.name(), aliases, method.path());
        }
    }

    for accessor in def.relations().iter() {
        let relation = accessor.descriptor();
        println!(
            "  relation  {} {} {}",
            relation.name, relation.kind, relation.target
        );
    }
}

/// Parse a CLI argument as JSON, falling back to a plain string
fn parse_arg(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

async fn call(
    registry: &Registry,
    target: &str,
    id: Option<&str>,
    args: Vec<String>,
) -> anyhow::Result<Value> {
    let (model_name, method) = target.split_once('.').ok_or_else(|| {
        TetherError::Config(format!("Expected Model.method, got '{}'", target))
    })?;

    let model = registry.model(model_name)?;
    let args: Vec<Value> = args.iter().map(|arg| parse_arg(arg)).collect();

    let handle = match id {
        Some(id) => {
            let property = model.def().id_property().ok_or_else(|| {
                TetherError::Config(format!("{} has no identity property", model.name()))
            })?;

            let mut instance = model.new_instance();
            instance.set(property, parse_arg(id));
            instance.call(method, args)?
        }
        None => model.call(method, args)?,
    };

    let value = handle.await?;
    Ok(value.to_json())
}
