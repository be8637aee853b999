//! flowlog CLI - validate mediator configurations and run single passes
//!
//! Both commands read the agent configuration from `--agent` or from the
//! `FLOWLOG_AGENT_CONFIG` environment variable (`.env` files are honoured).

use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use flowlog::agent::{run_shipper, AgentCell, NdjsonSink};
use flowlog::config::{AgentConfig, MediatorConfig, MediatorFactory, AGENT_CONFIG_ENV};
use flowlog::{Agent, EnvelopeMessage};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flowlog")]
#[command(version, about = "Transaction extraction for message mediation pipelines", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a mediator and print its serialized configuration
    Validate {
        /// Path to the agent configuration
        #[arg(short, long, env = AGENT_CONFIG_ENV)]
        agent: PathBuf,

        /// Path to the mediator configuration
        #[arg(short, long)]
        mediator: PathBuf,
    },

    /// Run one mediation pass over a JSON message
    Mediate {
        /// Path to the agent configuration
        #[arg(short, long, env = AGENT_CONFIG_ENV)]
        agent: PathBuf,

        /// Path to the mediator configuration
        #[arg(short, long)]
        mediator: PathBuf,

        /// Path to the message envelope ({id, headers, properties, body})
        #[arg(long)]
        message: PathBuf,

        /// Write shipped transactions here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate { agent, mediator } => validate(&agent, &mediator),
        Commands::Mediate {
            agent,
            mediator,
            message,
            output,
        } => mediate(&agent, &mediator, &message, output.as_deref()).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn validate(agent_path: &Path, mediator_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let agent_config = AgentConfig::load_from_file(agent_path)?;
    let cell = AgentCell::new();
    let agent = cell.get_or_try_init(|| {
        let (agent, _receiver) = agent_config.build_agent();
        Ok(Arc::new(agent) as Arc<dyn Agent>)
    })?;

    let factory = MediatorFactory::from_agent_config(&agent_config, agent)?;
    let mediator = factory.create(&MediatorConfig::load_from_file(mediator_path)?)?;

    println!("✓ Mediator at {} is valid", mediator.location());
    print!("{}", MediatorConfig::from_mediator(&mediator).to_yaml()?);
    Ok(())
}

async fn mediate(
    agent_path: &Path,
    mediator_path: &Path,
    message_path: &Path,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let agent_config = AgentConfig::load_from_file(agent_path)?;
    let (channel_agent, receiver) = agent_config.build_agent();

    let cell = AgentCell::new();
    let agent = cell.get_or_try_init(|| Ok(Arc::new(channel_agent) as Arc<dyn Agent>))?;

    let sink: Box<dyn Write + Send> = match output {
        Some(path) => Box::new(File::create(path)?),
        None => Box::new(io::stdout()),
    };
    let shipper = tokio::spawn(run_shipper(
        receiver,
        NdjsonSink::new(sink),
        agent_config.transport.interval(),
        agent_config.transport.size_threshold,
    ));

    let factory = MediatorFactory::from_agent_config(&agent_config, Arc::clone(&agent))?;
    let mediator = factory.create(&MediatorConfig::load_from_file(mediator_path)?)?;

    let mut message = EnvelopeMessage::from_json_str(&std::fs::read_to_string(message_path)?)?;
    mediator.mediate(&mut message);

    // Dropping every agent handle closes the channel and drains the shipper.
    drop(mediator);
    drop(factory);
    drop(agent);
    drop(cell);
    shipper.await?;

    eprintln!("Headers after mediation:");
    eprintln!("{}", serde_json::to_string_pretty(&message.headers)?);
    Ok(())
}
