//! Spatialiser CLI - run the engine, sweep a sound check, or export the layout

use clap::{Parser, Subcommand};
use spatialiser::config::SpatialiserConfig;
use spatialiser::routing::NullSink;
use spatialiser::spatialiser::Spatialiser;
use std::path::PathBuf;
use tracing::Level;

#[derive(Parser)]
#[command(name = "spatialiser")]
#[command(about = "Real-time spatial audio panning for modular speaker arrays", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file (built-in defaults when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the OSC listen port from the configuration
    #[arg(short = 'p', long, global = true)]
    osc_port: Option<u16>,

    /// Enable debug-level log output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine until Enter is pressed (the default command)
    Run,

    /// Sweep a test burst across every speaker channel, one at a time
    SoundCheck,

    /// Print the speaker layout as a SPAT-style OSC string
    Layout {
        /// Write the layout to this file instead of stdout
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let mut config = match &cli.config {
        Some(path) => SpatialiserConfig::load(path)?,
        None => SpatialiserConfig::default(),
    };
    if let Some(port) = cli.osc_port {
        config.osc_port = port;
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config),
        Commands::SoundCheck => sound_check(config),
        Commands::Layout { file } => layout(config, file),
    }
}

fn run(config: SpatialiserConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut engine = Spatialiser::new(config)?;
    engine.start()?;

    println!("Spatialiser running");
    println!("  OSC control: port {}", engine.config().osc_port);
    println!("  Speakers:    {}", engine.speakers().len());
    println!("  Sources:     {}", engine.renderers().len());
    println!();
    println!("Press Enter to stop...");

    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;

    engine.stop();
    Ok(())
}

fn sound_check(config: SpatialiserConfig) -> Result<(), Box<dyn std::error::Error>> {
    let engine = Spatialiser::new(config)?;
    let mut sink = NullSink;
    engine.sound_check(&mut sink);
    Ok(())
}

fn layout(
    mut config: SpatialiserConfig,
    file: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    // A layout dump is a pure query, skip the visualiser handshake.
    config.visualiser.enabled = false;
    let engine = Spatialiser::new(config)?;
    let layout = engine.spat_layout();

    match file {
        Some(path) => {
            std::fs::write(&path, format!("{layout}\n"))?;
            println!("Wrote speaker layout to {}", path.display());
        }
        None => println!("{layout}"),
    }
    Ok(())
}
