//! Voice command bridge binary.
//!
//! Joins the publish middleware as `voice_cmd_vel`, opens the microphone and
//! the keyword-spotting decoder, and runs the bridge loop until interrupted.

use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use voice_cmd_bridge::{
    init_logging, BridgeConfig, KeywordTable, MicrophoneSource, RosbridgePublisher, ShutdownFlag,
    SphinxDecoder, TableError, VoiceCommandBridge,
};

/// rosbridge endpoint used when ROSBRIDGE_ADDR is not set
const DEFAULT_ROSBRIDGE_ADDR: &str = "127.0.0.1:9090";

#[derive(Parser)]
#[command(name = "voice-cmd-bridge")]
#[command(about = "Voice-controlled velocity commands via keyword spotting", long_about = None)]
struct Cli {
    /// Acoustic model path
    #[arg(
        long,
        default_value = "/usr/share/pocketsphinx/model/hmm/en_US/hub4wsj_sc_8k"
    )]
    model: PathBuf,

    /// Pronunciation dictionary
    #[arg(long, default_value = "voice_cmd.dic")]
    lexicon: PathBuf,

    /// Keyword list with thresholds
    #[arg(long, default_value = "voice_cmd.kwlist")]
    kwlist: PathBuf,

    /// Publish destination for velocity commands
    #[arg(long, default_value = "mobile_base/commands/velocity")]
    rospub: String,
}

#[tokio::main]
async fn main() {
    init_logging();

    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let table = match load_keyword_table() {
        Ok(table) => table,
        Err(e) => {
            error!("Failed to load keyword table: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting voice command bridge v{}", voice_cmd_bridge::VERSION);
    info!(
        "Publishing on '{}' as node '{}'",
        config.topic, config.node_name
    );

    let shutdown = ShutdownFlag::new();
    let signal_flag = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
            signal_flag.set();
        }
    });

    let rosbridge_addr =
        std::env::var("ROSBRIDGE_ADDR").unwrap_or_else(|_| DEFAULT_ROSBRIDGE_ADDR.to_string());

    // The decoder handle cannot cross threads, so every collaborator is
    // constructed on the blocking worker that runs the loop.
    let worker = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
        let decoder =
            SphinxDecoder::new(&config.model_path, &config.lexicon_path, &config.kwlist_path)?;
        let publisher =
            RosbridgePublisher::connect(&rosbridge_addr, &config.topic, &config.node_name)?;
        let mut mic = MicrophoneSource::open(&config.audio)?;

        let mut bridge = VoiceCommandBridge::new(&config, table, decoder, publisher)?;
        let stats = bridge.run(&mut mic, &shutdown)?;
        Ok(stats)
    });

    match worker.await {
        Ok(Ok(stats)) => {
            info!(
                "Stopped after {} buffers, {} commands published",
                stats.buffers_read, stats.commands_published
            );
        }
        Ok(Err(e)) => {
            error!("Bridge failed: {:#}", e);
            std::process::exit(1);
        }
        Err(e) => {
            error!("Bridge worker panicked: {}", e);
            std::process::exit(1);
        }
    }
}

/// Build the bridge configuration from CLI flags and environment
fn load_config(cli: &Cli) -> Result<BridgeConfig, Box<dyn std::error::Error>> {
    let mut config = BridgeConfig {
        model_path: cli.model.clone(),
        lexicon_path: cli.lexicon.clone(),
        kwlist_path: cli.kwlist.clone(),
        topic: cli.rospub.clone(),
        ..Default::default()
    };

    if let Ok(speed) = std::env::var("VOICE_CMD_BASE_SPEED") {
        config.base_speed = speed.parse::<f64>()?;
    }

    config.validate()?;
    Ok(config)
}

/// Load the keyword table, honoring the override file if one is configured
fn load_keyword_table() -> Result<KeywordTable, TableError> {
    match std::env::var("VOICE_CMD_KEYWORD_TABLE") {
        Ok(path) => {
            info!("Loading keyword table from {}", path);
            KeywordTable::from_file(Path::new(&path))
        }
        Err(_) => Ok(KeywordTable::default()),
    }
}
