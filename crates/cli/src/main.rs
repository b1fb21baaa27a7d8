use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "intent-relay")]
#[command(about = "Relay Telegram and VK messages to a Dialogflow agent", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a default config file.
    Init {
        /// Config file path (default: INTENT_RELAY_CONFIG_PATH or ~/.intent-relay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Run the Telegram bot (long polling) until Ctrl+C.
    Telegram {
        /// Config file path (default: INTENT_RELAY_CONFIG_PATH or ~/.intent-relay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Run the VK bot (user long poll) until Ctrl+C.
    Vk {
        /// Config file path (default: INTENT_RELAY_CONFIG_PATH or ~/.intent-relay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },
}

fn init_logging(prefix: &'static str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(move |buf, record| {
            writeln!(
                buf,
                "{}",
                relay::logging::render_line(
                    prefix,
                    &chrono::Local::now(),
                    record.level(),
                    record.args()
                )
            )
        })
        .init();
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("intent-relay {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            init_logging("INTENT_RELAY");
            if let Err(e) = run_init(config) {
                log::error!("init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Telegram { config }) => {
            init_logging(relay::runner::TELEGRAM_PREFIX);
            if let Err(e) = run_telegram(config).await {
                log::error!("telegram bot failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Vk { config }) => {
            init_logging(relay::runner::VK_PREFIX);
            if let Err(e) = run_vk(config).await {
                log::error!("vk bot failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(relay::config::default_config_path);
    let dir = relay::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_telegram(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, path) = relay::config::load_config(config_path)?;
    log::debug!("loaded config from {}", path.display());
    relay::runner::run_telegram(config).await
}

async fn run_vk(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, path) = relay::config::load_config(config_path)?;
    log::debug!("loaded config from {}", path.display());
    relay::runner::run_vk(config).await
}
