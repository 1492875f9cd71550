use std::io;
use std::path::PathBuf;

use clap::Parser;

use multiverse_server::config::{default_db_path, DEFAULT_HOST, DEFAULT_MODEL};
use multiverse_server::logging::init_logging;
use multiverse_server::{run_server, ServerConfig};

#[derive(Parser, Debug, Clone)]
#[command(name = "multiverse-server")]
#[command(about = "Branching conversation tree server backed by Ollama")]
#[command(version)]
struct Cli {
    /// Enable debug mode
    #[arg(long, env = "DEBUG", default_value = "false")]
    debug: bool,

    /// Bind host
    #[arg(long, env = "HOST", default_value = DEFAULT_HOST)]
    host: String,

    /// Server port
    #[arg(long, env = "PORT", default_value = "8000")]
    port: u16,

    /// SQLite database file (defaults to ~/.multiverse/chat.db)
    #[arg(long, env = "MULTIVERSE_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Ollama base URL
    #[arg(long, env = "OLLAMA_BASE_URL", default_value = "http://localhost:11434")]
    ollama_url: String,

    /// Model used when a request does not name one
    #[arg(long, env = "DEFAULT_MODEL", default_value = DEFAULT_MODEL)]
    default_model: String,

    /// System prompt prepended to every inference context
    #[arg(long, env = "SYSTEM_PROMPT")]
    system_prompt: Option<String>,

    /// Log level (overrides debug flag)
    #[arg(long, env = "RUST_LOG")]
    log_level: Option<String>,
}

impl From<Cli> for ServerConfig {
    fn from(cli: Cli) -> Self {
        Self {
            host: cli.host,
            port: cli.port,
            db_path: cli.db_path.unwrap_or_else(default_db_path),
            ollama_url: cli.ollama_url,
            default_model: cli.default_model,
            system_prompt: cli.system_prompt,
        }
    }
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    let cli = Cli::parse();

    if cli.log_level.is_some() {
        env_logger::init();
    } else {
        init_logging(cli.debug);
    }

    log::info!("Starting Multiverse server on {}:{}", cli.host, cli.port);
    log::info!("  Ollama URL: {}", cli.ollama_url);
    log::info!("  Default model: {}", cli.default_model);
    if cli.debug {
        log::debug!("Debug mode enabled");
        log::debug!("  Database: {:?}", cli.db_path);
        log::debug!("  System prompt set: {}", cli.system_prompt.is_some());
    }

    run_server(ServerConfig::from(cli)).await
}
