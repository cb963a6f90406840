use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use conveyor::compiler::{Compiler, GithubRegistry, MemoryRegistry, Registry};
use conveyor::config::ServerConfig;
use conveyor::server::{AppState, create_router};
use conveyor::store::{PipelineStore, SqliteStore};

#[derive(Parser)]
#[command(name = "conveyor")]
#[command(about = "A CI pipeline compiler server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        #[arg(long, default_value_t = 8080)]
        port: u16,

        #[arg(long, default_value = "./data")]
        data_dir: String,

        /// Template registry base URL, used for HTML links
        #[arg(long, default_value = "https://github.com")]
        registry_url: String,

        /// Raw-content endpoint template bytes are fetched from
        #[arg(long, default_value = "https://raw.githubusercontent.com")]
        registry_raw_url: String,

        /// Token for authenticated registry fetches
        #[arg(long, env = "CONVEYOR_REGISTRY_TOKEN")]
        registry_token: Option<String>,

        /// zlib level for stored pipeline data (0-9)
        #[arg(long, default_value_t = 3)]
        compression_level: u32,
    },

    /// Parse and validate a local pipeline file without expansion
    Validate {
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("conveyor=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            host,
            port,
            data_dir,
            registry_url,
            registry_raw_url,
            registry_token,
            compression_level,
        } => {
            let config = ServerConfig {
                host,
                port,
                data_dir: data_dir.into(),
                registry_url,
                registry_raw_url,
                registry_token,
                compression_level,
                ..ServerConfig::default()
            };

            fs::create_dir_all(&config.data_dir)?;

            let store = SqliteStore::new(config.db_path(), config.compression_level)?;
            store.initialize()?;

            let registry = Registry::Github(GithubRegistry::new(
                &config.registry_url,
                &config.registry_raw_url,
                config.registry_token.clone(),
            ));

            let state = Arc::new(AppState {
                store: Arc::new(store),
                registry,
                limits: config.limits,
                merge_policy: Default::default(),
            });

            let app = create_router(state);
            let addr = config.socket_addr()?;

            info!("Starting server on {}", addr);

            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app).await?;
        }
        Commands::Validate { file } => {
            let raw = fs::read(&file)?;

            let compiler = Compiler::new(Registry::Memory(MemoryRegistry::default()));
            let doc = compiler.parse(&raw)?;
            compiler.validate(&doc)?;

            println!("{} is valid", file.display());
        }
    }

    Ok(())
}
