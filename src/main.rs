#[macro_use]
extern crate tracing;

mod config;
mod controller;
mod errors;
mod fetcher;
mod processor;
mod routes;
mod scratch;
mod storage;

#[cfg(test)]
mod test_helpers;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use poem::listener::TcpListener;
use poem::middleware::Tracing;
use poem::{EndpointExt, Route, Server};
use poem_openapi::OpenApiService;
use tracing_subscriber::EnvFilter;

use crate::controller::ThumbnailController;
use crate::fetcher::HttpFetcher;
use crate::processor::{ImageCrateEngine, Resizer};
use crate::routes::ThumbnailerApi;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Debug, Parser)]
#[clap(author, version, about)]
pub struct Cli {
    #[clap(long, env = "LOG_LEVEL")]
    /// The log filter to use, e.g. `debug` or `thumbnailer=debug,poem=info`.
    ///
    /// Falls back to `RUST_LOG` and then `info`.
    log_level: Option<String>,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Runs the server with the given configuration.
    Run {
        #[clap(
            short,
            long,
            env = "THUMBNAILER_CONFIG",
            default_value = "./etc/img-thumbnailer/server.yaml"
        )]
        /// The path to the YAML config file.
        config: PathBuf,
    },

    /// Writes a template configuration file.
    Init {
        #[clap(short, long, default_value = "./server.yaml")]
        /// Where to write the template to.
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Cli = Cli::parse();

    let filter = match args.log_level.as_deref() {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match args.command {
        Commands::Run { config } => run_server(&config).await,
        Commands::Init { out } => run_init(&out).await,
    }
}

async fn run_init(out: &Path) -> Result<()> {
    let template = serde_yaml::to_string(&config::RuntimeConfig::template())?;
    tokio::fs::write(out, template).await?;

    info!("Wrote template config to {:?}", out);
    Ok(())
}

async fn run_server(config_path: &Path) -> Result<()> {
    if let Err(e) = config::init(config_path).await {
        error!("Loading configuration failed: {}", e);
        return Err(e.into());
    }
    let cfg = config::config();

    let scratch_dir = cfg.scratch_dir();
    tokio::fs::create_dir_all(&scratch_dir).await?;

    let storage = cfg.backend.connect(cfg.upload_timeout()).await?;
    let fetcher = Arc::new(HttpFetcher::new(scratch_dir.clone(), cfg.fetch_timeout())?);
    let resizer =
        Resizer::new(Arc::new(ImageCrateEngine), scratch_dir).with_limits(cfg.output_limits());

    let controller = Arc::new(ThumbnailController::new(
        fetcher,
        resizer,
        storage,
        cfg.bucket.clone(),
        cfg.region.clone(),
    ));

    let api_service = OpenApiService::new(
        ThumbnailerApi::new(controller),
        "Thumbnailer API",
        env!("CARGO_PKG_VERSION"),
    )
    .server(format!("http://{}", cfg.bind_address()));

    let ui = api_service.redoc();
    let app = Route::new()
        .nest("/", api_service)
        .nest("/docs", ui)
        .with(Tracing);

    info!(
        "Publishing thumbnails to bucket {} ({}), listening on {}",
        &cfg.bucket,
        &cfg.region,
        cfg.bind_address(),
    );

    Server::new(TcpListener::bind(cfg.bind_address()))
        .run(app)
        .await?;

    Ok(())
}
