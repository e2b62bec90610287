#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]

use {
    std::{path::PathBuf, process::exit},
    tracing::{Level, info, error},
    tracing_subscriber::FmtSubscriber,
    clap::Parser,
    anyhow::Context,
    bns_server::{
        BuildNumberServer,
        ServerConfig,
        config::DEFAULT_CONFIG_PATH,
        pidfile::PidFile,
        shutdown_signal,
    },
};

/// Serves per-project build numbers over http.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Alternate configuration file.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log at debug level.
    #[arg(long, short)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    FmtSubscriber::builder()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    if let Err(err) = run(args).await {
        error!("bns failed: {err:?}");
        exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    info!("Loading config from {:?}", args.config);
    let config = ServerConfig::load(args.config).await.context("failed to load config")?;
    info!(
        pid_file = ?config.pid_file,
        db_path = %config.db_path,
        port = config.port,
        var_name = %config.var_name,
        "loaded config"
    );

    let pid_file = match config.pid_file.as_ref() {
        Some(path) => Some(PidFile::create(path).context("failed to create pid file")?),
        None => None,
    };

    let server = BuildNumberServer::bind(&config).await.context("failed to start server")?;
    server.serve(shutdown_signal()).await.context("failed to shut down cleanly")?;

    drop(pid_file);
    info!("goodbye.");
    Ok(())
}
