use camino::Utf8PathBuf;
use clap::{ArgAction, Args, Parser, Subcommand};
use eyre::WrapErr as _;
use npm_bridge::{Bridge, ServerConfig, TlsFiles};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "npm-registry", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the registry server
    Serve(ServeArgs),
}

#[derive(Debug, Args)]
struct ServeArgs {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 9000)]
    port: u16,

    /// Log every request
    #[arg(long, env = "DEBUG")]
    debug: bool,

    /// Serve HTTPS
    #[arg(long, env = "USE_TLS")]
    use_tls: bool,

    /// PEM certificate chain, used with --use-tls
    #[arg(long, env = "CERT_FILE", default_value = "certs/registry.pem")]
    cert_file: Utf8PathBuf,

    /// PEM private key, used with --use-tls
    #[arg(long, env = "KEY_FILE", default_value = "certs/registry-key.pem")]
    key_file: Utf8PathBuf,

    /// Backing registry, oci://[user[:pass]@]host[:port][/path]
    #[arg(long, env = "OCI_URL", default_value = npm_bridge::DEFAULT_OCI_URL)]
    oci_url: String,

    /// Talk plain HTTP to the backing registry
    #[arg(long, env = "OCI_PLAIN_HTTP", default_value_t = true, action = ArgAction::Set)]
    oci_plain_http: bool,

    /// Largest accepted request body, in bytes
    #[arg(long, env = "MAX_BODY_SIZE", default_value_t = npm_bridge::DEFAULT_MAX_BODY_SIZE)]
    max_body_size: usize,

    /// Serialize concurrent publishes of the same package
    #[arg(long, env = "SERIALIZE_PUSHES", default_value_t = true, action = ArgAction::Set)]
    serialize_pushes: bool,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => serve(args).await,
    }
}

async fn serve(args: ServeArgs) -> eyre::Result<()> {
    let default_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let bridge = Bridge::builder()
        .oci_url(args.oci_url)
        .debug(args.debug)
        .plain_http(args.oci_plain_http)
        .max_body_size(args.max_body_size)
        .serialize_pushes(args.serialize_pushes)
        .build();
    bridge.init().wrap_err("invalid OCI URL")?;

    let config = ServerConfig {
        port: args.port,
        tls: args.use_tls.then(|| TlsFiles {
            cert_file: args.cert_file,
            key_file: args.key_file,
        }),
    };
    tracing::info!(port = config.port, tls = config.tls.is_some(), "starting registry");

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    npm_bridge::serve(bridge.router(), config, shutdown)
        .await
        .wrap_err("server failed")?;
    Ok(())
}

async fn cancel_on_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl-C: {error}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::error!("failed to listen for SIGTERM: {error}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown requested");
    token.cancel();
}
