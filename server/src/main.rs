// CodeSafe - code-addressed note sharing server
// Entry point and server setup

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use codesafe::config::{
    CloudStorageSettings, ServerConfig, DEFAULT_CLOUD_API_BASE, DEFAULT_SESSION_IDLE_MINUTES,
    DEFAULT_UPLOAD_TIMEOUT_SECS, MAX_FILE_SIZE_BYTES,
};

#[derive(Parser, Debug)]
#[command(name = "codesafe", version, about = "Code-addressed note sharing server")]
struct Cli {
    /// Address to bind to
    #[arg(long, env = "CODESAFE_BIND", default_value = "127.0.0.1")]
    bind: String,

    #[arg(long, short, env = "CODESAFE_PORT", default_value_t = 8080)]
    port: u16,

    /// Directory for the database and locally stored files
    #[arg(long, env = "CODESAFE_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    /// Externally visible base URL
    #[arg(long, env = "CODESAFE_PUBLIC_URL")]
    public_url: Option<String>,

    /// Secret the PIN encryption key is derived from
    #[arg(long, env = "CODESAFE_PIN_SECRET", hide_env_values = true)]
    pin_secret: String,

    #[arg(long, env = "CLOUDINARY_CLOUD_NAME", default_value = "")]
    cloud_name: String,

    #[arg(long, env = "CLOUDINARY_API_KEY", default_value = "", hide_env_values = true)]
    cloud_api_key: String,

    #[arg(long, env = "CLOUDINARY_API_SECRET", default_value = "", hide_env_values = true)]
    cloud_api_secret: String,

    #[arg(long, env = "CLOUDINARY_API_BASE", default_value = DEFAULT_CLOUD_API_BASE)]
    cloud_api_base: String,

    /// Remote upload timeout in seconds
    #[arg(long, env = "CODESAFE_UPLOAD_TIMEOUT_SECS", default_value_t = DEFAULT_UPLOAD_TIMEOUT_SECS)]
    upload_timeout_secs: u64,

    /// Idle minutes before a session and its PIN verifications expire
    #[arg(long, env = "CODESAFE_SESSION_IDLE_MINUTES", default_value_t = DEFAULT_SESSION_IDLE_MINUTES)]
    session_idle_minutes: u64,

    /// Largest accepted upload in bytes
    #[arg(long, env = "CODESAFE_MAX_UPLOAD_BYTES", default_value_t = MAX_FILE_SIZE_BYTES)]
    max_upload_bytes: u64,
}

impl Cli {
    fn into_config(self) -> ServerConfig {
        let public_url = self
            .public_url
            .unwrap_or_else(|| format!("http://{}:{}", self.bind, self.port));

        let mut config = ServerConfig::new(self.data_dir, self.pin_secret);
        config.bind = self.bind;
        config.port = self.port;
        config.public_url = public_url;
        config.cloud = CloudStorageSettings {
            cloud_name: self.cloud_name,
            api_key: self.cloud_api_key,
            api_secret: self.cloud_api_secret,
        };
        config.cloud_api_base = self.cloud_api_base;
        config.upload_timeout = Duration::from_secs(self.upload_timeout_secs);
        config.session_idle_timeout = Duration::from_secs(self.session_idle_minutes * 60);
        config.max_upload_size = self.max_upload_bytes;
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "codesafe=debug,tower_http=info,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Cli::parse().into_config();

    tracing::info!("Starting CodeSafe server");

    let state = codesafe::app::build(&config)
        .await
        .context("failed to initialize application")?;
    let app = codesafe::handlers::router(state);

    let addr = format!("{}:{}", config.bind, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    tracing::info!("Listening on {} (public URL {})", addr, config.public_url);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
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

    tracing::info!("Shutdown signal received");
}
