use anyhow::Context;
use quire_server::{
    api::AppState,
    app::build_router,
    compile::CompileOrchestrator,
    config::{LogFormat, ServerConfig},
    cors::cors_layer,
};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env();
    init_tracing(&config);

    if !config.engine_path.exists() {
        warn!(
            engine_path = %config.engine_path.display(),
            "engine binary not found, every compile will fail until it is installed"
        );
    }

    let state = AppState::new(CompileOrchestrator::new(config.compile_options()));
    let app = build_router(state, cors_layer(config.cors_origins.as_deref()), config.max_body_bytes);

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind compile server on {}", config.listen_addr))?;

    info!(
        listen_addr = %config.listen_addr,
        engine_path = %config.engine_path.display(),
        timeout_secs = config.compile_timeout.as_secs(),
        max_concurrent_compiles = config.max_concurrent_compiles,
        "starting compile server"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("compile server exited unexpectedly")
}

fn init_tracing(config: &ServerConfig) {
    let filter = EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
}
