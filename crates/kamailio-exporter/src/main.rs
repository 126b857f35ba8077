mod auth;
mod handlers;
mod state;

use std::net::SocketAddr;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::get;
use clap::Parser;
use prometheus::Registry;
use tower_http::compression::CompressionLayer;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

use kamailio_exporter_core::collector::{RpcClient, StatsCollector};
use kamailio_exporter_core::config::{
    Config, ConstLabels, DEFAULT_BINRPC_PORT, DEFAULT_SOCKET_PATH, Transport, parse_label,
};
use kamailio_exporter_core::metrics::Catalog;

use auth::{AccessLogLayer, Credentials};
use state::{AppStateInner, SharedState};

// ============================================================
// CLI
// ============================================================

#[derive(Parser, Debug)]
#[command(
    name = "kamailio-exporter",
    about = "Prometheus exporter for Kamailio SIP server statistics",
    version = kamailio_exporter_core::VERSION
)]
struct Args {
    /// Path to the Kamailio ctl unix socket.
    /// Defaults to /var/run/kamailio/kamailio_ctl unless --host is given.
    #[arg(long, env = "KAMAILIO_EXPORTER_SOCKET_PATH", value_name = "PATH")]
    socket_path: Option<String>,

    /// Kamailio host for BINRPC over TCP. Ignored when --socket-path is set.
    #[arg(long, env = "KAMAILIO_EXPORTER_HOST")]
    host: Option<String>,

    /// Kamailio BINRPC TCP port.
    #[arg(long, default_value_t = DEFAULT_BINRPC_PORT, env = "KAMAILIO_EXPORTER_PORT")]
    port: u16,

    /// Listen address of the HTTP server.
    #[arg(long, default_value = "0.0.0.0:9494", env = "KAMAILIO_EXPORTER_LISTEN")]
    listen: SocketAddr,

    /// Path under which metrics are exposed.
    #[arg(
        long,
        default_value = "/metrics",
        env = "KAMAILIO_EXPORTER_METRICS_PATH",
        value_parser = parse_metrics_path
    )]
    metrics_path: String,

    /// Constant label added to every metric (repeatable).
    #[arg(
        long = "label",
        value_name = "NAME=VALUE",
        env = "KAMAILIO_EXPORTER_LABELS",
        value_delimiter = ',',
        value_parser = parse_label
    )]
    labels: Vec<(String, String)>,

    /// Deadline for each RPC call in seconds. 0 disables it.
    #[arg(long, default_value = "5", env = "KAMAILIO_EXPORTER_TIMEOUT")]
    timeout: u64,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,

    /// Basic Auth username. If set, --auth-password is also required.
    #[arg(long, env = "KAMAILIO_EXPORTER_AUTH_USER")]
    auth_user: Option<String>,

    /// Basic Auth password.
    #[arg(long, env = "KAMAILIO_EXPORTER_AUTH_PASSWORD")]
    auth_password: Option<String>,
}

impl Args {
    /// A non-empty socket path wins, then a non-empty host, then the default socket.
    fn transport(&self) -> Transport {
        let socket_path = self.socket_path.as_deref().unwrap_or_default();
        let host = self.host.as_deref().unwrap_or_default();
        if socket_path.is_empty() && host.is_empty() {
            Transport::select(DEFAULT_SOCKET_PATH, host, self.port)
        } else {
            Transport::select(socket_path, host, self.port)
        }
    }

    fn config(&self) -> Config {
        let labels: ConstLabels = self.labels.iter().cloned().collect();
        Config::new(self.transport())
            .with_const_labels(labels)
            .with_timeout(Duration::from_secs(self.timeout))
    }
}

fn parse_metrics_path(s: &str) -> Result<String, String> {
    if !s.starts_with('/') {
        return Err(format!("metrics path '{}' must start with '/'", s));
    }
    if s == "/" || s == "/health" {
        return Err(format!("metrics path '{}' is reserved", s));
    }
    Ok(s.to_string())
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Default level is INFO. Use -q for quiet mode (errors only).
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["kamailio_exporter", "kamailio_exporter_core"] {
        if let Ok(directive) = format!("{}={}", target, level).parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

// ============================================================
// Main
// ============================================================

fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let config = args.config();
    info!(
        version = kamailio_exporter_core::VERSION,
        transport = %config.transport,
        timeout_s = args.timeout,
        labels = config.const_labels.len(),
        "kamailio-exporter starting"
    );

    let catalog = match Catalog::new(config.const_labels.clone()) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            error!(error = %e, "invalid metric configuration");
            process::exit(1);
        }
    };

    let registry = Registry::new();
    let collector = StatsCollector::new(RpcClient::from_config(&config), catalog);
    if let Err(e) = registry.register(Box::new(collector)) {
        error!(error = %e, "failed to register collector");
        process::exit(1);
    }

    let credentials = match Credentials::from_args(
        args.auth_user.as_deref(),
        args.auth_password.as_deref(),
    ) {
        Ok(c) => c.map(Arc::new),
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    };

    let state: SharedState = Arc::new(AppStateInner {
        registry,
        metrics_path: args.metrics_path.clone(),
        transport: config.transport.clone(),
    });

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to build tokio runtime");
            process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(serve(args.listen, state, credentials)) {
        error!(error = %e, "server error");
        process::exit(1);
    }
    info!("kamailio-exporter stopped");
}

async fn serve(
    addr: SocketAddr,
    state: SharedState,
    credentials: Option<Arc<Credentials>>,
) -> std::io::Result<()> {
    let metrics_path = state.metrics_path.clone();
    let app = build_router(state, credentials).into_make_service_with_connect_info::<SocketAddr>();

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, metrics_path, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

fn build_router(state: SharedState, credentials: Option<Arc<Credentials>>) -> Router {
    let mut app = Router::new()
        .route(&state.metrics_path, get(handlers::handle_metrics))
        .route("/", get(handlers::handle_index));

    if let Some(creds) = credentials {
        info!("basic auth enabled");
        app = app.route_layer(axum::middleware::from_fn_with_state(
            creds,
            auth::basic_auth_middleware,
        ));
    }

    // health stays reachable without credentials
    app.route("/health", get(handlers::handle_health))
        .with_state(state)
        .layer(AccessLogLayer)
        .layer(CompressionLayer::new())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
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
    info!("received shutdown signal");
}
