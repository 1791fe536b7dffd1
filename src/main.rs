//! Driver Ready Webhook
//!
//! Mutating admission webhook injecting a driver-ready node selector into
//! pods whose volumes are served by the configured CSI driver.

use clap::Parser;
use kube::Client;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::{filter::Directive, fmt, prelude::*, EnvFilter};

use driver_ready_webhook::{
    ClassProjection, ClassWatcher, DecisionEngine, DriverClassSet, Error, KubeClaimResolver,
    Result, WebhookMetrics, WebhookServer, WebhookServerConfig,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Driver Ready Webhook - pins CSI-backed pods to nodes where the driver is ready
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// CSI driver name, matched against storage class provisioners
    #[arg(long, env = "DRIVER_NAME", default_value = "gcs.csi.ofek.dev")]
    driver_name: String,

    /// Webhook bind address
    #[arg(long, env = "WEBHOOK_ADDR", default_value = "0.0.0.0:8443")]
    addr: String,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// Max admission review body size in bytes
    #[arg(long, env = "MAX_BODY_SIZE", default_value = "3145728")]
    max_body_size: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args)?;

    info!("Starting Driver Ready Webhook");
    info!("  Version: {}", driver_ready_webhook::VERSION);
    info!("  Driver: {}", args.driver_name);
    info!("  Webhook: {}", args.addr);
    info!("  Metrics: {}", args.metrics_addr);

    let config = WebhookServerConfig {
        addr: parse_addr(&args.addr, "webhook")?,
        max_body_size: args.max_body_size,
    };
    let metrics_addr = parse_addr(&args.metrics_addr, "metrics")?;

    // Without a control plane client there is nothing to serve
    let client = Client::try_default().await?;

    let metrics = WebhookMetrics::new()?;
    let classes = Arc::new(DriverClassSet::new());
    let shutdown = CancellationToken::new();

    // The cache converges in the background; requests are served right away
    let projection = ClassProjection::new(&args.driver_name, classes.clone(), metrics.clone());
    let watcher = ClassWatcher::new(client.clone(), projection).spawn(shutdown.clone());

    let engine = Arc::new(DecisionEngine::new(
        &args.driver_name,
        classes,
        Arc::new(KubeClaimResolver::new(client)),
        metrics.clone(),
    )?);

    // Start metrics server
    let metrics_shutdown = shutdown.clone();
    let metrics_server = metrics.clone();
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(metrics_addr, metrics_server, metrics_shutdown).await {
            error!("Metrics server error: {}", e);
        }
    });

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_shutdown.cancel();
    });

    WebhookServer::new(config, engine, metrics)
        .run(shutdown.clone())
        .await?;

    shutdown.cancel();
    if let Err(e) = watcher.await {
        error!("Storage class watcher task failed: {}", e);
    }

    info!("Webhook shutdown complete");
    Ok(())
}

fn parse_addr(addr: &str, what: &str) -> Result<SocketAddr> {
    addr.parse()
        .map_err(|e| Error::Configuration(format!("Invalid {} address '{}': {}", what, addr, e)))
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                error!("Unable to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("Received shutdown signal");
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) -> Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "kube=info", "tower=warn", "axum=info"] {
        filter = filter.add_directive(parse_directive(directive)?);
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }

    Ok(())
}

fn parse_directive(directive: &str) -> Result<Directive> {
    directive
        .parse()
        .map_err(|e| Error::Configuration(format!("Invalid log directive '{}': {}", directive, e)))
}

// =============================================================================
// Metrics Server
// =============================================================================

async fn run_metrics_server(
    addr: SocketAddr,
    metrics: WebhookMetrics,
    shutdown: CancellationToken,
) -> Result<()> {
    use hyper::header::{HeaderValue, CONTENT_TYPE};
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Response, Server, StatusCode};

    let make_svc = make_service_fn(move |_conn| {
        let metrics = metrics.clone();
        async move {
            Ok::<_, std::convert::Infallible>(service_fn(move |req: Request<Body>| {
                let metrics = metrics.clone();
                async move {
                    let response = match req.uri().path() {
                        "/metrics" => match metrics.render() {
                            Ok((content_type, buffer)) => {
                                let mut rsp = Response::new(Body::from(buffer));
                                if let Ok(value) = HeaderValue::from_str(&content_type) {
                                    rsp.headers_mut().insert(CONTENT_TYPE, value);
                                }
                                rsp
                            }
                            Err(e) => {
                                let mut rsp = Response::new(Body::from(e.to_string()));
                                *rsp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                                rsp
                            }
                        },
                        _ => {
                            let mut rsp = Response::new(Body::from("not found"));
                            *rsp.status_mut() = StatusCode::NOT_FOUND;
                            rsp
                        }
                    };
                    Ok::<_, std::convert::Infallible>(response)
                }
            }))
        }
    });

    info!("Metrics server listening on {}", addr);
    Server::try_bind(&addr)
        .map_err(|e| Error::Internal(format!("Failed to bind metrics server: {}", e)))?
        .serve(make_svc)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| Error::Internal(format!("Metrics server error: {}", e)))?;

    Ok(())
}
