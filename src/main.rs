// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::Result;
use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use clap::Parser;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use klm_certs::{
    config::{CertificateManagement, Config},
    constants::{
        METRICS_SERVER_BIND_ADDRESS, METRICS_SERVER_PATH, ROOT_SECRET_NAME, SECRET_KIND,
        TOKIO_WORKER_THREADS,
    },
    gateway_secret::{
        cabundle::GatewaySecretRotator, legacy::LegacyGatewaySecretHandler, GatewaySecretHandler,
    },
    metrics,
    repository::{
        certmanager::CertManagerRepository, gardener::GardenerRepository,
        secret::KubeCredentialStore, CertificateAuthority, CredentialStore,
    },
};
use kube::{
    runtime::{controller::Action, watcher, Controller},
    Api, Client, ResourceExt,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
struct ReconcileError(#[from] anyhow::Error);

/// Shared state of the gateway secret controller
struct Context {
    handler: Arc<dyn GatewaySecretHandler>,
    requeue_success: Duration,
    requeue_error: Duration,
}

fn main() -> Result<()> {
    let config = Config::parse();
    config.validate()?;

    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("klm-certs")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(config))
}

async fn async_main(config: Config) -> Result<()> {
    // Respects RUST_LOG (default: info) and RUST_LOG_FORMAT (json|text)
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }

    info!("Starting watcher certificate controller");
    debug!("Configuration: {:?}", config);

    let client = Client::try_default().await?;
    debug!("Kubernetes client initialized successfully");

    let values = config.certificate_values();
    let authority: Arc<dyn CertificateAuthority> = match config.certificate_management {
        CertificateManagement::CertManager => Arc::new(CertManagerRepository::new(
            client.clone(),
            config.self_signed_cert_issuer_name.clone(),
            values,
        )?),
        CertificateManagement::Gardener => Arc::new(GardenerRepository::new(
            client.clone(),
            config.self_signed_cert_issuer_name.clone(),
            config.self_signed_cert_issuer_namespace.clone(),
            values,
        )?),
    };
    let store: Arc<dyn CredentialStore> = Arc::new(KubeCredentialStore::new(client.clone()));

    let handler: Arc<dyn GatewaySecretHandler> = if config.legacy_strategy_for_istio_gateway_secret
    {
        info!("Using legacy gateway secret strategy");
        Arc::new(LegacyGatewaySecretHandler::new(
            authority,
            store,
            config.gateway_secret_config(),
        ))
    } else {
        Arc::new(GatewaySecretRotator::new(
            authority,
            store,
            config.gateway_secret_config(),
        ))
    };

    let context = Arc::new(Context {
        handler,
        requeue_success: config.istio_gateway_secret_requeue_success_interval,
        requeue_error: config.istio_gateway_secret_requeue_error_interval,
    });

    tokio::select! {
        result = run_gateway_secret_controller(client, config.istio_namespace.clone(), context) => {
            error!("CRITICAL: gateway secret controller exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("gateway secret controller exited unexpectedly without error")
        }
        result = run_metrics_server(config.metrics_port) => {
            error!("CRITICAL: metrics server exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("metrics server exited unexpectedly without error")
        }
        result = shutdown_signal() => {
            result?;
            info!("Shutdown signal received, stopping");
            Ok(())
        }
    }
}

/// Run the controller watching the root secret
async fn run_gateway_secret_controller(
    client: Client,
    namespace: String,
    context: Arc<Context>,
) -> Result<()> {
    info!(
        "Starting gateway secret controller for {}/{}",
        namespace, ROOT_SECRET_NAME
    );

    let api = Api::<Secret>::namespaced(client, &namespace);
    let watcher_config =
        watcher::Config::default().fields(&format!("metadata.name={ROOT_SECRET_NAME}"));

    Controller::new(api, watcher_config)
        .run(reconcile_root_secret, error_policy, context)
        .for_each(|_| futures::future::ready(()))
        .await;

    Ok(())
}

/// Reconcile the gateway secret against the root secret
async fn reconcile_root_secret(
    root_secret: Arc<Secret>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let start = Instant::now();

    match ctx.handler.manage_gateway_secret(&root_secret).await {
        Ok(()) => {
            debug!(
                "Successfully reconciled gateway secret from {}",
                root_secret.name_any()
            );
            metrics::record_reconciliation_success(SECRET_KIND, start.elapsed());
            Ok(Action::requeue(ctx.requeue_success))
        }
        Err(e) => {
            warn!("Failed to reconcile gateway secret: {}", e);
            metrics::record_reconciliation_error(SECRET_KIND, start.elapsed());
            Err(anyhow::Error::new(e).into())
        }
    }
}

/// Error policy for the gateway secret controller
fn error_policy(_resource: Arc<Secret>, _err: &ReconcileError, ctx: Arc<Context>) -> Action {
    Action::requeue(ctx.requeue_error)
}

/// Serve Prometheus metrics
async fn run_metrics_server(port: u16) -> Result<()> {
    let app = Router::new().route(METRICS_SERVER_PATH, get(metrics_handler));
    let address = format!("{METRICS_SERVER_BIND_ADDRESS}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!("Serving metrics on {}{}", address, METRICS_SERVER_PATH);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn metrics_handler() -> impl IntoResponse {
    match metrics::gather_metrics() {
        Ok(text) => (StatusCode::OK, text),
        Err(e) => {
            error!("Failed to gather metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to gather metrics: {e}"),
            )
        }
    }
}

/// Resolve on SIGINT, or SIGTERM on Unix
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    Ok(())
}
