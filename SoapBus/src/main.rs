use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::Router;
use soapbus::{ActiveEndpoint, LoopbackBus};
use soapbusconfig::Config;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Répertoire de configuration en premier argument, sinon recherche habituelle
    let config_dir = std::env::args().nth(1).unwrap_or_default();
    let config = Config::load_config(&config_dir).context("cannot load configuration")?;

    let level = config.get_log_min_level()?.to_ascii_lowercase();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .init();

    // ========== PHASE 1 : Activation des endpoints ==========
    let http = config.http_settings()?;
    let bus = LoopbackBus::new();
    let mut endpoints = Vec::new();
    let mut router = Router::new();

    let declarations = config.get_endpoints()?;
    info!("📡 Activating {} endpoint(s)...", declarations.len());
    for declaration in &declarations {
        let endpoint = ActiveEndpoint::load(&config, declaration, &http)
            .with_context(|| format!("cannot activate endpoint '{}'", declaration.name))?;
        if let Some(routes) = endpoint.register(&bus) {
            info!(
                endpoint = %declaration.name,
                path = %declaration.http_path(),
                "🌐 SOAP endpoint mounted"
            );
            router = router.merge(routes);
        }
        endpoints.push(endpoint);
    }
    if endpoints.is_empty() {
        warn!("⚠️ No endpoint declared, the server will only answer 404");
    }

    // ========== PHASE 2 : Démarrage du serveur ==========
    let addr: SocketAddr = format!("{}:{}", config.get_http_bind(), config.get_http_port())
        .parse()
        .context("invalid bind address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("cannot bind {}", addr))?;
    info!("✅ SoapBus is ready on http://{}", addr);
    info!("Press Ctrl+C to stop...");

    let served = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(e) = signal::ctrl_c().await {
                error!("❌ Failed to listen for Ctrl+C: {}", e);
            }
            info!("Ctrl+C reçu, arrêt gracieux");
        })
        .await;

    for endpoint in &endpoints {
        endpoint.stop();
    }
    served.context("HTTP server failed")?;
    info!("👋 SoapBus stopped");
    Ok(())
}
