//! hostdash_agent entrypoint: parse config, build state, serve HTTP(S).

use std::net::SocketAddr;

use anyhow::Context;
use hostdash_agent::{
    api,
    config::{usage, Config},
    state::AppState,
    tls,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "-h" || a == "--help") {
        let prog = args.first().map(String::as_str).unwrap_or("hostdash_agent");
        println!("{}", usage(prog));
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Missing credentials abort here rather than serving an open dashboard.
    let cfg = Config::from_env()?;
    let state = AppState::from_config(&cfg)?;

    info!(
        pm2 = cfg.enable_pm2,
        docker = cfg.enable_docker,
        procs = cfg.enable_procs,
        upstream = cfg.upstream_url.is_some(),
        "backends"
    );

    let app = api::router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));

    if cfg.enable_ssl {
        let (cert, key) = tls::ensure_self_signed_cert()?;
        let rustls = axum_server::tls_rustls::RustlsConfig::from_pem_file(&cert, &key)
            .await
            .context("load TLS certificate")?;
        info!("hostdash_agent listening on https://{addr}");
        axum_server::bind_rustls(addr, rustls)
            .serve(app.into_make_service())
            .await?;
    } else {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("bind {addr}"))?;
        info!("hostdash_agent listening on http://{}", listener.local_addr()?);
        axum::serve(listener, app).await?;
    }
    Ok(())
}
