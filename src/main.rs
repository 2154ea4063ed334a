use anyhow::{Context, bail};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use nyt_keywords::{
    app::{ComponentRegistry, build_router},
    cli::{Cli, Command},
    config::Config,
    pipeline::report::month_report,
    store::models::MonthKey,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    std::panic::set_hook(Box::new(|panic_info| {
        let thread = std::thread::current();
        let thread_name = thread.name().unwrap_or("unnamed");
        let message = panic_info
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| {
                panic_info
                    .payload()
                    .downcast_ref::<String>()
                    .map(String::as_str)
            })
            .unwrap_or("unknown panic payload");

        if let Some(location) = panic_info.location() {
            error!(
                thread = thread_name,
                file = location.file(),
                line = location.line(),
                column = location.column(),
                message,
                "panic occurred"
            );
        } else {
            error!(
                thread = thread_name,
                message, "panic occurred without location information"
            );
        }
    }));

    let cli = Cli::parse();
    let command = cli.resolved_command();
    if let Command::Drop { yes: false } = command {
        bail!("refusing to drop the article cache without --yes");
    }

    // Tracing initialization is handled by Telemetry::new()
    let config = Config::from_env().context("failed to load configuration")?;
    let bind_addr = config.http_bind();
    let registry = ComponentRegistry::build(config)
        .await
        .context("failed to build component registry")?;

    match command {
        Command::Serve => {
            let router = build_router(registry);
            let listener = TcpListener::bind(bind_addr)
                .await
                .with_context(|| format!("failed to bind listener on {bind_addr}"))?;

            info!(%bind_addr, "listening");

            if let Err(error) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await
            {
                warn!(error = %error, "server exited with error");
            }
        }
        Command::Report {
            year,
            month,
            top,
            section,
        } => {
            let key = MonthKey::new(year, month)?;
            let top_n = top.unwrap_or(registry.config().keywords_top_n()).get();
            let report = month_report(&registry.gateway(), key, section, top_n).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Drop { .. } => {
            registry.gateway().drop_cache().await?;
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(error = %error, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
