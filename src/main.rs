//! Process bootstrap: parse arguments, open a bus connection, attach it to
//! the event loop, start the HTTP server, run until something fails.

use std::process::ExitCode;

use axum::Router;
use clap::Parser;
use dbus_http_bridge::{bus, cli, http};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(args.log_level.as_str()))
        .init();

    let bus_kind = if args.session { bus::BusKind::Session } else { bus::BusKind::System };

    let conn = match bus::connect(bus_kind) {
        Ok(conn) => conn,
        Err(e) => {
            tracing::error!(error = %e, "failed to open D-Bus connection");
            return ExitCode::FAILURE;
        }
    };

    let app = Router::new().nest(&args.prefix, http::router(conn));

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, addr, "failed to bind HTTP listener");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(addr, prefix = %args.prefix, "dbus-http-bridge starting");

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "HTTP server failed");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
