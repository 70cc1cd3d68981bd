//! Demo server.
//!
//! Routes:
//! - `/` answers immediately
//! - `/slow-request` answers after three seconds
//! - `/long-polling` polls for up to fifteen seconds and answers early once
//!   the server starts shutting down
//!
//! Configuration comes from `lameduck.toml` (optional), `.env` and
//! `LAMEDUCK__*` environment variables. Ctrl+C or SIGTERM starts a graceful
//! shutdown.

use std::time::Duration;

use http::{Request, Response, StatusCode};
use hyper::body::Incoming;
use lameduck::prelude::*;
use lameduck_server::{ResponseBody, DEFAULT_ENV_PREFIX};
use tokio::time::sleep;

async fn route(req: Request<Incoming>) -> Response<ResponseBody> {
    match req.uri().path() {
        "/" => text(StatusCode::OK, "ok"),
        "/slow-request" => {
            sleep(Duration::from_secs(3)).await;
            text(StatusCode::OK, "ok")
        }
        "/long-polling" => {
            if let Some(response) = req.response_handle() {
                for _ in 0..15 {
                    match check(response) {
                        Ok(true) => break,
                        Ok(false) => sleep(Duration::from_secs(1)).await,
                        Err(e) => {
                            tracing::warn!("Closing-state check failed: {}", e);
                            break;
                        }
                    }
                }
            }
            text(StatusCode::OK, "ok")
        }
        _ => text(StatusCode::NOT_FOUND, "not found"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
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
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ConfigLoader::new()
        .with_optional_file("lameduck.toml")?
        .with_dotenv()
        .with_env_prefix(DEFAULT_ENV_PREFIX)
        .load()?;

    init_logging(&config.log_config())?;

    let server = HttpServer::bind(config.server_config()).await?;
    let graceful = server.graceful();
    tracing::info!(
        addr = %server.local_addr(),
        idle_timeout = ?config.shutdown.idle_timeout(),
        force_timeout = ?config.shutdown.force_timeout(),
        "Demo server starting"
    );

    let serving = tokio::spawn(server.serve(Handler::new(route)));

    shutdown_signal().await;
    tracing::info!("Shutdown signal received");

    let result = graceful.shutdown().await;
    serving.await??;
    result?;

    tracing::info!("Demo server stopped");
    Ok(())
}
