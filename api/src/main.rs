use std::net::SocketAddr;

use clap::Parser;
use gcal_mcp_runtime::{Runtime, RuntimeArgs, report_fatal};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod error;
mod middleware;
mod routes;
mod state;

#[derive(Parser, Debug)]
#[command(name = "gcal-api", version, about = "Google Calendar tools over HTTP and SSE")]
struct Cli {
    #[command(flatten)]
    runtime: RuntimeArgs,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 3420)]
    port: u16,
}

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gcal_api=debug,gcal_mcp_runtime=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let cli = Cli::parse();

    // Nothing is served until calendar access works.
    let runtime = match Runtime::start(&cli.runtime).await {
        Ok(runtime) => runtime,
        Err(err) => std::process::exit(report_fatal(&err)),
    };

    let app_state = state::AppState::new(&runtime);
    let app = routes::router(app_state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(middleware::cors::build_cors_layer()),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, %addr, "failed to bind");
            std::process::exit(1);
        }
    };
    tracing::info!("Calendar service listening on {}", addr);

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "server stopped");
        std::process::exit(1);
    }
}
