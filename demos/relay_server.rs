//! Relay server example
//!
//! Runs the full HTTP surface with logging, stopping on SIGINT/SIGTERM.
//!
//! The listening port comes from `PORT` (default 4000); log verbosity from
//! `RUST_LOG` (default `info`).
//!
//! After starting, you can:
//! - Register a job via POST http://localhost:4000/api/request-download
//! - Hand out the returned downloadUrl (http://localhost:4000/dl/<job_id>)
//! - Proxy a page via GET http://localhost:4000/proxy?url=https://example.com
//! - Read stats via GET http://localhost:4000/api/stats
//! - View Swagger UI at http://localhost:4000/swagger-ui

use relay_dl::config::{ApiConfig, Config, ServerIntegrationConfig, StorageConfig};
use relay_dl::{JobManager, run_with_shutdown};
use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let port: u16 = match std::env::var("PORT") {
        Ok(value) => value.parse()?,
        Err(_) => 4000,
    };

    let config = Config {
        storage: StorageConfig {
            download_dir: "downloads".into(),
            temp_dir: "temp".into(),
            ..Default::default()
        },
        server: ServerIntegrationConfig {
            api: ApiConfig {
                bind_address: SocketAddr::from(([0, 0, 0, 0], port)),
                public_base_url: std::env::var("PUBLIC_BASE_URL").ok(),
                api_key: std::env::var("API_KEY").ok(),
                ..Default::default()
            },
        },
        ..Default::default()
    };

    let manager = JobManager::new(config).await?;

    println!("relay-dl listening on port {}", port);
    println!();
    println!("Example commands:");
    println!("  # Register a download");
    println!("  curl -X POST http://localhost:{}/api/request-download \\", port);
    println!("    -H 'Content-Type: application/json' \\");
    println!(
        "    -d '{{\"link\": \"https://example.com/file.zip\", \"filenameHint\": \"file.zip\"}}'"
    );
    println!();
    println!("  # Stream events (Server-Sent Events)");
    println!("  curl -N http://localhost:{}/events", port);

    run_with_shutdown(manager).await?;

    Ok(())
}
