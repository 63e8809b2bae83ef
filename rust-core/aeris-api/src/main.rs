// SPDX-License-Identifier: PMPL-1.0-or-later
//! Aeris API server binary.

use aeris_api::ApiConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = ApiConfig::from_env();

    tracing::info!(
        "Starting Aeris API server on {}:{}",
        config.host,
        config.port
    );

    aeris_api::serve(config).await?;

    Ok(())
}
