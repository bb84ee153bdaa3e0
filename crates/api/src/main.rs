use anyhow::Result;
use faq_api::{build_app, ApiConfig};
use faq_observability::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("faq_api");

    let config = ApiConfig::from_env()?;
    let bind = config.bind.clone();

    let app = build_app(config).await?;

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!(bind = %bind, "faq chatbot api started");

    axum::serve(listener, app).await?;
    Ok(())
}
