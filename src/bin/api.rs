use campus_assistant::{
    agent::GroundedAgent,
    api::start_server,
    backend::BackendClient,
    health::{HealthMonitor, MonitorConfig},
    pipeline::{PipelineConfig, ResponsePipeline},
    session::{SessionCache, SessionCacheConfig},
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    let base_url = std::env::var("AI_BACKEND_URL").unwrap_or_else(|_| {
        eprintln!("⚠️  AI_BACKEND_URL not set in .env, using http://127.0.0.1:9000");
        eprintln!("📌 See .env.example for setup instructions");
        "http://127.0.0.1:9000".to_string()
    });
    let auth_token = std::env::var("AI_BACKEND_TOKEN").ok();

    let api_port: u16 = std::env::var("PORT")
        .or_else(|_| std::env::var("API_PORT"))
        .unwrap_or_else(|_| "8080".to_string())
        .parse()?;

    info!("🚀 Campus Assistant - API Server");
    info!("📍 Port: {}", api_port);
    info!("🔌 AI backend: {}", base_url);

    // Create components
    let backend = Arc::new(BackendClient::new(base_url, auth_token));
    let monitor = HealthMonitor::spawn(backend.clone(), MonitorConfig::default());
    let cache = Arc::new(SessionCache::from_env(SessionCacheConfig::default()));

    let pipeline = Arc::new(ResponsePipeline::new(
        cache,
        Box::new(GroundedAgent),
        backend,
        monitor.subscribe(),
        PipelineConfig::default(),
    ));

    info!("✅ Pipeline initialized");
    info!("📡 Starting API server...");

    // Start API server
    start_server(pipeline, monitor, api_port).await?;

    Ok(())
}
