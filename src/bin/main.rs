use campus_assistant::{
    agent::GroundedAgent,
    backend::BackendClient,
    health::{HealthMonitor, MonitorConfig},
    models::{AssignmentRecord, CourseRecord, GradeRecord, StudentRecords, UserRole},
    pipeline::{PipelineConfig, ResponsePipeline},
    session::{SessionCache, SessionCacheConfig},
};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    dotenv::dotenv().ok();

    info!("Campus Assistant demo starting");

    // Create components against whatever backend is configured; without
    // one the monitor settles offline and answers stay grounded.
    let base_url = std::env::var("AI_BACKEND_URL")
        .unwrap_or_else(|_| "http://127.0.0.1:9000".to_string());
    let backend = Arc::new(BackendClient::new(base_url, None));
    let monitor = HealthMonitor::spawn(backend.clone(), MonitorConfig::default());
    let cache = Arc::new(SessionCache::in_memory(SessionCacheConfig::default()));

    let pipeline = ResponsePipeline::new(
        cache,
        Box::new(GroundedAgent),
        backend,
        monitor.subscribe(),
        PipelineConfig::default(),
    );

    // Sample user with a few records
    let user_id = Uuid::new_v4();
    let records = StudentRecords {
        courses: vec![CourseRecord {
            code: "CS101".to_string(),
            title: "Intro to Computer Science".to_string(),
            instructor: Some("Dr. Reyes".to_string()),
            schedule: Some("MWF 10:00".to_string()),
        }],
        grades: vec![GradeRecord {
            course_code: "CS101".to_string(),
            item: "Midterm".to_string(),
            score: 92.0,
            max_score: 100.0,
            letter: Some("A".to_string()),
        }],
        assignments: vec![AssignmentRecord {
            course_code: "CS101".to_string(),
            title: "Problem Set 3".to_string(),
            due: chrono::Utc::now() + chrono::Duration::days(2),
            submitted: false,
        }],
        announcements: vec![],
    };

    let queries = [
        "what's my grade in CS101",
        "what assignments are due",
        "show me John's grades",
    ];

    for query in queries {
        info!(query, "Running pipeline");
        let turn = pipeline
            .handle(user_id, UserRole::Student, query, &records)
            .await?;

        println!("\n=== {} ===", query);
        println!("{}", turn.content);
        if let Some(meta) = &turn.metadata {
            println!(
                "[{} / {} / {} ms]",
                meta.query_type, meta.data_source, meta.processing_time_ms
            );
        }
    }

    let stats = pipeline.session_stats(user_id).await;
    println!(
        "\nSession: {} turn(s), ~{} bytes",
        stats.count, stats.approx_size_bytes
    );

    monitor.stop();
    Ok(())
}
