mod config;
mod db;
mod error;
mod models;
mod routes;
mod services;
mod utils;

use axum::{Router, response::Html, routing::get};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Clone)]
pub struct AppState {
    pub db: db::Database,
    pub config: Arc<config::AppConfig>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let config = config::AppConfig::from_env();
    tracing::info!(database = %config.database_url, "Opening database");
    let db = db::Database::connect(&config.database_url).await?;

    let bind_addr = config.bind_addr.clone();
    let app_state = AppState {
        db,
        config: Arc::new(config),
    };

    let app = Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .merge(routes::api_router(app_state))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::AllowMethods::any())
                .allow_headers(tower_http::cors::AllowHeaders::any()),
        );

    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn index() -> Html<&'static str> {
    Html(
        r#"
    <!DOCTYPE html>
    <html>
    <head>
        <title>Novel Import Service</title>
        <meta charset="utf-8">
        <style>
            body { font-family: Arial, sans-serif; margin: 40px; }
            .info-box { background-color: #f0f8ff; padding: 20px; border-radius: 8px; margin: 20px 0; }
            .endpoint { background-color: #f5f5f5; padding: 10px; margin: 10px 0; border-radius: 4px; font-family: monospace; }
        </style>
    </head>
    <body>
        <h1>Novel Import Service</h1>

        <div class="info-box">
            <p>Upload a Word document to split it into chapters at headings such as
            "Chương 1" or "Chapter 1", review the result, then import it into a story.</p>
        </div>

        <h2>Available Endpoints:</h2>
        <div class="endpoint">GET /health - Health check</div>
        <div class="endpoint">POST /api/v1/import/upload - Upload a .docx file (multipart) and preview its chapters</div>
        <div class="endpoint">POST /api/v1/stories/{story_id}/import - Save previewed chapters in order</div>
        <div class="endpoint">GET|POST /api/v1/stories - List or create stories</div>
        <div class="endpoint">GET /api/v1/stories/{slug} - Story with its chapter list</div>
        <div class="endpoint">GET /api/v1/stories/{slug}/chapters/{chapter}?password= - Read a chapter</div>
        <div class="endpoint">POST /api/v1/chapters, PUT|DELETE /api/v1/chapters/{id} - Manage chapters</div>
        <div class="endpoint">POST /api/v1/users/{user_id}/recovery-codes, POST /api/v1/auth/recover - Recovery codes</div>
    </body>
    </html>
    "#,
    )
}

async fn health_check() -> &'static str {
    "OK"
}
