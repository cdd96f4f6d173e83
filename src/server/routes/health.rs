//! Health check endpoint

/// GET /health
pub async fn health_check() -> &'static str {
    "ok"
}
