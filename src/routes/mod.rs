pub mod health;
pub mod reminders;

use tower_http::cors::{Any, CorsLayer};

/// Permissive CORS for the dispatch surface. Browser-based schedulers send the
/// Supabase-style client headers, so those are allowed explicitly.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([http::Method::GET, http::Method::POST, http::Method::OPTIONS])
        .allow_headers([
            http::header::AUTHORIZATION,
            http::HeaderName::from_static("x-client-info"),
            http::HeaderName::from_static("apikey"),
            http::header::CONTENT_TYPE,
        ])
}
