//! Web application router and middleware setup.

use crate::sampling::ScaleService;
use crate::web::config::WebConfig;
use crate::web::handlers;
use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};
use tracing::{info, warn};

/// Routes under `/api/labjack`.
fn labjack_routes() -> Router<Arc<ScaleService>> {
    Router::new()
        .route("/ain1", get(handlers::get_current))
        .route("/history", get(handlers::get_history))
        .route("/config", get(handlers::get_config))
        .route("/status", get(handlers::get_status))
        .route("/tare", post(handlers::tare))
        .route("/scale", post(handlers::set_scale))
        .route("/clear-history", post(handlers::clear_history))
}

/// Create the main axum application with all routes and middleware.
pub fn create_app(config: &WebConfig, service: Arc<ScaleService>) -> Router {
    let mut app = Router::new()
        .nest("/api/labjack", labjack_routes())
        .route("/api/health", get(handlers::health_check));

    app = match config.static_path.as_deref().map(PathBuf::from) {
        Some(static_path) if static_path.is_dir() => {
            info!("Serving static files from: {:?}", static_path);
            app = app.nest_service("/static", ServeDir::new(&static_path));

            let index_file = static_path.join("index.html");
            if index_file.exists() {
                app.route_service("/", ServeFile::new(index_file))
            } else {
                app.route("/", get(handlers::default_index))
            }
        }
        Some(static_path) => {
            warn!(
                "Static path {:?} does not exist, serving default index",
                static_path
            );
            app.route("/", get(handlers::default_index))
        }
        None => app.route("/", get(handlers::default_index)),
    };

    let mut app = app.with_state(service);

    if config.enable_cors {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([header::CONTENT_TYPE]),
        );
    }

    app.layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_default_index_without_static_dir() {
        let config = WebConfig::default().with_static_path(None);
        let app = create_app(&config, Arc::new(ScaleService::default()));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_cors_preflight_allows_post() {
        let app = create_app(&WebConfig::default(), Arc::new(ScaleService::default()));

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/api/labjack/scale")
                    .header(header::ORIGIN, "http://kiosk.local")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "*"
        );
    }
}
