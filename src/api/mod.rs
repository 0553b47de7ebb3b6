mod error;
mod handlers;
pub mod middleware;

use axum::{
    http::HeaderValue,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::db::Database;

pub use error::ApiError;
pub use handlers::RecordKey;
pub use middleware::SecurityConfig;

/// Router with authentication, rate limiting and CORS restrictions disabled.
pub fn create_router(db: Database) -> Router {
    create_router_with_security(db, SecurityConfig::disabled())
}

pub fn create_router_with_security(db: Database, security: SecurityConfig) -> Router {
    let mut app = Router::new()
        // Projects
        .route("/projects", get(handlers::list_projects))
        .route(
            "/projects/create-new-project",
            get(handlers::project_form).post(handlers::create_project),
        )
        .route("/projects/{project}", get(handlers::get_project))
        .route(
            "/projects/{project}/edit",
            get(handlers::get_project_record).post(handlers::update_project),
        )
        .route(
            "/projects/{project}/delete",
            get(handlers::get_project_record).post(handlers::delete_project),
        )
        .route("/projects/{project}/velocitychart", get(handlers::velocity_chart))
        // Creation under a project
        .route(
            "/projects/{project}/{backlog}/create-new-pbi",
            post(handlers::create_pbi),
        )
        .route(
            "/projects/{project}/{backlog}/create-new-sprint",
            post(handlers::create_sprint),
        )
        .route(
            "/projects/{project}/{backlog}/{pbi}/create-new-task",
            post(handlers::create_task),
        )
        // PBIs, sprints and tasks by id
        .route(
            "/projects/product-backlog/pbi/{pk}",
            get(handlers::get_pbi_record).post(handlers::post_pbi_record),
        )
        .route(
            "/projects/product-backlog/sprint-backlog/{pk}",
            get(handlers::get_sprint).post(handlers::update_sprint),
        )
        .route(
            "/projects/product-backlog/{pbi}/{task}",
            get(handlers::view_task),
        )
        .route(
            "/projects/product-backlog/{pbi}/task/{pk}",
            get(handlers::get_task_record).post(handlers::post_task_record),
        )
        .route_layer(from_fn_with_state(
            security.clone(),
            middleware::require_api_key,
        ));

    if let Some(limiter) = security.rate_limiter.clone() {
        app = app.route_layer(from_fn_with_state(
            limiter,
            middleware::enforce_rate_limit,
        ));
    }

    Router::new()
        .merge(app)
        // Health stays reachable without credentials
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&security))
        .with_state(db)
}

fn cors_layer(security: &SecurityConfig) -> CorsLayer {
    match &security.cors_origins {
        Some(origins) => {
            let origins: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|origin| match origin.parse() {
                    Ok(value) => Some(value),
                    Err(_) => {
                        tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                        None
                    }
                })
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
        None => CorsLayer::permissive(),
    }
}
