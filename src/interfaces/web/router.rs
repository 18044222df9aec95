use axum::{
    Router,
    body::Body,
    http::{HeaderValue, Method, Request, header},
    middleware,
    middleware::Next,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

use super::handlers::{servers, system, tasks};
use super::{AppState, sse_logs_endpoint};
use crate::interfaces::live::live_socket_endpoint;

fn build_localhost_cors(api_port: u16) -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        format!("http://127.0.0.1:{}", api_port),
        format!("http://localhost:{}", api_port),
    ]
    .iter()
    .filter_map(|o| o.parse().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers(tower_http::cors::Any)
}

pub(crate) fn build_api_router(state: AppState) -> Router {
    let api_port = state.settings.api_port;

    Router::new()
        .route("/api/health", get(system::health_endpoint))
        .route("/api/logs", get(sse_logs_endpoint))
        .route(
            "/api/servers",
            get(servers::list_servers_endpoint).post(servers::create_server_endpoint),
        )
        .route(
            "/api/servers/{id}",
            get(servers::get_server_endpoint)
                .put(servers::update_server_endpoint)
                .patch(servers::update_server_endpoint)
                .delete(servers::delete_server_endpoint),
        )
        .route(
            "/api/servers/{id}/connect",
            post(servers::connect_server_endpoint),
        )
        .route(
            "/api/servers/{id}/disconnect",
            post(servers::disconnect_server_endpoint),
        )
        .route(
            "/api/servers/{id}/execute",
            post(servers::execute_command_endpoint),
        )
        .route("/api/servers/{id}/logs", get(servers::server_logs_endpoint))
        .route(
            "/api/servers/{id}/metrics",
            get(servers::server_metrics_endpoint),
        )
        .route(
            "/api/tasks",
            get(tasks::list_tasks_endpoint).post(tasks::create_task_endpoint),
        )
        .route(
            "/api/tasks/{id}",
            get(tasks::get_task_endpoint)
                .put(tasks::update_task_endpoint)
                .patch(tasks::update_task_endpoint)
                .delete(tasks::delete_task_endpoint),
        )
        .route("/api/tasks/{id}/run", post(tasks::run_task_endpoint))
        .route("/ws/{client_id}", get(live_socket_endpoint))
        .layer(middleware::from_fn(security_headers))
        .layer(build_localhost_cors(api_port))
        .with_state(state)
}

async fn security_headers(req: Request<Body>, next: Next) -> axum::response::Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("default-src 'self'"),
    );
    response
}
