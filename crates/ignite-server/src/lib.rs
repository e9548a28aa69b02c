pub mod actor;
pub mod error;
pub mod routes;
pub mod state;

use axum::routing::{delete, get, patch, post, put};
use axum::Router;
use std::path::PathBuf;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: state::AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Events (SSE)
        .route("/api/events", get(routes::events::sse_events))
        // Projects
        .route(
            "/api/projects",
            get(routes::projects::list_projects).post(routes::projects::create_project),
        )
        .route(
            "/api/projects/{id}",
            get(routes::projects::get_project)
                .patch(routes::projects::update_project)
                .delete(routes::projects::delete_project),
        )
        .route(
            "/api/projects/{id}/lock",
            post(routes::projects::lock_project).delete(routes::projects::unlock_project),
        )
        .route("/api/projects/{id}/mode", patch(routes::modes::change_mode))
        // Lessons and steps
        .route("/api/projects/{id}/lessons", post(routes::lessons::add_lesson))
        .route("/api/projects/{id}/lessons/order", put(routes::lessons::reorder_lessons))
        .route(
            "/api/lessons/{id}",
            patch(routes::lessons::update_lesson).delete(routes::lessons::delete_lesson),
        )
        .route("/api/lessons/{id}/steps", post(routes::lessons::add_step))
        .route("/api/lessons/{id}/steps/order", put(routes::lessons::reorder_steps))
        .route(
            "/api/steps/{id}",
            patch(routes::lessons::update_step).delete(routes::lessons::delete_step),
        )
        // Drafts
        .route(
            "/api/projects/{id}/draft",
            get(routes::drafts::get_draft)
                .post(routes::drafts::create_draft)
                .patch(routes::drafts::update_draft)
                .delete(routes::drafts::discard_draft),
        )
        .route("/api/projects/{id}/draft/diff", get(routes::drafts::get_draft_diff))
        .route(
            "/api/projects/{id}/draft/mode",
            patch(routes::modes::change_draft_mode),
        )
        .route("/api/lessons/{id}/draft", patch(routes::drafts::update_lesson_draft))
        .route("/api/steps/{id}/draft", patch(routes::drafts::update_step_draft))
        .route("/api/publish-due", post(routes::modes::publish_due))
        // Progress
        .route("/api/projects/{id}/state", post(routes::states::enroll))
        .route("/api/states/{id}", get(routes::states::get_state))
        .route(
            "/api/states/{id}/lessons/{lesson_id}",
            post(routes::states::start_lesson),
        )
        .route(
            "/api/lesson-states/{id}",
            delete(routes::states::delete_lesson_state),
        )
        .route(
            "/api/lesson-states/{id}/steps/{step_id}",
            post(routes::states::view_step),
        )
        .route(
            "/api/lesson-states/{id}/extra",
            put(routes::states::put_lesson_extra),
        )
        .route("/api/step-states/{id}", delete(routes::states::unview_step))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Start the Ignite API server.
pub async fn serve(root: PathBuf, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    serve_on(root, listener).await
}

/// Start the Ignite API server on a pre-bound listener.
///
/// Unlike `serve`, this accepts a `TcpListener` that was already bound so the
/// caller can read the actual port before starting (useful when `port = 0` and
/// the OS picks a free port).
pub async fn serve_on(root: PathBuf, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
    let actual_port = listener.local_addr()?.port();
    let app = build_router(state::AppState::open(root)?);

    tracing::info!("Ignite API server listening on http://localhost:{actual_port}");

    axum::serve(listener, app).await?;
    Ok(())
}
