mod dates;
mod docs;
mod error;
pub mod import;
mod permissions;
mod services;
mod state;
mod util;

pub mod routes;

pub use docs::ApiDoc;
pub use error::ApiError;
pub use state::{AppState, Channel, ClientEvent, EventHub, OAuthStateStore, ServerEvent, Topic};

use axum::{
    http::header::{AUTHORIZATION, CONTENT_TYPE},
    routing::{delete, get, patch, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Expire every pending invite past its deadline. Returns how many changed.
pub async fn sweep_expired_invites(pool: &sqlx::SqlitePool) -> anyhow::Result<u64> {
    Ok(services::invites::expire_stale_invites(pool).await?)
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health::health_check))
        // Auth routes
        .route("/api/auth/register", post(routes::auth::register))
        .route("/api/auth/login", post(routes::auth::login))
        .route("/api/auth/logout", post(routes::auth::logout))
        .route("/api/auth/google/login", get(routes::auth::google_login))
        .route(
            "/api/auth/google/callback",
            post(routes::auth::google_callback),
        )
        // User routes
        .route(
            "/api/users/me",
            get(routes::users::get_current_user).patch(routes::users::update_current_user),
        )
        .route("/api/users/search", get(routes::users::search_users))
        // Church routes
        .route("/api/churches", get(routes::churches::list_churches))
        .route(
            "/api/churches/:church_id",
            get(routes::churches::get_church).patch(routes::churches::update_church),
        )
        .route(
            "/api/churches/:church_id/bacentas",
            get(routes::bacentas::list_bacentas).post(routes::bacentas::create_bacenta),
        )
        .route(
            "/api/churches/:church_id/bacentas/:bacenta_id",
            get(routes::bacentas::get_bacenta)
                .patch(routes::bacentas::rename_bacenta)
                .delete(routes::bacentas::delete_bacenta),
        )
        .route(
            "/api/churches/:church_id/bacentas/:bacenta_id/head-count",
            put(routes::head_counts::set_head_count),
        )
        .route(
            "/api/churches/:church_id/head-counts",
            get(routes::head_counts::list_head_counts),
        )
        // Member routes
        .route(
            "/api/churches/:church_id/members",
            get(routes::members::list_members).post(routes::members::create_member),
        )
        .route(
            "/api/churches/:church_id/members/import",
            post(routes::members::import_members),
        )
        .route(
            "/api/churches/:church_id/members/:member_id",
            get(routes::members::get_member)
                .patch(routes::members::update_member)
                .delete(routes::members::delete_member),
        )
        .route(
            "/api/churches/:church_id/members/:member_id/linked-bacentas",
            put(routes::members::set_linked_bacentas),
        )
        .route(
            "/api/churches/:church_id/members/:member_id/active",
            put(routes::members::set_member_active),
        )
        .route(
            "/api/churches/:church_id/members/:member_id/history",
            get(routes::analytics::member_history),
        )
        .route(
            "/api/churches/:church_id/deletion-requests",
            get(routes::deletion_requests::list_requests)
                .post(routes::deletion_requests::create_request),
        )
        .route(
            "/api/churches/:church_id/deletion-requests/:request_id/approve",
            post(routes::deletion_requests::approve_request),
        )
        .route(
            "/api/churches/:church_id/deletion-requests/:request_id/reject",
            post(routes::deletion_requests::reject_request),
        )
        // New believer routes
        .route(
            "/api/churches/:church_id/new-believers",
            get(routes::new_believers::list_new_believers)
                .post(routes::new_believers::create_new_believer),
        )
        .route(
            "/api/churches/:church_id/new-believers/:new_believer_id",
            get(routes::new_believers::get_new_believer)
                .patch(routes::new_believers::update_new_believer)
                .delete(routes::new_believers::delete_new_believer),
        )
        .route(
            "/api/churches/:church_id/new-believers/:new_believer_id/follow-up",
            put(routes::new_believers::set_follow_up),
        )
        .route(
            "/api/churches/:church_id/new-believers/:new_believer_id/convert",
            post(routes::new_believers::convert_new_believer),
        )
        // Attendance and guests
        .route(
            "/api/churches/:church_id/attendance",
            get(routes::attendance::list_attendance),
        )
        .route(
            "/api/churches/:church_id/attendance/members/:member_id",
            put(routes::attendance::mark_member).delete(routes::attendance::clear_member),
        )
        .route(
            "/api/churches/:church_id/attendance/new-believers/:new_believer_id",
            put(routes::attendance::mark_new_believer)
                .delete(routes::attendance::clear_new_believer),
        )
        .route(
            "/api/churches/:church_id/guests",
            get(routes::guests::list_guests).post(routes::guests::create_guest),
        )
        .route(
            "/api/churches/:church_id/guests/:guest_id",
            delete(routes::guests::delete_guest),
        )
        .route(
            "/api/churches/:church_id/guests/:guest_id/convert",
            post(routes::guests::convert_guest),
        )
        // Analytics
        .route(
            "/api/churches/:church_id/analytics/weekly",
            get(routes::analytics::weekly_summary),
        )
        .route(
            "/api/churches/:church_id/analytics/monthly",
            get(routes::analytics::monthly_trend),
        )
        // Invite routes
        .route("/api/invites", post(routes::invites::send_invite))
        .route("/api/invites/incoming", get(routes::invites::list_incoming))
        .route("/api/invites/outgoing", get(routes::invites::list_outgoing))
        .route(
            "/api/invites/:invite_id/accept",
            post(routes::invites::accept_invite),
        )
        .route(
            "/api/invites/:invite_id/reject",
            post(routes::invites::reject_invite),
        )
        .route(
            "/api/invites/:invite_id/cancel",
            post(routes::invites::cancel_invite),
        )
        .route(
            "/api/invites/:invite_id/remove-access",
            post(routes::invites::remove_access),
        )
        // Chat routes
        .route(
            "/api/chat/threads",
            get(routes::chat::list_threads).post(routes::chat::create_thread),
        )
        .route("/api/chat/threads/:thread_id", get(routes::chat::get_thread))
        .route(
            "/api/chat/threads/:thread_id/messages",
            get(routes::chat::list_messages).post(routes::chat::post_message),
        )
        .route(
            "/api/chat/threads/:thread_id/read",
            post(routes::chat::mark_thread_read),
        )
        // Notification routes
        .route(
            "/api/notifications",
            get(routes::notifications::get_notifications),
        )
        .route(
            "/api/notifications/unread-count",
            get(routes::notifications::get_unread_count),
        )
        .route(
            "/api/notifications/mark-all-read",
            post(routes::notifications::mark_all_read),
        )
        .route(
            "/api/notifications/:notification_id",
            patch(routes::notifications::mark_notification_read)
                .delete(routes::notifications::delete_notification),
        )
        // WebSocket route
        .route("/ws", get(routes::websocket::websocket_handler))
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/docs/openapi.json", ApiDoc::openapi()))
        .layer(trace_layer())
        .layer(cors_layer())
}

fn trace_layer(
) -> TraceLayer<tower_http::classify::SharedClassifier<tower_http::classify::ServerErrorsAsFailures>>
{
    TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO))
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::PATCH,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
}
