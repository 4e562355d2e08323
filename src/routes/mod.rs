use axum::http::HeaderValue;
use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::{
    auth::{csrf, AuthenticatedUser},
    state::AppState,
};

pub mod askers;
pub mod chats;
pub mod consultants;
pub mod health;
pub mod sessions;
pub mod two_factor;

fn cors_layer(allowed: Option<&str>) -> CorsLayer {
    let allow_origin = match allowed {
        Some(origins) => {
            let headers: Vec<HeaderValue> = origins
                .split(',')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .filter_map(|value| match value.parse::<HeaderValue>() {
                    Ok(header) => Some(header),
                    Err(_) => {
                        warn!(origin = %value, "ignoring invalid CORS allowed origin");
                        None
                    }
                })
                .collect();
            AllowOrigin::list(headers)
        }
        None => AllowOrigin::mirror_request(),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

pub fn create_router(state: AppState) -> Router<()> {
    let cors = cors_layer(state.config.cors_allowed_origin.as_deref());

    let session_routes = Router::new()
        .route("/askers", get(sessions::list_asker_sessions))
        .route("/consultants", get(sessions::list_consultant_sessions))
        .route("/new/:session_id", put(sessions::accept_enquiry))
        .route(
            "/:session_id/consultant/:consultant_id",
            put(sessions::assign_session).delete(sessions::remove_consultant),
        );

    // `assign` addresses the chat by its group id, the other routes by chat id.
    let chat_routes = Router::new()
        .route("/new", post(chats::create_chat))
        .route("/:chat_id", get(chats::get_chat))
        .route("/:chat_id/start", put(chats::start_chat))
        .route("/:chat_id/join", put(chats::join_chat))
        .route("/:chat_id/leave", put(chats::leave_chat))
        .route("/:chat_id/stop", put(chats::stop_chat))
        .route("/:chat_id/members", get(chats::chat_members))
        .route("/:chat_id/update", put(chats::update_chat))
        .route("/:chat_id/assign", put(chats::assign_chat));

    let two_factor_routes = Router::new()
        .route(
            "/",
            get(two_factor::get_otp_info).delete(two_factor::deactivate),
        )
        .route("/email", put(two_factor::start_email_setup))
        .route("/email/validate/:tan", post(two_factor::finish_email_setup))
        .route("/app", put(two_factor::activate_app_otp));

    let consultant_routes = Router::new()
        .route("/search", get(consultants::search_consultants))
        .route("/languages", put(consultants::update_languages));

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .nest("/users/sessions", session_routes)
        .nest("/users/chat", chat_routes)
        .nest("/users/2fa", two_factor_routes)
        .nest("/users/consultants", consultant_routes)
        .route(
            "/users/twoFactorAuth",
            put(two_factor::activate_app_otp).delete(two_factor::deactivate),
        )
        .route("/users/:chat_user_id/chat/:chat_id/ban", post(chats::ban_user))
        .layer(middleware::from_extractor_with_state::<AuthenticatedUser, _>(protected_state));

    let csrf_state = state.clone();
    Router::new()
        .merge(protected_routes)
        .route("/users/askers/new", post(askers::register_asker))
        .route("/health", get(health::health_check))
        .with_state(state)
        .layer(middleware::from_fn_with_state(csrf_state, csrf::require_csrf_token))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
