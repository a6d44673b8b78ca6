use axum::{middleware, routing, Router};

use crate::auth::middleware::JwtSecret;
use crate::conversations;
use crate::friends;
use crate::messages;
use crate::moments;
use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Inject the JWT secret into request extensions so the Claims extractor can find it.
async fn inject_jwt_secret(
    axum::extract::State(state): axum::extract::State<AppState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: middleware::Next,
) -> axum::response::Response {
    req.extensions_mut()
        .insert(JwtSecret(state.jwt_secret.clone()));
    next.run(req).await
}

/// Build the full axum Router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let conversation_routes = Router::new()
        .route(
            "/api/conversations",
            routing::post(conversations::create_conversation),
        )
        .route(
            "/api/conversations",
            routing::get(conversations::list_conversations),
        )
        .route(
            "/api/conversations/{id}",
            routing::get(conversations::get_conversation),
        )
        .route(
            "/api/conversations/{id}",
            routing::delete(conversations::archive_conversation),
        );

    let message_routes = Router::new()
        .route("/api/messages", routing::post(messages::send_message))
        .route(
            "/api/conversations/{id}/messages",
            routing::get(messages::list_messages),
        )
        .route(
            "/api/messages/{id}/read",
            routing::post(messages::read_message),
        )
        .route(
            "/api/messages/{id}",
            routing::delete(messages::delete_message),
        );

    let friend_routes = Router::new()
        .route("/api/friends/request", routing::post(friends::send_request))
        .route("/api/friends", routing::get(friends::list_friends))
        .route(
            "/api/friends/requests/received",
            routing::get(friends::list_received_requests),
        )
        .route(
            "/api/friends/requests/sent",
            routing::get(friends::list_sent_requests),
        )
        .route(
            "/api/friends/requests/{id}/respond",
            routing::post(friends::respond_to_request),
        )
        .route(
            "/api/friends/{user_id}/block",
            routing::post(friends::block_user),
        )
        .route(
            "/api/friends/{user_id}/unblock",
            routing::delete(friends::unblock_user),
        );

    let moment_routes = Router::new()
        .route("/api/moments", routing::post(moments::create_moment))
        .route("/api/moments", routing::get(moments::feed))
        .route("/api/moments/{id}/view", routing::post(moments::view_moment))
        .route(
            "/api/moments/{id}",
            routing::delete(moments::delete_moment),
        );

    // WebSocket endpoint (auth via query param, not JWT header)
    let ws_routes = Router::new().route("/ws", routing::get(ws_handler::ws_upgrade));

    let health = Router::new().route("/health", routing::get(health_check));

    Router::new()
        .merge(conversation_routes)
        .merge(message_routes)
        .merge(friend_routes)
        .merge(moment_routes)
        .merge(ws_routes)
        .merge(health)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            inject_jwt_secret,
        ))
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}
