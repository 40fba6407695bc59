//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{db::DbAdapter, mailer::LogMailer},
    auth::{
        handlers::{
            login_handler, logout_handler, password_reset_handler, refresh_handler,
            register_handler,
        },
        middleware::{authorize, require_auth, ADMIN_ROLES},
        session::SessionManager,
        tokens::TokenCodec,
    },
    config::Config,
    error::ApiError,
    notify::{NotificationDispatcher, PresenceRegistry},
    web::{
        articles::{
            admin_delete_article_handler, create_article_handler, delete_article_handler,
            get_article_handler, list_articles_handler, record_view_handler,
            search_articles_handler, toggle_like_handler, update_article_handler,
        },
        comments::{
            create_comment_handler, delete_comment_handler, list_comments_handler,
            update_comment_handler,
        },
        notifications::{
            list_notifications_handler, mark_notification_read_handler,
            send_notification_handler,
        },
        state::AppState,
        ws_handler,
    },
};
use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{delete, get, post, put},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let store = Arc::new(DbAdapter::new(db_pool.clone()));
    info!("Running database migrations...");
    store.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Auth & Notification Services ---
    let mailer = Arc::new(LogMailer);
    let tokens = TokenCodec::from_config(&config);
    let sessions = SessionManager::new(
        store.clone(),
        mailer.clone(),
        tokens.clone(),
        config.frontend_url.clone(),
    );
    let presence = Arc::new(PresenceRegistry::new());
    let dispatcher = NotificationDispatcher::new(store.clone(), presence.clone());

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        store: store.clone(),
        mailer,
        config: config.clone(),
        tokens,
        sessions,
        presence,
        dispatcher,
    });

    let cors_origin = config.frontend_url.parse::<HeaderValue>().map_err(|_| {
        ApiError::Internal(format!(
            "Invalid FRONTEND_URL for CORS: '{}'",
            config.frontend_url
        ))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(cors_origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 5. Create the Web Router ---
    // Public routes (no auth required; the websocket authenticates itself
    // through its query token)
    let public_routes = Router::new()
        .route("/api/auth/register", post(register_handler))
        .route("/api/auth/login", post(login_handler))
        .route("/api/auth/refresh", post(refresh_handler))
        .route("/api/auth/logout", post(logout_handler))
        .route("/api/auth/password-reset", post(password_reset_handler))
        .route("/api/articles", get(list_articles_handler))
        .route("/api/articles/search", get(search_articles_handler))
        .route("/api/articles/{id}", get(get_article_handler))
        .route("/api/articles/{id}/view", post(record_view_handler))
        .route("/api/articles/{id}/comments", get(list_comments_handler))
        .route("/ws", get(ws_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/api/articles", post(create_article_handler))
        .route(
            "/api/articles/{id}",
            put(update_article_handler).delete(delete_article_handler),
        )
        .route("/api/articles/{id}/like", put(toggle_like_handler))
        .route("/api/articles/{id}/comments", post(create_comment_handler))
        .route(
            "/api/articles/{id}/comments/{comment_id}",
            put(update_comment_handler).delete(delete_comment_handler),
        )
        .route(
            "/api/notifications",
            get(list_notifications_handler).post(send_notification_handler),
        )
        .route(
            "/api/notifications/{id}/read",
            put(mark_notification_read_handler),
        )
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    // Admin routes. Layers run outermost-first, so require_auth is added
    // last: it must populate the auth context before the role gate reads it.
    let admin_routes = Router::new()
        .route(
            "/api/admin/articles/{id}",
            delete(admin_delete_article_handler),
        )
        .layer(axum_middleware::from_fn(authorize(ADMIN_ROLES)))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    // Combine API routes
    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(admin_routes)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(cors)
        .with_state(app_state);

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
