//! HTTP API for the Conduit backend

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};
use chrono::Duration;
use sea_orm::DatabaseConnection;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use handlers::{articles, comments, profiles, tags, users};
pub use middleware::JwtState;

/// Default validity of issued session tokens
pub const DEFAULT_TOKEN_TTL_HOURS: i64 = 24 * 60;

/// Upper bound on the validity of issued session tokens (ten years)
pub const MAX_TOKEN_TTL_HOURS: i64 = 24 * 365 * 10;

/// Application state shared across handlers
pub struct AppState {
    pub db: DatabaseConnection,
    pub jwt: JwtState,
    pub allow_signup: bool,
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Conduit API",
        version = "0.1.0",
        description = "REST API for a social blogging platform: users, profiles, articles, comments and tags"
    ),
    paths(
        handlers::health_check,
        users::register,
        users::login,
        users::get_current_user,
        users::update_current_user,
        profiles::get_profile,
        profiles::follow_profile,
        profiles::unfollow_profile,
        articles::list_articles,
        articles::feed_articles,
        articles::create_article,
        articles::get_article,
        articles::update_article,
        articles::delete_article,
        articles::favorite_article,
        articles::unfavorite_article,
        comments::list_comments,
        comments::add_comment,
        comments::delete_comment,
        tags::list_tags,
    ),
    components(
        schemas(
            models::RegisterUser,
            models::RegisterRequest,
            models::LoginUser,
            models::LoginRequest,
            models::UpdateUser,
            models::UpdateUserRequest,
            models::User,
            models::UserResponse,
            models::Profile,
            models::ProfileResponse,
            models::Article,
            models::ArticleResponse,
            models::ArticleList,
            models::NewArticle,
            models::CreateArticleRequest,
            models::UpdateArticle,
            models::UpdateArticleRequest,
            models::Comment,
            models::CommentResponse,
            models::CommentList,
            models::NewComment,
            models::CreateCommentRequest,
            models::TagList,
            models::HealthResponse,
            models::ErrorResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "users", description = "Registration, login and the current user"),
        (name = "profiles", description = "Public profiles and following"),
        (name = "articles", description = "Articles, the feed and favorites"),
        (name = "comments", description = "Comments on articles"),
        (name = "tags", description = "Article tags"),
        (name = "system", description = "System health and info endpoints")
    )
)]
pub struct ApiDoc;

/// Registers the `Authorization: Token <jwt>` scheme
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "token",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("Authorization"))),
            );
        }
    }
}

/// API server configuration
pub struct ApiServerConfig {
    /// Address to bind the API server
    pub bind_addr: SocketAddr,
    /// Enable CORS (for development)
    pub enable_cors: bool,
    /// Allowed CORS origins (if None, allows local development origins)
    pub cors_origins: Option<Vec<String>>,
    /// Secret for signing session tokens
    pub jwt_secret: String,
    /// Validity of issued session tokens
    pub token_ttl: Duration,
    /// Whether `POST /api/users` accepts registrations
    pub allow_signup: bool,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            enable_cors: true,
            cors_origins: None,
            jwt_secret: String::new(),
            token_ttl: Duration::hours(DEFAULT_TOKEN_TTL_HOURS),
            allow_signup: true,
        }
    }
}

/// API Server
pub struct ApiServer {
    config: ApiServerConfig,
    state: Arc<AppState>,
}

impl ApiServer {
    /// Create a new API server
    pub fn new(config: ApiServerConfig, db: DatabaseConnection) -> Result<Self, anyhow::Error> {
        if config.jwt_secret.is_empty() {
            anyhow::bail!("A JWT secret is required to sign session tokens");
        }
        if config.token_ttl <= Duration::zero()
            || config.token_ttl > Duration::hours(MAX_TOKEN_TTL_HOURS)
        {
            anyhow::bail!(
                "Token validity must be between 1 and {} hours",
                MAX_TOKEN_TTL_HOURS
            );
        }

        let state = Arc::new(AppState {
            db,
            jwt: JwtState::new(config.jwt_secret.as_bytes(), config.token_ttl),
            allow_signup: config.allow_signup,
        });

        Ok(Self { config, state })
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        let api_router = Router::new()
            .route("/api/health", get(handlers::health_check))
            .route("/api/users", post(users::register))
            .route("/api/users/login", post(users::login))
            .route(
                "/api/user",
                get(users::get_current_user).put(users::update_current_user),
            )
            .route("/api/profiles/{username}", get(profiles::get_profile))
            .route(
                "/api/profiles/{username}/follow",
                post(profiles::follow_profile).delete(profiles::unfollow_profile),
            )
            .route(
                "/api/articles",
                get(articles::list_articles).post(articles::create_article),
            )
            .route("/api/articles/feed", get(articles::feed_articles))
            .route(
                "/api/articles/{slug}",
                get(articles::get_article)
                    .put(articles::update_article)
                    .delete(articles::delete_article),
            )
            .route(
                "/api/articles/{slug}/comments",
                get(comments::list_comments).post(comments::add_comment),
            )
            .route(
                "/api/articles/{slug}/comments/{id}",
                delete(comments::delete_comment),
            )
            .route(
                "/api/articles/{slug}/favorite",
                post(articles::favorite_article).delete(articles::unfavorite_article),
            )
            .route("/api/tags", get(tags::list_tags))
            // Anonymous requests pass through; handlers decide what needs a user
            .layer(axum_middleware::from_fn_with_state(
                self.state.clone(),
                middleware::authenticate,
            ))
            .with_state(self.state.clone());

        // SwaggerUi automatically creates a route for /api/openapi.json
        let router = Router::new()
            .merge(SwaggerUi::new("/swagger-ui").url("/api/openapi.json", ApiDoc::openapi()))
            .merge(api_router);

        let mut router = router.layer(TraceLayer::new_for_http());

        if self.config.enable_cors {
            router = router.layer(self.cors_layer());
        }

        router
    }

    fn cors_layer(&self) -> CorsLayer {
        let origins = match &self.config.cors_origins {
            Some(origins) => AllowOrigin::list(
                origins
                    .iter()
                    .filter_map(|origin| HeaderValue::from_str(origin).ok()),
            ),
            None => AllowOrigin::predicate(|origin: &HeaderValue, _| {
                // Allow common development origins
                let origin_str = origin.to_str().unwrap_or("");
                origin_str.starts_with("http://localhost:")
                    || origin_str.starts_with("http://127.0.0.1:")
                    || origin_str.starts_with("https://localhost:")
                    || origin_str.starts_with("https://127.0.0.1:")
            }),
        };

        CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            .allow_origin(origins)
    }

    /// Start the API server, stopping gracefully once `shutdown` resolves
    pub async fn start_with_shutdown<F>(self, shutdown: F) -> Result<(), anyhow::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = self.build_router();

        info!("Starting API server on {}", self.config.bind_addr);
        info!(
            "OpenAPI spec: http://{}/api/openapi.json",
            self.config.bind_addr
        );
        info!("Swagger UI: http://{}/swagger-ui", self.config.bind_addr);

        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

        info!("API server stopped");
        Ok(())
    }
}
