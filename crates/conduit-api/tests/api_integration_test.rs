//! Integration tests for the HTTP API

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::Duration;
use conduit_api::{models::*, ApiServer, ApiServerConfig};
use conduit_auth::{JwtClaims, JwtValidator};
use sea_orm::DatabaseConnection;
use serde_json::{json, Value};
use tower::ServiceExt; // For `oneshot` method

const TEST_SECRET: &str = "test-secret";

/// Helper to create an in-memory database with migrations applied
async fn create_test_db() -> DatabaseConnection {
    let db = conduit_db::connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");

    conduit_db::migrate(&db)
        .await
        .expect("Failed to run migrations");

    db
}

fn test_config(allow_signup: bool) -> ApiServerConfig {
    ApiServerConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(), // Random port
        enable_cors: true,
        cors_origins: None,
        jwt_secret: TEST_SECRET.to_string(),
        token_ttl: Duration::hours(1),
        allow_signup,
    }
}

/// Helper to create the test router
async fn create_test_app() -> Router {
    let db = create_test_db().await;
    ApiServer::new(test_config(true), db)
        .unwrap()
        .build_router()
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().uri(uri).method(method);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Token {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };

    (status, value)
}

/// Register a user and return its token
async fn register(app: &Router, username: &str) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/api/users",
        None,
        Some(json!({
            "user": {
                "username": username,
                "email": format!("{}@example.com", username),
                "password": "correct horse battery"
            }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let response: UserResponse = serde_json::from_value(body).unwrap();
    response.user.token
}

async fn create_article(app: &Router, token: &str, title: &str, tags: &[&str]) -> Article {
    let (status, body) = send(
        app,
        "POST",
        "/api/articles",
        Some(token),
        Some(json!({
            "article": {
                "title": title,
                "description": "Ever wonder how?",
                "body": "You have to believe",
                "tagList": tags
            }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let response: ArticleResponse = serde_json::from_value(body).unwrap();
    response.article
}

#[tokio::test]
async fn test_health_check() {
    let app = create_test_app().await;

    let (status, body) = send(&app, "GET", "/api/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let app = create_test_app().await;

    let (status, body) = send(&app, "GET", "/api/openapi.json", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/api/articles"].is_object());
}

#[tokio::test]
async fn test_register_and_login() {
    let app = create_test_app().await;
    let token = register(&app, "jake").await;
    assert!(!token.is_empty());

    let (status, body) = send(
        &app,
        "POST",
        "/api/users/login",
        None,
        Some(json!({"user": {"email": "jake@example.com", "password": "correct horse battery"}})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let response: UserResponse = serde_json::from_value(body).unwrap();
    assert_eq!(response.user.username, "jake");
    assert_eq!(response.user.email, "jake@example.com");
    assert_eq!(response.user.bio, "");
    assert!(response.user.image.is_none());
}

#[tokio::test]
async fn test_register_validation_errors() {
    let app = create_test_app().await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/users",
        None,
        Some(json!({"user": {"username": "", "email": "nope", "password": "short"}})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: ErrorResponse = serde_json::from_value(body).unwrap();
    assert_eq!(error.code, "VALIDATION_FAILED");
    assert!(error.errors.contains_key("username"));
    assert!(error.errors.contains_key("email"));
    assert!(error.errors.contains_key("password"));
}

#[tokio::test]
async fn test_register_duplicate_email() {
    let app = create_test_app().await;
    register(&app, "jake").await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/users",
        None,
        Some(json!({
            "user": {"username": "other", "email": "jake@example.com", "password": "correct horse battery"}
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"]["email"].is_array());
}

#[tokio::test]
async fn test_malformed_json_is_a_validation_error() {
    let app = create_test_app().await;

    let request = Request::builder()
        .uri("/api/users")
        .method("POST")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
    assert!(error.errors.contains_key("detail"));
}

#[tokio::test]
async fn test_bad_query_and_path_parameters_are_validation_errors() {
    let app = create_test_app().await;
    let token = register(&app, "jake").await;
    let article = create_article(&app, &token, "Query Test", &[]).await;

    let (status, body) = send(&app, "GET", "/api/articles?limit=abc", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_FAILED");
    assert!(body["errors"]["detail"].is_array());

    let (status, body) = send(&app, "GET", "/api/articles/feed?offset=-1", Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_FAILED");

    let uri = format!("/api/articles/{}/comments/abc", article.slug);
    let (status, body) = send(&app, "DELETE", &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_FAILED");
    assert!(body["errors"]["detail"].is_array());
}

#[tokio::test]
async fn test_overlong_title_is_a_validation_error() {
    let app = create_test_app().await;
    let token = register(&app, "jake").await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/articles",
        Some(&token),
        Some(json!({
            "article": {
                "title": "t".repeat(256),
                "description": "Ever wonder how?",
                "body": "You have to believe"
            }
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["errors"]["title"][0],
        "Ensure this field has no more than 255 characters."
    );
}

#[tokio::test]
async fn test_signup_can_be_disabled() {
    let db = create_test_db().await;
    let app = ApiServer::new(test_config(false), db)
        .unwrap()
        .build_router();

    let (status, body) = send(
        &app,
        "POST",
        "/api/users",
        None,
        Some(json!({
            "user": {"username": "jake", "email": "jake@example.com", "password": "correct horse battery"}
        })),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");
}

#[tokio::test]
async fn test_login_wrong_password() {
    let app = create_test_app().await;
    register(&app, "jake").await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/users/login",
        None,
        Some(json!({"user": {"email": "jake@example.com", "password": "wrong password"}})),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.get("user").is_none());
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_current_user_requires_token() {
    let app = create_test_app().await;

    let (status, body) = send(&app, "GET", "/api/user", None, None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_current_user_with_token_and_bearer_scheme() {
    let app = create_test_app().await;
    let token = register(&app, "jake").await;

    let (status, body) = send(&app, "GET", "/api/user", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["username"], "jake");
    assert!(body["user"]["token"].is_string());

    let request = Request::builder()
        .uri("/api/user")
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_malformed_authorization_header() {
    let app = create_test_app().await;

    let request = Request::builder()
        .uri("/api/articles")
        .header("authorization", "NotAScheme")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_expired_and_foreign_tokens_are_rejected() {
    let app = create_test_app().await;
    register(&app, "jake").await;

    let expired = JwtValidator::encode(
        TEST_SECRET.as_bytes(),
        &JwtClaims::session(uuid::Uuid::new_v4().to_string(), Duration::seconds(-120)).unwrap(),
    )
    .unwrap();
    let (status, _) = send(&app, "GET", "/api/user", Some(&expired), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let foreign = JwtValidator::encode(
        b"someone-elses-secret",
        &JwtClaims::session(uuid::Uuid::new_v4().to_string(), Duration::hours(1)).unwrap(),
    )
    .unwrap();
    let (status, _) = send(&app, "GET", "/api/user", Some(&foreign), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_token_for_unknown_user_is_rejected() {
    let app = create_test_app().await;

    let orphan = JwtValidator::encode(
        TEST_SECRET.as_bytes(),
        &JwtClaims::session(uuid::Uuid::new_v4().to_string(), Duration::hours(1)).unwrap(),
    )
    .unwrap();
    let (status, _) = send(&app, "GET", "/api/user", Some(&orphan), None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_update_current_user() {
    let app = create_test_app().await;
    let token = register(&app, "jake").await;

    let (status, body) = send(
        &app,
        "PUT",
        "/api/user",
        Some(&token),
        Some(json!({"user": {"bio": "I like to skateboard", "image": "https://i.stack.imgur.com/xHWG8.jpg"}})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["bio"], "I like to skateboard");
    assert_eq!(body["user"]["image"], "https://i.stack.imgur.com/xHWG8.jpg");
    assert_eq!(body["user"]["username"], "jake");
}

#[tokio::test]
async fn test_profiles_and_following() {
    let app = create_test_app().await;
    let jake = register(&app, "jake").await;
    register(&app, "jane").await;

    let (status, body) = send(&app, "GET", "/api/profiles/jane", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["profile"]["following"], false);
    assert_eq!(
        body["profile"]["image"],
        "https://static.productionready.io/images/smiley-cyrus.jpg"
    );

    let (status, body) = send(&app, "POST", "/api/profiles/jane/follow", Some(&jake), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["profile"]["following"], true);

    let (_, body) = send(&app, "GET", "/api/profiles/jane", Some(&jake), None).await;
    assert_eq!(body["profile"]["following"], true);

    let (status, body) = send(&app, "DELETE", "/api/profiles/jane/follow", Some(&jake), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["profile"]["following"], false);

    let (status, _) = send(&app, "POST", "/api/profiles/jake/follow", Some(&jake), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, "GET", "/api/profiles/ghost", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_article_lifecycle() {
    let app = create_test_app().await;
    let jake = register(&app, "jake").await;
    let jane = register(&app, "jane").await;

    let article = create_article(&app, &jake, "How to train your dragon", &["dragons", "Dragons"]).await;
    assert_eq!(article.slug, "how-to-train-your-dragon");
    assert_eq!(article.tag_list, vec!["dragons"]);
    assert_eq!(article.author.username, "jake");

    let (status, body) = send(&app, "GET", "/api/articles/how-to-train-your-dragon", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["article"]["favoritesCount"], 0);
    assert!(body["article"]["createdAt"].is_string());

    // Only the author may edit
    let (status, _) = send(
        &app,
        "PUT",
        "/api/articles/how-to-train-your-dragon",
        Some(&jane),
        Some(json!({"article": {"body": "hijacked"}})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        "PUT",
        "/api/articles/how-to-train-your-dragon",
        Some(&jake),
        Some(json!({"article": {"title": "Did you train your dragon?"}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["article"]["title"], "Did you train your dragon?");
    assert_eq!(body["article"]["slug"], "how-to-train-your-dragon");

    let (status, body) = send(
        &app,
        "POST",
        "/api/articles/how-to-train-your-dragon/favorite",
        Some(&jane),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["article"]["favorited"], true);
    assert_eq!(body["article"]["favoritesCount"], 1);

    let (status, body) = send(
        &app,
        "DELETE",
        "/api/articles/how-to-train-your-dragon/favorite",
        Some(&jane),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["article"]["favorited"], false);
    assert_eq!(body["article"]["favoritesCount"], 0);

    let (status, _) = send(&app, "DELETE", "/api/articles/how-to-train-your-dragon", Some(&jane), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, "DELETE", "/api/articles/how-to-train-your-dragon", Some(&jake), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_null());

    let (status, _) = send(&app, "GET", "/api/articles/how-to-train-your-dragon", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_article_requires_authentication() {
    let app = create_test_app().await;

    let (status, _) = send(
        &app,
        "POST",
        "/api/articles",
        None,
        Some(json!({"article": {"title": "t", "description": "d", "body": "b"}})),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_list_articles_and_feed() {
    let app = create_test_app().await;
    let jake = register(&app, "jake").await;
    let jane = register(&app, "jane").await;

    create_article(&app, &jake, "Jake writes", &["rust"]).await;
    create_article(&app, &jane, "Jane writes", &["go"]).await;

    let (status, body) = send(&app, "GET", "/api/articles", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let list: ArticleList = serde_json::from_value(body).unwrap();
    assert_eq!(list.articles_count, 2);
    assert_eq!(list.articles[0].title, "Jane writes");

    let (_, body) = send(&app, "GET", "/api/articles?tag=rust", None, None).await;
    let list: ArticleList = serde_json::from_value(body).unwrap();
    assert_eq!(list.articles_count, 1);
    assert_eq!(list.articles[0].title, "Jake writes");

    let (_, body) = send(&app, "GET", "/api/articles?author=jane&limit=1", None, None).await;
    let list: ArticleList = serde_json::from_value(body).unwrap();
    assert_eq!(list.articles.len(), 1);
    assert_eq!(list.articles[0].author.username, "jane");

    let (status, _) = send(&app, "GET", "/api/articles/feed", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    send(&app, "POST", "/api/profiles/jane/follow", Some(&jake), None).await;
    let (status, body) = send(&app, "GET", "/api/articles/feed", Some(&jake), None).await;
    assert_eq!(status, StatusCode::OK);
    let feed: ArticleList = serde_json::from_value(body).unwrap();
    assert_eq!(feed.articles_count, 1);
    assert_eq!(feed.articles[0].title, "Jane writes");
    assert!(feed.articles[0].author.following);
}

#[tokio::test]
async fn test_comments() {
    let app = create_test_app().await;
    let jake = register(&app, "jake").await;
    let jane = register(&app, "jane").await;
    let article = create_article(&app, &jake, "Discuss", &[]).await;
    let comments_uri = format!("/api/articles/{}/comments", article.slug);

    let (status, body) = send(
        &app,
        "POST",
        &comments_uri,
        Some(&jane),
        Some(json!({"comment": {"body": "Thank you so much!"}})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let created: CommentResponse = serde_json::from_value(body).unwrap();
    assert_eq!(created.comment.author.username, "jane");

    let (status, _) = send(
        &app,
        "POST",
        &comments_uri,
        Some(&jane),
        Some(json!({"comment": {"body": ""}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, "GET", &comments_uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    let list: CommentList = serde_json::from_value(body).unwrap();
    assert_eq!(list.comments.len(), 1);

    let comment_uri = format!("{}/{}", comments_uri, created.comment.id);

    // Only the comment's author may delete it
    let (status, _) = send(&app, "DELETE", &comment_uri, Some(&jake), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, "DELETE", &comment_uri, Some(&jane), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, "DELETE", &comment_uri, Some(&jane), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_tags() {
    let app = create_test_app().await;
    let jake = register(&app, "jake").await;
    create_article(&app, &jake, "Tagged", &["rust", "Axum", "rust"]).await;

    let (status, body) = send(&app, "GET", "/api/tags", None, None).await;

    assert_eq!(status, StatusCode::OK);
    let tags: TagList = serde_json::from_value(body).unwrap();
    assert_eq!(tags.tags, vec!["Axum", "rust"]);
}
