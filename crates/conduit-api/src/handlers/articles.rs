use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use conduit_db::articles::{self, ArticleChanges, ArticlePage, ArticleQuery};
use tracing::{debug, info};

use crate::error::{ApiJson, ApiPath, ApiQuery, ApiResult};
use crate::middleware::{AuthUser, MaybeAuthUser};
use crate::models::*;
use crate::AppState;

fn article_list(page: ArticlePage) -> ArticleList {
    ArticleList {
        articles: page.articles.into_iter().map(Article::from).collect(),
        articles_count: page.total,
    }
}

/// List articles, newest first
#[utoipa::path(
    get,
    path = "/api/articles",
    params(ArticleListQuery),
    responses(
        (status = 200, description = "Page of articles", body = ArticleList),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "articles"
)]
pub async fn list_articles(
    State(state): State<Arc<AppState>>,
    viewer: MaybeAuthUser,
    ApiQuery(query): ApiQuery<ArticleListQuery>,
) -> ApiResult<Json<ArticleList>> {
    debug!("Listing articles with filters: {:?}", query);

    let page = articles::list(
        &state.db,
        ArticleQuery {
            tag: query.tag,
            author: query.author,
            favorited: query.favorited,
            limit: query.limit,
            offset: query.offset,
        },
        viewer.profile_id(),
    )
    .await?;

    Ok(Json(article_list(page)))
}

/// Articles by the profiles the current user follows
#[utoipa::path(
    get,
    path = "/api/articles/feed",
    params(FeedQuery),
    responses(
        (status = 200, description = "Page of articles", body = ArticleList),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    ),
    security(("token" = [])),
    tag = "articles"
)]
pub async fn feed_articles(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiQuery(query): ApiQuery<FeedQuery>,
) -> ApiResult<Json<ArticleList>> {
    let page = articles::feed(&state.db, auth.profile_id, query.limit, query.offset).await?;
    Ok(Json(article_list(page)))
}

/// Create an article
#[utoipa::path(
    post,
    path = "/api/articles",
    request_body = CreateArticleRequest,
    responses(
        (status = 201, description = "Article created", body = ArticleResponse),
        (status = 400, description = "Missing or blank fields", body = ErrorResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    ),
    security(("token" = [])),
    tag = "articles"
)]
pub async fn create_article(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiJson(req): ApiJson<CreateArticleRequest>,
) -> ApiResult<(StatusCode, Json<ArticleResponse>)> {
    let record = articles::create(
        &state.db,
        auth.profile_id,
        articles::NewArticle {
            title: req.article.title,
            description: req.article.description,
            body: req.article.body,
            tag_list: req.article.tag_list,
        },
    )
    .await?;

    info!("{} published '{}'", auth.username, record.article.slug);

    Ok((
        StatusCode::CREATED,
        Json(ArticleResponse {
            article: Article::from(record),
        }),
    ))
}

/// Get an article by slug
#[utoipa::path(
    get,
    path = "/api/articles/{slug}",
    params(
        ("slug" = String, Path, description = "Article slug")
    ),
    responses(
        (status = 200, description = "Article", body = ArticleResponse),
        (status = 404, description = "Article not found", body = ErrorResponse)
    ),
    tag = "articles"
)]
pub async fn get_article(
    State(state): State<Arc<AppState>>,
    viewer: MaybeAuthUser,
    ApiPath(slug): ApiPath<String>,
) -> ApiResult<Json<ArticleResponse>> {
    let record = articles::load(&state.db, &slug, viewer.profile_id()).await?;

    Ok(Json(ArticleResponse {
        article: Article::from(record),
    }))
}

/// Update an article
///
/// Only the author may update an article. The slug does not change.
#[utoipa::path(
    put,
    path = "/api/articles/{slug}",
    params(
        ("slug" = String, Path, description = "Article slug")
    ),
    request_body = UpdateArticleRequest,
    responses(
        (status = 200, description = "Updated article", body = ArticleResponse),
        (status = 400, description = "Blank fields", body = ErrorResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 403, description = "Not the author", body = ErrorResponse),
        (status = 404, description = "Article not found", body = ErrorResponse)
    ),
    security(("token" = [])),
    tag = "articles"
)]
pub async fn update_article(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiPath(slug): ApiPath<String>,
    ApiJson(req): ApiJson<UpdateArticleRequest>,
) -> ApiResult<Json<ArticleResponse>> {
    let changes = ArticleChanges {
        title: req.article.title,
        description: req.article.description,
        body: req.article.body,
        tag_list: req.article.tag_list,
    };

    let record = articles::update(&state.db, &slug, auth.profile_id, changes).await?;

    Ok(Json(ArticleResponse {
        article: Article::from(record),
    }))
}

/// Delete an article with its comments and favorites
#[utoipa::path(
    delete,
    path = "/api/articles/{slug}",
    params(
        ("slug" = String, Path, description = "Article slug")
    ),
    responses(
        (status = 204, description = "Article deleted"),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 403, description = "Not the author", body = ErrorResponse),
        (status = 404, description = "Article not found", body = ErrorResponse)
    ),
    security(("token" = [])),
    tag = "articles"
)]
pub async fn delete_article(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiPath(slug): ApiPath<String>,
) -> ApiResult<StatusCode> {
    articles::delete(&state.db, &slug, auth.profile_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Favorite an article
#[utoipa::path(
    post,
    path = "/api/articles/{slug}/favorite",
    params(
        ("slug" = String, Path, description = "Article slug")
    ),
    responses(
        (status = 200, description = "Favorited article", body = ArticleResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 404, description = "Article not found", body = ErrorResponse)
    ),
    security(("token" = [])),
    tag = "articles"
)]
pub async fn favorite_article(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiPath(slug): ApiPath<String>,
) -> ApiResult<Json<ArticleResponse>> {
    let record = articles::favorite(&state.db, &slug, auth.profile_id).await?;

    Ok(Json(ArticleResponse {
        article: Article::from(record),
    }))
}

/// Remove an article from the current user's favorites
#[utoipa::path(
    delete,
    path = "/api/articles/{slug}/favorite",
    params(
        ("slug" = String, Path, description = "Article slug")
    ),
    responses(
        (status = 200, description = "Unfavorited article", body = ArticleResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 404, description = "Article not found", body = ErrorResponse)
    ),
    security(("token" = [])),
    tag = "articles"
)]
pub async fn unfavorite_article(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiPath(slug): ApiPath<String>,
) -> ApiResult<Json<ArticleResponse>> {
    let record = articles::unfavorite(&state.db, &slug, auth.profile_id).await?;

    Ok(Json(ArticleResponse {
        article: Article::from(record),
    }))
}
