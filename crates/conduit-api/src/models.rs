use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use conduit_db::accounts::Account;
use conduit_db::articles::ArticleRecord;
use conduit_db::comments::CommentRecord;
use conduit_db::profiles::ProfileRecord;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// Registration payload
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct RegisterUser {
    /// Unique username
    pub username: String,
    /// Unique email address
    pub email: String,
    /// Password (8 to 128 characters)
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub user: RegisterUser,
}

/// Login payload
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct LoginUser {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub user: LoginUser,
}

/// Partial update of the current user; omitted fields are left untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateUser {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    /// Avatar URL; an empty string clears it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateUserRequest {
    pub user: UpdateUser,
}

/// The authenticated user
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub email: String,
    pub username: String,
    /// Session token to send as `Authorization: Token <token>`
    pub token: String,
    pub bio: String,
    pub image: Option<String>,
}

impl User {
    pub fn new(account: Account, token: String) -> Self {
        Self {
            email: account.user.email,
            username: account.user.username,
            token,
            bio: account.profile.bio,
            image: account.profile.image,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub user: User,
}

// ---------------------------------------------------------------------------
// Profiles
// ---------------------------------------------------------------------------

/// A public profile as seen by the requester
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Profile {
    pub username: String,
    pub bio: String,
    /// Avatar URL, or the default avatar when unset
    pub image: String,
    /// Whether the requester follows this profile
    pub following: bool,
}

impl From<&ProfileRecord> for Profile {
    fn from(record: &ProfileRecord) -> Self {
        Self {
            username: record.username.clone(),
            bio: record.profile.bio.clone(),
            image: record.image_url().to_string(),
            following: record.following,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProfileResponse {
    pub profile: Profile,
}

// ---------------------------------------------------------------------------
// Articles
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub slug: String,
    pub title: String,
    pub description: String,
    pub body: String,
    pub tag_list: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Whether the requester has favorited this article
    pub favorited: bool,
    pub favorites_count: u64,
    pub author: Profile,
}

impl From<ArticleRecord> for Article {
    fn from(record: ArticleRecord) -> Self {
        let author = Profile::from(&record.author);
        Self {
            slug: record.article.slug,
            title: record.article.title,
            description: record.article.description,
            body: record.article.body,
            tag_list: record.tag_list,
            created_at: record.article.created_at,
            updated_at: record.article.updated_at,
            favorited: record.favorited,
            favorites_count: record.favorites_count,
            author,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ArticleResponse {
    pub article: Article,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ArticleList {
    pub articles: Vec<Article>,
    /// Total matches, ignoring `limit` and `offset`
    pub articles_count: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct NewArticle {
    pub title: String,
    pub description: String,
    pub body: String,
    pub tag_list: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateArticleRequest {
    pub article: NewArticle,
}

/// Partial article update; `tagList` replaces the whole tag set
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateArticle {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag_list: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateArticleRequest {
    pub article: UpdateArticle,
}

/// Query parameters for listing articles
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ArticleListQuery {
    /// Only articles carrying this tag
    pub tag: Option<String>,
    /// Only articles written by this username
    pub author: Option<String>,
    /// Only articles favorited by this username
    pub favorited: Option<String>,
    /// Page size (default: 20, max: 100)
    pub limit: Option<u64>,
    /// Pagination offset (default: 0)
    pub offset: Option<u64>,
}

/// Query parameters for the feed
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct FeedQuery {
    /// Page size (default: 20, max: 100)
    pub limit: Option<u64>,
    /// Pagination offset (default: 0)
    pub offset: Option<u64>,
}

// ---------------------------------------------------------------------------
// Comments
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: i32,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub author: Profile,
}

impl From<CommentRecord> for Comment {
    fn from(record: CommentRecord) -> Self {
        let author = Profile::from(&record.author);
        Self {
            id: record.comment.id,
            body: record.comment.body,
            created_at: record.comment.created_at,
            updated_at: record.comment.updated_at,
            author,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CommentResponse {
    pub comment: Comment,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CommentList {
    pub comments: Vec<Comment>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct NewComment {
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateCommentRequest {
    pub comment: NewComment,
}

// ---------------------------------------------------------------------------
// Misc
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TagList {
    pub tags: Vec<String>,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Service version
    pub version: String,
}

/// Error response
///
/// Field errors are keyed by field name; errors not tied to a field use `detail`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub errors: BTreeMap<String, Vec<String>>,
    /// Machine-readable error code
    pub code: String,
}
