//! Articles, their tags, and favorites
//!
//! Slugs are derived from the title once, at creation, and never change.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Select, Set, TransactionTrait,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::entities::{article, article_tag, comment, favorite};
use crate::error::{FieldErrors, StoreError, StoreResult};
use crate::profiles::{self, ProfileRecord};
use crate::tags;

pub const DEFAULT_LIMIT: u64 = 20;
pub const MAX_LIMIT: u64 = 100;

const FALLBACK_SLUG: &str = "article";
const SLUG_SUFFIX_LENGTH: usize = 6;
const MAX_TITLE_LENGTH: usize = 255;
/// Leaves room for `-` and a collision suffix within the 255-character column
const MAX_BASE_SLUG_LENGTH: usize = 255 - 1 - SLUG_SUFFIX_LENGTH;

#[derive(Debug, Clone, Default)]
pub struct NewArticle {
    pub title: String,
    pub description: String,
    pub body: String,
    pub tag_list: Vec<String>,
}

/// Partial update; `None` leaves a field untouched, `tag_list` replaces the set
#[derive(Debug, Clone, Default)]
pub struct ArticleChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub body: Option<String>,
    pub tag_list: Option<Vec<String>>,
}

/// Listing filters; unknown names yield an empty page
#[derive(Debug, Clone, Default)]
pub struct ArticleQuery {
    pub tag: Option<String>,
    /// Author username
    pub author: Option<String>,
    /// Username of a profile that favorited the article
    pub favorited: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// An article as seen by one viewer
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleRecord {
    pub article: article::Model,
    pub author: ProfileRecord,
    pub tag_list: Vec<String>,
    pub favorites_count: u64,
    pub favorited: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArticlePage {
    pub articles: Vec<ArticleRecord>,
    /// Matches before `limit`/`offset` were applied
    pub total: u64,
}

fn not_found() -> StoreError {
    StoreError::NotFound("An article with this slug does not exist.".to_string())
}

fn not_author() -> StoreError {
    StoreError::Forbidden("You do not have permission to perform this action.".to_string())
}

/// Slug for `title` before collision handling
pub fn base_slug(title: &str) -> String {
    let slug = slug::slugify(title);
    if slug.is_empty() {
        return FALLBACK_SLUG.to_string();
    }

    // slugify output is ASCII, so byte length equals character count
    if slug.len() <= MAX_BASE_SLUG_LENGTH {
        return slug;
    }
    slug[..MAX_BASE_SLUG_LENGTH].trim_end_matches('-').to_string()
}

fn random_suffix() -> String {
    Uuid::new_v4().simple().to_string()[..SLUG_SUFFIX_LENGTH].to_string()
}

async fn slug_exists<C: ConnectionTrait>(db: &C, slug: &str) -> StoreResult<bool> {
    Ok(article::Entity::find()
        .filter(article::Column::Slug.eq(slug))
        .count(db)
        .await?
        > 0)
}

/// A slug for `title` not yet used by any article
pub async fn generate_slug<C: ConnectionTrait>(db: &C, title: &str) -> StoreResult<String> {
    let base = base_slug(title);
    let mut candidate = base.clone();
    while slug_exists(db, &candidate).await? {
        candidate = format!("{}-{}", base, random_suffix());
    }
    Ok(candidate)
}

fn check_required(field: &str, value: &str, errors: &mut FieldErrors) {
    if value.trim().is_empty() {
        errors.add(field, "This field may not be blank.");
    }
}

fn check_title(title: &str, errors: &mut FieldErrors) {
    check_required("title", title, errors);
    errors.check_max_length("title", title.trim(), MAX_TITLE_LENGTH);
}

pub async fn find_by_slug<C: ConnectionTrait>(db: &C, slug: &str) -> StoreResult<article::Model> {
    article::Entity::find()
        .filter(article::Column::Slug.eq(slug))
        .one(db)
        .await?
        .ok_or_else(not_found)
}

/// Create an article authored by the profile `author_id`
pub async fn create(
    db: &DatabaseConnection,
    author_id: Uuid,
    new_article: NewArticle,
) -> StoreResult<ArticleRecord> {
    let mut errors = FieldErrors::new();
    check_title(&new_article.title, &mut errors);
    check_required("description", &new_article.description, &mut errors);
    check_required("body", &new_article.body, &mut errors);
    tags::check_list(&new_article.tag_list, &mut errors);
    errors.into_result()?;

    let now = Utc::now();
    let txn = db.begin().await?;

    let slug = generate_slug(&txn, &new_article.title).await?;
    let article = article::ActiveModel {
        slug: Set(slug),
        title: Set(new_article.title.trim().to_string()),
        description: Set(new_article.description),
        body: Set(new_article.body),
        author_id: Set(author_id),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await
    .map_err(|e| {
        StoreError::from_unique_violation(e, &[("slug", "An article with this slug already exists.")])
    })?;

    tags::set_article_tags(&txn, article.id, &new_article.tag_list).await?;
    txn.commit().await?;

    info!("Created article '{}' ({})", article.slug, article.id);
    into_record(db, article, Some(author_id)).await
}

/// The article `slug`, with `favorited` and `following` computed for `viewer`
pub async fn load<C: ConnectionTrait>(
    db: &C,
    slug: &str,
    viewer: Option<Uuid>,
) -> StoreResult<ArticleRecord> {
    let article = find_by_slug(db, slug).await?;
    into_record(db, article, viewer).await
}

async fn into_record<C: ConnectionTrait>(
    db: &C,
    article: article::Model,
    viewer: Option<Uuid>,
) -> StoreResult<ArticleRecord> {
    load_many(db, vec![article], viewer)
        .await?
        .pop()
        .ok_or_else(not_found)
}

/// Decorate articles with author, tags and favorite state in a fixed number of queries
///
/// Order is preserved.
pub async fn load_many<C: ConnectionTrait>(
    db: &C,
    articles: Vec<article::Model>,
    viewer: Option<Uuid>,
) -> StoreResult<Vec<ArticleRecord>> {
    if articles.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<i32> = articles.iter().map(|a| a.id).collect();
    let author_ids: Vec<Uuid> = articles
        .iter()
        .map(|a| a.author_id)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();

    let authors = profiles::load_many(db, &author_ids, viewer).await?;
    let mut tags_by_article = tags::for_articles(db, &ids).await?;

    let favorites = favorite::Entity::find()
        .filter(favorite::Column::ArticleId.is_in(ids.iter().copied()))
        .all(db)
        .await?;
    let mut counts: HashMap<i32, u64> = HashMap::new();
    let mut favorited_by_viewer: HashSet<i32> = HashSet::new();
    for row in favorites {
        *counts.entry(row.article_id).or_default() += 1;
        if Some(row.profile_id) == viewer {
            favorited_by_viewer.insert(row.article_id);
        }
    }

    let mut records = Vec::with_capacity(articles.len());
    for article in articles {
        let author = match authors.get(&article.author_id) {
            Some(author) => author.clone(),
            None => continue,
        };
        records.push(ArticleRecord {
            tag_list: tags_by_article.remove(&article.id).unwrap_or_default(),
            favorites_count: counts.get(&article.id).copied().unwrap_or(0),
            favorited: favorited_by_viewer.contains(&article.id),
            author,
            article,
        });
    }
    Ok(records)
}

fn page_bounds(limit: Option<u64>, offset: Option<u64>) -> (u64, u64) {
    let limit = limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    (limit, offset.unwrap_or(0))
}

async fn paginate<C: ConnectionTrait>(
    db: &C,
    select: Select<article::Entity>,
    limit: Option<u64>,
    offset: Option<u64>,
    viewer: Option<Uuid>,
) -> StoreResult<ArticlePage> {
    let (limit, offset) = page_bounds(limit, offset);
    let total = select.clone().count(db).await?;

    let rows = select
        .order_by_desc(article::Column::CreatedAt)
        .order_by_desc(article::Column::Id)
        .limit(limit)
        .offset(offset)
        .all(db)
        .await?;

    Ok(ArticlePage {
        articles: load_many(db, rows, viewer).await?,
        total,
    })
}

async fn profile_id_for<C: ConnectionTrait>(db: &C, username: &str) -> StoreResult<Option<Uuid>> {
    match profiles::find_by_username(db, username).await {
        Ok((_, profile)) => Ok(Some(profile.id)),
        Err(StoreError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Articles matching `query`, newest first
pub async fn list<C: ConnectionTrait>(
    db: &C,
    query: ArticleQuery,
    viewer: Option<Uuid>,
) -> StoreResult<ArticlePage> {
    debug!("Listing articles: {:?}", query);

    let mut select = article::Entity::find();

    if let Some(tag) = &query.tag {
        let ids = tags::article_ids(db, tag).await?;
        if ids.is_empty() {
            return Ok(ArticlePage::default());
        }
        select = select.filter(article::Column::Id.is_in(ids));
    }

    if let Some(author) = &query.author {
        let Some(author_id) = profile_id_for(db, author).await? else {
            return Ok(ArticlePage::default());
        };
        select = select.filter(article::Column::AuthorId.eq(author_id));
    }

    if let Some(favoriter) = &query.favorited {
        let Some(profile_id) = profile_id_for(db, favoriter).await? else {
            return Ok(ArticlePage::default());
        };
        let ids: Vec<i32> = favorite::Entity::find()
            .filter(favorite::Column::ProfileId.eq(profile_id))
            .all(db)
            .await?
            .into_iter()
            .map(|row| row.article_id)
            .collect();
        if ids.is_empty() {
            return Ok(ArticlePage::default());
        }
        select = select.filter(article::Column::Id.is_in(ids));
    }

    paginate(db, select, query.limit, query.offset, viewer).await
}

/// Articles written by the profiles `viewer` follows, newest first
pub async fn feed<C: ConnectionTrait>(
    db: &C,
    viewer: Uuid,
    limit: Option<u64>,
    offset: Option<u64>,
) -> StoreResult<ArticlePage> {
    let followees = profiles::followee_ids(db, viewer).await?;
    if followees.is_empty() {
        return Ok(ArticlePage::default());
    }

    let select = article::Entity::find().filter(article::Column::AuthorId.is_in(followees));
    paginate(db, select, limit, offset, Some(viewer)).await
}

/// Apply `changes` to the article `slug`; only its author may do this
pub async fn update(
    db: &DatabaseConnection,
    slug: &str,
    requester: Uuid,
    changes: ArticleChanges,
) -> StoreResult<ArticleRecord> {
    let article = find_by_slug(db, slug).await?;
    if article.author_id != requester {
        return Err(not_author());
    }

    let mut errors = FieldErrors::new();
    if let Some(title) = &changes.title {
        check_title(title, &mut errors);
    }
    if let Some(description) = &changes.description {
        check_required("description", description, &mut errors);
    }
    if let Some(body) = &changes.body {
        check_required("body", body, &mut errors);
    }
    if let Some(tag_list) = &changes.tag_list {
        tags::check_list(tag_list, &mut errors);
    }
    errors.into_result()?;

    let txn = db.begin().await?;

    let article_id = article.id;
    let mut active: article::ActiveModel = article.into();
    if let Some(title) = changes.title {
        active.title = Set(title.trim().to_string());
    }
    if let Some(description) = changes.description {
        active.description = Set(description);
    }
    if let Some(body) = changes.body {
        active.body = Set(body);
    }
    active.updated_at = Set(Utc::now());
    let article = active.update(&txn).await?;

    if let Some(tag_list) = &changes.tag_list {
        tags::set_article_tags(&txn, article_id, tag_list).await?;
    }

    txn.commit().await?;
    debug!("Updated article '{}'", article.slug);

    into_record(db, article, Some(requester)).await
}

/// Delete the article `slug` with its comments, favorites and tag links
pub async fn delete(db: &DatabaseConnection, slug: &str, requester: Uuid) -> StoreResult<()> {
    let article = find_by_slug(db, slug).await?;
    if article.author_id != requester {
        return Err(not_author());
    }

    let txn = db.begin().await?;

    comment::Entity::delete_many()
        .filter(comment::Column::ArticleId.eq(article.id))
        .exec(&txn)
        .await?;
    favorite::Entity::delete_many()
        .filter(favorite::Column::ArticleId.eq(article.id))
        .exec(&txn)
        .await?;
    article_tag::Entity::delete_many()
        .filter(article_tag::Column::ArticleId.eq(article.id))
        .exec(&txn)
        .await?;
    article::Entity::delete_by_id(article.id).exec(&txn).await?;

    txn.commit().await?;
    info!("Deleted article '{}' ({})", article.slug, article.id);

    Ok(())
}

/// Mark the article `slug` as a favorite of `profile_id`; idempotent
pub async fn favorite<C: ConnectionTrait>(
    db: &C,
    slug: &str,
    profile_id: Uuid,
) -> StoreResult<ArticleRecord> {
    let article = find_by_slug(db, slug).await?;

    let row = favorite::ActiveModel {
        profile_id: Set(profile_id),
        article_id: Set(article.id),
        created_at: Set(Utc::now()),
    };
    favorite::Entity::insert(row)
        .on_conflict(
            OnConflict::columns([favorite::Column::ProfileId, favorite::Column::ArticleId])
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;

    into_record(db, article, Some(profile_id)).await
}

/// Remove `profile_id`'s favorite on the article `slug`; a missing favorite is a no-op
pub async fn unfavorite<C: ConnectionTrait>(
    db: &C,
    slug: &str,
    profile_id: Uuid,
) -> StoreResult<ArticleRecord> {
    let article = find_by_slug(db, slug).await?;

    favorite::Entity::delete_many()
        .filter(favorite::Column::ProfileId.eq(profile_id))
        .filter(favorite::Column::ArticleId.eq(article.id))
        .exec(db)
        .await?;

    into_record(db, article, Some(profile_id)).await
}

pub async fn favorites_count<C: ConnectionTrait>(db: &C, article_id: i32) -> StoreResult<u64> {
    Ok(favorite::Entity::find()
        .filter(favorite::Column::ArticleId.eq(article_id))
        .count(db)
        .await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_slug_hyphenates_and_lowercases() {
        assert_eq!(base_slug("How to Train Your Dragon"), "how-to-train-your-dragon");
        assert_eq!(base_slug("  Rust: 2024 edition!  "), "rust-2024-edition");
    }

    #[test]
    fn base_slug_falls_back_for_unsluggable_titles() {
        assert_eq!(base_slug("!!!"), FALLBACK_SLUG);
        assert_eq!(base_slug(""), FALLBACK_SLUG);
    }

    #[test]
    fn base_slug_leaves_room_for_a_suffix() {
        let slug = base_slug(&"a".repeat(300));
        assert_eq!(slug.len(), MAX_BASE_SLUG_LENGTH);
        assert!(slug.len() + 1 + SLUG_SUFFIX_LENGTH <= 255);

        // Truncation does not leave a dangling separator
        let title = format!("{} tail", "b".repeat(MAX_BASE_SLUG_LENGTH - 1));
        assert_eq!(base_slug(&title), "b".repeat(MAX_BASE_SLUG_LENGTH - 1));
    }

    #[test]
    fn title_length_is_capped() {
        let mut errors = FieldErrors::new();
        check_title(&"t".repeat(MAX_TITLE_LENGTH), &mut errors);
        assert!(errors.is_empty());

        check_title(&"t".repeat(MAX_TITLE_LENGTH + 1), &mut errors);
        assert!(errors.contains("title"));
    }

    #[test]
    fn random_suffix_has_fixed_length() {
        let suffix = random_suffix();
        assert_eq!(suffix.len(), SLUG_SUFFIX_LENGTH);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn page_bounds_apply_defaults_and_cap() {
        assert_eq!(page_bounds(None, None), (DEFAULT_LIMIT, 0));
        assert_eq!(page_bounds(Some(500), Some(40)), (MAX_LIMIT, 40));
        assert_eq!(page_bounds(Some(5), None), (5, 0));
    }
}
