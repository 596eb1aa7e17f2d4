//! Tags: lazily created labels, unique by their lowercased text

use std::collections::HashMap;

use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set};

use crate::entities::{article_tag, tag};
use crate::error::{FieldErrors, StoreError, StoreResult};

/// Longest tag text the schema stores
pub const MAX_TAG_LENGTH: usize = 255;

/// Split raw tag input into `(display text, lookup key)`
///
/// Returns `None` for blank input.
pub fn normalize(raw: &str) -> Option<(String, String)> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }
    Some((text.to_string(), text.to_lowercase()))
}

/// Normalize a tag list, dropping blanks and case-variant duplicates
///
/// The first spelling of each tag wins; order is preserved.
pub fn normalize_list(raw: &[String]) -> Vec<(String, String)> {
    let mut seen = Vec::<(String, String)>::new();
    for item in raw {
        if let Some((text, key)) = normalize(item) {
            if !seen.iter().any(|(_, existing)| *existing == key) {
                seen.push((text, key));
            }
        }
    }
    seen
}

/// Record a `tagList` error for every tag longer than [`MAX_TAG_LENGTH`]
pub fn check_list(raw: &[String], errors: &mut FieldErrors) {
    for (text, _) in normalize_list(raw) {
        errors.check_max_length("tagList", &text, MAX_TAG_LENGTH);
    }
}

/// Return the tag for `raw`, inserting it if this is its first use
///
/// Keyed on the lowercased text, so "Go" and "go" resolve to the same row.
/// A concurrent insert of the same key is absorbed by the unique index.
pub async fn get_or_create<C: ConnectionTrait>(db: &C, raw: &str) -> StoreResult<tag::Model> {
    let (text, key) =
        normalize(raw).ok_or_else(|| FieldErrors::single("tagList", "Tags may not be blank."))?;
    let mut errors = FieldErrors::new();
    errors.check_max_length("tagList", &text, MAX_TAG_LENGTH);
    errors.into_result()?;

    if let Some(existing) = find_by_key(db, &key).await? {
        return Ok(existing);
    }

    let new_tag = tag::ActiveModel {
        tag: Set(text),
        slug: Set(key.clone()),
        created_at: Set(Utc::now()),
        ..Default::default()
    };

    tag::Entity::insert(new_tag)
        .on_conflict(
            OnConflict::column(tag::Column::Slug)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;

    find_by_key(db, &key).await?.ok_or_else(|| {
        StoreError::Database(sea_orm::DbErr::RecordNotFound(format!(
            "tag '{}' vanished after insert",
            key
        )))
    })
}

async fn find_by_key<C: ConnectionTrait>(db: &C, key: &str) -> StoreResult<Option<tag::Model>> {
    Ok(tag::Entity::find()
        .filter(tag::Column::Slug.eq(key))
        .one(db)
        .await?)
}

/// Look up an existing tag without creating it
pub async fn find<C: ConnectionTrait>(db: &C, raw: &str) -> StoreResult<Option<tag::Model>> {
    match normalize(raw) {
        Some((_, key)) => find_by_key(db, &key).await,
        None => Ok(None),
    }
}

/// Every tag's display text, sorted
pub async fn list<C: ConnectionTrait>(db: &C) -> StoreResult<Vec<String>> {
    Ok(tag::Entity::find()
        .order_by_asc(tag::Column::Slug)
        .all(db)
        .await?
        .into_iter()
        .map(|tag| tag.tag)
        .collect())
}

/// Replace the tag set of an article
pub async fn set_article_tags<C: ConnectionTrait>(
    db: &C,
    article_id: i32,
    raw_tags: &[String],
) -> StoreResult<()> {
    article_tag::Entity::delete_many()
        .filter(article_tag::Column::ArticleId.eq(article_id))
        .exec(db)
        .await?;

    let normalized = normalize_list(raw_tags);
    if normalized.is_empty() {
        return Ok(());
    }

    let mut links = Vec::with_capacity(normalized.len());
    for (text, _) in normalized {
        let tag = get_or_create(db, &text).await?;
        links.push(article_tag::ActiveModel {
            article_id: Set(article_id),
            tag_id: Set(tag.id),
        });
    }

    article_tag::Entity::insert_many(links)
        .on_conflict(
            OnConflict::columns([article_tag::Column::ArticleId, article_tag::Column::TagId])
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;

    Ok(())
}

/// Display texts of the tags on each article, in tag order
pub async fn for_articles<C: ConnectionTrait>(
    db: &C,
    article_ids: &[i32],
) -> StoreResult<HashMap<i32, Vec<String>>> {
    let mut by_article: HashMap<i32, Vec<String>> = HashMap::new();
    if article_ids.is_empty() {
        return Ok(by_article);
    }

    let rows = article_tag::Entity::find()
        .filter(article_tag::Column::ArticleId.is_in(article_ids.iter().copied()))
        .find_also_related(tag::Entity)
        .order_by_asc(article_tag::Column::TagId)
        .all(db)
        .await?;

    for (link, tag) in rows {
        if let Some(tag) = tag {
            by_article.entry(link.article_id).or_default().push(tag.tag);
        }
    }

    Ok(by_article)
}

/// Ids of the articles carrying the tag `raw`
pub async fn article_ids<C: ConnectionTrait>(db: &C, raw: &str) -> StoreResult<Vec<i32>> {
    let Some(tag) = find(db, raw).await? else {
        return Ok(Vec::new());
    };

    Ok(article_tag::Entity::find()
        .filter(article_tag::Column::TagId.eq(tag.id))
        .all(db)
        .await?
        .into_iter()
        .map(|link| link.article_id)
        .collect())
}
