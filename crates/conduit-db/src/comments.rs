//! Comments on articles

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use tracing::debug;
use uuid::Uuid;

use crate::articles;
use crate::entities::comment;
use crate::error::{FieldErrors, StoreError, StoreResult};
use crate::profiles::{self, ProfileRecord};

/// A comment as seen by one viewer
#[derive(Debug, Clone, PartialEq)]
pub struct CommentRecord {
    pub comment: comment::Model,
    pub author: ProfileRecord,
}

fn not_found() -> StoreError {
    StoreError::NotFound("A comment with this ID does not exist.".to_string())
}

/// Comment on the article `slug` as the profile `author_id`
pub async fn add<C: ConnectionTrait>(
    db: &C,
    slug: &str,
    author_id: Uuid,
    body: &str,
) -> StoreResult<CommentRecord> {
    let article = articles::find_by_slug(db, slug).await?;

    if body.trim().is_empty() {
        return Err(FieldErrors::single("body", "This field may not be blank."));
    }

    let now = Utc::now();
    let comment = comment::ActiveModel {
        body: Set(body.to_string()),
        article_id: Set(article.id),
        author_id: Set(author_id),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;

    debug!("Comment {} added to '{}'", comment.id, article.slug);

    let author = profiles::load_many(db, &[author_id], Some(author_id))
        .await?
        .remove(&author_id)
        .ok_or_else(|| StoreError::NotFound("No profile exists for this user.".to_string()))?;

    Ok(CommentRecord { comment, author })
}

/// Comments on the article `slug`, newest first
pub async fn list_for_article<C: ConnectionTrait>(
    db: &C,
    slug: &str,
    viewer: Option<Uuid>,
) -> StoreResult<Vec<CommentRecord>> {
    let article = articles::find_by_slug(db, slug).await?;

    let rows = comment::Entity::find()
        .filter(comment::Column::ArticleId.eq(article.id))
        .order_by_desc(comment::Column::CreatedAt)
        .order_by_desc(comment::Column::Id)
        .all(db)
        .await?;

    let mut author_ids: Vec<Uuid> = rows.iter().map(|c| c.author_id).collect();
    author_ids.sort_unstable();
    author_ids.dedup();
    let authors = profiles::load_many(db, &author_ids, viewer).await?;

    Ok(rows
        .into_iter()
        .filter_map(|comment| {
            let author = authors.get(&comment.author_id)?.clone();
            Some(CommentRecord { comment, author })
        })
        .collect())
}

/// Delete comment `id` of the article `slug`; only its author may do this
pub async fn delete<C: ConnectionTrait>(
    db: &C,
    slug: &str,
    id: i32,
    requester: Uuid,
) -> StoreResult<()> {
    let article = articles::find_by_slug(db, slug).await?;

    let comment = comment::Entity::find_by_id(id)
        .filter(comment::Column::ArticleId.eq(article.id))
        .one(db)
        .await?
        .ok_or_else(not_found)?;

    if comment.author_id != requester {
        return Err(StoreError::Forbidden(
            "You do not have permission to perform this action.".to_string(),
        ));
    }

    comment::Entity::delete_by_id(comment.id).exec(db).await?;
    debug!("Comment {} deleted from '{}'", comment.id, article.slug);

    Ok(())
}
