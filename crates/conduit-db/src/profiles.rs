//! Profiles and the follow graph
//!
//! Follow edges are rows of a join table keyed by `(follower_id, followee_id)`;
//! adding an existing edge or removing a missing one is a no-op.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};
use tracing::debug;
use uuid::Uuid;

use crate::entities::{follow, profile, user};
use crate::error::{FieldErrors, StoreError, StoreResult};

/// Avatar shown for profiles without an image of their own
pub const DEFAULT_IMAGE: &str = "https://static.productionready.io/images/smiley-cyrus.jpg";

/// A profile as seen by one viewer
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileRecord {
    pub profile: profile::Model,
    pub username: String,
    /// Whether the viewer follows this profile; always false for anonymous viewers
    pub following: bool,
}

impl ProfileRecord {
    pub fn id(&self) -> Uuid {
        self.profile.id
    }

    pub fn image_url(&self) -> &str {
        self.profile
            .image
            .as_deref()
            .filter(|image| !image.is_empty())
            .unwrap_or(DEFAULT_IMAGE)
    }
}

fn not_found() -> StoreError {
    StoreError::NotFound("A profile with this username does not exist.".to_string())
}

/// Look up a user and profile by username
pub async fn find_by_username<C: ConnectionTrait>(
    db: &C,
    username: &str,
) -> StoreResult<(user::Model, profile::Model)> {
    let (user, profile) = user::Entity::find()
        .filter(user::Column::Username.eq(username))
        .find_also_related(profile::Entity)
        .one(db)
        .await?
        .ok_or_else(not_found)?;

    let profile = profile.ok_or_else(not_found)?;
    Ok((user, profile))
}

/// Profile for `username`, with `following` computed for `viewer`
pub async fn load<C: ConnectionTrait>(
    db: &C,
    username: &str,
    viewer: Option<Uuid>,
) -> StoreResult<ProfileRecord> {
    debug!("Loading profile: {}", username);

    let (user, profile) = find_by_username(db, username).await?;
    let following = match viewer {
        Some(viewer) => is_following(db, viewer, profile.id).await?,
        None => false,
    };

    Ok(ProfileRecord {
        profile,
        username: user.username,
        following,
    })
}

/// Batch variant of [`load`], keyed by profile id
///
/// Ids with no matching profile are simply absent from the map.
pub async fn load_many<C: ConnectionTrait>(
    db: &C,
    ids: &[Uuid],
    viewer: Option<Uuid>,
) -> StoreResult<HashMap<Uuid, ProfileRecord>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows = profile::Entity::find()
        .filter(profile::Column::Id.is_in(ids.iter().copied()))
        .find_also_related(user::Entity)
        .all(db)
        .await?;

    let followed: HashSet<Uuid> = match viewer {
        Some(viewer) => follow::Entity::find()
            .filter(follow::Column::FollowerId.eq(viewer))
            .filter(follow::Column::FolloweeId.is_in(ids.iter().copied()))
            .all(db)
            .await?
            .into_iter()
            .map(|edge| edge.followee_id)
            .collect(),
        None => HashSet::new(),
    };

    Ok(rows
        .into_iter()
        .filter_map(|(profile, user)| {
            let user = user?;
            Some((
                profile.id,
                ProfileRecord {
                    following: followed.contains(&profile.id),
                    username: user.username,
                    profile,
                },
            ))
        })
        .collect())
}

pub async fn is_following<C: ConnectionTrait>(
    db: &C,
    follower_id: Uuid,
    followee_id: Uuid,
) -> StoreResult<bool> {
    let count = follow::Entity::find()
        .filter(follow::Column::FollowerId.eq(follower_id))
        .filter(follow::Column::FolloweeId.eq(followee_id))
        .count(db)
        .await?;

    Ok(count > 0)
}

/// Add the edge `follower → followee`
///
/// Idempotent. Self-follows are rejected.
pub async fn follow<C: ConnectionTrait>(
    db: &C,
    follower_id: Uuid,
    followee_id: Uuid,
) -> StoreResult<()> {
    if follower_id == followee_id {
        return Err(FieldErrors::single(
            "profile",
            "You can not follow yourself.",
        ));
    }

    let edge = follow::ActiveModel {
        follower_id: Set(follower_id),
        followee_id: Set(followee_id),
        created_at: Set(Utc::now()),
    };

    let inserted = follow::Entity::insert(edge)
        .on_conflict(
            OnConflict::columns([follow::Column::FollowerId, follow::Column::FolloweeId])
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;

    debug!(
        "Follow {} -> {} ({} new edge(s))",
        follower_id, followee_id, inserted
    );
    Ok(())
}

/// Remove the edge `follower → followee`; a missing edge is a no-op
pub async fn unfollow<C: ConnectionTrait>(
    db: &C,
    follower_id: Uuid,
    followee_id: Uuid,
) -> StoreResult<()> {
    follow::Entity::delete_many()
        .filter(follow::Column::FollowerId.eq(follower_id))
        .filter(follow::Column::FolloweeId.eq(followee_id))
        .exec(db)
        .await?;

    Ok(())
}

/// Profiles that `follower_id` follows
pub async fn followee_ids<C: ConnectionTrait>(db: &C, follower_id: Uuid) -> StoreResult<Vec<Uuid>> {
    Ok(follow::Entity::find()
        .filter(follow::Column::FollowerId.eq(follower_id))
        .all(db)
        .await?
        .into_iter()
        .map(|edge| edge.followee_id)
        .collect())
}

/// Follow the profile named `username` and return it as the follower sees it
pub async fn follow_username<C: ConnectionTrait>(
    db: &C,
    follower_id: Uuid,
    username: &str,
) -> StoreResult<ProfileRecord> {
    let (user, followee) = find_by_username(db, username).await?;
    follow(db, follower_id, followee.id).await?;

    Ok(ProfileRecord {
        profile: followee,
        username: user.username,
        following: true,
    })
}

/// Unfollow the profile named `username` and return it as the follower sees it
pub async fn unfollow_username<C: ConnectionTrait>(
    db: &C,
    follower_id: Uuid,
    username: &str,
) -> StoreResult<ProfileRecord> {
    let (user, followee) = find_by_username(db, username).await?;
    unfollow(db, follower_id, followee.id).await?;

    Ok(ProfileRecord {
        profile: followee,
        username: user.username,
        following: false,
    })
}
