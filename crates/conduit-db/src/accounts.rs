//! User accounts: registration, credential checks, and self-service updates
//!
//! A user and its profile are created together in one transaction; a profile
//! never exists without its user.

use chrono::Utc;
use conduit_auth::{check_password_policy, hash_password, verify_password};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, Set, TransactionTrait,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::entities::{profile, user};
use crate::error::{FieldErrors, StoreError, StoreResult};

const MAX_USERNAME_LENGTH: usize = 255;
const MAX_EMAIL_LENGTH: usize = 255;
const MAX_IMAGE_LENGTH: usize = 1024;

const UNIQUE_FIELDS: &[(&str, &str)] = &[
    ("username", "A user with that username already exists."),
    ("email", "User with this email address already exists."),
];

/// A user together with its profile
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub user: user::Model,
    pub profile: profile::Model,
}

/// Registration input
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub password: String,
}

/// Partial update of the current user; `None` leaves a field untouched
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub email: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub bio: Option<String>,
    /// An empty string clears the image
    pub image: Option<String>,
}

impl UserChanges {
    fn touches_user(&self) -> bool {
        self.email.is_some() || self.username.is_some() || self.password.is_some()
    }

    fn touches_profile(&self) -> bool {
        self.bio.is_some() || self.image.is_some()
    }
}

/// Trim an email and lowercase its domain part
pub fn normalize_email(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.rsplit_once('@') {
        Some((local, domain)) => format!("{}@{}", local, domain.to_lowercase()),
        None => trimmed.to_string(),
    }
}

fn check_email(email: &str, errors: &mut FieldErrors) {
    if email.is_empty() {
        errors.add("email", "This field may not be blank.");
        return;
    }
    let well_formed = match email.rsplit_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !well_formed {
        errors.add("email", "Enter a valid email address.");
    } else {
        errors.check_max_length("email", email, MAX_EMAIL_LENGTH);
    }
}

fn check_username(username: &str, errors: &mut FieldErrors) {
    if username.is_empty() {
        errors.add("username", "This field may not be blank.");
    } else {
        errors.check_max_length("username", username, MAX_USERNAME_LENGTH);
    }
}

fn check_password(password: &str, errors: &mut FieldErrors) {
    if let Err(e) = check_password_policy(password) {
        errors.add("password", e.to_string());
    }
}

async fn email_taken<C: ConnectionTrait>(
    db: &C,
    email: &str,
    except: Option<Uuid>,
) -> StoreResult<bool> {
    let mut query = user::Entity::find().filter(user::Column::Email.eq(email));
    if let Some(id) = except {
        query = query.filter(user::Column::Id.ne(id));
    }
    Ok(query.count(db).await? > 0)
}

async fn username_taken<C: ConnectionTrait>(
    db: &C,
    username: &str,
    except: Option<Uuid>,
) -> StoreResult<bool> {
    let mut query = user::Entity::find().filter(user::Column::Username.eq(username));
    if let Some(id) = except {
        query = query.filter(user::Column::Id.ne(id));
    }
    Ok(query.count(db).await? > 0)
}

/// Register a regular user
pub async fn register(db: &DatabaseConnection, new_user: NewUser) -> StoreResult<Account> {
    create_account(db, new_user, false).await
}

/// Register a user with staff rights
pub async fn create_superuser(db: &DatabaseConnection, new_user: NewUser) -> StoreResult<Account> {
    create_account(db, new_user, true).await
}

async fn create_account(
    db: &DatabaseConnection,
    new_user: NewUser,
    is_staff: bool,
) -> StoreResult<Account> {
    let email = normalize_email(&new_user.email);
    let username = new_user.username.trim().to_string();

    let mut errors = FieldErrors::new();
    check_email(&email, &mut errors);
    check_username(&username, &mut errors);
    check_password(&new_user.password, &mut errors);

    if !errors.contains("email") && email_taken(db, &email, None).await? {
        errors.add("email", UNIQUE_FIELDS[1].1);
    }
    if !errors.contains("username") && username_taken(db, &username, None).await? {
        errors.add("username", UNIQUE_FIELDS[0].1);
    }
    errors.into_result()?;

    let password_hash = hash_password(&new_user.password)?;
    let now = Utc::now();

    let txn = db.begin().await?;

    let user = user::ActiveModel {
        id: Set(Uuid::new_v4()),
        email: Set(email),
        username: Set(username),
        password_hash: Set(password_hash),
        is_active: Set(true),
        is_staff: Set(is_staff),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&txn)
    .await
    .map_err(|e| StoreError::from_unique_violation(e, UNIQUE_FIELDS))?;

    let profile = profile::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.id),
        bio: Set(String::new()),
        image: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;

    info!(
        "Registered user '{}' ({}){}",
        user.username,
        user.id,
        if is_staff { " with staff rights" } else { "" }
    );

    Ok(Account { user, profile })
}

/// Check login credentials
///
/// Unknown emails and wrong passwords fail identically.
pub async fn authenticate(
    db: &DatabaseConnection,
    email: &str,
    password: &str,
) -> StoreResult<Account> {
    let mut errors = FieldErrors::new();
    if email.trim().is_empty() {
        errors.add("email", "An email address is required to log in.");
    }
    if password.is_empty() {
        errors.add("password", "A password is required to log in.");
    }
    errors.into_result()?;

    let invalid =
        || StoreError::Unauthorized("A user with this email and password was not found.".into());

    let email = normalize_email(email);
    let Some((user, profile)) = user::Entity::find()
        .filter(user::Column::Email.eq(email.as_str()))
        .find_also_related(profile::Entity)
        .one(db)
        .await?
    else {
        warn!("Login attempt for unknown email");
        return Err(invalid());
    };

    if !verify_password(password, &user.password_hash)? {
        warn!("Login attempt with wrong password for user {}", user.id);
        return Err(invalid());
    }

    if !user.is_active {
        return Err(deactivated());
    }

    let profile = profile.ok_or_else(|| missing_profile(user.id))?;
    Ok(Account { user, profile })
}

fn deactivated() -> StoreError {
    StoreError::Forbidden("This user has been deactivated.".to_string())
}

fn missing_profile(user_id: Uuid) -> StoreError {
    StoreError::NotFound(format!("User {} has no profile.", user_id))
}

/// Resolve an authenticated user id to an active account
pub async fn find_active<C: ConnectionTrait>(db: &C, user_id: Uuid) -> StoreResult<Account> {
    let account = find(db, user_id)
        .await?
        .ok_or_else(|| StoreError::Unauthorized("No user matching this token was found.".into()))?;

    if !account.user.is_active {
        return Err(deactivated());
    }
    Ok(account)
}

async fn find<C: ConnectionTrait>(db: &C, user_id: Uuid) -> StoreResult<Option<Account>> {
    match user::Entity::find_by_id(user_id)
        .find_also_related(profile::Entity)
        .one(db)
        .await?
    {
        Some((user, Some(profile))) => Ok(Some(Account { user, profile })),
        Some((user, None)) => Err(missing_profile(user.id)),
        None => Ok(None),
    }
}

/// Look up an account by (normalized) email
pub async fn find_by_email<C: ConnectionTrait>(db: &C, email: &str) -> StoreResult<Account> {
    let email = normalize_email(email);
    match user::Entity::find()
        .filter(user::Column::Email.eq(email.as_str()))
        .find_also_related(profile::Entity)
        .one(db)
        .await?
    {
        Some((user, Some(profile))) => Ok(Account { user, profile }),
        Some((user, None)) => Err(missing_profile(user.id)),
        None => Err(StoreError::NotFound(
            "A user with this email does not exist.".to_string(),
        )),
    }
}

/// Apply a partial update to the user and its profile
pub async fn update(
    db: &DatabaseConnection,
    user_id: Uuid,
    changes: UserChanges,
) -> StoreResult<Account> {
    let Account { user, profile } = find_active(db, user_id).await?;

    let email = changes.email.as_deref().map(normalize_email);
    let username = changes.username.as_deref().map(|u| u.trim().to_string());

    let mut errors = FieldErrors::new();
    if let Some(email) = &email {
        check_email(email, &mut errors);
        if !errors.contains("email") && email_taken(db, email, Some(user.id)).await? {
            errors.add("email", UNIQUE_FIELDS[1].1);
        }
    }
    if let Some(username) = &username {
        check_username(username, &mut errors);
        if !errors.contains("username") && username_taken(db, username, Some(user.id)).await? {
            errors.add("username", UNIQUE_FIELDS[0].1);
        }
    }
    if let Some(password) = &changes.password {
        check_password(password, &mut errors);
    }
    if let Some(image) = &changes.image {
        errors.check_max_length("image", image.trim(), MAX_IMAGE_LENGTH);
    }
    errors.into_result()?;

    let password_hash = match &changes.password {
        Some(password) => Some(hash_password(password)?),
        None => None,
    };

    let now = Utc::now();
    let txn = db.begin().await?;

    let user = if changes.touches_user() {
        let mut active: user::ActiveModel = user.into();
        if let Some(email) = email {
            active.email = Set(email);
        }
        if let Some(username) = username {
            active.username = Set(username);
        }
        if let Some(hash) = password_hash {
            active.password_hash = Set(hash);
        }
        active.updated_at = Set(now);
        active
            .update(&txn)
            .await
            .map_err(|e| StoreError::from_unique_violation(e, UNIQUE_FIELDS))?
    } else {
        user
    };

    let profile = if changes.touches_profile() {
        let mut active: profile::ActiveModel = profile.into();
        if let Some(bio) = changes.bio {
            active.bio = Set(bio);
        }
        if let Some(image) = changes.image {
            let image = image.trim().to_string();
            active.image = Set(if image.is_empty() { None } else { Some(image) });
        }
        active.updated_at = Set(now);
        active.update(&txn).await?
    } else {
        profile
    };

    txn.commit().await?;
    debug!("Updated user {}", user.id);

    Ok(Account { user, profile })
}

/// Activate or deactivate the account registered under `email`
pub async fn set_active(
    db: &DatabaseConnection,
    email: &str,
    is_active: bool,
) -> StoreResult<user::Model> {
    let Account { user, .. } = find_by_email(db, email).await?;

    let mut active: user::ActiveModel = user.into();
    active.is_active = Set(is_active);
    active.updated_at = Set(Utc::now());
    let user = active.update(db).await?;

    info!(
        "User {} is now {}",
        user.id,
        if is_active { "active" } else { "deactivated" }
    );
    Ok(user)
}
