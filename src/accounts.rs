/*!
 * User accounts: storage, password hashing, permissions.
 */
use std::sync::OnceLock;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use async_std::task;
use chrono::Utc;
use log::*;
use phonenumber::country;
use regex::Regex;
use tide::Request;

use crate::db::{Databases, ModelKind};
use crate::error::{AppError, AppResult};
use crate::models::User;
use crate::{session, AppState};

pub struct NewUser {
    pub username: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

#[derive(Debug, Default)]
pub struct ProfileUpdate {
    pub profile: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub age: Option<i64>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

pub async fn hash_password(password: String) -> AppResult<String> {
    task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AppError::Hash(e.to_string()))
    })
    .await
}

pub async fn verify_password(password: String, encoded: String) -> bool {
    task::spawn_blocking(move || match PasswordHash::new(&encoded) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            warn!("Stored password hash is unreadable: {}", e);
            false
        }
    })
    .await
}

/**
 * Between 7 and 12 characters, with an uppercase letter, a lowercase
 * letter, a digit, and one of `$`, `#` or `A`.
 */
pub fn validate_password(password: &str) -> bool {
    static RULES: OnceLock<[Regex; 4]> = OnceLock::new();
    let rules = RULES.get_or_init(|| {
        [r"[A-Z]", r"[a-z]", r"\d", r"[$#A]"].map(|p| Regex::new(p).expect("static password rule"))
    });

    let length = password.chars().count();
    (7..=12).contains(&length) && rules.iter().all(|r| r.is_match(password))
}

/**
 * Normalize an Indian phone number to E.164, or `None` when it is not valid
 */
pub fn normalize_phone(raw: &str) -> Option<String> {
    let number = phonenumber::parse(Some(country::Id::IN), raw).ok()?;
    if !phonenumber::is_valid(&number) {
        return None;
    }
    Some(number.format().mode(phonenumber::Mode::E164).to_string())
}

pub async fn create_user(dbs: &Databases, new: NewUser) -> AppResult<User> {
    let hash = hash_password(new.password).await?;
    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (username, password, first_name, last_name, email, date_joined)
         VALUES (?, ?, ?, ?, ?, ?)
         RETURNING *",
    )
    .bind(&new.username)
    .bind(hash)
    .bind(&new.first_name)
    .bind(&new.last_name)
    .bind(&new.email)
    .bind(Utc::now())
    .fetch_one(dbs.writer(ModelKind::User))
    .await?;

    info!("Created user {}", user);
    Ok(user)
}

pub async fn find_user(dbs: &Databases, id: i64) -> AppResult<Option<User>> {
    Ok(sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(dbs.reader(ModelKind::User))
        .await?)
}

pub async fn find_by_username(dbs: &Databases, username: &str) -> AppResult<Option<User>> {
    Ok(sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(dbs.reader(ModelKind::User))
        .await?)
}

/**
 * Check credentials, recording the login time on success
 */
pub async fn authenticate(dbs: &Databases, username: &str, password: &str) -> AppResult<Option<User>> {
    let user = match find_by_username(dbs, username).await? {
        Some(user) if user.is_active => user,
        _ => return Ok(None),
    };

    if !verify_password(password.to_string(), user.password.clone()).await {
        debug!("Bad password for {}", username);
        return Ok(None);
    }

    let user = sqlx::query_as::<_, User>("UPDATE users SET last_login = ? WHERE id = ? RETURNING *")
        .bind(Utc::now())
        .bind(user.id)
        .fetch_one(dbs.writer(ModelKind::User))
        .await?;
    Ok(Some(user))
}

pub async fn update_profile(dbs: &Databases, id: i64, update: ProfileUpdate) -> AppResult<User> {
    sqlx::query_as::<_, User>(
        "UPDATE users
         SET profile = COALESCE(?, profile), first_name = ?, last_name = ?, email = ?,
             age = ?, phone = ?, address = ?
         WHERE id = ?
         RETURNING *",
    )
    .bind(update.profile)
    .bind(update.first_name)
    .bind(update.last_name)
    .bind(update.email)
    .bind(update.age)
    .bind(update.phone)
    .bind(update.address)
    .bind(id)
    .fetch_optional(dbs.writer(ModelKind::User))
    .await?
    .ok_or_else(|| AppError::not_found("user", id))
}

/**
 * Superusers hold every permission; everyone else needs an explicit grant.
 */
pub async fn has_perm(dbs: &Databases, user: &User, codename: &str) -> AppResult<bool> {
    if !user.is_active {
        return Ok(false);
    }
    if user.is_superuser {
        return Ok(true);
    }
    let (granted,): (i64,) = sqlx::query_as(
        "SELECT EXISTS(SELECT 1 FROM user_permissions WHERE user_id = ? AND codename = ?)",
    )
    .bind(user.id)
    .bind(codename)
    .fetch_one(dbs.reader(ModelKind::UserPermission))
    .await?;
    Ok(granted != 0)
}

pub async fn grant_permission(dbs: &Databases, user_id: i64, codename: &str) -> AppResult<()> {
    sqlx::query("INSERT OR IGNORE INTO user_permissions (user_id, codename) VALUES (?, ?)")
        .bind(user_id)
        .bind(codename)
        .execute(dbs.writer(ModelKind::UserPermission))
        .await?;
    Ok(())
}

/**
 * The user behind the request's session, if any
 */
pub async fn current_user(req: &Request<AppState>) -> AppResult<Option<User>> {
    match session::user_id(req) {
        Some(id) => find_user(&req.state().dbs, id).await,
        None => Ok(None),
    }
}
