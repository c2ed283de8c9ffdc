use log::*;
use serde_json::json;
use tide::{Redirect, Request};

use crate::accounts::{self, NewUser, ProfileUpdate};
use crate::error::AppError;
use crate::forms::{FormData, FormErrors};
use crate::models::User;
use crate::routes::pk;
use crate::templates::render;
use crate::{session, uploads, AppState};

const LOGIN_ERROR: &str = "Invalid username or password.";
const PASSWORD_RULE: &str =
    "Password must be 7 to 12 characters long with an uppercase letter, a lowercase letter, a digit and one of $, # or A.";
const PROFILE_FOLDER: &str = "Customer_Profile";

/**
 *  GET /accounts/login/
 */
pub async fn login_form(mut req: Request<AppState>) -> tide::Result {
    render(&mut req, "accounts/login", json!({ "errors": FormErrors::default() })).await
}

/**
 *  POST /accounts/login/
 */
pub async fn login(mut req: Request<AppState>) -> tide::Result {
    let form = FormData::from_request(&mut req).await?;
    let mut errors = FormErrors::default();
    let username = form.char_field("username", 30, true, &mut errors);
    let password = form.get("password").filter(|p| !p.is_empty());
    if password.is_none() {
        errors.add("password", crate::forms::REQUIRED);
    }

    if let (Some(username), Some(password)) = (&username, password) {
        match accounts::authenticate(&req.state().dbs, username, password).await? {
            Some(user) => {
                info!("{} logged in", user);
                session::login(&mut req, user.id)?;
                return Ok(Redirect::new("/polls").into());
            }
            None => errors.add_non_field(LOGIN_ERROR),
        }
    }

    render(
        &mut req,
        "accounts/login",
        json!({ "errors": errors, "values": form.values() }),
    )
    .await
}

/**
 *  GET /accounts/signup/
 */
pub async fn signup_form(mut req: Request<AppState>) -> tide::Result {
    render(&mut req, "accounts/signup", json!({ "errors": FormErrors::default() })).await
}

/**
 *  POST /accounts/signup/
 */
pub async fn signup(mut req: Request<AppState>) -> tide::Result {
    let form = FormData::from_request(&mut req).await?;
    let mut errors = FormErrors::default();

    let first_name = form.char_field("first_name", 150, false, &mut errors);
    let last_name = form.char_field("last_name", 150, false, &mut errors);
    let username = form.char_field("username", 150, true, &mut errors);
    let email = form.email_field("email", 254, false, &mut errors);
    let password = form.get("password").unwrap_or_default().to_string();

    if let Some(username) = &username {
        if accounts::find_by_username(&req.state().dbs, username).await?.is_some() {
            errors.add("username", "A user with that username already exists.");
        }
    }
    if password.is_empty() {
        errors.add("password", crate::forms::REQUIRED);
    } else if !accounts::validate_password(&password) {
        errors.add("password", PASSWORD_RULE);
    }

    match username {
        Some(username) if errors.is_empty() => {
            accounts::create_user(
                &req.state().dbs,
                NewUser {
                    username,
                    password,
                    first_name: first_name.unwrap_or_default(),
                    last_name: last_name.unwrap_or_default(),
                    email: email.unwrap_or_default(),
                },
            )
            .await?;
            Ok(Redirect::new("/accounts/login/").into())
        }
        _ => {
            render(
                &mut req,
                "accounts/signup",
                json!({ "errors": errors, "values": form.values() }),
            )
            .await
        }
    }
}

/**
 *  GET /accounts/logout/
 */
pub async fn logout(mut req: Request<AppState>) -> tide::Result {
    session::logout(&mut req);
    Ok(Redirect::new("/polls").into())
}

/**
 * The user named by `:pk`, provided it is the one logged in
 */
async fn own_profile(req: &Request<AppState>) -> Result<User, AppError> {
    let id = pk(req)?;
    let user = accounts::find_user(&req.state().dbs, id)
        .await?
        .ok_or_else(|| AppError::not_found("user", id))?;

    if session::user_id(req) != Some(user.id) {
        return Err(AppError::Forbidden("You are not allowed to edit this profile.".into()));
    }
    Ok(user)
}

/**
 *  GET /accounts/profile/:pk
 */
pub async fn profile_form(mut req: Request<AppState>) -> tide::Result {
    let user = own_profile(&req).await?;
    let values = json!({
        "first_name": user.first_name,
        "last_name": user.last_name,
        "email": user.email,
        "age": user.age,
        "phone": user.phone,
        "address": user.address,
    });
    render(
        &mut req,
        "accounts/profile",
        json!({ "profile_user": user, "errors": FormErrors::default(), "values": values }),
    )
    .await
}

/**
 *  POST /accounts/profile/:pk
 */
pub async fn profile(mut req: Request<AppState>) -> tide::Result {
    let user = own_profile(&req).await?;
    let form = FormData::from_request(&mut req).await?;
    let mut errors = FormErrors::default();

    let first_name = form.char_field("first_name", 150, false, &mut errors);
    let last_name = form.char_field("last_name", 150, false, &mut errors);
    let email = form.email_field("email", 254, false, &mut errors);
    let age = form.int_field("age", false, &mut errors);
    let address = form.char_field("address", 50, false, &mut errors);
    let phone = match form.char_field("phone", 128, false, &mut errors) {
        Some(raw) => {
            let normalized = accounts::normalize_phone(&raw);
            if normalized.is_none() {
                errors.add("phone", "Enter a valid phone number (e.g. 0121 234 5678) or a number with an international call prefix.");
            }
            normalized
        }
        None => None,
    };
    let image = form.file("profile");
    if image.map(|f| !f.is_image()).unwrap_or(false) {
        errors.add(
            "profile",
            "Upload a valid image. The file you uploaded was either not an image or a corrupted image.",
        );
    }

    if !errors.is_empty() {
        return render(
            &mut req,
            "accounts/profile",
            json!({ "profile_user": user, "errors": errors, "values": form.values() }),
        )
        .await;
    }

    let profile = match image {
        Some(file) => Some(uploads::store(&req.state().media_root, PROFILE_FOLDER, file).await?),
        None => None,
    };
    let updated = match accounts::update_profile(
        &req.state().dbs,
        user.id,
        ProfileUpdate {
            profile: profile.clone(),
            first_name: first_name.unwrap_or_default(),
            last_name: last_name.unwrap_or_default(),
            email: email.unwrap_or_default(),
            age,
            phone,
            address,
        },
    )
    .await
    {
        Ok(updated) => updated,
        Err(e) => {
            if let Some(path) = &profile {
                uploads::discard(&req.state().media_root, path).await;
            }
            return Err(e.into());
        }
    };
    debug!("Profile of {} updated", updated);

    Ok(Redirect::new(format!("/accounts/profile/{}", updated.id)).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ModelKind;
    use crate::forms::testing::{body, Part};
    use tide::StatusCode;
    use crate::routes::testing::{location, session_cookie, TestApp};

    #[async_std::test]
    async fn signup_then_login_then_logout() {
        let app = TestApp::new().await;

        let res = app
            .post_form(
                "/accounts/signup/",
                &[
                    ("first_name", "Ada"),
                    ("last_name", "Lovelace"),
                    ("username", "ada"),
                    ("email", "ada@example.com"),
                    ("password", "Engine#42"),
                ],
                None,
            )
            .await;
        assert_eq!(location(&res).as_deref(), Some("/accounts/login/"));

        let stored = accounts::find_by_username(&app.dbs, "ada").await.unwrap().unwrap();
        assert_ne!(stored.password, "Engine#42");
        assert!(stored.password.starts_with("$argon2"));

        let cookie = app.login("ada", "Engine#42").await;
        let mut res = app.get("/polls", Some(&cookie)).await;
        assert!(res.body_string().await.unwrap().contains("ada"));

        let res = app.get("/accounts/logout/", Some(&cookie)).await;
        assert_eq!(location(&res).as_deref(), Some("/polls"));
    }

    #[async_std::test]
    async fn signup_rejects_weak_passwords_and_taken_usernames() {
        let app = TestApp::new().await;
        app.user("taken", "Strong#1").await;

        let mut res = app
            .post_form(
                "/accounts/signup/",
                &[("username", "taken"), ("password", "weak")],
                None,
            )
            .await;
        assert_eq!(res.status(), StatusCode::Ok);
        let html = res.body_string().await.unwrap();
        assert!(html.contains("already exists"));
        assert!(html.contains("Password must be 7 to 12 characters"));
    }

    #[async_std::test]
    async fn bad_credentials_get_one_generic_error() {
        let app = TestApp::new().await;
        app.user("bob", "Builder#1").await;

        for (username, password) in [("bob", "wrong"), ("nobody", "Builder#1")] {
            let mut res = app
                .post_form(
                    "/accounts/login/",
                    &[("username", username), ("password", password)],
                    None,
                )
                .await;
            assert_eq!(res.status(), StatusCode::Ok);
            assert!(session_cookie(&res).is_none());
            assert!(res.body_string().await.unwrap().contains(LOGIN_ERROR));
        }
    }

    #[async_std::test]
    async fn profiles_are_private() {
        let app = TestApp::new().await;
        let carol = app.user("carol", "Secret#1").await;
        let dave = app.user("dave", "Secret#2").await;
        let cookie = app.login("carol", "Secret#1").await;

        let res = app.get(&format!("/accounts/profile/{}", carol.id), Some(&cookie)).await;
        assert_eq!(res.status(), StatusCode::Ok);

        let res = app.get(&format!("/accounts/profile/{}", dave.id), Some(&cookie)).await;
        assert_eq!(res.status(), StatusCode::Forbidden);

        let res = app
            .post_form(
                &format!("/accounts/profile/{}", dave.id),
                &[("first_name", "Mallory")],
                Some(&cookie),
            )
            .await;
        assert_eq!(res.status(), StatusCode::Forbidden);
        let dave = accounts::find_user(&app.dbs, dave.id).await.unwrap().unwrap();
        assert_eq!(dave.first_name, "");

        let res = app.get("/accounts/profile/999", Some(&cookie)).await;
        assert_eq!(res.status(), StatusCode::NotFound);
    }

    #[async_std::test]
    async fn profile_update_normalizes_phone_and_stores_picture() {
        let app = TestApp::new().await;
        let erin = app.user("erin", "Secret#3").await;
        let cookie = app.login("erin", "Secret#3").await;
        let path = format!("/accounts/profile/{}", erin.id);

        let raw = body(&[
            Part::Text("first_name", "Erin"),
            Part::Text("age", "31"),
            Part::Text("phone", "98765 43210"),
            Part::Text("address", "MG Road"),
            Part::File {
                name: "profile",
                file_name: "me.jpg",
                content_type: "image/jpeg",
                data: b"\xff\xd8\xff",
            },
        ]);
        let res = app.post_multipart(&path, raw, Some(&cookie)).await;
        assert_eq!(location(&res).as_deref(), Some(path.as_str()));

        let erin = accounts::find_user(&app.dbs, erin.id).await.unwrap().unwrap();
        assert_eq!(erin.phone.as_deref(), Some("+919876543210"));
        assert_eq!(erin.age, Some(31));
        let picture = erin.profile.unwrap();
        assert!(picture.starts_with("Customer_Profile/"));
        assert!(app.media_root().join(picture).exists());

        let long = "x".repeat(51);
        let mut res = app
            .post_form(&path, &[("phone", "12"), ("address", long.as_str())], Some(&cookie))
            .await;
        assert_eq!(res.status(), StatusCode::Ok);
        let html = res.body_string().await.unwrap();
        assert!(html.contains("Enter a valid phone number"));
        assert!(html.contains("at most 50 characters"));
    }

    #[async_std::test]
    async fn failed_profile_update_leaves_no_picture_behind() {
        let app = TestApp::new().await;
        let finn = app.user("finn", "Secret#4").await;
        let cookie = app.login("finn", "Secret#4").await;
        sqlx::query(
            "CREATE TRIGGER users_read_only BEFORE UPDATE ON users \
             BEGIN SELECT RAISE(ABORT, 'read only'); END",
        )
        .execute(app.dbs.writer(ModelKind::User))
        .await
        .unwrap();

        let raw = body(&[
            Part::Text("first_name", "Finn"),
            Part::File {
                name: "profile",
                file_name: "finn.jpg",
                content_type: "image/jpeg",
                data: b"\xff\xd8\xff",
            },
        ]);
        let res = app
            .post_multipart(&format!("/accounts/profile/{}", finn.id), raw, Some(&cookie))
            .await;
        assert_eq!(res.status(), StatusCode::InternalServerError);

        let leftovers = std::fs::read_dir(app.media_root().join(PROFILE_FOLDER))
            .map(|dir| dir.count())
            .unwrap_or(0);
        assert_eq!(leftovers, 0);
    }
}
