/**
 * The routes module contains all the tide routes and the logic to fulfill the
 * responses for each route.
 *
 * Modules are nested per area of the site: polls, accounts and the learning
 * playground.
 */
use std::path::Path;

use tide::{Redirect, Request, Server};

use crate::error::AppError;
use crate::AppState;

pub mod accounts;
pub mod learning;
pub mod polls;

#[cfg(test)]
pub mod testing;

pub fn mount(app: &mut Server<AppState>, media_root: &Path) -> std::io::Result<()> {
    app.at("/").get(index);

    app.at("/polls").get(polls::index);
    app.at("/polls/").get(polls::index);
    app.at("/polls/vote").post(polls::vote);
    app.at("/polls/add").get(polls::create_form).post(polls::create);

    app.at("/accounts/login/").get(accounts::login_form).post(accounts::login);
    app.at("/accounts/signup/").get(accounts::signup_form).post(accounts::signup);
    app.at("/accounts/logout/").get(accounts::logout);
    app.at("/accounts/profile/:pk").get(accounts::profile_form).post(accounts::profile);

    app.at("/learn/http/").get(learning::http_demo);
    app.at("/learn/redirect_view/").get(learning::redirect_view);
    app.at("/learn/file_form/").get(learning::upload_form).post(learning::upload);
    app.at("/learn/send_email").get(learning::email_form).post(learning::send_email);
    app.at("/learn/pizza_add").get(learning::pizza_form).post(learning::pizza_add);
    app.at("/learn/pizza_list").get(learning::pizza_list);
    app.at("/learn/pizza_details/:pk").get(learning::pizza_detail);
    app.at("/learn/pizza_redirect_counter/:pk").get(learning::pizza_redirect);
    app.at("/learn/pizza_delete/:pk")
        .get(learning::pizza_delete_confirm)
        .post(learning::pizza_delete);
    app.at("/learn/pdf_list").get(learning::pdf_list);
    app.at("/learn/pdf_detail/:pk").get(learning::pdf_detail);

    app.at("/media").serve_dir(media_root)?;
    Ok(())
}

/**
 *  GET /
 */
pub async fn index(_req: Request<AppState>) -> tide::Result {
    Ok(Redirect::new("/polls").into())
}

/**
 * Numeric `:pk` path parameter; anything else cannot name a row
 */
pub fn pk(req: &Request<AppState>) -> Result<i64, AppError> {
    let raw = req.param("pk").unwrap_or_default();
    raw.parse().map_err(|_| AppError::not_found("record", raw))
}
