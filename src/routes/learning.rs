use std::str::FromStr;

use async_std::task;
use chrono::Utc;
use lettre::message::Mailbox;
use log::*;
use serde_json::json;
use tide::http::cookies::Cookie;
use tide::{Redirect, Request};

use crate::error::AppError;
use crate::forms::{FormData, FormErrors, REQUIRED};
use crate::mail::Outgoing;
use crate::routes::pk;
use crate::templates::render;
use crate::{accounts, learning, session, uploads, AppState};

const MAIL_FAILED: &str = "The mail could not be sent, please try again later.";

/**
 *  GET /learn/http/
 */
pub async fn http_demo(mut req: Request<AppState>) -> tide::Result {
    info!(
        "Request cookies: {}",
        req.header("Cookie").map(|c| c.last().as_str()).unwrap_or("<none>")
    );

    let mut res = render(&mut req, "learning/http", json!({ "now": Utc::now().to_rfc2822() })).await?;
    res.insert_header("name", "Mohit");
    res.insert_cookie(Cookie::new("key", "value"));
    Ok(res)
}

/**
 *  GET /learn/redirect_view/
 */
pub async fn redirect_view(_req: Request<AppState>) -> tide::Result {
    Ok(Redirect::new("/learn/file_form/").into())
}

/**
 *  GET /learn/file_form/
 */
pub async fn upload_form(mut req: Request<AppState>) -> tide::Result {
    render(&mut req, "learning/upload", json!({ "errors": FormErrors::default() })).await
}

/**
 *  POST /learn/file_form/
 *
 * PDFs are also recorded so they show up under `/learn/pdf_list`.
 */
pub async fn upload(mut req: Request<AppState>) -> tide::Result {
    let form = FormData::from_request(&mut req).await?;
    let mut errors = FormErrors::default();

    let title = form.char_field("title", 50, true, &mut errors);
    let description = form.char_field("description", 1000, false, &mut errors);
    let file = form.file("file");
    if file.is_none() {
        errors.add("file", REQUIRED);
    }

    let (title, file) = match (title, file) {
        (Some(title), Some(file)) if errors.is_empty() => (title, file),
        _ => {
            return render(
                &mut req,
                "learning/upload",
                json!({ "errors": errors, "values": form.values() }),
            )
            .await
        }
    };

    let is_pdf = file.content_type.as_deref() == Some("application/pdf");
    let folder = if is_pdf { "pdfs" } else { "uploads" };
    let stored = uploads::store(&req.state().media_root, folder, file).await?;
    if is_pdf {
        if let Err(e) = learning::create_pdf(&req.state().dbs, &title, description.as_deref(), &stored).await {
            uploads::discard(&req.state().media_root, &stored).await;
            return Err(e.into());
        }
    }

    Ok(Redirect::new("/learn/file_form/").into())
}

/**
 * Flashes and returns false unless the visitor may add pizzas
 */
async fn may_add_pizza(req: &mut Request<AppState>) -> tide::Result<bool> {
    let allowed = match accounts::current_user(req).await? {
        Some(user) => accounts::has_perm(&req.state().dbs, &user, learning::ADD_PIZZA).await?,
        None => false,
    };
    if !allowed {
        session::flash(req, "Permission Not Allowed")?;
    }
    Ok(allowed)
}

/**
 *  GET /learn/pizza_add
 */
pub async fn pizza_form(mut req: Request<AppState>) -> tide::Result {
    if !may_add_pizza(&mut req).await? {
        return Ok(Redirect::new("/polls").into());
    }
    let toppings = learning::list_toppings(&req.state().dbs).await?;
    render(
        &mut req,
        "learning/pizza_form",
        json!({ "toppings": toppings, "errors": FormErrors::default() }),
    )
    .await
}

/**
 *  POST /learn/pizza_add
 */
pub async fn pizza_add(mut req: Request<AppState>) -> tide::Result {
    if !may_add_pizza(&mut req).await? {
        return Ok(Redirect::new("/polls").into());
    }
    let form = FormData::from_request(&mut req).await?;
    let mut errors = FormErrors::default();

    let name = form.char_field("name", 50, true, &mut errors);
    let topping_ids = form.id_list("toppings", &mut errors);
    let toppings = learning::list_toppings(&req.state().dbs).await?;
    for id in &topping_ids {
        if !toppings.iter().any(|t| t.id == *id) {
            errors.add(
                "toppings",
                format!("Select a valid choice. {} is not one of the available choices.", id),
            );
        }
    }

    match name {
        Some(name) if errors.is_empty() => {
            learning::create_pizza(&req.state().dbs, &name, &topping_ids).await?;
            Ok(Redirect::new("/learn/pizza_list").into())
        }
        _ => {
            render(
                &mut req,
                "learning/pizza_form",
                json!({
                    "toppings": toppings,
                    "errors": errors,
                    "values": form.values(),
                    "selected": topping_ids,
                }),
            )
            .await
        }
    }
}

/**
 *  GET /learn/pizza_list
 */
pub async fn pizza_list(mut req: Request<AppState>) -> tide::Result {
    let pizzas = learning::list_pizzas(&req.state().dbs).await?;
    render(&mut req, "learning/pizza_list", json!({ "pizzas": pizzas })).await
}

/**
 *  GET /learn/pizza_details/:pk
 */
pub async fn pizza_detail(mut req: Request<AppState>) -> tide::Result {
    let id = pk(&req)?;
    let pizza = learning::find_pizza(&req.state().dbs, id)
        .await?
        .ok_or_else(|| AppError::not_found("pizza", id))?;
    let restaurants = learning::championed_by(&req.state().dbs, id).await?;
    render(
        &mut req,
        "learning/pizza_detail",
        json!({ "pizza": pizza, "restaurants": restaurants }),
    )
    .await
}

/**
 *  GET /learn/pizza_redirect_counter/:pk
 */
pub async fn pizza_redirect(req: Request<AppState>) -> tide::Result {
    let id = pk(&req)?;
    if learning::find_pizza(&req.state().dbs, id).await?.is_none() {
        return Err(AppError::not_found("pizza", id).into());
    }

    let mut target = format!("/learn/pizza_details/{}", id);
    if let Some(query) = req.url().query().filter(|q| !q.is_empty()) {
        target.push('?');
        target.push_str(query);
    }
    Ok(Redirect::new(target).into())
}

/**
 *  GET /learn/pizza_delete/:pk
 */
pub async fn pizza_delete_confirm(mut req: Request<AppState>) -> tide::Result {
    let id = pk(&req)?;
    let pizza = learning::find_pizza(&req.state().dbs, id)
        .await?
        .ok_or_else(|| AppError::not_found("pizza", id))?;
    render(&mut req, "learning/pizza_delete", json!({ "pizza": pizza })).await
}

/**
 *  POST /learn/pizza_delete/:pk
 */
pub async fn pizza_delete(req: Request<AppState>) -> tide::Result {
    learning::delete_pizza(&req.state().dbs, pk(&req)?).await?;
    Ok(Redirect::new("/learn/pizza_list").into())
}

/**
 *  GET /learn/pdf_list
 */
pub async fn pdf_list(mut req: Request<AppState>) -> tide::Result {
    let pdfs = learning::list_pdfs(&req.state().dbs).await?;
    render(&mut req, "learning/pdf_list", json!({ "pdfs": pdfs })).await
}

/**
 *  GET /learn/pdf_detail/:pk
 */
pub async fn pdf_detail(mut req: Request<AppState>) -> tide::Result {
    let id = pk(&req)?;
    let pdf = learning::find_pdf(&req.state().dbs, id)
        .await?
        .ok_or_else(|| AppError::not_found("pdf", id))?;
    let label = pdf.to_string();
    render(&mut req, "learning/pdf_detail", json!({ "pdf": pdf, "label": label })).await
}

/**
 *  GET /learn/send_email
 */
pub async fn email_form(mut req: Request<AppState>) -> tide::Result {
    render(
        &mut req,
        "learning/email_send",
        json!({
            "errors": FormErrors::default(),
            "values": { "subject": "Test Subject" },
        }),
    )
    .await
}

/// Comma separated addresses, each of which has to parse
fn receivers(form: &FormData, errors: &mut FormErrors) -> Vec<Mailbox> {
    let raw = form.get("receiver").unwrap_or_default();
    let mut mailboxes = vec![];
    for address in raw.split(',').map(str::trim).filter(|a| !a.is_empty()) {
        match Mailbox::from_str(address) {
            Ok(mailbox) => mailboxes.push(mailbox),
            Err(_) => errors.add("receiver", format!("Enter a valid email address: {}", address)),
        }
    }
    if mailboxes.is_empty() && !errors.fields.contains_key("receiver") {
        errors.add("receiver", REQUIRED);
    }
    mailboxes
}

/**
 *  POST /learn/send_email
 */
pub async fn send_email(mut req: Request<AppState>) -> tide::Result {
    let form = FormData::from_request(&mut req).await?;
    let mut errors = FormErrors::default();

    let subject = form.char_field("subject", 64, true, &mut errors);
    let sender = form.email_field("sender", 64, true, &mut errors);
    let to = receivers(&form, &mut errors);
    let attachment = form.file("attachment").map(|f| f.data.to_vec());

    if let (Some(subject), Some(sender)) = (subject, sender) {
        if errors.is_empty() {
            let user = accounts::current_user(&req).await?;
            let html = req
                .state()
                .templates
                .render("learning/email", &json!({ "user": user, "from": sender }))
                .map_err(AppError::from)?;

            let sent = match Mailbox::from_str(&sender) {
                Ok(from) => {
                    let outgoing = Outgoing {
                        subject,
                        from,
                        to,
                        text: "Temp Body".into(),
                        html,
                        attachment,
                    };
                    let mailer = req.state().mailer.clone();
                    match outgoing.build() {
                        Ok(message) => task::spawn_blocking(move || mailer.send(&message)).await,
                        Err(e) => Err(e),
                    }
                }
                Err(e) => Err(AppError::Mail(e.to_string())),
            };

            match sent {
                Ok(()) => {
                    info!("Mail from {} sent", sender);
                    session::flash(&mut req, "Mail Send Successfully")?;
                    return Ok(Redirect::new("/learn/send_email").into());
                }
                Err(e) => {
                    error!("Sending mail from {} failed: {}", sender, e);
                    errors.add_non_field(MAIL_FAILED);
                }
            }
        }
    }

    render(
        &mut req,
        "learning/email_send",
        json!({ "errors": errors, "values": form.values() }),
    )
    .await
}
