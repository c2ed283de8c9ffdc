use log::*;
use serde_json::json;
use tide::{Body, Redirect, Request, Response, StatusCode};

use crate::api_models::{Ballot, BallotForm};
use crate::error::AppError;
use crate::forms::{FormData, FormErrors};
use crate::polls::{self, IndexQuery, NewQuestion};
use crate::templates::render;
use crate::{uploads, AppState};

const IMAGE_FOLDER: &str = "Question_Images";

/**
 *  GET /polls
 */
pub async fn index(mut req: Request<AppState>) -> tide::Result {
    let query: IndexQuery = serde_qs::from_str(req.url().query().unwrap_or_default())
        .map_err(|e| AppError::BadRequest(format!("bad query string: {}", e)))?;

    let page = polls::index(&req.state().dbs, &query).await?;
    let tags = polls::list_tags(&req.state().dbs).await?;
    render(
        &mut req,
        "polls/index",
        json!({ "page": page, "tags": tags, "filters": query.link_params(), "query": query }),
    )
    .await
}

/**
 *  POST /polls/vote
 *
 * The voting page posts `data=<json ballot>` and patches its counters from
 * the JSON it gets back.
 */
pub async fn vote(mut req: Request<AppState>) -> tide::Result {
    let form: BallotForm = req
        .body_form()
        .await
        .map_err(|_| AppError::BadRequest("missing data field".into()))?;
    let ballot: Ballot = serde_json::from_str(&form.data)
        .map_err(|e| AppError::BadRequest(format!("unreadable ballot: {}", e)))?;
    debug!("Ballot received: {:?}", ballot);

    let snapshot = polls::record_vote(&req.state().dbs, &ballot).await?;
    Ok(Response::builder(StatusCode::Ok)
        .body(Body::from_json(&snapshot)?)
        .build())
}

/**
 *  GET /polls/add
 */
pub async fn create_form(mut req: Request<AppState>) -> tide::Result {
    show_form(&mut req, FormErrors::default(), &FormData::default()).await
}

async fn show_form(req: &mut Request<AppState>, errors: FormErrors, form: &FormData) -> tide::Result {
    let tags = polls::list_tags(&req.state().dbs).await?;
    let choices: Vec<&str> = form.get_list("choices");
    let selected_tag = form.get("question_tag").and_then(|id| id.parse::<i64>().ok());
    render(
        req,
        "polls/create",
        json!({
            "tags": tags,
            "selected_tag": selected_tag,
            "errors": errors,
            "values": form.values(),
            "choices": choices,
        }),
    )
    .await
}

/**
 *  POST /polls/add
 */
pub async fn create(mut req: Request<AppState>) -> tide::Result {
    let form = FormData::from_request(&mut req).await?;
    let mut errors = FormErrors::default();

    let title = form.char_field("title", 255, true, &mut errors);
    let tag = form.int_field("question_tag", false, &mut errors);
    if let Some(id) = tag {
        if polls::find_tag(&req.state().dbs, id).await?.is_none() {
            errors.add(
                "question_tag",
                "Select a valid choice. That choice is not one of the available choices.",
            );
        }
    }
    let image = form.file("question_image");
    if image.map(|f| !f.is_image()).unwrap_or(false) {
        errors.add(
            "question_image",
            "Upload a valid image. The file you uploaded was either not an image or a corrupted image.",
        );
    }

    let title = match title {
        Some(title) if errors.is_empty() => title,
        _ => {
            return show_form(&mut req, errors, &form).await;
        }
    };

    let question_image = match image {
        Some(file) => Some(uploads::store(&req.state().media_root, IMAGE_FOLDER, file).await?),
        None => None,
    };

    let created = polls::create_question(
        &req.state().dbs,
        NewQuestion {
            title,
            question_image: question_image.clone(),
            question_tag_id: tag,
            choices: form.get_list("choices").into_iter().map(String::from).collect(),
        },
    )
    .await;
    if let Err(e) = created {
        if let Some(path) = &question_image {
            uploads::discard(&req.state().media_root, path).await;
        }
        return Err(e.into());
    }

    Ok(Redirect::new("/polls").into())
}
