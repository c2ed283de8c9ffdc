use std::path::Path;

use handlebars::{handlebars_helper, Handlebars, TemplateError};
use log::*;
use rand::seq::SliceRandom;
use serde_json::{json, Value as Json};
use tide::http::mime;
use tide::{Request, Response, StatusCode};

use crate::error::AppError;
use crate::{accounts, session, AppState};

pub const MEDIA_URL: &str = "/media";

handlebars_helper!(shuffle: |items: array| {
    let mut items = items.clone();
    items.shuffle(&mut rand::thread_rng());
    Json::Array(items)
});

/**
 * Load every `*.hbs` file below `dir`; `templates/polls/index.hbs` is
 * registered as `polls/index`.
 */
pub fn registry(dir: &Path) -> Result<Handlebars<'static>, TemplateError> {
    let mut hb = Handlebars::new();
    hb.register_helper("shuffle", Box::new(shuffle));
    hb.register_templates_directory(".hbs", dir)?;
    info!("Loaded {} templates from {}", hb.get_templates().len(), dir.display());
    Ok(hb)
}

/**
 * Render a full page, adding what every page needs: the logged-in user,
 * pending flash messages and the media URL.
 */
pub async fn render(req: &mut Request<AppState>, template: &str, mut context: Json) -> tide::Result<Response> {
    let user = accounts::current_user(req).await?;
    let messages = session::take_messages(req);

    if let Some(map) = context.as_object_mut() {
        map.insert("user".into(), json!(user));
        map.insert("messages".into(), json!(messages));
        map.insert("media_url".into(), json!(MEDIA_URL));
    }

    let body = req
        .state()
        .templates
        .render(template, &context)
        .map_err(AppError::from)?;

    Ok(Response::builder(StatusCode::Ok)
        .body(body)
        .content_type(mime::HTML)
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shuffle_keeps_every_item() {
        let mut hb = Handlebars::new();
        hb.register_helper("shuffle", Box::new(shuffle));
        hb.register_template_string("t", "{{#each (shuffle items)}}{{this}},{{/each}}")
            .unwrap();

        let out = hb.render("t", &json!({ "items": [1, 2, 3, 4] })).unwrap();
        let mut seen: Vec<&str> = out.trim_end_matches(',').split(',').collect();
        seen.sort();
        assert_eq!(seen, vec!["1", "2", "3", "4"]);
    }

    #[test]
    fn site_templates_load() {
        let hb = registry(Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/templates"))).unwrap();
        for name in [
            "layout",
            "field_errors",
            "polls/index",
            "polls/create",
            "accounts/login",
            "accounts/signup",
            "accounts/profile",
            "learning/http",
            "learning/pizza_form",
            "learning/email_send",
            "learning/email",
        ] {
            assert!(hb.get_template(name).is_some(), "missing template {}", name);
        }
    }
}
