use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct Tag {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.title)
    }
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct Question {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub total_votes: i64,
    /// Path relative to the media root
    pub question_image: Option<String>,
    pub question_tag_id: Option<i64>,
}

impl Question {
    /**
     * Created within the last day, and not in the future
     */
    pub fn was_published_recently(&self, now: DateTime<Utc>) -> bool {
        now - Duration::days(1) <= self.created && self.created <= now
    }

    /**
     * HTML preview for the question image, or a warning box when there is none
     */
    pub fn thumbnail_preview(&self, media_url: &str) -> String {
        match &self.question_image {
            Some(path) => format!(
                r#"<img src="{}" width="320"/>"#,
                html_escape::encode_double_quoted_attribute(&format!(
                    "{}/{}",
                    media_url.trim_end_matches('/'),
                    path
                ))
            ),
            None => NO_IMAGE_WARNING.to_string(),
        }
    }
}

const NO_IMAGE_WARNING: &str = r##"<div class="warning thumbnail-missing">
    <div class="warning__icon">
        <svg xmlns="http://www.w3.org/2000/svg" width="24" viewBox="0 0 24 24" height="24" fill="none">
            <path fill="#F7C752" d="m13 14h-2v-5h2zm0 4h-2v-2h2zm-12 3h22l-11-19z"></path>
        </svg>
    </div>
    <strong>No Question Image Available</strong>
</div>"##;

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.title)
    }
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct Choice {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub votes: i64,
    pub question_id: i64,
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.title)
    }
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub is_active: bool,
    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub profile: Option<String>,
    pub age: Option<i64>,
    pub address: Option<String>,
    pub phone: Option<String>,
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.username)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct Topping {
    pub id: i64,
    pub name: String,
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct Pizza {
    pub id: i64,
    pub name: String,
}

/**
 * A pizza together with its toppings, which is how every page shows one
 */
#[derive(Clone, Debug, Serialize)]
pub struct PizzaWithToppings {
    #[serde(flatten)]
    pub pizza: Pizza,
    pub toppings: Vec<Topping>,
    pub label: String,
}

impl PizzaWithToppings {
    pub fn new(pizza: Pizza, toppings: Vec<Topping>) -> Self {
        let names: Vec<&str> = toppings.iter().map(|t| t.name.as_str()).collect();
        let label = format!("{} ({})", pizza.name, names.join(", "));
        Self {
            pizza,
            toppings,
            label,
        }
    }
}

impl fmt::Display for PizzaWithToppings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct Restaurant {
    pub id: i64,
    pub name: String,
    pub best_pizza_id: i64,
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct PdfFile {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub pdf: String,
}

impl fmt::Display for PdfFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Pdf", self.title)
    }
}
