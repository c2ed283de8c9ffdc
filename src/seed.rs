/*!
 * Bulk sample data for development databases.
 */
use log::*;
use rand::seq::SliceRandom;

use crate::db::{Databases, ModelKind};
use crate::error::AppResult;
use crate::learning;
use crate::models::{Tag, Topping};
use crate::polls::{self, NewQuestion};

pub const TAGS: [&str; 24] = [
    "anime",
    "bollywood",
    "art",
    "books",
    "comics",
    "dating",
    "relationship",
    "pride",
    "indian",
    "festival",
    "gaming",
    "finance",
    "money",
    "holiday",
    "news",
    "nature",
    "religion",
    "sports",
    "shopping",
    "travel",
    "technology",
    "school",
    "college",
    "miscellaneous",
];

const TOPPINGS: [&str; 6] = ["cheese", "tomato", "basil", "mushroom", "olive", "pepperoni"];

async fn ensure_tags(dbs: &Databases) -> AppResult<Vec<Tag>> {
    let mut tags = Vec::with_capacity(TAGS.len());
    for title in TAGS {
        let tag = match polls::find_tag_by_title(dbs, title).await? {
            Some(tag) => tag,
            None => polls::create_tag(dbs, title).await?,
        };
        tags.push(tag);
    }
    Ok(tags)
}

async fn ensure_toppings(dbs: &Databases) -> AppResult<Vec<Topping>> {
    let existing = learning::list_toppings(dbs).await?;
    for name in TOPPINGS {
        if !existing.iter().any(|t| t.name == name) {
            learning::create_topping(dbs, name).await?;
        }
    }
    learning::list_toppings(dbs).await
}

/// A first pizza and a restaurant championing it, unless pizzas exist already
async fn ensure_pizzas(dbs: &Databases, toppings: &[Topping]) -> AppResult<()> {
    if !learning::list_pizzas(dbs).await?.is_empty() {
        return Ok(());
    }
    let margherita: Vec<i64> = toppings
        .iter()
        .filter(|t| ["cheese", "tomato", "basil"].contains(&t.name.as_str()))
        .map(|t| t.id)
        .collect();
    let pizza = learning::create_pizza(dbs, "Margherita", &margherita).await?;
    learning::create_restaurant(dbs, "Pizza Corner", pizza.id, &[pizza.id]).await?;
    Ok(())
}

/**
 * Create the default tags, toppings and a sample pizza when missing, then
 * `count` sample polls numbered after the questions already stored, each
 * with a random tag.
 */
pub async fn run(dbs: &Databases, count: usize) -> AppResult<()> {
    let tags = ensure_tags(dbs).await?;
    let toppings = ensure_toppings(dbs).await?;
    ensure_pizzas(dbs, &toppings).await?;

    let (existing,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM questions")
        .fetch_one(dbs.reader(ModelKind::Question))
        .await?;

    for index in (existing + 1)..=(existing + count as i64) {
        let tag = tags.choose(&mut rand::thread_rng()).map(|t| t.id);
        polls::create_question(
            dbs,
            NewQuestion {
                title: format!("Sample Poll Question {}", index),
                question_image: None,
                question_tag_id: tag,
                choices: vec![format!("Option {}B", index)],
            },
        )
        .await?;
    }

    info!("Seeded {} tags and {} sample polls", tags.len(), count);
    Ok(())
}
