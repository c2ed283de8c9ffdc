/*!
 * The demo entities: pizzas, toppings, restaurants and PDF files.
 *
 * Pizzas and toppings live in the secondary database while restaurants stay
 * in the default one, so anything spanning both is kept consistent here
 * rather than by foreign keys.
 */
use std::collections::HashMap;

use log::*;

use crate::db::{Databases, ModelKind};
use crate::error::{AppError, AppResult};
use crate::models::{PdfFile, Pizza, PizzaWithToppings, Restaurant, Topping};

pub const ADD_PIZZA: &str = "learning.add_pizza";

pub async fn create_topping(dbs: &Databases, name: &str) -> AppResult<Topping> {
    Ok(
        sqlx::query_as::<_, Topping>("INSERT INTO toppings (name) VALUES (?) RETURNING *")
            .bind(name)
            .fetch_one(dbs.writer(ModelKind::Topping))
            .await?,
    )
}

pub async fn list_toppings(dbs: &Databases) -> AppResult<Vec<Topping>> {
    Ok(sqlx::query_as::<_, Topping>("SELECT * FROM toppings ORDER BY name")
        .fetch_all(dbs.reader(ModelKind::Topping))
        .await?)
}

/// Topping rows keyed by pizza id
async fn toppings_by_pizza(dbs: &Databases, pizza_id: Option<i64>) -> AppResult<HashMap<i64, Vec<Topping>>> {
    let rows: Vec<(i64, i64, String)> = sqlx::query_as(
        "SELECT pt.pizza_id, t.id, t.name
         FROM pizza_toppings pt JOIN toppings t ON t.id = pt.topping_id
         WHERE ? IS NULL OR pt.pizza_id = ?
         ORDER BY t.name",
    )
    .bind(pizza_id)
    .bind(pizza_id)
    .fetch_all(dbs.reader(ModelKind::Topping))
    .await?;

    let mut by_pizza: HashMap<i64, Vec<Topping>> = HashMap::new();
    for (pizza, id, name) in rows {
        by_pizza.entry(pizza).or_default().push(Topping { id, name });
    }
    Ok(by_pizza)
}

pub async fn list_pizzas(dbs: &Databases) -> AppResult<Vec<PizzaWithToppings>> {
    let pizzas = sqlx::query_as::<_, Pizza>("SELECT * FROM pizzas ORDER BY id")
        .fetch_all(dbs.reader(ModelKind::Pizza))
        .await?;
    let mut toppings = toppings_by_pizza(dbs, None).await?;

    Ok(pizzas
        .into_iter()
        .map(|p| {
            let t = toppings.remove(&p.id).unwrap_or_default();
            PizzaWithToppings::new(p, t)
        })
        .collect())
}

pub async fn find_pizza(dbs: &Databases, id: i64) -> AppResult<Option<PizzaWithToppings>> {
    let pizza = sqlx::query_as::<_, Pizza>("SELECT * FROM pizzas WHERE id = ?")
        .bind(id)
        .fetch_optional(dbs.reader(ModelKind::Pizza))
        .await?;

    match pizza {
        Some(pizza) => {
            let toppings = toppings_by_pizza(dbs, Some(id))
                .await?
                .remove(&id)
                .unwrap_or_default();
            Ok(Some(PizzaWithToppings::new(pizza, toppings)))
        }
        None => Ok(None),
    }
}

/**
 * Create a pizza with its toppings; every topping id has to exist
 */
pub async fn create_pizza(dbs: &Databases, name: &str, topping_ids: &[i64]) -> AppResult<Pizza> {
    let mut tx = dbs.writer(ModelKind::Pizza).begin().await?;

    let pizza = sqlx::query_as::<_, Pizza>("INSERT INTO pizzas (name) VALUES (?) RETURNING *")
        .bind(name)
        .fetch_one(&mut *tx)
        .await?;

    for topping in topping_ids {
        let linked = sqlx::query(
            "INSERT OR IGNORE INTO pizza_toppings (pizza_id, topping_id)
             SELECT ?, id FROM toppings WHERE id = ?",
        )
        .bind(pizza.id)
        .bind(*topping)
        .execute(&mut *tx)
        .await?;
        if linked.rows_affected() == 0 {
            let (exists,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM toppings WHERE id = ?")
                .bind(*topping)
                .fetch_one(&mut *tx)
                .await?;
            if exists == 0 {
                return Err(AppError::not_found("topping", topping));
            }
        }
    }

    tx.commit().await?;
    info!("Created pizza {} ({})", pizza.id, pizza.name);
    Ok(pizza)
}

/**
 * Delete a pizza, its topping links and the restaurants championing it
 */
pub async fn delete_pizza(dbs: &Databases, id: i64) -> AppResult<()> {
    let deleted = sqlx::query("DELETE FROM pizzas WHERE id = ?")
        .bind(id)
        .execute(dbs.writer(ModelKind::Pizza))
        .await?;
    if deleted.rows_affected() == 0 {
        return Err(AppError::not_found("pizza", id));
    }

    let mut tx = dbs.writer(ModelKind::Restaurant).begin().await?;
    let champions = sqlx::query("DELETE FROM restaurants WHERE best_pizza_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM restaurant_pizzas WHERE pizza_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!(
        "Deleted pizza {} along with {} championing restaurants",
        id,
        champions.rows_affected()
    );
    Ok(())
}

pub async fn create_restaurant(
    dbs: &Databases,
    name: &str,
    best_pizza_id: i64,
    pizza_ids: &[i64],
) -> AppResult<Restaurant> {
    if find_pizza(dbs, best_pizza_id).await?.is_none() {
        return Err(AppError::not_found("pizza", best_pizza_id));
    }

    let mut tx = dbs.writer(ModelKind::Restaurant).begin().await?;
    let restaurant = sqlx::query_as::<_, Restaurant>(
        "INSERT INTO restaurants (name, best_pizza_id) VALUES (?, ?) RETURNING *",
    )
    .bind(name)
    .bind(best_pizza_id)
    .fetch_one(&mut *tx)
    .await?;

    for pizza in pizza_ids {
        sqlx::query("INSERT OR IGNORE INTO restaurant_pizzas (restaurant_id, pizza_id) VALUES (?, ?)")
            .bind(restaurant.id)
            .bind(*pizza)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(restaurant)
}

/// Restaurants whose best pizza is `pizza_id`
pub async fn championed_by(dbs: &Databases, pizza_id: i64) -> AppResult<Vec<Restaurant>> {
    Ok(sqlx::query_as::<_, Restaurant>(
        "SELECT * FROM restaurants WHERE best_pizza_id = ? ORDER BY name",
    )
    .bind(pizza_id)
    .fetch_all(dbs.reader(ModelKind::Restaurant))
    .await?)
}

pub async fn create_pdf(dbs: &Databases, title: &str, description: Option<&str>, pdf: &str) -> AppResult<PdfFile> {
    Ok(sqlx::query_as::<_, PdfFile>(
        "INSERT INTO pdf_files (title, description, pdf) VALUES (?, ?, ?) RETURNING *",
    )
    .bind(title)
    .bind(description)
    .bind(pdf)
    .fetch_one(dbs.writer(ModelKind::PdfFile))
    .await?)
}

pub async fn list_pdfs(dbs: &Databases) -> AppResult<Vec<PdfFile>> {
    Ok(sqlx::query_as::<_, PdfFile>("SELECT * FROM pdf_files ORDER BY id")
        .fetch_all(dbs.reader(ModelKind::PdfFile))
        .await?)
}

pub async fn find_pdf(dbs: &Databases, id: i64) -> AppResult<Option<PdfFile>> {
    Ok(sqlx::query_as::<_, PdfFile>("SELECT * FROM pdf_files WHERE id = ?")
        .bind(id)
        .fetch_optional(dbs.reader(ModelKind::PdfFile))
        .await?)
}
