use serde::Serialize;

use crate::error::AppError;

/**
 * One page of a list view, numbered from 1
 */
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: i64,
    pub num_pages: i64,
    pub count: i64,
    pub has_next: bool,
    pub has_previous: bool,
    pub next: Option<i64>,
    pub previous: Option<i64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageWindow {
    pub number: i64,
    pub num_pages: i64,
    pub limit: i64,
    pub offset: i64,
}

/**
 * Resolve the `page` query parameter against a row count.
 *
 * Missing means the first page, `last` means the last one; anything that is
 * not a page number, or is out of range, is not found. An empty list still
 * has one (empty) first page.
 */
pub fn window(requested: Option<&str>, count: i64, per_page: i64) -> Result<PageWindow, AppError> {
    let num_pages = ((count + per_page - 1) / per_page).max(1);

    let number = match requested.map(str::trim) {
        None | Some("") => 1,
        Some("last") => num_pages,
        Some(raw) => raw
            .parse::<i64>()
            .map_err(|_| AppError::not_found("page", raw))?,
    };

    if number < 1 || number > num_pages {
        return Err(AppError::not_found("page", number));
    }

    Ok(PageWindow {
        number,
        num_pages,
        limit: per_page,
        offset: (number - 1) * per_page,
    })
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, window: PageWindow, count: i64) -> Self {
        let has_next = window.number < window.num_pages;
        let has_previous = window.number > 1;
        Self {
            items,
            number: window.number,
            num_pages: window.num_pages,
            count,
            has_next,
            has_previous,
            next: has_next.then(|| window.number + 1),
            previous: has_previous.then(|| window.number - 1),
        }
    }
}
