use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Query string accepted by every paginated listing (`?page=2`).
///
/// The raw value is kept as a string so that junk like `?page=abc` falls back to the
/// first page instead of being rejected.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct PageQuery {
    pub page: Option<String>,
}

/// Page
///
/// One page of a listing plus the navigation data a client needs to render pager links.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// 1-based page number actually served.
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
    pub num_pages: usize,
    pub has_next: bool,
    pub has_previous: bool,
}

/// paginate
///
/// Slices `items` into the requested page. Missing or non-numeric page numbers serve
/// the first page, numbers below 1 or past the end serve the last page, and an empty
/// listing is a single empty page.
pub fn paginate<T>(items: Vec<T>, page: Option<&str>, per_page: usize) -> Page<T> {
    let per_page = per_page.max(1);
    let total = items.len();
    let num_pages = total.div_ceil(per_page).max(1);

    let page = match page.and_then(|raw| raw.trim().parse::<i64>().ok()) {
        None => 1,
        Some(n) if n < 1 => num_pages,
        Some(n) => usize::try_from(n).map_or(num_pages, |n| n.min(num_pages)),
    };

    let items: Vec<T> = items
        .into_iter()
        .skip((page - 1) * per_page)
        .take(per_page)
        .collect();

    Page {
        items,
        page,
        per_page,
        total,
        num_pages,
        has_next: page < num_pages,
        has_previous: page > 1,
    }
}
