use askama::Template;
use axum::{
    extract::{Query, State},
    routing::get,
    Router,
};
use serde::Deserialize;
use tower_sessions::Session;

use crate::api::flash::{self, Flash};
use crate::api::form::{single_choice, Choice};
use crate::api::middleware::session::AppState;
use crate::error::Result;
use crate::models::summary::{
    SummaryFilters, SummaryListItem, AVAILABILITIES, CONTRIBUTION_WISHES,
};

pub const PER_PAGE: i64 = 32;

#[derive(Debug, Deserialize)]
pub struct PaginationParams {
    pub page: Option<i64>,
}

/// 1-based page number and matching row offset
fn page_bounds(page: Option<i64>) -> (i64, i64) {
    let page = page.unwrap_or(1).clamp(1, i64::MAX / PER_PAGE);
    (page, (page - 1) * PER_PAGE)
}

fn page_count(total: i64) -> i64 {
    ((total + PER_PAGE - 1) / PER_PAGE).max(1)
}

/// Query string carrying the active filters, for pager links
fn filters_query(filters: &SummaryFilters) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .append_pair("member", &filters.member)
        .append_pair("current_profession", &filters.current_profession)
        .append_pair("contribution_wish", &filters.contribution_wish)
        .append_pair("availability", &filters.availability)
        .finish()
}

#[derive(Template)]
#[template(path = "admin/summaries/list.html")]
struct SummaryListTemplate {
    flashes: Vec<Flash>,
    summaries: Vec<SummaryListItem>,
    filters: SummaryFilters,
    contribution_wishes: Vec<Choice>,
    availabilities: Vec<Choice>,
    page: i64,
    pages: i64,
    total: i64,
    query: String,
}

async fn list_summaries(
    State(state): State<AppState>,
    session: Session,
    Query(filters): Query<SummaryFilters>,
    Query(pagination): Query<PaginationParams>,
) -> Result<SummaryListTemplate> {
    let (page, offset) = page_bounds(pagination.page);
    let (summaries, total) = SummaryListItem::list(&state.pool, &filters, PER_PAGE, offset).await?;

    tracing::debug!(page, total, "Listing summaries");

    Ok(SummaryListTemplate {
        flashes: flash::take_flashes(&session).await?,
        summaries,
        contribution_wishes: single_choice(&CONTRIBUTION_WISHES, &filters.contribution_wish),
        availabilities: single_choice(&AVAILABILITIES, &filters.availability),
        query: filters_query(&filters),
        filters,
        page,
        pages: page_count(total),
        total,
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/admin/summaries", get(list_summaries))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination() {
        assert_eq!(page_bounds(None), (1, 0));
        assert_eq!(page_bounds(Some(0)), (1, 0));
        assert_eq!(page_bounds(Some(3)), (3, 64));

        let (page, offset) = page_bounds(Some(i64::MAX));
        assert_eq!(page, i64::MAX / PER_PAGE);
        assert!(offset >= 0);

        assert_eq!(page_count(0), 1);
        assert_eq!(page_count(32), 1);
        assert_eq!(page_count(33), 2);
    }

    #[test]
    fn test_filters_query_is_encoded() {
        let filters = SummaryFilters {
            member: "Carl Mirabeau".to_string(),
            availability: "weekends".to_string(),
            ..Default::default()
        };

        assert_eq!(
            filters_query(&filters),
            "member=Carl+Mirabeau&current_profession=&contribution_wish=&availability=weekends"
        );
    }
}
