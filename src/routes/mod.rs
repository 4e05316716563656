use crate::config::BlogConfig;
use crate::query::{Order, PostQuery, SortKey};

pub mod admin;
pub mod api;
pub mod auth;
pub mod public;

/// Query string shared by every paginated listing.
/// `sortBy` is an alias of `sort`; `order` overrides the sort's direction.
#[derive(Debug, Default, FromForm)]
pub struct ListParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub sort: Option<String>,
    #[field(name = "sortBy")]
    pub sort_by: Option<String>,
    pub order: Option<String>,
    pub q: Option<String>,
}

impl ListParams {
    /// Published-post query with this request's paging and sorting.
    pub fn query(&self, config: &BlogConfig, route_default: i64) -> PostQuery {
        let sort = self
            .sort
            .as_deref()
            .or(self.sort_by.as_deref())
            .and_then(SortKey::parse)
            .unwrap_or_default();
        let order = self.order.as_deref().and_then(Order::parse);
        PostQuery::published(self.page, config.page_size(self.limit, route_default)).sorted(sort, order)
    }

    /// Trimmed search text, `None` when blank.
    pub fn search_text(&self) -> Option<&str> {
        self.q.as_deref().map(str::trim).filter(|q| !q.is_empty())
    }
}
