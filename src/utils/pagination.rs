use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::config::Config;
use crate::models::{
    AlertResponse, BillResponse, BlockResponse, ComplaintResponse, ContactSubmission,
    EventResponse, FlatResponse, NoticeResponse, PaymentResponse, Society, UserResponse,
    VisitorResponse,
};

/// `?page=&page_size=` as sent by clients. Pages are 1-based.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageParams {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

impl PageParams {
    pub fn resolve(&self, config: &Config) -> Page {
        Page::new(
            self.page,
            self.page_size,
            config.default_page_size,
            config.max_page_size,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: i64,
    pub page_size: i64,
}

impl Page {
    pub fn new(page: Option<i64>, page_size: Option<i64>, default_size: i64, max_size: i64) -> Self {
        let page_size = page_size
            .filter(|s| *s > 0)
            .unwrap_or(default_size)
            .min(max_size)
            .max(1);
        // keeps (page - 1) * page_size within i64
        let last_page = i64::MAX / page_size;
        Self {
            page: page.unwrap_or(1).clamp(1, last_page),
            page_size,
        }
    }

    pub fn limit(&self) -> i64 {
        self.page_size
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[aliases(
    SocietyPage = Paginated<Society>,
    BlockPage = Paginated<BlockResponse>,
    FlatPage = Paginated<FlatResponse>,
    UserPage = Paginated<UserResponse>,
    NoticePage = Paginated<NoticeResponse>,
    VisitorPage = Paginated<VisitorResponse>,
    ComplaintPage = Paginated<ComplaintResponse>,
    BillPage = Paginated<BillResponse>,
    PaymentPage = Paginated<PaymentResponse>,
    EventPage = Paginated<EventResponse>,
    AlertPage = Paginated<AlertResponse>,
    ContactPage = Paginated<ContactSubmission>
)]
pub struct Paginated<T> {
    pub count: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
    pub results: Vec<T>,
}

impl<T> Paginated<T> {
    pub fn new(results: Vec<T>, count: i64, page: Page) -> Self {
        let total_pages = if count == 0 {
            0
        } else {
            (count + page.page_size - 1) / page.page_size
        };
        Self {
            count,
            page: page.page,
            page_size: page.page_size,
            total_pages,
            results,
        }
    }
}

/// `ILIKE` pattern for a free-text `search` parameter. Blank terms disable the filter.
pub fn search_pattern(term: Option<&str>) -> Option<String> {
    let term = term?.trim();
    if term.is_empty() {
        return None;
    }
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    Some(format!("%{}%", escaped))
}

/// `ORDER BY` expression for an `?ordering=` value such as `-created_at`.
/// `allowed` maps public field names to SQL columns; anything else falls back to `default`.
pub fn order_by(requested: Option<&str>, allowed: &[(&str, &str)], default: &str) -> String {
    requested
        .and_then(|r| {
            let (desc, field) = match r.strip_prefix('-') {
                Some(field) => (true, field),
                None => (false, r),
            };
            allowed
                .iter()
                .find(|(name, _)| *name == field)
                .map(|(_, column)| format!("{} {}", column, if desc { "DESC" } else { "ASC" }))
        })
        .unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_defaults() {
        let page = Page::new(None, None, 20, 100);
        assert_eq!(page, Page { page: 1, page_size: 20 });
        assert_eq!(page.offset(), 0);
    }

    #[test]
    fn test_page_size_is_capped() {
        let page = Page::new(Some(3), Some(500), 20, 100);
        assert_eq!(page.limit(), 100);
        assert_eq!(page.offset(), 200);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let page = Page::new(Some(0), Some(-5), 20, 100);
        assert_eq!(page, Page { page: 1, page_size: 20 });
    }

    #[test]
    fn test_huge_page_does_not_overflow() {
        let page = Page::new(Some(i64::MAX), Some(20), 20, 100);
        assert!(page.offset() > 0);
        assert_eq!(page.page, i64::MAX / 20);

        let page = Page::new(Some(i64::MAX), None, 20, 100);
        assert_eq!(page.offset(), (i64::MAX / 20 - 1) * 20);
    }

    #[test]
    fn test_total_pages() {
        let page = Page::new(Some(1), Some(20), 20, 100);
        assert_eq!(Paginated::new(Vec::<i32>::new(), 0, page).total_pages, 0);
        assert_eq!(Paginated::new(vec![1], 20, page).total_pages, 1);
        assert_eq!(Paginated::new(vec![1], 21, page).total_pages, 2);
    }

    #[test]
    fn test_search_pattern() {
        assert_eq!(search_pattern(None), None);
        assert_eq!(search_pattern(Some("   ")), None);
        assert_eq!(search_pattern(Some("A-1")), Some("%A-1%".to_string()));
        assert_eq!(search_pattern(Some("50%")), Some("%50\\%%".to_string()));
    }

    #[test]
    fn test_order_by() {
        let allowed = [("name", "s.name"), ("created_at", "s.created_at")];
        assert_eq!(order_by(Some("name"), &allowed, "s.id"), "s.name ASC");
        assert_eq!(order_by(Some("-created_at"), &allowed, "s.id"), "s.created_at DESC");
        assert_eq!(order_by(Some("password_hash"), &allowed, "s.id"), "s.id");
        assert_eq!(order_by(Some("-"), &allowed, "s.id"), "s.id");
        assert_eq!(order_by(None, &allowed, "s.name ASC"), "s.name ASC");
    }
}
