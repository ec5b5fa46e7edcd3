pub mod json;
pub mod pagination;
pub mod validators;

pub use json::{double_option, ApiJson};
pub use pagination::{order_by, search_pattern, Page, PageParams, Paginated};
