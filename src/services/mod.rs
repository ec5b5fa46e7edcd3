pub mod auth_service;
pub mod billing_service;
pub mod file_service;
pub mod flat_service;

pub use auth_service::AuthService;
pub use file_service::FileService;
