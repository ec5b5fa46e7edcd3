pub mod alerts;
pub mod auth;
pub mod billing;
pub mod complaints;
pub mod contact;
pub mod events;
pub mod notices;
pub mod society;
pub mod visitors;

use crate::middleware::AppState;
use axum::Router;

pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::routes())
        .nest("/society", society::routes())
        .nest("/billing", billing::routes())
        .nest("/notices", notices::routes())
        .nest("/visitors", visitors::routes())
        .nest("/complaints", complaints::routes())
        .nest("/events", events::routes())
        .nest("/alerts", alerts::routes())
        .nest("/contact", contact::routes())
}
