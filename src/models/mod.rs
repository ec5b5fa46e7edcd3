pub mod alert;
pub mod billing;
pub mod complaint;
pub mod contact;
pub mod event;
pub mod notice;
pub mod society;
pub mod user;
pub mod visitor;

pub use alert::*;
pub use billing::*;
pub use complaint::*;
pub use contact::*;
pub use event::*;
pub use notice::*;
pub use society::*;
pub use user::*;
pub use visitor::*;
