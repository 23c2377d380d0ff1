pub mod chart;
pub mod dispatcher;
pub mod html;
pub mod notification;
pub mod template;

pub use dispatcher::{SendOutcome, TelegramDispatcher};
pub use notification::NotificationDispatcher;
