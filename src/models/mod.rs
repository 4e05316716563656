pub mod analytics;
pub mod category;
pub mod comment;
pub mod notification;
pub mod post;
pub mod settings;
pub mod tag;
pub mod user;
