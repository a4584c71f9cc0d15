pub mod app;
pub mod error;
pub mod forward;
pub mod handlers;
pub mod models;
pub mod normalize;
