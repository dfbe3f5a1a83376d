pub mod api;
pub mod app;
pub mod collector;
pub mod models;
pub mod sheets;
pub mod utils;
