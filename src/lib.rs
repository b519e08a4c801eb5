pub mod app;
pub mod audit;
pub mod auth;
pub mod cli;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod startup;

pub use app::{router, AdminRouter, AppState};
pub use error::AppError;
