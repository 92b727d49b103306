pub mod app;
pub mod auth;
pub mod bookings;
pub mod catalog;
pub mod chatbot;
pub mod config;
pub mod error;
pub mod extract;
pub mod notify;
pub mod rate_limit;
pub mod response;
pub mod state;
pub mod storage;
pub mod users;
