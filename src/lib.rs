//! Contact and newsletter form gateway for the Flight Service 365 website.
//!
//! Each submission is rate-limited per client, decoded, validated and
//! handed to a mail transport. See [`app::build_router`] for the routes.

pub mod app;
pub mod catalog;
pub mod config;
pub mod error;
pub mod limiter;
pub mod mail;
pub mod notify;
pub mod submission;
pub mod subscription;
pub mod token;
pub mod validator;
