//! CeyMail backup service.
//!
//! Creates, lists, deletes and streams compressed archives of a mail server's
//! configuration, databases, DKIM keys and mailboxes, behind an admin-only
//! HTTP API.

pub mod auth;
pub mod config;
pub mod credentials;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod utils;
