//! Hospital records backend: user authentication, session tokens and
//! patient records over a JSON HTTP API.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod token;
pub mod web;
