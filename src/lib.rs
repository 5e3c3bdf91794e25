#[macro_use]
extern crate rocket;

pub mod analytics;
pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod finance;
pub mod models;
pub mod money;
pub mod period;
pub mod validation;
