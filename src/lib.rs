pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod policy;
pub mod repository;
pub mod routes;
pub mod schema;
pub mod sequence;
pub mod state;
pub mod utils;
