pub mod config;
pub mod db;
pub mod discord;
pub mod engine;
pub mod error;
pub mod poll;
