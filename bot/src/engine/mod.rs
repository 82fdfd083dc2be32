pub mod chat;
pub mod diff;
pub mod emoji;
pub mod format;
pub mod model;
pub mod notify;
pub mod repository;
pub mod snapshot;
pub mod tracker;
pub mod validation;
