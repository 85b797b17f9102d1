pub mod commands;
pub mod cover;
pub mod error;
pub mod geo;
pub mod history;
pub mod ledger;
pub mod mode;
pub mod models;
pub mod progress;
pub mod session;
