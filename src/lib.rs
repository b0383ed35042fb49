pub mod bot;
pub mod command;
pub mod config;
pub mod error;
pub mod github;
pub mod models;
pub mod playlist;
pub mod queue;
pub mod relay;
pub mod server;
pub mod state;
pub mod telegram;
pub mod transfer;
pub mod update;
