pub mod api;
pub mod classify;
pub mod commands;
pub mod config;
pub mod console;
pub mod controller;
pub mod domain;
pub mod poller;
pub mod present;
pub mod refresh;
pub mod state;
pub mod version;
