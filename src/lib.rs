// Library root
// -----------
// This crate exposes the library surface behind the `driveup` binary.
// `main.rs` parses arguments, loads the config and hands a `Client` the
// command to run.
//
// Module responsibilities:
// - `api`: the blocking HTTP client, URL layout and error decoding.
// - `auth`, `callback`, `token`: the OAuth code flow, the local redirect
//   listener and the stored credentials with their renewal window.
// - `upload`, `download`, `items`: drive operations.
// - `signal`, `progress`: transfer progress reporting.
// - `config`, `cli`, `ui`: the config file, argument parsing and the
//   terminal output / interactive wizard.
pub mod api;
pub mod auth;
pub mod callback;
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod items;
pub mod progress;
pub mod signal;
pub mod token;
pub mod ui;
pub mod upload;

pub use api::Client;
pub use error::{Error, Result};
