pub mod api;
pub mod app;
pub mod backend;
pub mod config;
pub mod domain;
pub mod error;
pub mod forms;
pub mod notify;
pub mod services;

pub use app::App;
pub use config::Config;
pub use error::{BackendError, BackendResult};
