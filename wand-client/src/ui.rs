//! Line-mode front end

mod app;
mod event;

pub use app::{App, AppOptions};
