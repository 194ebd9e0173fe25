//! Server connection management
//!
//! A [`Session`] owns one TCP connection to the server and reports
//! everything that happens on it as [`SessionEvent`]s.

mod handler;
mod session;

pub use handler::{dispatch, SessionHandler};
pub use session::{
    SendId, Session, SessionError, SessionEvent, SessionOptions, SessionState,
};
