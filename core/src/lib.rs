pub mod auth;
pub mod calendar;
pub mod credentials;
pub mod error;
pub mod store;

pub use error::{CalendarError, Result};
