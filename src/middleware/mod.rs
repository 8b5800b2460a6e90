//! Stock interceptors.
//!
//! Order matters when composing them: [`Recover`] belongs outermost so it
//! also catches failures in [`RequestLog`] and everything after it.

mod auth;
mod logging;
mod recover;
mod timeout;

pub use auth::{ApiKeys, Auth, Validator};
pub use logging::RequestLog;
pub use recover::Recover;
pub use timeout::Timeout;
