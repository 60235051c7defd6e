//! Common types shared by the stats updater crates

mod error;
mod persist;
mod secret;

pub use error::{Error, Result};
pub use persist::{read_json_or_default, write_json_atomic};
pub use secret::Secret;
