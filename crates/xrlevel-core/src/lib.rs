//! xrlevel core library
//!
//! This crate provides the error taxonomy, chunk role vocabulary and
//! diagnostic report types shared by the xrlevel parser and CLI.

pub mod error;
pub mod types;

pub use error::{Error, Result, ResultExt};
pub use types::*;

/// Re-export commonly used items
pub mod prelude {
    pub use crate::error::{Error, Result, ResultExt};
    pub use crate::types::*;
}
