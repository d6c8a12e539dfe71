//! The host filesystem.
//!
//! [`HostFs`] is the executor behind every registered operation. It works on
//! native [`Value`](fsremote_types::Value) arguments that have already passed
//! their schema, and returns native values for the result schema to check.
//!
//! # Module Structure
//!
//! - `args`: picking typed arguments out of validated argument lists
//! - `encoding`: text encodings named in options objects
//! - `error`: [`HostError`] with Node-style codes
//! - `fd`: the descriptor table shared by `open`/`read`/`write`/`close`
//! - `flags`: open-flag mnemonics and numeric flag words
//! - `local`: the operations themselves
//! - `stats`: metadata to stats records

pub mod args;
pub mod encoding;
pub mod error;
pub mod fd;
pub mod flags;
pub mod local;
pub mod stats;

pub use encoding::Encoding;
pub use error::{HostError, HostResult};
pub use fd::FdTable;
pub use flags::OpenFlags;
pub use local::HostFs;
