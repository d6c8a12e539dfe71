//! Shared value model, type descriptors and method registry for fs-remote.
//!
//! This crate is everything both ends of the channel must agree on. It has
//! **no I/O**: descriptors, registries and envelopes are plain immutable data,
//! safe to share across threads once built.
//!
//! # Data Flow
//!
//! ```text
//! caller args (Value)
//!     └── Registry::get(name) → MethodSpec
//!     └── marshal::serialize_args → Envelope {type, value}
//!             ─── RpcChannel ───▶
//!     └── marshal::deserialize_args (same MethodSpec, looked up by name)
//!     └── host executes, marshal::serialize_result
//!             ◀── RpcChannel ───
//!     └── marshal::deserialize_result → Value
//! ```
//!
//! # Key Types
//!
//! |------------------|----------------------------------------------------|
//! | Type             | Purpose                                            |
//! |------------------|----------------------------------------------------|
//! | [`Value`]        | Native value: scalars, bytes, dates, URLs, objects |
//! | [`TypeDef`]      | Named descriptor; its name is the wire tag         |
//! | [`Envelope`]     | `{type, value}` wire form                          |
//! | [`MethodSpec`]   | Argument/result schemas plus calling convention    |
//! | [`Registry`]     | Simple and special operation tables                |
//! | [`Stats`]        | Stat result with precomputed predicates            |
//! | [`WatchFrame`]   | One message on a watch side channel                |
//! | [`RpcChannel`]   | Request/response transport seam                    |
//! |------------------|----------------------------------------------------|

pub mod constants;
pub mod envelope;
pub mod error;
pub mod marshal;
pub mod protocol;
pub mod registry;
pub mod schema;
pub mod stats;
pub mod value;
pub mod watch;

pub use envelope::Envelope;
pub use error::{MarshalError, MarshalResult, SchemaError};
pub use protocol::{RemoteError, RemoteErrorKind, Request, Response, RpcChannel, RpcError};
pub use registry::{MethodKind, MethodSpec, Registry, SpecialKind};
pub use schema::{Primitive, TypeDef};
pub use stats::{Stats, stats_record};
pub use value::{Fields, TypedArray, TypedArrayKind, Value};
pub use watch::{CLOSE_FRAME, ErrorDescription, FrameData, FrameSource, WatchFrame, watch_message};
