//! Proximate: a transparent remote-object layer over an asynchronous,
//! message-oriented duplex channel.
//!
//! Code on one side of a channel holds a [`Handle`] to an object on the
//! other side and drives it: reading properties, calling methods, walking
//! nested members, writing values, and passing objects and handles back and
//! forth, subject to the one rule that every operation is asynchronous.
//!
//! The six components from the design (nonce generator, receiver registry,
//! codec, pending-request table, handle factory, message dispatcher) live
//! in [`nonce`], [`registry`], [`codec`]/[`protocol`], [`pending`],
//! [`handle`], and [`connection`] respectively. The concrete transport is
//! out of scope for this crate; see [`transport::Endpoint`] for the
//! minimum contract any carrier must meet.
//!
//! ```no_run
//! use std::sync::Arc;
//! use proximate::{wrap, WrapOptions, Handle, Value};
//!
//! # async fn example(endpoint: Arc<dyn proximate::Endpoint>) -> Result<(), proximate::ProximateError> {
//! let primary: Handle = wrap(endpoint, WrapOptions::default());
//! let answer = primary.call(vec![Value::json(42)]).await?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod connection;
pub mod error;
pub mod error_codec;
pub mod handle;
pub mod nonce;
pub mod pending;
pub mod protocol;
pub mod registry;
pub mod remote;
pub mod transport;
pub mod value;
mod wire;

pub use connection::{close, release, wrap, WrapOptions};
pub use error::ProximateError;
pub use handle::Handle;
pub use protocol::{register_global as register_protocol, Protocol};
pub use remote::{Remote, RemoteFn};
pub use transport::{Endpoint, Transferable};
pub use value::Value;
pub use wire::WireMessage;
