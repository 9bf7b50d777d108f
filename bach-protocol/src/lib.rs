//! bach-protocol: wire-level definitions for talking to the notation host
//!
//! The host speaks newline-terminated UTF-8 text in both directions. This
//! crate owns the line framing, the envelope every inbound line is wrapped
//! in, and the connection vocabulary shared by the bridge.

pub mod codec;
pub mod llll;
pub mod messages;

pub use codec::{CodecError, LineCodec, MAX_LINE_LENGTH};
pub use llll::{validate_llll, LlllError};
pub use messages::{ClientId, ConnectionRole, ConnectionState, InboundEvent, MessageKind};
