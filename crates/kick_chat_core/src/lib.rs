#![forbid(unsafe_code)]

//! Recovery of Kick chat messages from inconsistently escaped Pusher payloads.
//!
//! The envelope `data` field is a JSON string literal wrapping the message
//! object, escaped once, sometimes twice. [`ResilientDecoder`] strips the
//! quotes, runs the normalization [`Strategy`]s in order and returns the
//! first candidate that decodes into a [`ChatMessage`].

pub mod decoder;
pub mod error;
pub mod escape;
pub mod message;

pub use decoder::{Decoded, NormalizeStep, ResilientDecoder, Strategy, decode_chat_message};
pub use error::{Candidate, DecodeError, FailureReport};
pub use message::{Badge, ChatMessage, Identity, MessageId, ParseIdError, Sender, parse_created_at};
