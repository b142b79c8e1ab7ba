//! # Shared Protocol Library
//!
//! Wire-level building blocks used by every agent in the swarm. Nothing in this
//! crate performs I/O or holds state; it only turns raw websocket payloads into
//! values and values back into outgoing frames.
//!
//! ## Module Organization
//!
//! ### Codec (`codec`)
//! - Opcode constants for the binary game protocol
//! - Big-endian 16 and 24 bit field readers
//! - Decoding of the obfuscated handshake secret
//! - Encoding of the small client control frames (hello, nickname, pong, heading)
//!
//! ### Heading (`heading`)
//! The server measures angles in its own unit where a full turn is 250 units.
//! This module converts between that unit and radians.
//!
//! ## Malformed Input
//!
//! The server regularly sends frames the agents do not care about, and some of
//! them are shorter than the fields we would like to read. Every decoder
//! returns `Option` and declines instead of panicking.

pub mod codec;
pub mod heading;

pub use codec::*;
pub use heading::*;
