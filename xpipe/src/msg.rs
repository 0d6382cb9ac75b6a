//! Messages carried by a pipe.
//!
//! A message is an owned payload plus flags. Multi-part messages are sent as a
//! run of frames with [`MsgFlags::MORE`] set on every frame except the last.
//! The delimiter is a payload-less marker written once by a terminating pipe;
//! it is consumed by the reading pipe and never handed to its owner.

use crate::error::{ErrorKind, Result};
use crate::MAX_IDENTITY_SIZE;

/// Message flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MsgFlags(u8);

impl MsgFlags {
    /// No flags set.
    pub const NONE: Self = Self(0);

    /// More frames of the same message follow.
    pub const MORE: Self = Self(1 << 0);

    /// Creates flags from raw value.
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Returns the raw bits.
    pub const fn bits(&self) -> u8 {
        self.0
    }

    /// Checks if a flag is set.
    pub const fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Sets a flag.
    pub fn set(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Clears a flag.
    pub fn clear(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Data,
    Delimiter,
}

/// A single message frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Msg {
    data: Vec<u8>,
    flags: MsgFlags,
    kind: Kind,
}

impl Msg {
    /// Creates a data frame owning `data`.
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            flags: MsgFlags::NONE,
            kind: Kind::Data,
        }
    }

    /// Creates a data frame by copying `data`.
    pub fn from_slice(data: &[u8]) -> Self {
        Self::new(data.to_vec())
    }

    /// Creates the termination delimiter.
    pub fn delimiter() -> Self {
        Self {
            data: Vec::new(),
            flags: MsgFlags::NONE,
            kind: Kind::Delimiter,
        }
    }

    /// Marks this frame as followed by more frames of the same message.
    pub fn with_more(mut self) -> Self {
        self.flags.set(MsgFlags::MORE);
        self
    }

    /// Sets or clears the more flag.
    pub fn set_more(&mut self, more: bool) {
        if more {
            self.flags.set(MsgFlags::MORE);
        } else {
            self.flags.clear(MsgFlags::MORE);
        }
    }

    /// Returns true if more frames of the same message follow.
    pub fn has_more(&self) -> bool {
        self.flags.contains(MsgFlags::MORE)
    }

    /// Returns true for the termination delimiter.
    pub fn is_delimiter(&self) -> bool {
        self.kind == Kind::Delimiter
    }

    /// Returns the flags.
    pub fn flags(&self) -> MsgFlags {
        self.flags
    }

    /// Returns the payload.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns the payload length.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Consumes the frame, returning the payload.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

/// Opaque identity of the writer, attached to the reading pipe.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Identity(heapless::Vec<u8, MAX_IDENTITY_SIZE>);

impl Identity {
    /// Copies `blob` into a new identity.
    pub fn from_slice(blob: &[u8]) -> Result<Self> {
        heapless::Vec::from_slice(blob)
            .map(Self)
            .map_err(|_| ErrorKind::IdentityTooLong.into())
    }

    /// Returns the identity bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns true if the identity is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
