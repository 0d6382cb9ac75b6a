//! # XPipe - In-process Message Pipes
//!
//! XPipe connects two endpoints living on (possibly) different threads with a
//! bidirectional message pipe:
//!
//! - **Lock-free queues**: one single-producer/single-consumer queue per direction,
//!   with batched visibility at flush time
//! - **Flow control**: high/low watermarks keep memory bounded without blocking
//! - **Asynchronous shutdown**: a termination handshake that converges for every
//!   interleaving of local and remote close requests
//! - **Hiccups**: the inbound queue can be swapped mid-session without tearing
//!   the pipe down
//!
//! ## Architecture
//!
//! ```text
//!        owner A                                         owner B
//! ┌──────────────────┐                          ┌──────────────────┐
//! │  PipeEvents sink │                          │  PipeEvents sink │
//! │        ▲         │                          │        ▲         │
//! │  ┌─────┴──────┐  │   queue 2 (A writes)     │  ┌─────┴──────┐  │
//! │  │   Pipe A   │──┼─────────────────────────►┼──│   Pipe B   │  │
//! │  │            │◄─┼──────────────────────────┼──│            │  │
//! │  └─────┬──────┘  │   queue 1 (B writes)     │  └─────┬──────┘  │
//! │        │         │                          │        │         │
//! │   Mailbox A  ◄───┼──── commands from B ─────┤        │         │
//! │                  ├──── commands to B ───────┼──► Mailbox B     │
//! └──────────────────┘                          └──────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use xpipe::{mailbox, pipepair, Config, Msg, PipeOptions};
//!
//! let (mailbox_a, mut inbox_a) = mailbox();
//! let (mailbox_b, mut inbox_b) = mailbox();
//! let options = PipeOptions::default().with_hwm(4);
//! let (mut a, mut b) = pipepair([mailbox_a, mailbox_b], [options, options], &Config::default())?;
//!
//! a.write(Msg::from_slice(b"hello")).unwrap();
//! a.flush();
//!
//! let msg = b.read().unwrap();
//! assert_eq!(msg.data(), b"hello");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod command;
pub mod config;
pub mod error;
pub mod msg;
pub mod pipe;
pub mod queue;

// Re-export commonly used types
pub use command::{mailbox, Command, Envelope, Mailbox, MailboxReceiver};
pub use config::{Config, PipeOptions};
pub use error::{Error, ErrorKind, Result};
pub use msg::{Identity, Msg, MsgFlags};
pub use pipe::{compute_lwm, pipepair, Pipe, PipeEvent, PipeEvents, PipeId, State};

/// Default maximum distance between the high and the low watermark.
pub const DEFAULT_MAX_WM_DELTA: u64 = 1024;

/// Default high watermark (messages) for a pipe direction.
pub const DEFAULT_HWM: u64 = 1000;

/// Maximum identity blob size in bytes.
pub const MAX_IDENTITY_SIZE: usize = 255;
