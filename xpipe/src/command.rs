//! Commands exchanged between the owners of the two ends of a pipe.
//!
//! Every owner has one mailbox. A pipe never calls into its peer directly;
//! it posts a command addressed to the peer pipe into the peer owner's
//! mailbox, and the owner's event loop hands it to
//! [`Pipe::process_command`](crate::Pipe::process_command). Delivery is
//! asynchronous and in order per sender.

use tokio::sync::mpsc;

use crate::error::{ErrorKind, Result};
use crate::msg::Msg;
use crate::pipe::PipeId;
use crate::queue::{Reader, Writer};

/// Instruction for a pipe, sent by its peer.
#[derive(Debug)]
pub enum Command {
    /// The peer asks this pipe to terminate.
    PipeTerm,

    /// The peer acknowledged termination.
    PipeTermAck,

    /// Messages were published to an idle inbound queue.
    ActivateRead,

    /// The peer has read this many messages in total.
    ActivateWrite(u64),

    /// The peer replaced its inbound queue.
    Hiccup {
        /// Write end of the peer's new inbound queue.
        writer: Writer<Msg>,

        /// Read end of the retired queue, to be drained by this pipe.
        retired: Reader<Msg>,
    },
}

impl Command {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Command::PipeTerm => "pipe-term",
            Command::PipeTermAck => "pipe-term-ack",
            Command::ActivateRead => "activate-read",
            Command::ActivateWrite(_) => "activate-write",
            Command::Hiccup { .. } => "hiccup",
        }
    }
}

/// A command together with the pipe it is addressed to.
#[derive(Debug)]
pub struct Envelope {
    /// Destination pipe.
    pub target: PipeId,

    /// The command itself.
    pub command: Command,
}

/// Sending side of an owner's mailbox.
#[derive(Debug, Clone)]
pub struct Mailbox {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl Mailbox {
    /// Posts `command` for `target`. Never blocks.
    pub fn send(&self, target: PipeId, command: Command) -> Result<()> {
        self.tx
            .send(Envelope { target, command })
            .map_err(|_| ErrorKind::MailboxClosed.into())
    }

    /// Returns true once the owner dropped its receiver.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving side of an owner's mailbox.
#[derive(Debug)]
pub struct MailboxReceiver {
    rx: mpsc::UnboundedReceiver<Envelope>,
}

impl MailboxReceiver {
    /// Waits for the next command.
    ///
    /// Returns `None` once every `Mailbox` handle is gone.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }

    /// Blocks the current thread until the next command arrives.
    ///
    /// Must not be called from within an async runtime.
    pub fn blocking_recv(&mut self) -> Option<Envelope> {
        self.rx.blocking_recv()
    }

    /// Returns the next command if one is already queued.
    pub fn try_recv(&mut self) -> Option<Envelope> {
        self.rx.try_recv().ok()
    }
}

/// Creates an owner mailbox.
pub fn mailbox() -> (Mailbox, MailboxReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Mailbox { tx }, MailboxReceiver { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mailbox_in_order() {
        let (mailbox, mut inbox) = mailbox();
        let target = PipeId::next();

        mailbox.send(target, Command::ActivateRead).unwrap();
        mailbox.send(target, Command::ActivateWrite(7)).unwrap();

        let first = inbox.try_recv().unwrap();
        assert_eq!(first.target, target);
        assert!(matches!(first.command, Command::ActivateRead));

        let second = inbox.try_recv().unwrap();
        assert!(matches!(second.command, Command::ActivateWrite(7)));
        assert!(inbox.try_recv().is_none());
    }

    #[test]
    fn test_mailbox_closed() {
        let (mailbox, inbox) = mailbox();
        drop(inbox);

        assert!(mailbox.is_closed());
        let err = mailbox.send(PipeId::next(), Command::PipeTerm).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MailboxClosed);
    }
}
