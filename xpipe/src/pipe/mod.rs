//! Pipe endpoints.
//!
//! A [`Pipe`] is one end of a bidirectional message pipe. It reads from an
//! inbound queue filled by the peer and writes to an outbound queue drained by
//! the peer. The two ends never touch each other's fields: everything that
//! crosses over goes through the queues or through commands posted to the
//! peer owner's [`Mailbox`].
//!
//! Flow control works on whole messages. A pipe stops accepting writes once
//! `hwm` messages are in flight, and the reader reports progress every `lwm`
//! messages so the writer can continue.

mod pair;
mod state;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use crate::command::{Command, Mailbox};
use crate::config::Config;
use crate::msg::{Identity, Msg};
use crate::queue::{self, Reader, Writer};

pub use pair::{compute_lwm, pipepair};
pub use state::State;
use state::{Action, Event};

static NEXT_PIPE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique identifier of a pipe endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipeId(u64);

impl PipeId {
    pub(crate) fn next() -> Self {
        Self(NEXT_PIPE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw identifier.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PipeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pipe#{}", self.0)
    }
}

/// Notifications a pipe delivers to its owner.
///
/// Called synchronously from the owner's own thread, inside `read`,
/// `check_read` or `process_command`.
pub trait PipeEvents: Send {
    /// Inbound messages became available after the pipe had run dry.
    fn read_activated(&mut self, pipe: PipeId);

    /// The peer caught up and the pipe accepts writes again.
    fn write_activated(&mut self, pipe: PipeId);

    /// The outbound queue was replaced by the peer.
    fn hiccuped(&mut self, pipe: PipeId) {
        let _ = pipe;
    }

    /// The termination handshake completed; the pipe must not be used again.
    fn terminated(&mut self, pipe: PipeId);
}

/// A pipe notification as a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeEvent {
    /// See [`PipeEvents::read_activated`].
    ReadActivated(PipeId),
    /// See [`PipeEvents::write_activated`].
    WriteActivated(PipeId),
    /// See [`PipeEvents::hiccuped`].
    Hiccuped(PipeId),
    /// See [`PipeEvents::terminated`].
    Terminated(PipeId),
}

fn forward(tx: &mpsc::UnboundedSender<PipeEvent>, event: PipeEvent) {
    if tx.send(event).is_err() {
        log::warn!("Event receiver dropped, {:?} lost", event);
    }
}

/// Owners running an async loop can take events from a channel.
impl PipeEvents for mpsc::UnboundedSender<PipeEvent> {
    fn read_activated(&mut self, pipe: PipeId) {
        forward(self, PipeEvent::ReadActivated(pipe));
    }

    fn write_activated(&mut self, pipe: PipeId) {
        forward(self, PipeEvent::WriteActivated(pipe));
    }

    fn hiccuped(&mut self, pipe: PipeId) {
        forward(self, PipeEvent::Hiccuped(pipe));
    }

    fn terminated(&mut self, pipe: PipeId) {
        forward(self, PipeEvent::Terminated(pipe));
    }
}

#[derive(Debug, Clone)]
struct Peer {
    id: PipeId,
    mailbox: Mailbox,
}

/// One end of a bidirectional message pipe.
///
/// Owned and driven by a single thread or task. Commands addressed to this
/// pipe must be handed to [`Pipe::process_command`] on that same owner.
pub struct Pipe {
    id: PipeId,

    /// `None` once the pipe is deallocated.
    inbound: Option<Reader<Msg>>,

    /// `None` once released during termination.
    outbound: Option<Writer<Msg>>,

    in_active: bool,
    out_active: bool,

    /// Outbound high watermark; 0 means unbounded.
    hwm: u64,

    /// Inbound low watermark.
    lwm: u64,

    msgs_read: u64,
    msgs_written: u64,

    /// Last read count reported by the peer.
    peers_msgs_read: u64,

    peer: Peer,
    sink: Option<Box<dyn PipeEvents>>,
    identity: Option<Identity>,
    state: State,
    delay: bool,
}

impl Pipe {
    #[allow(clippy::too_many_arguments)]
    fn new(
        id: PipeId,
        inbound: Reader<Msg>,
        outbound: Writer<Msg>,
        in_hwm: u64,
        out_hwm: u64,
        delay: bool,
        peer: Peer,
        config: &Config,
    ) -> Self {
        Self {
            id,
            inbound: Some(inbound),
            outbound: Some(outbound),
            in_active: true,
            out_active: true,
            hwm: out_hwm,
            lwm: compute_lwm(in_hwm, config.max_wm_delta),
            msgs_read: 0,
            msgs_written: 0,
            peers_msgs_read: 0,
            peer,
            sink: None,
            identity: None,
            state: State::Active,
            delay,
        }
    }

    /// Registers the owner's event sink.
    ///
    /// # Panics
    ///
    /// Panics if a sink was already registered.
    pub fn set_event_sink(&mut self, sink: impl PipeEvents + 'static) {
        assert!(self.sink.is_none(), "{} already has an event sink", self.id);
        self.sink = Some(Box::new(sink));
    }

    /// Attaches the identity of the writing side.
    pub fn set_identity(&mut self, identity: Identity) {
        debug_assert!(self.identity.is_none(), "identity set twice");
        self.identity = Some(identity);
    }

    /// Returns the identity attached with [`Pipe::set_identity`].
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Returns true if a message can be read right now.
    ///
    /// A delimiter at the head of the queue is consumed here and reported as
    /// "nothing to read".
    pub fn check_read(&mut self) -> bool {
        if !self.in_active || !self.state.is_readable() {
            return false;
        }
        let Some(inbound) = self.inbound.as_mut() else {
            return false;
        };

        if !inbound.check_read() {
            self.in_active = false;
            return false;
        }

        if inbound.probe().is_some_and(Msg::is_delimiter) {
            let delimiter = inbound.read();
            debug_assert!(delimiter.is_some());
            self.delimit();
            return false;
        }

        true
    }

    /// Reads the next message frame.
    ///
    /// Returns `None` when nothing is available. The pipe then waits for the
    /// peer's activate-read before reporting data again.
    pub fn read(&mut self) -> Option<Msg> {
        if !self.in_active || !self.state.is_readable() {
            return None;
        }

        let Some(msg) = self.inbound.as_mut().and_then(Reader::read) else {
            self.in_active = false;
            return None;
        };

        if msg.is_delimiter() {
            self.delimit();
            return None;
        }

        if !msg.has_more() {
            self.msgs_read += 1;
            if self.lwm > 0 && self.msgs_read % self.lwm == 0 {
                self.send_peer(Command::ActivateWrite(self.msgs_read));
            }
        }

        Some(msg)
    }

    /// Returns true if a write would be accepted right now.
    pub fn check_write(&mut self) -> bool {
        if !self.out_active || self.state != State::Active {
            return false;
        }

        if self.is_full() {
            self.out_active = false;
            return false;
        }

        true
    }

    /// Stages a message frame for the peer.
    ///
    /// Frames with the more flag stay invisible to the peer until the frame
    /// closing the message is written and flushed. On rejection the frame is
    /// handed back.
    pub fn write(&mut self, msg: Msg) -> Result<(), Msg> {
        debug_assert!(!msg.is_delimiter(), "delimiter written by owner");

        if !self.check_write() {
            return Err(msg);
        }
        let Some(outbound) = self.outbound.as_mut() else {
            return Err(msg);
        };

        let more = msg.has_more();
        outbound.write(msg, more);
        if !more {
            self.msgs_written += 1;
        }

        Ok(())
    }

    /// Publishes every complete staged message to the peer.
    pub fn flush(&mut self) {
        // Outbound is already gone or about to go.
        if self.state == State::Terminating {
            return;
        }

        if let Some(outbound) = self.outbound.as_mut() {
            if outbound.flush() {
                self.send_peer(Command::ActivateRead);
            }
        }
    }

    /// Drops the staged fragments of an unfinished message.
    pub fn rollback(&mut self) {
        let Some(outbound) = self.outbound.as_mut() else {
            return;
        };

        let mut dropped = 0usize;
        while let Some(msg) = outbound.unwrite() {
            debug_assert!(msg.has_more());
            dropped += 1;
        }

        if dropped > 0 {
            log::debug!("{} rolled back {} fragments", self.id, dropped);
        }
    }

    /// Starts the termination handshake.
    ///
    /// With `delay` set, messages the peer already sent are still read before
    /// the pipe goes away. Repeated calls are ignored.
    pub fn terminate(&mut self, delay: bool) {
        self.delay = delay;

        if self.transition(Event::Terminate { delay }) == Action::Ignore {
            return;
        }

        self.out_active = false;
        self.rollback();

        if let Some(outbound) = self.outbound.as_mut() {
            // Bypasses the watermark.
            outbound.write(Msg::delimiter(), false);
            self.flush();
        }
    }

    /// Replaces the inbound queue with a fresh one.
    ///
    /// The peer moves whatever is left in the old queue over to the new one,
    /// so no message is lost. Only done while the pipe is active.
    pub fn hiccup(&mut self) {
        if self.state != State::Active {
            return;
        }
        let Some(retired) = self.inbound.take() else {
            return;
        };

        let (writer, reader) = queue::channel();
        self.inbound = Some(reader);
        self.in_active = true;

        log::debug!("{} hiccup, new inbound queue", self.id);
        self.send_peer(Command::Hiccup { writer, retired });
    }

    /// Applies a command sent by the peer.
    pub fn process_command(&mut self, command: Command) {
        log::trace!("{} <- {}: {}", self.id, self.peer.id, command.name());

        match command {
            Command::PipeTerm => self.process_pipe_term(),
            Command::PipeTermAck => self.process_pipe_term_ack(),
            Command::ActivateRead => self.process_activate_read(),
            Command::ActivateWrite(msgs_read) => self.process_activate_write(msgs_read),
            Command::Hiccup { writer, retired } => self.process_hiccup(writer, retired),
        }
    }

    /// The peer flushed into an idle inbound queue.
    pub fn process_activate_read(&mut self) {
        if !self.in_active && self.state.is_readable() {
            self.in_active = true;
            self.notify(PipeEvent::ReadActivated(self.id));
        }
    }

    /// The peer has read `msgs_read` messages in total.
    pub fn process_activate_write(&mut self, msgs_read: u64) {
        self.peers_msgs_read = msgs_read;

        if !self.out_active && self.state == State::Active {
            self.out_active = true;
            self.notify(PipeEvent::WriteActivated(self.id));
        }
    }

    /// The peer asked to terminate.
    pub fn process_pipe_term(&mut self) {
        let delay = self.delay;
        self.transition(Event::PeerTerm { delay });
    }

    /// The peer acknowledged termination. The pipe is deallocated.
    ///
    /// # Panics
    ///
    /// Panics if the pipe was already deallocated.
    pub fn process_pipe_term_ack(&mut self) {
        assert!(!self.is_closed(), "{} acknowledged twice", self.id);

        if let Action::Deallocate { ack: true } = self.transition(Event::PeerTermAck) {
            self.outbound = None;
            self.send_peer(Command::PipeTermAck);
        }

        self.notify(PipeEvent::Terminated(self.id));

        // Whatever the peer wrote and we never read dies with us.
        if let Some(mut inbound) = self.inbound.take() {
            let mut dropped = 0usize;
            while inbound.read().is_some() {
                dropped += 1;
            }
            log::debug!("{} deallocated, {} unread frames dropped", self.id, dropped);
        }
    }

    /// The peer replaced its inbound queue.
    ///
    /// Everything still sitting in the retired queue is moved to the new one
    /// in order, followed by the fragments of a message still being written.
    pub fn process_hiccup(&mut self, writer: Writer<Msg>, mut retired: Reader<Msg>) {
        let Some(mut old) = self.outbound.take() else {
            log::debug!("{} ignored hiccup, outbound already released", self.id);
            return;
        };

        // The peer stopped reading the old queue; nobody needs the wake-up.
        old.flush();

        let mut fragments = Vec::new();
        while let Some(msg) = old.unwrite() {
            fragments.push(msg);
        }

        let mut new = writer;
        let mut moved = 0usize;
        while let Some(msg) = retired.read() {
            let more = msg.has_more();
            new.write(msg, more);
            moved += 1;
        }
        for msg in fragments.into_iter().rev() {
            new.write(msg, true);
        }

        drop(old);
        drop(retired);

        self.outbound = Some(new);
        self.out_active = true;
        self.flush();

        log::debug!("{} hiccup, {} frames moved to the new queue", self.id, moved);

        if self.state == State::Active {
            self.notify(PipeEvent::Hiccuped(self.id));
        }
    }

    /// Returns this pipe's identifier.
    pub fn id(&self) -> PipeId {
        self.id
    }

    /// Returns the peer pipe's identifier.
    pub fn peer_id(&self) -> PipeId {
        self.peer.id
    }

    /// Returns the termination state.
    pub fn state(&self) -> State {
        self.state
    }

    /// Returns true once the termination handshake completed.
    pub fn is_closed(&self) -> bool {
        self.inbound.is_none()
    }

    /// Returns the outbound high watermark.
    pub fn hwm(&self) -> u64 {
        self.hwm
    }

    /// Returns the inbound low watermark.
    pub fn lwm(&self) -> u64 {
        self.lwm
    }

    /// Returns the number of complete messages read.
    pub fn msgs_read(&self) -> u64 {
        self.msgs_read
    }

    /// Returns the number of complete messages written.
    pub fn msgs_written(&self) -> u64 {
        self.msgs_written
    }

    fn is_full(&self) -> bool {
        self.hwm > 0 && self.msgs_written.saturating_sub(self.peers_msgs_read) >= self.hwm
    }

    fn delimit(&mut self) {
        self.transition(Event::DelimiterRead);
    }

    fn transition(&mut self, event: Event) -> Action {
        let (next, action) = self.state.on(event);
        if next != self.state {
            log::debug!("{} {:?} -> {:?} on {:?}", self.id, self.state, next, event);
        }
        self.state = next;

        match action {
            Action::SendTerm => self.send_peer(Command::PipeTerm),
            Action::ReleaseAndAck => {
                self.outbound = None;
                self.send_peer(Command::PipeTermAck);
            }
            Action::None | Action::Ignore | Action::Deallocate { .. } => {}
        }

        action
    }

    fn send_peer(&self, command: Command) {
        let name = command.name();
        log::trace!("{} -> {}: {}", self.id, self.peer.id, name);

        if let Err(e) = self.peer.mailbox.send(self.peer.id, command) {
            log::warn!("{} could not send {} to {}: {}", self.id, name, self.peer.id, e);
        }
    }

    fn notify(&mut self, event: PipeEvent) {
        let Some(sink) = self.sink.as_mut() else {
            log::warn!("{} has no event sink, {:?} dropped", self.id, event);
            return;
        };

        match event {
            PipeEvent::ReadActivated(id) => sink.read_activated(id),
            PipeEvent::WriteActivated(id) => sink.write_activated(id),
            PipeEvent::Hiccuped(id) => sink.hiccuped(id),
            PipeEvent::Terminated(id) => sink.terminated(id),
        }
    }
}

impl fmt::Debug for Pipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipe")
            .field("id", &self.id)
            .field("peer", &self.peer.id)
            .field("state", &self.state)
            .field("in_active", &self.in_active)
            .field("out_active", &self.out_active)
            .field("hwm", &self.hwm)
            .field("lwm", &self.lwm)
            .field("msgs_read", &self.msgs_read)
            .field("msgs_written", &self.msgs_written)
            .field("peers_msgs_read", &self.peers_msgs_read)
            .finish_non_exhaustive()
    }
}
