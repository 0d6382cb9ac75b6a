//! Termination state machine of a pipe endpoint.

/// State of a pipe endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Normal operation, no termination under way.
    Active,

    /// The delimiter was read before the peer asked to terminate.
    Delimited,

    /// The peer asked to terminate; pending inbound messages are still read.
    Pending,

    /// All pending messages handled, the ack was sent; waiting for the peer's ack.
    Terminating,

    /// Termination was requested locally; waiting for the peer's ack.
    Terminated,

    /// Both sides requested termination; waiting for the peer's ack.
    DoubleTerminated,
}

/// Input to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Event {
    /// The delimiter was read from the inbound queue.
    DelimiterRead,

    /// The owner called `terminate`.
    Terminate { delay: bool },

    /// The peer's termination request arrived.
    PeerTerm { delay: bool },

    /// The peer's termination acknowledgment arrived.
    PeerTermAck,
}

/// What the pipe has to do after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Action {
    /// State change only.
    None,

    /// Duplicate termination request; do nothing at all.
    Ignore,

    /// Ask the peer to terminate.
    SendTerm,

    /// Drop the outbound queue and acknowledge the peer's request.
    ReleaseAndAck,

    /// Tear the pipe down, acknowledging the peer first when `ack` is set.
    Deallocate { ack: bool },
}

impl State {
    /// Applies `event`.
    ///
    /// # Panics
    ///
    /// Panics on a (state, event) pair the handshake can never produce. That
    /// only happens when the two ends disagree about the protocol.
    pub(crate) fn on(self, event: Event) -> (State, Action) {
        use State::*;

        match (self, event) {
            (Active, Event::DelimiterRead) => (Delimited, Action::None),
            (Pending, Event::DelimiterRead) => (Terminating, Action::ReleaseAndAck),

            (Terminated | DoubleTerminated | Terminating, Event::Terminate { .. }) => {
                (self, Action::Ignore)
            }
            (Active | Delimited, Event::Terminate { .. }) => (Terminated, Action::SendTerm),
            (Pending, Event::Terminate { delay: false }) => (Terminating, Action::ReleaseAndAck),
            (Pending, Event::Terminate { delay: true }) => (Pending, Action::None),

            (Active, Event::PeerTerm { delay: true }) => (Pending, Action::None),
            (Active | Delimited, Event::PeerTerm { .. }) => (Terminating, Action::ReleaseAndAck),
            (Terminated, Event::PeerTerm { .. }) => (DoubleTerminated, Action::ReleaseAndAck),

            (Terminated, Event::PeerTermAck) => (Terminating, Action::Deallocate { ack: true }),
            (Terminating | DoubleTerminated, Event::PeerTermAck) => {
                (self, Action::Deallocate { ack: false })
            }

            (state, event) => panic!("pipe protocol violation: {:?} in state {:?}", event, state),
        }
    }

    /// Returns true while inbound messages may still be handed to the owner.
    pub fn is_readable(self) -> bool {
        matches!(self, State::Active | State::Pending)
    }
}
