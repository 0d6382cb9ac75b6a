use log::{debug, warn};
use tokio::sync::mpsc::UnboundedReceiver;
use xpipe::{MailboxReceiver, Pipe, PipeEvent};

pub struct ReaderTask {
    pipe: Pipe,
    inbox: MailboxReceiver,
    events: UnboundedReceiver<PipeEvent>,
}

#[derive(Debug, Default)]
pub struct ReaderStats {
    pub messages: u64,
    pub frames: u64,
    pub bytes: u64,
    pub wakeups: u64,
}

impl ReaderTask {
    pub fn new(pipe: Pipe, inbox: MailboxReceiver, events: UnboundedReceiver<PipeEvent>) -> Self {
        Self {
            pipe,
            inbox,
            events,
        }
    }

    /// Reads until the writer's delimiter, then completes the handshake.
    pub async fn run(mut self) -> ReaderStats {
        let mut stats = ReaderStats::default();

        loop {
            while let Some(frame) = self.pipe.read() {
                stats.frames += 1;
                stats.bytes += frame.len() as u64;
                if !frame.has_more() {
                    stats.messages += 1;
                }
            }

            let Some(envelope) = self.inbox.recv().await else {
                warn!("Reader mailbox closed before termination");
                break;
            };
            self.pipe.process_command(envelope.command);

            let mut terminated = false;
            while let Ok(event) = self.events.try_recv() {
                debug!("Reader event: {:?}", event);
                match event {
                    PipeEvent::ReadActivated(_) => stats.wakeups += 1,
                    PipeEvent::Terminated(_) => terminated = true,
                    _ => {}
                }
            }
            if terminated {
                break;
            }
        }

        stats
    }
}
