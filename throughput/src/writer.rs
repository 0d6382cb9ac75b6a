use log::{debug, info, warn};
use tokio::sync::mpsc::UnboundedReceiver;
use xpipe::{MailboxReceiver, Msg, Pipe, PipeEvent, State};

pub struct WriterTask {
    pipe: Pipe,
    inbox: MailboxReceiver,
    events: UnboundedReceiver<PipeEvent>,
    payload: Vec<u8>,
    fragments: usize,
}

#[derive(Debug, Default)]
pub struct WriterStats {
    pub messages: u64,
    pub bytes: u64,
    pub stalls: u64,
}

impl WriterTask {
    pub fn new(
        pipe: Pipe,
        inbox: MailboxReceiver,
        events: UnboundedReceiver<PipeEvent>,
        payload_size: usize,
        fragments: usize,
    ) -> Self {
        Self {
            pipe,
            inbox,
            events,
            payload: vec![0xAB; payload_size],
            fragments: fragments.max(1),
        }
    }

    pub async fn run(mut self, messages: u64) -> WriterStats {
        let mut stats = WriterStats::default();

        loop {
            while stats.messages < messages && self.write_message() {
                stats.messages += 1;
                stats.bytes += (self.payload.len() * self.fragments) as u64;
            }
            self.pipe.flush();

            if stats.messages == messages {
                if self.pipe.state() == State::Active {
                    info!("Writer done after {} messages, terminating", stats.messages);
                    self.pipe.terminate(true);
                }
            } else {
                stats.stalls += 1;
            }

            let Some(envelope) = self.inbox.recv().await else {
                warn!("Writer mailbox closed before termination");
                break;
            };
            self.pipe.process_command(envelope.command);

            if self.drain_events() {
                break;
            }
        }

        stats
    }

    // All fragments of one message, or none of them.
    fn write_message(&mut self) -> bool {
        if !self.pipe.check_write() {
            return false;
        }

        for i in 0..self.fragments {
            let mut frame = Msg::from_slice(&self.payload);
            frame.set_more(i + 1 < self.fragments);
            if self.pipe.write(frame).is_err() {
                self.pipe.rollback();
                return false;
            }
        }
        true
    }

    fn drain_events(&mut self) -> bool {
        let mut terminated = false;
        while let Ok(event) = self.events.try_recv() {
            debug!("Writer event: {:?}", event);
            terminated |= matches!(event, PipeEvent::Terminated(_));
        }
        terminated
    }
}
