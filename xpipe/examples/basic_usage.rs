//! Two owners on plain threads exchanging messages over one pipe pair.
//!
//! Run with `RUST_LOG=debug` to watch the termination handshake.

use std::thread;

use log::info;
use tokio::sync::mpsc;
use xpipe::{mailbox, pipepair, Config, Msg, PipeEvent, PipeOptions};

const MESSAGES: u32 = 50;

fn main() -> xpipe::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let (mailbox_a, mut inbox_a) = mailbox();
    let (mailbox_b, mut inbox_b) = mailbox();
    let options = PipeOptions::default().with_hwm(8);
    let (mut producer, mut consumer) =
        pipepair([mailbox_a, mailbox_b], [options, options], &Config::default())?;

    let (events_tx, mut events) = mpsc::unbounded_channel();
    producer.set_event_sink(events_tx);

    let producer = thread::spawn(move || {
        let mut next = 0;
        loop {
            while next < MESSAGES && producer.check_write() {
                let header = Msg::from_slice(b"greeting").with_more();
                let body = Msg::new(format!("hello #{}", next).into_bytes());

                // Both frames go in together or not at all.
                if producer.write(header).is_err() || producer.write(body).is_err() {
                    producer.rollback();
                    break;
                }
                next += 1;
            }
            producer.flush();

            if next == MESSAGES && producer.state() == xpipe::State::Active {
                info!("All {} messages written, terminating", MESSAGES);
                producer.terminate(true);
            }

            let Some(envelope) = inbox_a.blocking_recv() else {
                return;
            };
            producer.process_command(envelope.command);

            while let Ok(event) = events.try_recv() {
                if let PipeEvent::Terminated(id) = event {
                    info!("Producer {} terminated", id);
                    return;
                }
            }
        }
    });

    let (events_tx, mut events) = mpsc::unbounded_channel();
    consumer.set_event_sink(events_tx);

    let consumer = thread::spawn(move || {
        let mut received = 0;
        loop {
            while let Some(frame) = consumer.read() {
                if !frame.has_more() {
                    info!("Received: {}", String::from_utf8_lossy(frame.data()));
                    received += 1;
                }
            }

            let Some(envelope) = inbox_b.blocking_recv() else {
                return received;
            };
            consumer.process_command(envelope.command);

            while let Ok(event) = events.try_recv() {
                if let PipeEvent::Terminated(id) = event {
                    info!("Consumer {} terminated", id);
                    return received;
                }
            }
        }
    });

    let _ = producer.join();
    let received = consumer.join().unwrap_or(0);
    info!("Consumer received {} messages", received);

    Ok(())
}
