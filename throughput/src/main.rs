mod reader;
mod writer;

use log::{error, info};
use std::time::Instant;
use tokio::sync::mpsc;
use xpipe::{mailbox, pipepair, Config, PipeOptions};

use crate::reader::ReaderTask;
use crate::writer::WriterTask;

const MESSAGES: u64 = 1_000_000;
const PAYLOAD_SIZE: usize = 64; // bytes per frame
const FRAGMENTS: usize = 2;
const HWM: u64 = 1000;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let (mailbox_w, inbox_w) = mailbox();
    let (mailbox_r, inbox_r) = mailbox();
    let options = PipeOptions::default().with_hwm(HWM);
    let (mut pipe_w, mut pipe_r) = pipepair(
        [mailbox_w, mailbox_r],
        [options, options],
        &Config::default(),
    )
    .expect("Failed to create pipe pair");

    info!(
        "Pipe pair {} -> {}, hwm {}, lwm {}",
        pipe_w.id(),
        pipe_r.id(),
        pipe_w.hwm(),
        pipe_r.lwm()
    );

    let (events_w, rx_w) = mpsc::unbounded_channel();
    let (events_r, rx_r) = mpsc::unbounded_channel();
    pipe_w.set_event_sink(events_w);
    pipe_r.set_event_sink(events_r);

    let writer = WriterTask::new(pipe_w, inbox_w, rx_w, PAYLOAD_SIZE, FRAGMENTS);
    let reader = ReaderTask::new(pipe_r, inbox_r, rx_r);

    info!(
        "Sending {} messages of {} x {} bytes...",
        MESSAGES, FRAGMENTS, PAYLOAD_SIZE
    );
    let start = Instant::now();
    let (sent, received) = futures::future::join(
        tokio::spawn(writer.run(MESSAGES)),
        tokio::spawn(reader.run()),
    )
    .await;
    let elapsed = start.elapsed();

    let (sent, received) = match (sent, received) {
        (Ok(sent), Ok(received)) => (sent, received),
        (sent, received) => {
            error!("Owner task failed: {:?} / {:?}", sent.err(), received.err());
            return;
        }
    };

    if sent.messages == received.messages && sent.bytes == received.bytes {
        info!("All messages delivered");
    } else {
        error!(
            "Delivery mismatch: sent {} ({} bytes), received {} ({} bytes)",
            sent.messages, sent.bytes, received.messages, received.bytes
        );
    }

    let secs = elapsed.as_secs_f64();
    info!("=== Transfer Complete ===");
    info!("Messages: {} ({} frames)", received.messages, received.frames);
    info!("Total received: {} KB", received.bytes / 1024);
    info!("Time: {:.2} seconds", secs);
    info!("Speed: {:.2} KB/s", (received.bytes as f64 / 1024.0) / secs);
    info!("Rate: {:.0} msg/s", received.messages as f64 / secs);
    info!(
        "Writer stalled {} times, reader woken {} times",
        sent.stalls, received.wakeups
    );
}
