//! Fan-out example: one producer, several consumers reading the same stream.
//!
//! Run with: `cargo run --example fan_out`

use hyperloop_rs::{Channel, Config};
use std::thread;
use std::time::Instant;

const CONSUMERS: usize = 4;
const MESSAGES: u64 = 5_000_000;

fn main() {
    let config = Config::default()
        .with_capacity(4096)
        .with_max_consumers(CONSUMERS)
        .with_metrics(true);
    let channel = Channel::with_config(config).expect("valid config");

    // Register before producing so every consumer sees the whole stream
    let consumers: Vec<_> = (0..CONSUMERS)
        .map(|_| channel.create_consumer().expect("free cursor slot"))
        .collect();

    let start = Instant::now();
    thread::scope(|s| {
        for mut consumer in consumers {
            s.spawn(move || {
                let mut checksum = 0u64;
                for _ in 0..MESSAGES {
                    checksum = checksum.wrapping_add(consumer.receive_blocking());
                }
                println!("consumer {}: checksum {}", consumer.id(), checksum);
            });
        }

        for v in 0..MESSAGES {
            channel.send_to(v);
        }
    });
    let elapsed = start.elapsed();

    let metrics = channel.metrics();
    println!(
        "{} messages x {} consumers in {:?} ({:.1} M msg/s per consumer)",
        MESSAGES,
        CONSUMERS,
        elapsed,
        MESSAGES as f64 / elapsed.as_secs_f64() / 1e6
    );
    println!(
        "full rejections: {}, min cursor rescans: {}",
        metrics.full_rejections, metrics.min_cursor_refreshes
    );
}
