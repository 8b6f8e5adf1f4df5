//! Pipe CLI Demo
//!
//! Demonstrates the flow-controlled pipe: two consumers bound to one
//! producer, with the slow consumer detached halfway through the stream.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use flowpipe::{Chunk, Consumer, EventName, PipeBinding, Producer, Scheduler};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let scheduler = Scheduler::new();
    let producer = Producer::new(scheduler.clone(), "demo");

    println!("Enter text (empty line to start the flow):");

    let stdin = tokio::io::stdin();
    let reader = tokio::io::BufReader::new(stdin);
    let mut lines = tokio::io::AsyncBufReadExt::lines(reader);

    let mut total = 0usize;
    while let Ok(Some(line)) = lines.next_line().await {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            break;
        }
        producer.push(Chunk::from(trimmed))?;
        total += 1;
    }

    if total == 0 {
        println!("Nothing to pipe");
        return Ok(());
    }

    let fast = Arc::new(Consumer::new(scheduler.clone(), "fast"));
    let slow = Arc::new(Consumer::with_high_water(scheduler.clone(), "slow", 1));

    let fast_binding = PipeBinding::attach(&producer, fast.clone());
    let slow_binding = PipeBinding::attach(&producer, slow.clone());

    // Detach the slow consumer once half the chunks have been produced
    let half = total.div_ceil(2);
    let produced = Arc::new(AtomicUsize::new(0));
    {
        let produced = Arc::clone(&produced);
        let slow_binding = slow_binding.clone();
        producer
            .events()
            .add_listener(EventName::ChunkProduced, "demo.detach-at-half", move |_| {
                if produced.fetch_add(1, Ordering::SeqCst) + 1 == half {
                    println!("(detaching slow consumer after {half} chunks)");
                    slow_binding.detach();
                }
            });
    }

    let tasks = scheduler.run_until_idle();

    println!("Scheduler ran {tasks} tasks");
    println!(
        "fast: received {} chunks ({} bytes), attached={}",
        fast.received_count(),
        fast.bytes_received(),
        fast_binding.is_attached()
    );
    println!(
        "slow: received {} chunks ({} bytes), unbound={}",
        slow.received_count(),
        slow.bytes_received(),
        slow.is_unbound()
    );
    println!(
        "producer: ended={}, produced {} chunks",
        producer.is_ended(),
        produced.load(Ordering::SeqCst)
    );

    Ok(())
}
