use flowpipe::{
    Capacity, Chunk, Consume, Consumer, EventChannel, EventName, EventPayload, PipeBinding,
    Producer, Scheduler,
};
use std::sync::{Arc, Mutex};

fn text(payload: &EventPayload) -> String {
    let chunk = payload.chunk().expect("expected a chunk payload");
    String::from_utf8_lossy(chunk.as_bytes()).into_owned()
}

fn labeled_producer(scheduler: &Scheduler, count: usize) -> Producer {
    let producer = Producer::new(scheduler.clone(), "src");
    for i in 1..=count {
        producer.push(Chunk::from(format!("{i}"))).unwrap();
    }
    producer
}

// Thirty labeled chunks, one bound consumer, detach after the tenth
// produced chunk. The binding's consumer stops at ten; the independent
// observer and the diagnostic counter both see all thirty.
#[test]
fn test_detach_after_ten_of_thirty_chunks() {
    let scheduler = Scheduler::new();
    let producer = labeled_producer(&scheduler, 30);

    let data_events = Arc::new(Mutex::new(0));
    let data_events_clone = data_events.clone();
    producer.add_data_listener("independent-counter", move |_| {
        *data_events_clone.lock().unwrap() += 1;
    });

    let consumer = Arc::new(Consumer::new(scheduler.clone(), "dest"));
    let binding = PipeBinding::attach(&producer, consumer.clone());

    let produced = Arc::new(Mutex::new(0));
    {
        let produced = produced.clone();
        let binding = binding.clone();
        producer
            .events()
            .add_listener(EventName::ChunkProduced, "detach-at-10", move |_| {
                let mut produced = produced.lock().unwrap();
                *produced += 1;
                if *produced == 10 {
                    binding.detach();
                }
            });
    }

    scheduler.run_until_idle();

    // The binding stopped forwarding at the detach point
    assert_eq!(consumer.received_count(), 10);
    assert!(consumer.is_unbound());
    assert!(!binding.is_attached());

    // The independent observer was not disturbed
    assert_eq!(producer.data_listener_count(), 1);
    assert_eq!(*data_events.lock().unwrap(), 30);
    assert_eq!(*produced.lock().unwrap(), 30);
    assert!(producer.is_ended());
}

#[test]
fn test_detach_is_idempotent() {
    let scheduler = Scheduler::new();
    let producer = labeled_producer(&scheduler, 3);
    let consumer = Arc::new(Consumer::new(scheduler.clone(), "dest"));
    let binding = PipeBinding::attach(&producer, consumer.clone());

    assert!(binding.detach());
    assert!(!binding.detach());

    scheduler.run_until_idle();
    assert!(!binding.detach());

    // Same observable effect as a single detach
    assert_eq!(consumer.received_count(), 0);
    assert!(consumer.is_unbound());
    assert!(producer.is_ended());
}

#[test]
fn test_detach_leaves_other_observers_registered() {
    let scheduler = Scheduler::new();
    let producer = labeled_producer(&scheduler, 5);

    producer.add_data_listener("observer-a", |_| {});
    producer.add_data_listener("observer-b", |_| {});

    let consumer = Arc::new(Consumer::new(scheduler.clone(), "dest"));
    let binding = PipeBinding::attach(&producer, consumer);
    assert_eq!(producer.data_listener_count(), 3);

    binding.detach();
    assert_eq!(producer.data_listener_count(), 2);

    binding.detach();
    assert_eq!(producer.data_listener_count(), 2);
}

#[test]
fn test_end_of_data_is_not_an_unbind() {
    let scheduler = Scheduler::new();
    let producer = labeled_producer(&scheduler, 4);
    let consumer = Arc::new(Consumer::new(scheduler.clone(), "dest"));
    let binding = PipeBinding::attach(&producer, consumer.clone());

    scheduler.run_until_idle();

    assert_eq!(consumer.received_count(), 4);
    assert!(producer.is_ended());
    assert!(!binding.is_attached());
    assert!(!consumer.is_unbound());

    // The binding removed its own listeners on end
    assert_eq!(producer.data_listener_count(), 0);
    assert_eq!(producer.events().listener_count(EventName::End), 0);
}

#[test]
fn test_consumer_sees_full_ordered_sequence() {
    let scheduler = Scheduler::new();
    let producer = labeled_producer(&scheduler, 6);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    producer.add_data_listener("order-check", move |payload| {
        seen_clone.lock().unwrap().push(text(payload));
    });

    let consumer = Arc::new(Consumer::new(scheduler.clone(), "dest"));
    let _binding = PipeBinding::attach(&producer, consumer.clone());

    scheduler.run_until_idle();

    assert_eq!(
        *seen.lock().unwrap(),
        vec!["1", "2", "3", "4", "5", "6"]
    );
    assert_eq!(consumer.received_count(), 6);
}

// A saturating consumer throttles the producer, but every chunk still
// arrives exactly once and in order across the pause/resume cycles.
#[test]
fn test_backpressure_pauses_and_resumes_without_loss() {
    let scheduler = Scheduler::new();
    let producer = labeled_producer(&scheduler, 8);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    producer.add_data_listener("order-check", move |payload| {
        seen_clone.lock().unwrap().push(text(payload));
    });

    let consumer = Arc::new(Consumer::with_high_water(scheduler.clone(), "slow", 1));
    let binding = PipeBinding::attach(&producer, consumer.clone());

    scheduler.run_until_idle();

    let expected: Vec<String> = (1..=8).map(|i| i.to_string()).collect();
    assert_eq!(*seen.lock().unwrap(), expected);
    assert_eq!(consumer.received_count(), 8);
    assert_eq!(consumer.in_flight(), 0);
    assert!(producer.is_ended());
    assert!(!binding.is_attached());
    assert!(!consumer.is_unbound());
}

#[test]
fn test_two_bindings_one_detached_midstream() {
    let scheduler = Scheduler::new();
    let producer = labeled_producer(&scheduler, 12);

    let keeper = Arc::new(Consumer::new(scheduler.clone(), "keeper"));
    let leaver = Arc::new(Consumer::new(scheduler.clone(), "leaver"));
    let keeper_binding = PipeBinding::attach(&producer, keeper.clone());
    let leaver_binding = PipeBinding::attach(&producer, leaver.clone());

    let produced = Arc::new(Mutex::new(0));
    {
        let produced = produced.clone();
        let leaver_binding = leaver_binding.clone();
        producer
            .events()
            .add_listener(EventName::ChunkProduced, "detach-at-5", move |_| {
                let mut produced = produced.lock().unwrap();
                *produced += 1;
                if *produced == 5 {
                    leaver_binding.detach();
                }
            });
    }

    scheduler.run_until_idle();

    assert_eq!(keeper.received_count(), 12);
    assert!(!keeper.is_unbound());
    assert_eq!(leaver.received_count(), 5);
    assert!(leaver.is_unbound());
    assert!(!keeper_binding.is_attached());
    assert!(producer.is_ended());
}

// Consumer that detaches its own binding from inside accept(), while the
// delivery that triggered it is still on the stack.
struct SelfDetaching {
    events: EventChannel,
    received: Mutex<u64>,
    unbound: Mutex<bool>,
    binding: Mutex<Option<PipeBinding>>,
    detach_at: u64,
}

impl SelfDetaching {
    fn new(detach_at: u64) -> Self {
        Self {
            events: EventChannel::new(),
            received: Mutex::new(0),
            unbound: Mutex::new(false),
            binding: Mutex::new(None),
            detach_at,
        }
    }
}

impl Consume for SelfDetaching {
    fn accept(&self, _chunk: &Chunk) -> Capacity {
        let received = {
            let mut received = self.received.lock().unwrap();
            *received += 1;
            *received
        };
        if received == self.detach_at {
            let binding = self.binding.lock().unwrap().take();
            if let Some(binding) = binding {
                binding.detach();
            }
        }
        Capacity::Ready
    }

    fn on_unbind(&self) {
        *self.unbound.lock().unwrap() = true;
    }

    fn events(&self) -> &EventChannel {
        &self.events
    }
}

#[test]
fn test_binding_can_detach_itself_during_delivery() {
    let scheduler = Scheduler::new();
    let producer = labeled_producer(&scheduler, 7);

    let data_events = Arc::new(Mutex::new(0));
    let data_events_clone = data_events.clone();
    producer.add_data_listener("independent-counter", move |_| {
        *data_events_clone.lock().unwrap() += 1;
    });

    let consumer = Arc::new(SelfDetaching::new(3));
    let binding = PipeBinding::attach(&producer, consumer.clone());
    *consumer.binding.lock().unwrap() = Some(binding.clone());

    scheduler.run_until_idle();

    assert_eq!(*consumer.received.lock().unwrap(), 3);
    assert!(*consumer.unbound.lock().unwrap());
    assert!(!binding.is_attached());

    // The rest of the stream still reached the independent observer
    assert_eq!(*data_events.lock().unwrap(), 7);
    assert!(producer.is_ended());
}

// Detaching a binding whose saturation paused the producer must not
// strand the producer's other observers behind that pause.
#[test]
fn test_detach_while_paused_resumes_flow_for_others() {
    let scheduler = Scheduler::new();
    let producer = labeled_producer(&scheduler, 6);

    let data_events = Arc::new(Mutex::new(0));
    let data_events_clone = data_events.clone();
    producer.add_data_listener("independent-counter", move |_| {
        *data_events_clone.lock().unwrap() += 1;
    });

    let consumer = Arc::new(Consumer::with_high_water(scheduler.clone(), "slow", 1));
    let binding = PipeBinding::attach(&producer, consumer.clone());

    let produced = Arc::new(Mutex::new(0));
    {
        let produced = produced.clone();
        let binding = binding.clone();
        producer
            .events()
            .add_listener(EventName::ChunkProduced, "detach-at-2", move |_| {
                let mut produced = produced.lock().unwrap();
                *produced += 1;
                if *produced == 2 {
                    // The consumer saturated on this chunk and paused the
                    // producer; detaching must undo that pause.
                    binding.detach();
                }
            });
    }

    scheduler.run_until_idle();

    assert_eq!(consumer.received_count(), 2);
    assert!(consumer.is_unbound());
    assert_eq!(*data_events.lock().unwrap(), 6);
    assert!(producer.is_ended());
}
