//! Actor-level pipeline behavior
//!
//! Exercises the consumer contract across hand-wired actor chains: TTL hop
//! accounting, SPSC ordering, backpressure and fall-through shedding.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tokio::time::{sleep, timeout, Duration};

use wishbone::actor::Actor;
use wishbone::domain::EventTtl;
use wishbone::template::RenderedKwargs;
use wishbone::{ActorConfig, Envelope, Event, QueueCapacity};

fn forwarding_actor(name: &str, capacity: usize) -> Arc<Actor> {
    let config = ActorConfig::new(name).with_size(QueueCapacity::try_new(capacity).unwrap());
    let actor = Actor::new(config, Value::Null);
    actor.pool().create_queue("inbox");
    actor.pool().create_queue("outbox");
    let forwarder = {
        let actor = Arc::clone(&actor);
        move |envelope: Envelope, _kwargs: RenderedKwargs| {
            let actor = Arc::clone(&actor);
            async move {
                let outbox = actor.pool().get_queue("outbox").unwrap();
                actor.submit(envelope, &outbox).await;
                Ok(())
            }
        }
    };
    actor.register_consumer(forwarder, "inbox");
    actor
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    timeout(Duration::from_secs(5), async {
        while !check() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn ttl_expires_after_the_budgeted_hops() {
    let a = forwarding_actor("a", 10);
    let b = forwarding_actor("b", 10);

    let consumed = Arc::new(AtomicUsize::new(0));
    let config = ActorConfig::new("c").with_size(QueueCapacity::try_new(10).unwrap());
    let c = Actor::new(config, Value::Null);
    c.pool().create_queue("inbox");
    let counter = {
        let consumed = Arc::clone(&consumed);
        move |_envelope: Envelope, _kwargs: RenderedKwargs| {
            let consumed = Arc::clone(&consumed);
            async move {
                consumed.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
        }
    };
    c.register_consumer(counter, "inbox");

    a.connect("outbox", &b, "inbox").unwrap();
    b.connect("outbox", &c, "inbox").unwrap();
    for actor in [&a, &b, &c] {
        actor.transition_running().unwrap();
    }

    // Two hops of budget: consumed by a and b, expired at c.
    let event = Event::new(json!("hop")).with_ttl(EventTtl::new(2));
    a.pool()
        .get_queue("inbox")
        .unwrap()
        .try_put(event.into())
        .unwrap();

    let c_inbox = c.pool().get_queue("inbox").unwrap();
    wait_until(|| c_inbox.stats().out_total == 1).await;
    // Give c time to mis-handle it if it were going to.
    sleep(Duration::from_millis(50)).await;

    assert_eq!(consumed.load(Ordering::Relaxed), 0);
    assert_eq!(c.pool().get_queue("success").unwrap().stats().in_total, 0);

    // The expiry warning landed on c's logs queue.
    let logs = c.pool().get_queue("logs").unwrap();
    let mut warned = false;
    while let Some(envelope) = logs.try_get() {
        let data = envelope.as_event().unwrap().get("data").unwrap();
        if data["level"] == json!(4)
            && data["message"].as_str().unwrap_or_default().contains("dropped")
        {
            warned = true;
        }
    }
    assert!(warned, "no TTL warning logged");

    for actor in [&a, &b, &c] {
        actor.halt();
    }
}

#[tokio::test]
async fn spsc_order_is_preserved_end_to_end() {
    let producer = forwarding_actor("producer", 100);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Actor::new(ActorConfig::new("sink"), Value::Null);
    sink.pool().create_queue("inbox");
    let recorder = {
        let seen = Arc::clone(&seen);
        move |envelope: Envelope, _kwargs: RenderedKwargs| {
            let seen = Arc::clone(&seen);
            async move {
                let value = envelope.as_event().unwrap().get("data").unwrap();
                seen.lock().unwrap().push(value.as_u64().unwrap());
                Ok(())
            }
        }
    };
    sink.register_consumer(recorder, "inbox");

    producer.connect("outbox", &sink, "inbox").unwrap();
    producer.transition_running().unwrap();
    sink.transition_running().unwrap();

    let inbox = producer.pool().get_queue("inbox").unwrap();
    for i in 0..50u64 {
        producer.submit(Event::new(json!(i)).into(), &inbox).await;
    }

    wait_until(|| seen.lock().unwrap().len() == 50).await;
    let seen = seen.lock().unwrap();
    assert_eq!(*seen, (0..50).collect::<Vec<u64>>());

    producer.halt();
    sink.halt();
}

#[tokio::test]
async fn backpressure_delivers_everything_without_loss() {
    let producer = Actor::new(
        ActorConfig::new("pump").with_size(QueueCapacity::try_new(1).unwrap()),
        Value::Null,
    );
    producer.pool().create_queue("outbox");

    let processed = Arc::new(AtomicUsize::new(0));
    let slowpoke = Actor::new(
        ActorConfig::new("slowpoke").with_size(QueueCapacity::try_new(1).unwrap()),
        Value::Null,
    );
    slowpoke.pool().create_queue("inbox");
    let handler = {
        let processed = Arc::clone(&processed);
        move |_envelope: Envelope, _kwargs: RenderedKwargs| {
            let processed = Arc::clone(&processed);
            async move {
                sleep(Duration::from_millis(2)).await;
                processed.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
        }
    };
    slowpoke.register_consumer(handler, "inbox");

    producer.connect("outbox", &slowpoke, "inbox").unwrap();
    producer.transition_running().unwrap();
    slowpoke.transition_running().unwrap();

    let shared = producer.pool().get_queue("outbox").unwrap();
    for i in 0..20u64 {
        // submit never surfaces QueueFull; it waits for room instead.
        producer.submit(Event::new(json!(i)).into(), &shared).await;
    }

    wait_until(|| processed.load(Ordering::Relaxed) == 20).await;
    let stats = shared.stats();
    assert_eq!(stats.in_total, 20);
    assert_eq!(stats.out_total, 20);
    assert_eq!(stats.dropped_total, 0);

    producer.halt();
    slowpoke.halt();
}

#[tokio::test]
async fn fall_through_sheds_overflow_immediately() {
    let producer = Actor::new(
        ActorConfig::new("shedder").with_size(QueueCapacity::try_new(1).unwrap()),
        Value::Null,
    );
    let queue = producer.pool().create_queue("outbox");
    producer.transition_running().unwrap();

    // No consumer, fall-through stays on: the producer never blocks.
    let started = std::time::Instant::now();
    for i in 0..100u64 {
        producer.submit(Event::new(json!(i)).into(), &queue).await;
    }
    assert!(started.elapsed() < Duration::from_millis(500));

    let stats = queue.stats();
    assert_eq!(stats.size, 1);
    assert!(stats.dropped_total >= 90, "dropped {}", stats.dropped_total);

    producer.halt();
}

#[tokio::test]
async fn confirmation_waiter_releases_on_consumption() {
    let sink = Actor::new(ActorConfig::new("sink"), Value::Null);
    sink.pool().create_queue("inbox");
    sink.register_consumer(
        |_envelope: Envelope, _kwargs: RenderedKwargs| async move { Ok(()) },
        "inbox",
    );
    sink.transition_running().unwrap();

    let event = Event::new(json!("payload"))
        .with_confirmation(["sink".to_string()].into());
    let waiter = event.clone();
    sink.pool()
        .get_queue("inbox")
        .unwrap()
        .try_put(event.into())
        .unwrap();

    timeout(Duration::from_secs(5), waiter.confirmed())
        .await
        .expect("confirmation never released");

    sink.halt();
}
