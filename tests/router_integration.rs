//! Router end-to-end behavior
//!
//! Assembles pipelines from bootstrap declarations and checks wiring,
//! generator throughput, shutdown quiescence and wiring failure modes.

use tokio::time::{sleep, timeout, Duration};

use wishbone::actor::ActorState;
use wishbone::{
    ComponentRegistry, ConfigFile, LogStyle, MetricsInterval, QueueCapacity, Router,
    WishboneError,
};

const GENERATOR_TO_STDOUT: &str = r#"
modules:
  gen:
    module: wishbone.module.input.testevent
    arguments:
      interval: 0.01
      payload: test

  out:
    module: wishbone.module.output.stdout

routingtable:
  - gen.outbox -> out.inbox
"#;

fn build_router(config: &str) -> Router {
    let pipeline = ConfigFile::new(LogStyle::Stdout)
        .with_colorized_stdout(false)
        .parse(config)
        .unwrap();
    let mut router = Router::new(ComponentRegistry::with_builtins())
        .with_size(QueueCapacity::try_new(100).unwrap())
        .with_frequency(MetricsInterval::try_new(1).unwrap());
    router.initialize(&pipeline).unwrap();
    router
}

#[tokio::test]
async fn generator_feeds_the_output_module() {
    let router = build_router(GENERATOR_TO_STDOUT);
    router.start().await.unwrap();

    // The generator's outbox is the output module's inbox after adoption.
    let gen = router.pool().get("gen").unwrap();
    let shared = gen.actor().pool().get_queue("outbox").unwrap();
    timeout(Duration::from_secs(5), async {
        while shared.stats().out_total < 3 {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("fewer than 3 events flowed");

    // Nothing landed on any failed queue.
    for (_, module) in router.pool().list() {
        let failed = module.actor().pool().get_queue("failed").unwrap();
        assert_eq!(failed.stats().in_total, 0);
    }

    router.stop().await;
}

#[tokio::test]
async fn wiring_shares_queues_and_funnels_logs() {
    let router = build_router(GENERATOR_TO_STDOUT);

    let gen = router.pool().get("gen").unwrap();
    let out = router.pool().get("out").unwrap();
    let logs = router.pool().get("_logs").unwrap();

    // Queue adoption: one buffer on both sides of a connection.
    assert!(gen
        .actor()
        .pool()
        .get_queue("outbox")
        .unwrap()
        .same_queue(&out.actor().pool().get_queue("inbox").unwrap()));
    assert!(gen
        .actor()
        .pool()
        .get_queue("logs")
        .unwrap()
        .same_queue(&logs.actor().pool().get_queue("_gen").unwrap()));

    // Connected queues stop shedding.
    assert!(!gen.actor().pool().get_queue("outbox").unwrap().fall_through());
    // Unconnected service queues keep shedding.
    assert!(gen.actor().pool().get_queue("failed").unwrap().fall_through());

    // The log pipeline hangs off the funnel.
    let mut children = router.get_children("_logs");
    children.sort();
    assert_eq!(children, vec!["_logs_format", "_logs_stdout"]);
}

#[tokio::test]
async fn stop_quiesces_every_module_and_drains_logs() {
    let router = build_router(GENERATOR_TO_STDOUT);
    router.start().await.unwrap();
    sleep(Duration::from_millis(50)).await;
    router.stop().await;

    for (_, module) in router.pool().list() {
        assert_eq!(module.actor().state(), ActorState::Stopped);
        let logs = module.actor().pool().get_queue("logs").unwrap();
        assert_eq!(logs.size(), 0);
    }

    // The block barrier is released.
    timeout(Duration::from_secs(1), router.block())
        .await
        .expect("block barrier still held");
}

#[tokio::test]
async fn double_binding_an_endpoint_fails() {
    let router = build_router(GENERATOR_TO_STDOUT);
    // gen.outbox is already bound to out.inbox.
    assert!(matches!(
        router.connect_queue("gen.outbox", "out.inbox"),
        Err(WishboneError::QueueConnected { .. })
    ));
}

#[tokio::test]
async fn connecting_to_an_undeclared_queue_fails() {
    let router = build_router(GENERATOR_TO_STDOUT);
    assert!(matches!(
        router.connect_queue("out.success", "gen.sidedoor"),
        Err(WishboneError::QueueMissing { .. })
    ));
}

#[test_log::test(tokio::test)]
async fn unknown_components_stop_the_router_before_start() {
    let raw = r#"
modules:
  gen:
    module: wishbone.module.input.missing
routingtable: []
"#;
    let pipeline = ConfigFile::new(LogStyle::Stdout).parse(raw).unwrap();
    let mut router = Router::new(ComponentRegistry::with_builtins());
    assert!(matches!(
        router.initialize(&pipeline),
        Err(WishboneError::NoSuchComponent(_))
    ));
}

#[tokio::test]
async fn function_chains_run_before_the_consumer() {
    let raw = r#"
functions:
  stamp:
    function: wishbone.function.process.set
    arguments:
      data: stamped
      destination: tmp.mark

modules:
  gen:
    module: wishbone.module.input.testevent
    arguments:
      interval: 0.01

  out:
    module: wishbone.module.output.stdout
    functions:
      inbox:
        - stamp

routingtable:
  - gen.outbox -> out.inbox
"#;
    let router = build_router(raw);
    router.start().await.unwrap();

    // The stamped copy lands on out's success queue.
    let out = router.pool().get("out").unwrap();
    let success = out.actor().pool().get_queue("success").unwrap();
    let envelope = timeout(Duration::from_secs(5), success.get())
        .await
        .expect("no event consumed");
    assert_eq!(
        envelope.as_event().unwrap().get("tmp.mark").unwrap(),
        serde_json::json!("stamped")
    );

    router.stop().await;
}

#[tokio::test]
async fn metrics_flow_into_the_metrics_funnel() {
    let router = build_router(GENERATOR_TO_STDOUT);
    router.start().await.unwrap();

    let metrics = router.pool().get("_metrics").unwrap();
    let outbox = metrics.actor().pool().get_queue("outbox").unwrap();
    let envelope = timeout(Duration::from_secs(5), outbox.get())
        .await
        .expect("no metric produced");
    let name = envelope
        .as_event()
        .unwrap()
        .get("data.name")
        .unwrap()
        .as_str()
        .unwrap()
        .to_string();
    assert!(name.starts_with("module."), "{name}");
    assert!(name.contains(".queue."), "{name}");

    router.stop().await;
}
