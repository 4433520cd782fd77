//! Pooled command bus: executor handoff, shutdown and concurrency.

mod support;

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde_json::{json, Value};
use sourced_dispatch::executor::ThreadPoolExecutor;
use sourced_dispatch::{
    AsyncCommandBus, CommandBus, DispatchErrorKind, ExecutorService, HandlerError, Message,
    PoolConfig, UnitOfWork,
};
use support::recording::{CountingExecutorService, EventLog, RecordingExecutor, ResultSink};

fn echo_handler(uow: &mut UnitOfWork) -> Result<Value, HandlerError> {
    Ok(json!(uow.message().payload_str()))
}

// ============================================================================
// Shutdown
// ============================================================================

#[test]
fn shutdown_stops_executor_service_once() {
    let service = CountingExecutorService::new();
    let bus = AsyncCommandBus::with_executor_service(Arc::new(service.clone()));

    bus.shutdown();
    bus.shutdown();

    assert!(bus.is_shutdown());
    assert_eq!(service.shutdowns(), 1);
}

#[test]
fn shutdown_leaves_plain_executor_alone() {
    let log = EventLog::new();
    let executor = RecordingExecutor::new(log.clone());
    let bus = AsyncCommandBus::with_executor(Arc::new(executor.clone()));

    bus.shutdown();

    assert!(bus.is_shutdown());
    assert_eq!(executor.submitted(), 0);
    assert!(log.entries().is_empty());
}

#[test]
fn dispatch_after_shutdown_is_rejected() {
    let log = EventLog::new();
    let executor = RecordingExecutor::new(log.clone());
    let bus = AsyncCommandBus::with_executor(Arc::new(executor.clone()));
    bus.subscribe("echo", Arc::new(echo_handler));

    bus.shutdown();
    let sink = ResultSink::new();
    bus.dispatch(Message::with_string_payload("echo", "late"), sink.callback());

    let (_, result) = sink.next();
    assert_eq!(result.exception_kind(), Some(DispatchErrorKind::BusShutdown));
    assert_eq!(executor.submitted(), 0);
}

#[test]
fn executor_shut_down_behind_the_bus_reports_bus_shutdown() {
    let service = CountingExecutorService::new();
    let bus = AsyncCommandBus::with_executor_service(Arc::new(service.clone()));
    bus.subscribe("echo", Arc::new(echo_handler));

    // Someone else stopped the executor; the bus itself is still open.
    service.shutdown();
    let result = bus.dispatch_and_wait(Message::with_string_payload("echo", "x"));

    assert!(!bus.is_shutdown());
    assert_eq!(result.exception_kind(), Some(DispatchErrorKind::BusShutdown));
}

#[test]
fn missing_handler_never_reaches_executor() {
    let log = EventLog::new();
    let executor = RecordingExecutor::new(log.clone());
    let bus = AsyncCommandBus::with_executor(Arc::new(executor.clone()));

    let result = bus.dispatch_and_wait(Message::with_string_payload("unknown", ""));

    assert_eq!(result.exception_kind(), Some(DispatchErrorKind::NoHandler));
    assert_eq!(executor.submitted(), 0);
}

// ============================================================================
// Thread pool
// ============================================================================

#[test]
fn single_worker_preserves_submission_order() {
    support::init_tracing();
    let pool = Arc::new(ThreadPoolExecutor::new(1).unwrap());
    let bus = AsyncCommandBus::with_executor_service(pool.clone());

    let log = EventLog::new();
    let handler_log = log.clone();
    bus.subscribe(
        "step",
        Arc::new(move |uow: &mut UnitOfWork| -> Result<Value, HandlerError> {
            handler_log.push(uow.message().payload_str().unwrap_or_default());
            Ok(Value::Null)
        }),
    );

    let sink = ResultSink::new();
    for i in 0..20 {
        bus.dispatch(Message::with_string_payload("step", i.to_string()), sink.callback());
    }

    bus.shutdown();
    let stats = pool.await_termination();

    assert_eq!(stats.tasks_completed, 20);
    let expected: Vec<String> = (0..20).map(|i| i.to_string()).collect();
    assert_eq!(log.entries(), expected);
    assert_eq!(sink.drain().len(), 20);
}

#[test]
fn every_command_gets_exactly_one_callback() {
    let pool = Arc::new(ThreadPoolExecutor::builder().workers(4).thread_name("orders").build().unwrap());
    let bus = Arc::new(AsyncCommandBus::with_executor_service(pool.clone()));
    bus.subscribe("echo", Arc::new(echo_handler));

    let sink = ResultSink::new();
    let dispatchers: Vec<_> = (0..4)
        .map(|t| {
            let bus = Arc::clone(&bus);
            let sink = sink.clone();
            thread::spawn(move || {
                for i in 0..25 {
                    bus.dispatch(
                        Message::with_string_payload("echo", format!("{}-{}", t, i)),
                        sink.callback(),
                    );
                }
            })
        })
        .collect();
    for dispatcher in dispatchers {
        dispatcher.join().unwrap();
    }

    bus.shutdown();
    pool.await_termination();

    let results = sink.drain();
    assert_eq!(results.len(), 100);

    let mut seen: HashMap<String, usize> = HashMap::new();
    for (id, result) in &results {
        assert_eq!(result.correlation_id(), id);
        assert!(!result.is_exceptional());
        *seen.entry(id.clone()).or_default() += 1;
    }
    assert_eq!(seen.len(), 100);
    assert!(seen.values().all(|count| *count == 1));
}

#[test]
fn handler_panic_on_a_worker_becomes_a_result() {
    let pool = Arc::new(ThreadPoolExecutor::new(2).unwrap());
    let bus = AsyncCommandBus::with_executor_service(pool.clone());
    bus.subscribe(
        "explode",
        Arc::new(|_: &mut UnitOfWork| -> Result<Value, HandlerError> { panic!("worker bug") }),
    );
    bus.subscribe("echo", Arc::new(echo_handler));

    let failed = bus.dispatch_and_wait(Message::with_string_payload("explode", ""));
    assert!(matches!(
        failed.exception().and_then(|e| e.handler_error()),
        Some(HandlerError::Panicked(_))
    ));

    // Workers survive and keep serving.
    let ok = bus.dispatch_and_wait(Message::with_string_payload("echo", "still here"));
    assert_eq!(ok.payload(), Some(&json!("still here")));

    bus.shutdown();
    let stats = pool.await_termination();
    assert_eq!(stats.tasks_panicked, 0, "panics are contained by the unit of work");
}

#[test]
fn builder_defaults_to_a_thread_pool() {
    let bus = AsyncCommandBus::builder()
        .pool_config(PoolConfig {
            workers: 2,
            thread_name: "default-pool".into(),
        })
        .build()
        .unwrap();

    bus.subscribe(
        "whoami",
        Arc::new(|_: &mut UnitOfWork| -> Result<Value, HandlerError> {
            Ok(json!(thread::current().name().map(str::to_string)))
        }),
    );

    let result = bus
        .dispatch_and_wait_timeout(Message::with_string_payload("whoami", ""), Duration::from_secs(5))
        .unwrap();
    let name = result.payload().and_then(Value::as_str).unwrap_or_default().to_string();
    assert!(name.starts_with("default-pool-"), "ran on {:?}", name);

    bus.shutdown();
}

#[test]
fn zero_workers_is_a_configuration_error() {
    let built = AsyncCommandBus::builder()
        .pool_config(PoolConfig {
            workers: 0,
            ..PoolConfig::default()
        })
        .build();
    assert!(built.is_err());
}
