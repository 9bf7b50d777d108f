use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};

use bach_protocol::{ConnectionRole, ConnectionState, InboundEvent, MessageKind};

use super::*;
use crate::transport::TransportEvent;

fn line(text: &str) -> InboundEvent {
    InboundEvent::parse(text, None).unwrap()
}

// ==================== Slot ====================

#[tokio::test]
async fn test_reply_fulfils_pending_request() {
    let correlator = Arc::new(Correlator::new());
    let slot = correlator
        .acquire("getnumvoices", Duration::from_secs(1), ReplyMatch::Next)
        .unwrap();
    assert!(!correlator.is_idle());

    assert!(correlator.offer(line("2")).is_none());
    let reply = slot.wait().await.unwrap();
    assert_eq!(reply.data, "2");
    assert!(correlator.is_idle());
}

#[tokio::test]
async fn test_second_acquire_is_busy() {
    let correlator = Arc::new(Correlator::new());
    let _slot = correlator
        .acquire("dump", Duration::from_secs(1), ReplyMatch::Next)
        .unwrap();

    let second = correlator.acquire("getnumvoices", Duration::from_secs(1), ReplyMatch::Next);
    assert!(matches!(second, Err(BridgeError::Busy)));
    assert!(matches!(correlator.ensure_idle(), Err(BridgeError::Busy)));
}

#[tokio::test]
async fn test_unrepresentable_deadline_is_rejected() {
    let correlator = Arc::new(Correlator::new());
    let result = correlator.acquire("dump", Duration::MAX, ReplyMatch::Next);

    assert!(matches!(result, Err(BridgeError::InvalidArguments { .. })));
    assert!(correlator.is_idle());
}

#[tokio::test]
async fn test_dropping_slot_releases_it() {
    let correlator = Arc::new(Correlator::new());
    let slot = correlator
        .acquire("dump", Duration::from_secs(1), ReplyMatch::Next)
        .unwrap();
    drop(slot);

    assert!(correlator.is_idle());
    assert!(correlator
        .acquire("dump", Duration::from_secs(1), ReplyMatch::Next)
        .is_ok());
}

#[tokio::test]
async fn test_line_without_pending_is_returned() {
    let correlator = Correlator::new();
    let event = correlator.offer(line("score saved")).unwrap();
    assert_eq!(event.data, "score saved");
}

#[tokio::test]
async fn test_timeout_then_late_line_is_not_a_reply() {
    let correlator = Arc::new(Correlator::new());
    let slot = correlator
        .acquire("getnumvoices", Duration::from_millis(100), ReplyMatch::Next)
        .unwrap();

    let started = tokio::time::Instant::now();
    let err = slot.wait().await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, BridgeError::TimedOut { millis: 100 }));
    assert!(elapsed >= Duration::from_millis(100));
    assert!(correlator.is_idle());

    // Late reply goes to the observer, and the next request is clean
    assert!(correlator.offer(line("2")).is_some());
    let next = correlator
        .acquire("getnumchords", Duration::from_secs(1), ReplyMatch::Next)
        .unwrap();
    assert!(correlator.offer(line("5")).is_none());
    assert_eq!(next.wait().await.unwrap().data, "5");
}

#[tokio::test]
async fn test_expired_request_is_cleared_by_offer() {
    let correlator = Arc::new(Correlator::new());
    let slot = correlator
        .acquire("dump", Duration::from_millis(20), ReplyMatch::Next)
        .unwrap();

    // Past the deadline but the waiter has not run yet
    std::thread::sleep(Duration::from_millis(40));
    assert!(correlator.offer(line("[1 2 3]")).is_some());
    assert!(correlator.is_idle());
    assert!(matches!(
        slot.wait().await,
        Err(BridgeError::TimedOut { .. })
    ));
}

#[tokio::test]
async fn test_kind_matcher_skips_other_lines() {
    let correlator = Arc::new(Correlator::new());
    let slot = correlator
        .acquire("dump", Duration::from_secs(1), ReplyMatch::Kind(MessageKind::Llll))
        .unwrap();

    let skipped = correlator.offer(line("playing")).unwrap();
    assert_eq!(skipped.kind, MessageKind::Info);
    assert!(!correlator.is_idle());

    assert!(correlator.offer(line("roll [ [ 0. [ 6000. 500. 100 0 ] 0 ] 0 ]")).is_none());
    assert_eq!(slot.wait().await.unwrap().kind, MessageKind::Llll);
}

#[tokio::test]
async fn test_fail_pending_delivers_error_once() {
    let correlator = Arc::new(Correlator::new());
    let slot = correlator
        .acquire("dump", Duration::from_secs(5), ReplyMatch::Next)
        .unwrap();

    assert!(correlator.fail_pending(BridgeError::TransportLost));
    assert!(!correlator.fail_pending(BridgeError::TransportLost));

    // A line after the failure is not a reply
    assert!(correlator.offer(line("2")).is_some());
    assert!(matches!(slot.wait().await, Err(BridgeError::TransportLost)));
}

#[tokio::test]
async fn test_pending_info() {
    let correlator = Arc::new(Correlator::new());
    assert!(correlator.pending().is_none());
    let slot = correlator
        .acquire("getlength", Duration::from_secs(1), ReplyMatch::Next)
        .unwrap();

    let info = correlator.pending().unwrap();
    assert_eq!(info.command, "getlength");
    assert_eq!(info.token, slot.token());
}

#[tokio::test]
async fn test_each_request_resolves_exactly_once() {
    let correlator = Arc::new(Correlator::new());

    for i in 0..20u64 {
        let slot = correlator
            .acquire("getnumnotes", Duration::from_millis(30), ReplyMatch::Next)
            .unwrap();
        let responder = Arc::clone(&correlator);
        let reply = tokio::spawn(async move {
            if i % 2 == 0 {
                responder.offer(InboundEvent::parse(&i.to_string(), None).unwrap())
            } else {
                None
            }
        });

        let result = slot.wait().await;
        let leftover = reply.await.unwrap();
        match result {
            Ok(event) => {
                assert_eq!(event.data, i.to_string());
                assert!(leftover.is_none());
            }
            Err(BridgeError::TimedOut { .. }) => assert!(i % 2 == 1 || leftover.is_some()),
            Err(other) => panic!("unexpected error: {other}"),
        }
        assert!(correlator.is_idle());
    }
}

// ==================== Router ====================

struct RouterFixture {
    correlator: Arc<Correlator>,
    events: mpsc::Sender<TransportEvent>,
    observer: broadcast::Receiver<SessionEvent>,
    outbound: watch::Sender<ConnectionState>,
}

/// Outbound starts out down, as after a drop
fn start_router() -> RouterFixture {
    let correlator = Arc::new(Correlator::new());
    let (events_tx, events_rx) = mpsc::channel(16);
    let (observers, observer) = broadcast::channel(OBSERVER_CHANNEL_CAPACITY);
    let (outbound, outbound_rx) = watch::channel(ConnectionState::Disconnected);
    tokio::spawn(run_router(events_rx, Arc::clone(&correlator), observers, outbound_rx));
    RouterFixture {
        correlator,
        events: events_tx,
        observer,
        outbound,
    }
}

#[tokio::test]
async fn test_router_routes_reply_to_pending() {
    let mut fixture = start_router();
    let slot = fixture
        .correlator
        .acquire("getnumvoices", Duration::from_secs(1), ReplyMatch::Next)
        .unwrap();

    fixture.events.send(TransportEvent::Line(line("2"))).await.unwrap();
    assert_eq!(slot.wait().await.unwrap().data, "2");

    // Nothing was forwarded for the consumed line
    fixture.events.send(TransportEvent::Line(line("hello"))).await.unwrap();
    match fixture.observer.recv().await.unwrap() {
        SessionEvent::Unsolicited(event) => assert_eq!(event.data, "hello"),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn test_router_fails_pending_on_outbound_drop() {
    let mut fixture = start_router();
    let slot = fixture
        .correlator
        .acquire("dump", Duration::from_secs(5), ReplyMatch::Next)
        .unwrap();

    fixture
        .events
        .send(TransportEvent::StateChanged {
            role: ConnectionRole::Outbound,
            state: ConnectionState::Disconnected,
        })
        .await
        .unwrap();

    assert!(matches!(slot.wait().await, Err(BridgeError::TransportLost)));
    assert!(matches!(
        fixture.observer.recv().await.unwrap(),
        SessionEvent::ConnectionChanged {
            role: ConnectionRole::Outbound,
            state: ConnectionState::Disconnected
        }
    ));
}

#[tokio::test]
async fn test_router_ignores_drop_already_followed_by_reconnect() {
    let mut fixture = start_router();
    // The link came back before the router saw the queued drop
    fixture.outbound.send_replace(ConnectionState::Connected);
    let slot = fixture
        .correlator
        .acquire("dump", Duration::from_secs(5), ReplyMatch::Next)
        .unwrap();

    fixture
        .events
        .send(TransportEvent::StateChanged {
            role: ConnectionRole::Outbound,
            state: ConnectionState::Disconnected,
        })
        .await
        .unwrap();
    let _ = fixture.observer.recv().await.unwrap();
    assert!(!fixture.correlator.is_idle());

    fixture.events.send(TransportEvent::Line(line("[1]"))).await.unwrap();
    assert_eq!(slot.wait().await.unwrap().data, "[1]");
}

#[tokio::test]
async fn test_router_inbound_drop_keeps_pending() {
    let mut fixture = start_router();
    let slot = fixture
        .correlator
        .acquire("dump", Duration::from_secs(5), ReplyMatch::Next)
        .unwrap();

    fixture
        .events
        .send(TransportEvent::StateChanged {
            role: ConnectionRole::Inbound,
            state: ConnectionState::Listening,
        })
        .await
        .unwrap();
    let _ = fixture.observer.recv().await.unwrap();
    assert!(!fixture.correlator.is_idle());

    // Host reconnected on the inbound side and answers
    fixture.events.send(TransportEvent::Line(line("[1]"))).await.unwrap();
    assert_eq!(slot.wait().await.unwrap().data, "[1]");
}
