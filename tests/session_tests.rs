mod common;

use common::{new_log, snapshot, Call, FailingSigner, FakeTransport};
use fxstream::client::{subscription, SUBSCRIBE_EVENT};
use fxstream::core::kernel::{HmacSigner, Signer, TransportEvent};
use fxstream::{CloseReason, SessionManager, SessionState, StreamError, SubscriptionRequest};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const URL: &str = "https://stream.example.test";
const NAMESPACE: &str = "/streaming";

fn test_signer() -> Arc<dyn Signer> {
    Arc::new(
        HmacSigner::new("api_key".to_string(), "c2VjcmV0", "passphrase".to_string())
            .unwrap()
            .with_clock(Arc::new(fxstream::core::kernel::FixedClock(Duration::new(
                1_700_000_000,
                123_456_000,
            )))),
    )
}

fn requests(pairs: &[&str]) -> Arc<[SubscriptionRequest]> {
    subscription::build(pairs, &[30]).unwrap().into()
}

#[cfg(test)]
mod session_tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribes_in_order_on_connect() {
        let log = new_log();
        let requests = requests(&["BTC/USD", "ETH/USD"]);
        let transport = FakeTransport::scripted(
            log.clone(),
            vec![
                TransportEvent::Connected,
                TransportEvent::Disconnected("io server disconnect".to_string()),
            ],
        );

        let summary = SessionManager::new(transport, test_signer(), URL, NAMESPACE, requests.clone())
            .connect(CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.subscriptions_sent, 2);
        assert_eq!(summary.events_received, 2);
        assert!(summary.reached_open);
        assert_eq!(
            summary.close_reason,
            CloseReason::Disconnected("io server disconnect".to_string())
        );

        let calls = snapshot(&log);
        assert_eq!(calls.len(), 6, "unexpected call sequence: {:?}", calls);
        assert!(matches!(
            &calls[0],
            Call::Connect { url, namespace, reconnect: false, .. } if url == URL && namespace == NAMESPACE
        ));
        assert_eq!(calls[1], Call::Poll);
        // Both subscriptions go out before the next event is read
        for (call, request) in calls[2..4].iter().zip(requests.iter()) {
            assert_eq!(
                *call,
                Call::Emit {
                    event: SUBSCRIBE_EVENT.to_string(),
                    payload: serde_json::to_value(request).unwrap(),
                }
            );
        }
        assert_eq!(calls[4], Call::Poll);
        assert_eq!(calls[5], Call::Close);
        println!("✅ Session summary: {:?}", summary);
    }

    #[tokio::test]
    async fn test_subscription_payload_on_the_wire() {
        let log = new_log();
        let requests = requests(&["ETH/USD"]);
        let transport = FakeTransport::scripted(log.clone(), vec![TransportEvent::Connected]);

        SessionManager::new(transport, test_signer(), URL, NAMESPACE, requests.clone())
            .connect(CancellationToken::new())
            .await
            .unwrap();

        let payload = snapshot(&log)
            .into_iter()
            .find_map(|call| match call {
                Call::Emit { payload, .. } => Some(payload),
                _ => None,
            })
            .unwrap();
        assert_eq!(
            payload,
            json!({
                "token_pair": {"base_token": "ETH", "quote_token": "USD"},
                "quantity": [30],
                "quantity_token": "ETH",
                "client_request_id": requests[0].request_id.to_string(),
                "echo_id": true
            })
        );
    }

    #[tokio::test]
    async fn test_handshake_carries_signed_headers() {
        let log = new_log();
        let transport = FakeTransport::scripted(log.clone(), vec![]);

        SessionManager::new(transport, test_signer(), URL, NAMESPACE, requests(&["BTC/USD"]))
            .connect(CancellationToken::new())
            .await
            .unwrap();

        match &snapshot(&log)[0] {
            Call::Connect {
                timestamp,
                signature,
                ..
            } => {
                assert_eq!(timestamp, "1700000000.123456");
                assert_eq!(signature, "yWTRYWMGkRugPrsUC4oqZkEq6DLtbBxUZvpifLJiEIY=");
            }
            other => panic!("expected connect, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_resubscribes_on_every_connect() {
        let log = new_log();
        let transport = FakeTransport::scripted(
            log.clone(),
            vec![
                TransportEvent::Connected,
                TransportEvent::Stream(json!({"bids": []})),
                TransportEvent::Connected,
            ],
        );

        let summary =
            SessionManager::new(transport, test_signer(), URL, NAMESPACE, requests(&["BTC/USD"]))
                .connect(CancellationToken::new())
                .await
                .unwrap();

        assert_eq!(summary.subscriptions_sent, 2);
        assert_eq!(summary.events_received, 3);
        assert_eq!(summary.close_reason, CloseReason::StreamEnded);
    }

    #[tokio::test]
    async fn test_remote_errors_do_not_end_session() {
        let log = new_log();
        let transport = FakeTransport::scripted(
            log.clone(),
            vec![
                TransportEvent::Error(json!("boom")),
                TransportEvent::Response(json!({"status": "success"})),
                TransportEvent::Other {
                    event: "heartbeat".to_string(),
                    payload: json!(null),
                },
                TransportEvent::Disconnected("transport close".to_string()),
            ],
        );

        let summary =
            SessionManager::new(transport, test_signer(), URL, NAMESPACE, requests(&["BTC/USD"]))
                .connect(CancellationToken::new())
                .await
                .unwrap();

        assert_eq!(summary.events_received, 4);
        assert_eq!(summary.subscriptions_sent, 0);
        assert!(!summary.reached_open);
    }

    #[tokio::test]
    async fn test_connect_error_closes_session() {
        let log = new_log();
        // Sender stays alive: the transport itself never ends the stream
        let (transport, tx) = FakeTransport::new(log.clone());
        tx.send(TransportEvent::ConnectError(json!({"message": "unauthorized"})))
            .unwrap();

        let handle =
            SessionManager::new(transport, test_signer(), URL, NAMESPACE, requests(&["BTC/USD"]))
                .open(CancellationToken::new())
                .await
                .unwrap();
        let state = handle.watch_state();
        let summary = handle.wait_closed().await.unwrap();

        assert_eq!(
            summary.close_reason,
            CloseReason::ConnectRefused(r#"{"message":"unauthorized"}"#.to_string())
        );
        assert!(!summary.reached_open);
        assert_eq!(*state.borrow(), SessionState::Closed);
        assert_eq!(snapshot(&log).last(), Some(&Call::Close));
        drop(tx);
    }

    #[tokio::test]
    async fn test_stops_subscribing_after_failed_send() {
        let log = new_log();
        let transport = FakeTransport::scripted(
            log.clone(),
            vec![
                TransportEvent::Connected,
                TransportEvent::Disconnected("transport error".to_string()),
            ],
        )
        .failing_emit_at(1);

        let summary = SessionManager::new(
            transport,
            test_signer(),
            URL,
            NAMESPACE,
            requests(&["BTC/USD", "ETH/USD", "SOL/USD"]),
        )
        .connect(CancellationToken::new())
        .await
        .unwrap();

        assert_eq!(summary.subscriptions_sent, 1);
        let emits = snapshot(&log)
            .iter()
            .filter(|call| matches!(call, Call::Emit { .. }))
            .count();
        assert_eq!(emits, 1);
    }

    #[tokio::test]
    async fn test_signing_failure_happens_before_io() {
        let log = new_log();
        let (transport, _tx) = FakeTransport::new(log.clone());

        let result = SessionManager::new(
            transport,
            Arc::new(FailingSigner),
            URL,
            NAMESPACE,
            requests(&["BTC/USD"]),
        )
        .open(CancellationToken::new())
        .await;

        assert!(matches!(result, Err(StreamError::CryptoError(_))));
        assert!(snapshot(&log).is_empty());
    }

    #[tokio::test]
    async fn test_rejected_handshake_is_reported() {
        let log = new_log();
        let (transport, _tx) = FakeTransport::new(log.clone());
        let transport =
            transport.failing_connect(StreamError::AuthRejected("HTTP 401".to_string()));

        let result = SessionManager::new(transport, test_signer(), URL, NAMESPACE, requests(&["BTC/USD"]))
            .connect(CancellationToken::new())
            .await;

        let err = result.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(snapshot(&log).len(), 1);
    }

    #[tokio::test]
    async fn test_close_handle_ends_session() {
        let log = new_log();
        let (transport, tx) = FakeTransport::new(log.clone());
        tx.send(TransportEvent::Connected).unwrap();

        let handle =
            SessionManager::new(transport, test_signer(), URL, NAMESPACE, requests(&["BTC/USD"]))
                .open(CancellationToken::new())
                .await
                .unwrap();

        let mut state = handle.watch_state();
        state
            .wait_for(|s| *s == SessionState::Open)
            .await
            .unwrap();
        assert_eq!(handle.state(), SessionState::Open);

        handle.close();
        let summary = handle.wait_closed().await.unwrap();

        assert_eq!(summary.close_reason, CloseReason::Cancelled);
        assert_eq!(*state.borrow(), SessionState::Closed);
        assert_eq!(snapshot(&log).last(), Some(&Call::Close));
    }

    #[tokio::test]
    async fn test_parent_cancellation_reaches_session() {
        let log = new_log();
        let (transport, _tx) = FakeTransport::new(log.clone());
        let parent = CancellationToken::new();

        let handle =
            SessionManager::new(transport, test_signer(), URL, NAMESPACE, requests(&["BTC/USD"]))
                .open(parent.clone())
                .await
                .unwrap();

        parent.cancel();
        let summary = handle.wait_closed().await.unwrap();
        assert_eq!(summary.close_reason, CloseReason::Cancelled);
        assert!(!summary.reached_open);
    }
}
