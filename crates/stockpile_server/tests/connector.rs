//! The client connector against a live server.

mod common;

use common::TestServer;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use stockpile_client::{ClientConfig, ConnectionState, Replica, ServerConnection};
use stockpile_protocol::Entry;
use tokio::sync::mpsc;

fn connector(server: &TestServer) -> ServerConnection {
    ServerConnection::new(ClientConfig::from(server.addr()))
}

async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn replicas_converge() {
    let server = TestServer::with_contents("3|0|fookitchen\n").await;

    let alice = connector(&server);
    let bob = connector(&server);
    let bob_replica = Arc::new(Mutex::new(Replica::new()));
    let (tx, mut bob_updates) = mpsc::unbounded_channel();
    let apply = Replica::listener(Arc::clone(&bob_replica));
    bob.add_update_listener(move |line: &str| {
        apply(line);
        let _ = tx.send(line.to_string());
    });

    let alice_snapshot = alice.connect_and_fetch_snapshot().await.unwrap();
    let bob_snapshot = bob.connect_and_fetch_snapshot().await.unwrap();
    assert_eq!(alice_snapshot, bob_snapshot);
    {
        // Nothing has been relayed yet, so the listener has not applied anything.
        let mut replica = bob_replica.lock();
        *replica = Replica::from_snapshot(&bob_snapshot);
    }

    alice.send("+6|0|hammershed").await.unwrap();
    alice.send(">14>3|0|fookitchen3|1|fookitchen").await.unwrap();
    assert_eq!(recv(&mut bob_updates).await, "+6|0|hammershed");
    assert_eq!(
        recv(&mut bob_updates).await,
        ">14>3|0|fookitchen3|1|fookitchen"
    );

    assert_eq!(
        bob_replica.lock().entries(),
        &[Entry::new("foo", "kitchen", 1), Entry::new("hammer", "shed", 0)]
    );
    assert_eq!(bob_replica.lock().entries(), server.db().snapshot().as_slice());
}

#[tokio::test]
async fn server_shutdown_disconnects_clients() {
    let server = TestServer::start().await;
    let conn = connector(&server);
    let (tx, mut states) = mpsc::unbounded_channel();
    conn.add_state_listener(move |state: &ConnectionState| {
        let _ = tx.send(state.clone());
    });

    conn.connect_and_fetch_snapshot().await.unwrap();
    assert_eq!(recv(&mut states).await, ConnectionState::Connected);

    server.stop().await;
    assert_eq!(recv(&mut states).await, ConnectionState::Disconnected);
    assert!(!conn.is_connected());
}

#[tokio::test]
async fn client_disconnect_frees_session() {
    let server = TestServer::start().await;
    let conn = connector(&server);
    conn.connect_and_fetch_snapshot().await.unwrap();
    server.wait_for_sessions(1).await;

    conn.disconnect().await;
    server.wait_for_sessions(0).await;
}
