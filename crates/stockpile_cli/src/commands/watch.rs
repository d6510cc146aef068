//! Watch command implementation.

use parking_lot::Mutex;
use std::sync::Arc;
use stockpile_client::{ClientConfig, ConnectionState, Replica, ServerConnection};
use stockpile_protocol::Command;
use tokio::sync::mpsc;

/// Connects to a server and prints the snapshot and every relayed update.
///
/// Returns when the server disconnects or on Ctrl-C.
pub fn run(host: String, port: u16, raw: bool) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(watch(ClientConfig::new(host, port), raw))
}

async fn watch(config: ClientConfig, raw: bool) -> Result<(), Box<dyn std::error::Error>> {
    let conn = ServerConnection::new(config);
    let replica = Arc::new(Mutex::new(Replica::new()));

    let apply = Replica::listener(Arc::clone(&replica));
    conn.add_update_listener(move |line: &str| {
        println!("{}", describe(line, raw));
        apply(line);
    });

    let (state_tx, mut states) = mpsc::unbounded_channel();
    conn.add_state_listener(move |state: &ConnectionState| {
        let _ = state_tx.send(state.clone());
    });

    let snapshot = conn.connect_and_fetch_snapshot().await?;
    // Single-threaded runtime: the reader task has not run yet.
    *replica.lock() = Replica::from_snapshot(&snapshot);
    for entry in replica.lock().entries() {
        if raw {
            println!("{}", entry.to_wire());
        } else {
            println!("  {entry}");
        }
    }
    println!("-- {} entries, watching {}", snapshot.len(), conn.config());

    let outcome = loop {
        tokio::select! {
            state = states.recv() => match state {
                Some(ConnectionState::Connected) => continue,
                Some(ConnectionState::Disconnected) | None => break Ok(()),
                Some(ConnectionState::Error(message)) => break Err(message.into()),
            },
            _ = tokio::signal::ctrl_c() => {
                conn.disconnect().await;
                break Ok(());
            }
        }
    };

    println!("-- {} entries at exit", replica.lock().len());
    outcome
}

/// Formats one relayed line for display.
fn describe(line: &str, raw: bool) -> String {
    if raw {
        return line.to_string();
    }
    match Command::parse(line) {
        Ok(Command::Add(entry)) => format!("+ {entry}"),
        Ok(Command::Remove(entry)) => format!("- {entry}"),
        Ok(Command::Replace { from, to }) => format!("~ {from}  =>  {to}"),
        Err(err) => format!("? {line} ({err})"),
    }
}
