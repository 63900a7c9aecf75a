//! Hello/echo example: two peers on one broadcast channel.
//!
//! One peer plays server (binds `hello` and `data` handlers), the other plays
//! client and issues calls. Both run in-process over [`MemoryBroadcast`]; a
//! production deployment would swap in a real pub/sub transport behind the
//! same [`BroadcastTransport`] trait.
//!
//! # Run
//!
//! ```bash
//! cargo run --example hello
//! ```

use serde_json::json;

use broadcast_rpc::{IpcError, MemoryBroadcast, Payload, Peer, PeerConfig};

#[tokio::main]
async fn main() -> Result<(), IpcError> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let hub = MemoryBroadcast::new();

    // Server peer: serves "hello" and "data".
    let server = Peer::with_config(hub.handle(), PeerConfig::default().with_identity("server"));
    server.add_handler("hello", |_| async move {
        let mut reply = Payload::new();
        reply.insert("hello".to_string(), json!("world"));
        Ok(Some(reply))
    });
    server.add_handler("data", |payload| async move {
        let mut data = payload.unwrap_or_default();
        data.insert(
            "ack".to_string(),
            json!("The message was successfully received by the server!"),
        );
        Ok(Some(data))
    });
    server.start().await?;

    // Client peer.
    let client = Peer::new(hub.handle());
    client.start().await?;

    let reply = client.call("hello", Payload::new()).await?;
    println!("hello -> {}", serde_json::Value::Object(reply));

    let mut request = Payload::new();
    request.insert("msg".to_string(), json!("greetings from the client"));
    let reply = client.call("data", request).await?;
    println!("data  -> {}", serde_json::Value::Object(reply));

    client.close().await?;
    server.close().await?;
    Ok(())
}
