//! Join a lobby channel and post one message.
//!
//! ```text
//! cargo run -p tether-ws --example lobby -- ws://localhost:4000/socket/websocket
//! ```

use std::time::Duration;

use serde_json::{json, Value};
use tether::telemetry::{init_tracing, TracingConfig};
use tether::{Channel, SessionConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing(TracingConfig::default().with_level("tether=debug,tether_ws=debug"))?;

    let endpoint = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://localhost:4000/socket/websocket".to_string());

    let config = SessionConfig::builder()
        .endpoint(&endpoint)
        .heartbeat_interval(Duration::from_secs(10))
        .log_traffic(true)
        .build();
    let (handle, task) = tether_ws::spawn(config);

    let lobby = Channel::new("room:lobby");
    lobby.on_event(|envelope| println!("<- {} {}", envelope.event, envelope.payload));

    handle.join(&lobby);
    handle.connect();

    while !lobby.is_joined() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let reply = handle
        .request::<_, Value>(&lobby, "new_msg", &json!({"body": "hello"}))
        .await?;
    println!("reply: {} {}", reply.status.as_str(), reply.response);

    tokio::signal::ctrl_c().await?;
    handle.disconnect(Some(Duration::from_secs(1)));
    handle.shutdown();
    task.await?;
    Ok(())
}
