use std::time::Duration;

use webview_bridge::{BridgeConfig, BridgeHandle, connect, transport::duplex};

/// a native host and a web view talking to each other over an in-memory duplex channel
pub struct Peers {
    pub native: BridgeHandle,
    pub web: BridgeHandle,
}

pub async fn connected_peers(response_timeout: Option<Duration>) -> anyhow::Result<Peers> {
    let ((native_sink, native_source), (web_sink, web_source)) = duplex(100);

    let native = connect(
        native_sink,
        native_source,
        BridgeConfig {
            identifier: "native".to_string(),
            response_timeout,
        },
    )
    .await?;

    let web = connect(
        web_sink,
        web_source,
        BridgeConfig {
            identifier: "web".to_string(),
            response_timeout,
        },
    )
    .await?;

    Ok(Peers { native, web })
}

/// polls `condition` until it holds or a second has passed
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
