use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use webview_bridge::{CallRequest, Responder};

use crate::peers::{connected_peers, eventually};

#[tokio::test]
pub async fn unanswered_ask_fails_after_the_timeout() -> anyhow::Result<()> {
    let peers = connected_peers(Some(Duration::from_millis(50))).await?;

    // never responds
    peers
        .native
        .register_handler("blackHole", |_data, _responder| Ok(()))?;

    let result = tokio::time::timeout(
        Duration::from_secs(1),
        peers.web.ask("blackHole", json!(1)),
    )
    .await?;

    assert!(result.is_err());
    assert_eq!(peers.web.pending_callbacks().await?, 0);
    Ok(())
}

#[tokio::test]
pub async fn late_response_is_dropped() -> anyhow::Result<()> {
    let peers = connected_peers(Some(Duration::from_millis(50))).await?;
    let parked: Arc<Mutex<Option<Responder>>> = Arc::new(Mutex::new(None));
    let invoked = Arc::new(Mutex::new(false));

    let parked_copy = parked.clone();
    peers.native.register_handler("park", move |_data, responder| {
        *parked_copy.lock().unwrap() = responder;
        Ok(())
    })?;

    let invoked_copy = invoked.clone();
    peers.web.call_handler(
        "park",
        CallRequest::with_response(move |_| {
            *invoked_copy.lock().unwrap() = true;
            Ok(())
        }),
    )?;

    assert!(eventually(|| parked.lock().unwrap().is_some()).await);
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(peers.web.pending_callbacks().await?, 0);

    let responder = parked.lock().unwrap().take().unwrap();
    responder.respond(json!("too late"))?;

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!*invoked.lock().unwrap());
    Ok(())
}

#[tokio::test]
pub async fn without_timeout_unanswered_calls_stay_pending() -> anyhow::Result<()> {
    let peers = connected_peers(None).await?;
    peers
        .native
        .register_handler("blackHole", |_data, _responder| Ok(()))?;

    peers
        .web
        .call_handler("blackHole", CallRequest::with_response(|_| Ok(())))?;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(peers.web.pending_callbacks().await?, 1);

    Ok(())
}
