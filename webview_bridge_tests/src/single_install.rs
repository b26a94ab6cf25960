use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::json;
use webview_bridge::{BridgeConfig, BridgeSlot, Envelope, TransportMessage, transport::duplex};

use crate::peers::eventually;

#[tokio::test]
pub async fn queued_callbacks_run_once_after_install() -> anyhow::Result<()> {
    let slot = BridgeSlot::new();
    let order: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));

    for i in 0..3 {
        let order = order.clone();
        slot.on_bridge_ready(move |bridge| {
            if i == 0 {
                let _ = bridge.register_handler("ready", |_data, responder| {
                    if let Some(responder) = responder {
                        responder.respond(json!(true))?;
                    }
                    Ok(())
                });
            }
            order.lock().unwrap().push(i);
        });
    }
    assert_eq!(slot.queued_callbacks(), Some(3));
    assert!(!slot.is_installed());

    let ((sink, source), (mut remote_sink, mut remote_source)) = duplex(16);
    slot.install(sink, source, BridgeConfig::default()).await?;

    // the queue is taken during install, but nothing runs until the next scheduler turn
    assert_eq!(slot.queued_callbacks(), None);
    assert!(order.lock().unwrap().is_empty());

    assert!(eventually(|| order.lock().unwrap().len() == 3).await);
    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);

    // the handle the callbacks got is live
    let call = Envelope::call("ready", json!(null), Some("cb_1_1".into()));
    remote_sink
        .send(TransportMessage::Text(call.encode()?))
        .await?;
    let Some(Ok(TransportMessage::Text(text))) =
        tokio::time::timeout(Duration::from_secs(1), remote_source.next()).await?
    else {
        panic!("expected a response frame");
    };
    assert_eq!(
        Envelope::decode(&text)?,
        Envelope::response("ready", "cb_1_1".into(), json!(true))
    );

    // registered after the drain: still runs, exactly once
    let order_copy = order.clone();
    slot.on_bridge_ready(move |_bridge| order_copy.lock().unwrap().push(3));
    assert!(eventually(|| order.lock().unwrap().len() == 4).await);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
    Ok(())
}

#[tokio::test]
pub async fn second_install_returns_the_first_bridge() -> anyhow::Result<()> {
    let slot = BridgeSlot::new();

    let ((sink, source), (_remote_sink, _remote_source)) = duplex(16);
    let first = slot.install(sink, source, BridgeConfig::default()).await?;

    let ((sink, source), (mut other_remote_sink, _other_remote_source)) = duplex(16);
    let second = slot
        .install(
            sink,
            source,
            BridgeConfig {
                identifier: "second".to_string(),
                response_timeout: None,
            },
        )
        .await?;

    assert_eq!(first.actor().get_id(), second.actor().get_id());
    assert_eq!(
        slot.get().map(|bridge| bridge.actor().get_id()),
        Some(first.actor().get_id())
    );

    // nobody listens on the second transport, its source was dropped
    let result = other_remote_sink
        .send(TransportMessage::Text("{}".to_string()))
        .await;
    assert!(result.is_err());
    Ok(())
}

#[tokio::test]
pub async fn process_wide_bridge_is_installed_once() -> anyhow::Result<()> {
    let ((sink, source), (_remote_sink, _remote_source)) = duplex(16);
    let first = webview_bridge::install(sink, source, BridgeConfig::default()).await?;

    let ((sink, source), (_other_remote_sink, _other_remote_source)) = duplex(16);
    let second = webview_bridge::install(sink, source, BridgeConfig::default()).await?;

    assert_eq!(first.actor().get_id(), second.actor().get_id());
    assert_eq!(
        webview_bridge::installed().map(|bridge| bridge.actor().get_id()),
        Some(first.actor().get_id())
    );
    Ok(())
}

#[tokio::test]
pub async fn late_callback_from_a_plain_thread_runs_on_the_bridge_runtime() -> anyhow::Result<()> {
    let slot = Arc::new(BridgeSlot::new());
    let ((sink, source), (_remote_sink, _remote_source)) = duplex(16);
    let bridge = slot.install(sink, source, BridgeConfig::default()).await?;

    let seen = Arc::new(Mutex::new(None));
    let thread_slot = slot.clone();
    let thread_seen = seen.clone();
    let registered = std::thread::spawn(move || {
        thread_slot.on_bridge_ready(move |bridge| {
            *thread_seen.lock().unwrap() = Some(bridge.actor().get_id());
        });
    })
    .join();
    assert!(registered.is_ok());

    assert!(eventually(|| seen.lock().unwrap().is_some()).await);
    assert_eq!(*seen.lock().unwrap(), Some(bridge.actor().get_id()));
    Ok(())
}
