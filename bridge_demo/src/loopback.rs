use std::time::Duration;

use futures::channel::oneshot;
use log::info;
use serde_json::{Value, json};
use webview_bridge::{BridgeConfig, connect, transport::duplex};

pub async fn run(calls: i64, response_timeout: Option<Duration>) -> Result<(), anyhow::Error> {
    // app code that loaded before the native bridge existed
    let (ready_tx, ready_rx) = oneshot::channel();
    webview_bridge::on_bridge_ready(move |native| {
        let registered = native
            .register_handler("getVersion", |_data, responder| {
                if let Some(responder) = responder {
                    responder.respond(json!({"version": env!("CARGO_PKG_VERSION")}))?;
                }
                Ok(())
            })
            .and_then(|_| {
                native.register_typed_handler("add", |operands: Vec<i64>| {
                    Ok(operands.iter().sum::<i64>())
                })
            });
        let _ = ready_tx.send(registered);
    });

    let ((native_sink, native_source), (web_sink, web_source)) = duplex(100);

    let native = webview_bridge::install(
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
    web.disable_javascript_alert_box_safety_timeout();

    web.register_handler("log", |data, _responder| {
        println!("[web] native says: {}", data);
        Ok(())
    })?;

    ready_rx.await??;
    info!("Native handlers are registered");

    let version = web.ask("getVersion", Value::Null).await?;
    println!("[web] native version: {}", version);

    for i in 1..=calls {
        let sum: i64 = web.ask_typed("add", &[i, i * 10]).await?;
        println!("[web] add({}, {}) = {}", i, i * 10, sum);
    }

    if response_timeout.is_some() {
        // nobody registered this one, so only the timeout ends the wait
        match web.ask("notRegistered", Value::Null).await {
            Ok(value) => println!("[web] unexpected answer: {}", value),
            Err(err) => println!("[web] {}", err),
        }
    }

    native.call_handler("log", json!("goodbye"))?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    web.close()?;
    native.close()?;
    web.stopped().await?;
    native.stopped().await?;
    Ok(())
}
