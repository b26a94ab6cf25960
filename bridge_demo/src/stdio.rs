use std::time::{SystemTime, UNIX_EPOCH};

use futures::{sink, stream};
use log::info;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use webview_bridge::{BridgeConfig, TransportMessage, TransportSink, TransportSource};

pub async fn run(config: BridgeConfig) -> Result<(), anyhow::Error> {
    let bridge = webview_bridge::install(create_sink(), create_source(), config).await?;

    bridge.register_handler("echo", |data, responder| {
        if let Some(responder) = responder {
            responder.respond(data)?;
        }
        Ok(())
    })?;

    bridge.register_handler("now", |_data, responder| {
        let millis = SystemTime::now().duration_since(UNIX_EPOCH)?.as_millis();
        if let Some(responder) = responder {
            responder.respond(json!(millis as u64))?;
        }
        Ok(())
    })?;

    let bridge_copy = bridge.clone();
    bridge.register_handler("quit", move |_data, _responder| bridge_copy.close())?;

    bridge.call_handler("bridgeReady", json!({"handlers": ["echo", "now", "quit"]}))?;
    info!("Serving bridge on stdin/stdout");

    bridge.stopped().await?;
    info!("Bridge on stdin/stdout stopped");

    Ok(())
}

// ---------------------------------------------------------------------------------

fn create_sink() -> TransportSink {
    let sink = sink::unfold(
        tokio::io::stdout(),
        |mut stdout, element: TransportMessage| async move {
            match element {
                TransportMessage::Text(text) => {
                    stdout.write_all(text.as_bytes()).await?;
                    stdout.write_all(b"\n").await?;
                }
                TransportMessage::Binary(data) => {
                    stdout.write_all(&data).await?;
                    stdout.write_all(b"\n").await?;
                }
                TransportMessage::Close(_) => {}
            }
            stdout.flush().await?;
            Ok::<_, anyhow::Error>(stdout)
        },
    );
    Box::pin(sink)
}

fn create_source() -> TransportSource {
    let lines = BufReader::new(tokio::io::stdin()).lines();
    let source = stream::unfold(lines, |mut lines| async move {
        match lines.next_line().await {
            Ok(Some(line)) => Some((Ok(TransportMessage::Text(line)), lines)),
            Ok(None) => None,
            Err(e) => Some((Err(anyhow::Error::from(e)), lines)),
        }
    });
    Box::pin(source)
}
