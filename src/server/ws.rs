use crate::state::{AppState, WsMessage};
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::watch;

/// Client -> server control message. `{"index": "NIFTY"}` narrows the stream
/// to one index, `{"index": null}` restores every index.
#[derive(serde::Deserialize)]
struct Subscribe {
    index: Option<String>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.ws_tx.subscribe();
    let (filter_tx, filter_rx) = watch::channel::<Option<String>>(None);

    // Send initial snapshot
    {
        let json = serde_json::to_string(&*state.snapshot_rx.borrow());
        if let Ok(json) = json {
            if sender.send(Message::Text(json.into())).await.is_err() {
                return;
            }
        }
    }

    // Forward broadcast messages that pass this client's index filter
    let send_task = tokio::spawn(async move {
        loop {
            let ws_msg = match rx.recv().await {
                Ok(msg) => msg,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "ws client lagging, dropped messages");
                    continue;
                }
                Err(_) => break,
            };
            let wanted = passes_filter(&ws_msg, filter_rx.borrow().as_deref());
            if !wanted {
                continue;
            }
            let Ok(json) = serde_json::to_string(&ws_msg) else {
                continue;
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // Read subscription changes; detect disconnect
    let recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => match serde_json::from_str::<Subscribe>(text.as_str()) {
                    Ok(sub) => {
                        let _ = filter_tx.send(sub.index.map(|i| i.to_uppercase()));
                    }
                    Err(e) => tracing::debug!(error = %e, "ignoring ws client message"),
                },
                Ok(Message::Close(_)) | Err(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish (client disconnected)
    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }
}

fn passes_filter(msg: &WsMessage, filter: Option<&str>) -> bool {
    let Some(wanted) = filter else {
        return true;
    };
    match msg {
        WsMessage::Analytics(a) => a.index == wanted,
        WsMessage::GreeksPassMsg { index, .. } => index == wanted,
        WsMessage::EngineStateMsg { .. } => true,
    }
}
