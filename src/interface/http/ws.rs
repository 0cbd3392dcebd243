use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use super::handlers::AppState;

/// Commands accepted from a connected client
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Pin the replayed cycle to an exact seal time; `null` unpins
    Timestamp { timestamp: Option<f64> },
    /// Toggle replay mode
    Timemachine { time_machine_active: bool },
}

/// Handler for GET /ws
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| client_session(socket, state))
}

/// One client session: forward broadcast events out, apply inbound
/// commands. The first session to connect starts the tick worker.
async fn client_session(socket: WebSocket, state: AppState) {
    if state.timemachine.spawn() {
        info!("first client connected, tick worker started");
    } else {
        debug!("client connected");
    }

    let mut events = state.events.subscribe();
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let Ok(text) = serde_json::to_string(&event) else {
                        continue;
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "client lagging behind event stream");
                }
                Err(RecvError::Closed) => break,
            },
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => apply_command(&state, text.as_str()),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(error = %e, "websocket receive error");
                    break;
                }
            },
        }
    }

    debug!("client session closed");
}

/// Decode and apply one inbound command; unrecognized payloads are
/// logged and dropped.
fn apply_command(state: &AppState, text: &str) {
    match serde_json::from_str::<ClientCommand>(text) {
        Ok(ClientCommand::Timestamp { timestamp }) => {
            debug!(?timestamp, "client selected replay timestamp");
            state.timemachine.select_timestamp(timestamp);
        }
        Ok(ClientCommand::Timemachine {
            time_machine_active,
        }) => {
            debug!(active = time_machine_active, "client toggled replay");
            state.timemachine.set_replay_active(time_machine_active);
        }
        Err(e) => debug!(error = %e, payload = text, "unrecognized client message"),
    }
}
