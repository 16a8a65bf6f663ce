use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use vibeman_runtime::{ContainerRuntime, PtyHandle, PtySize};

use crate::{
    error::AttachError,
    protocol::{decode_bytes, encode_bytes, ClientFrame, ServerFrame},
};

const HEARTBEAT_CHECK_INTERVAL: Duration = Duration::from_secs(5);
const IDLE_TIMEOUT: Duration = Duration::from_secs(30);
const EXIT_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// Opens an exec-attached PTY on `container_id` and bridges it to `socket`
/// (spec §4.6 step 2).
pub async fn attach(
    runtime: &dyn ContainerRuntime,
    container_id: &str,
    size: PtySize,
    socket: WebSocket,
) -> Result<(), AttachError> {
    let pty = runtime.attach_pty(container_id, size).await?;
    run_session(socket, pty).await;
    Ok(())
}

/// Drives one attach session until either side closes, the remote process
/// exits, or the idle-heartbeat watchdog fires (spec §4.6 steps 2-5). Frame
/// I/O errors on the socket end the session rather than propagating, since
/// by that point there's no client left to report them to.
pub async fn run_session(mut socket: WebSocket, mut pty: PtyHandle) {
    let mut last_activity = tokio::time::Instant::now();
    let mut heartbeat = tokio::time::interval(HEARTBEAT_CHECK_INTERVAL);

    loop {
        tokio::select! {
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        last_activity = tokio::time::Instant::now();
                        if !handle_client_frame(&text, &mut socket, &mut pty).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "websocket read error, ending attach session");
                        break;
                    }
                }
            }
            chunk = pty.stdout.recv() => {
                match chunk {
                    Some(bytes) => {
                        if send_frame(&mut socket, &ServerFrame::Stdout { data: encode_bytes(&bytes) }).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            exit = &mut pty.wait => {
                let code = exit.unwrap_or(-1);
                let _ = send_frame(&mut socket, &ServerFrame::Exit { exit_code: code }).await;
                pty.close();
                let _ = socket.close().await;
                return;
            }
            _ = heartbeat.tick() => {
                if last_activity.elapsed() > IDLE_TIMEOUT {
                    tracing::warn!("attach session idle past heartbeat timeout, closing");
                    let _ = send_frame(&mut socket, &ServerFrame::Error { message: "heartbeat timeout".to_string() }).await;
                    break;
                }
            }
        }
    }

    pty.close();
    if let Ok(code) = tokio::time::timeout(EXIT_GRACE_PERIOD, pty.wait).await {
        let _ = send_frame(&mut socket, &ServerFrame::Exit { exit_code: code.unwrap_or(-1) }).await;
    }
    let _ = socket.close().await;
}

/// Returns `false` when the session should end.
async fn handle_client_frame(text: &str, socket: &mut WebSocket, pty: &mut PtyHandle) -> bool {
    match serde_json::from_str::<ClientFrame>(text) {
        Ok(ClientFrame::Stdin { data }) => match decode_bytes(&data) {
            Ok(bytes) => pty.stdin.send(bytes).await.is_ok(),
            Err(e) => {
                let _ = send_frame(socket, &ServerFrame::Error { message: format!("invalid base64 stdin frame: {e}") }).await;
                true
            }
        },
        Ok(ClientFrame::Resize { cols, rows }) => {
            if let Err(e) = pty.resize(PtySize { cols, rows }) {
                tracing::warn!(error = %e, "pty resize failed");
            }
            true
        }
        Ok(ClientFrame::Ping) => {
            let _ = send_frame(socket, &ServerFrame::Pong).await;
            true
        }
        Err(e) => {
            let _ = send_frame(socket, &ServerFrame::Error { message: format!("malformed frame: {e}") }).await;
            true
        }
    }
}

async fn send_frame(socket: &mut WebSocket, frame: &ServerFrame) -> Result<(), axum::Error> {
    let text = serde_json::to_string(frame).expect("ServerFrame always serializes");
    socket.send(Message::Text(text.into())).await
}
