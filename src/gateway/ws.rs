use axum::{
    debug_handler,
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::HeaderMap,
    response::IntoResponse,
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;

use crate::{auth::bearer_token, AppState};

use super::{events::Outbound, Gateway};

#[derive(Deserialize)]
pub(crate) struct SocketQuery {
    token: Option<String>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn socket(
    State(gateway): State<Gateway>,
    Query(SocketQuery { token }): Query<SocketQuery>,
    headers: HeaderMap,

    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let credential = bearer_token(&headers).map(str::to_owned).or(token);

    ws.on_upgrade(async move |stream| serve(gateway, stream, credential).await)
}

async fn serve(gateway: Gateway, stream: WebSocket, credential: Option<String>) {
    let (mut sender, mut receiver) = stream.split();
    let (mut connection, mut outbox) = gateway.open();

    if let Err(e) = gateway.authenticate(&mut connection, credential.as_deref()).await {
        close_with(&mut sender, format!("Authentication error: {}", e.public_message())).await;
        return;
    }

    let mut announcements = match gateway.activate(&mut connection).await {
        Ok(announcements) => announcements,
        Err(e) => {
            close_with(&mut sender, e.public_message()).await;
            gateway.disconnect(&mut connection).await;
            return;
        }
    };

    let connection_id = connection.id();
    let mut writer = tokio::spawn(async move {
        loop {
            let outbound = tokio::select! {
                outbound = outbox.recv() => match outbound {
                    Some(outbound) => outbound,
                    None => break,
                },
                announcement = announcements.recv() => match announcement {
                    Ok(announcement) if announcement.origin == connection_id => continue,
                    Ok(announcement) => Outbound::Event(announcement.event),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(%connection_id, skipped, "socket fell behind on announcements");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
            };

            let text = match outbound.to_text() {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(%connection_id, error = %e, "could not encode frame");
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let reader = async {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => gateway.handle_frame(&connection, text.as_str()).await,
                Message::Close(_) => break,
                _ => {}
            }
        }
    };

    tokio::select! {
        _ = reader => writer.abort(),
        _ = &mut writer => {},
        _ = gateway.presence().closed() => writer.abort(),
    };

    gateway.disconnect(&mut connection).await;
}

async fn close_with(sender: &mut SplitSink<WebSocket, Message>, reason: String) {
    let _ = sender
        .send(Message::Close(Some(CloseFrame {
            code: close_code::POLICY,
            reason: reason.into(),
        })))
        .await;
}
