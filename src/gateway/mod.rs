mod connection;
mod events;
mod presence;
mod ws;

use axum::{routing::get, Router};

use crate::AppState;

pub use connection::{Connection, ConnectionState, Gateway};
pub use events::{parse_frame, AckFrame, ClientEvent, Outbound, ServerEvent};
pub use presence::{Announcement, Outbox, Presence};

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(ws::socket))
}
