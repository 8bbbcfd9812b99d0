//! Driver WebSocket channel.
//!
//! # Data Flow
//! ```text
//! GET /v1/drivers/ws (driver caller)
//!     → upgrade
//!     → writer task: ChannelReceiver → JSON text frame → ack PendingWrite
//!     → DispatchNotifier::connect (register + replay backlog)
//!     → read loop: heartbeat | accept → RideLedger::advance(accepted)
//!     → DispatchNotifier::disconnect on close
//! ```
//!
//! # Design Decisions
//! - One writer task per socket; deliveries never touch the sink directly
//! - When the registry drops a superseded channel the writer sees the end
//!   of its queue and closes the socket
//! - Malformed client messages are logged and ignored

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    Extension,
};
use futures_util::{SinkExt, StreamExt};

use crate::http::middleware::require_role;
use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::identity::{Caller, IdentityError, Role};
use crate::ledger::RideStatus;
use crate::location::DriverId;
use crate::notify::{self, ChannelError, DriverMessage};

/// `GET /v1/drivers/ws`
pub async fn driver_channel(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    require_role(&caller, Role::Driver)?;
    let driver = caller
        .driver_id()
        .ok_or(IdentityError::WrongRole(Role::Driver))?;
    Ok(ws.on_upgrade(move |socket| serve_driver(socket, state, driver)))
}

async fn serve_driver(socket: WebSocket, state: AppState, driver: DriverId) {
    let guard = state.connections.track();
    let connection_id = guard.id();
    let buffer = state.config.notifications.channel_buffer;
    let (channel, mut outbox) = notify::channel(connection_id, buffer);
    let (mut sink, mut stream) = socket.split();
    let mut shutdown = state.shutdown.subscribe();

    tracing::info!(driver_id = %driver, connection_id = %connection_id, "Driver channel opened");

    let mut writer = tokio::spawn(async move {
        while let Some(write) = outbox.recv().await {
            let result = match serde_json::to_string(write.event()) {
                Ok(text) => sink
                    .send(Message::Text(text.into()))
                    .await
                    .map_err(|e| ChannelError::Write(e.to_string())),
                Err(e) => Err(ChannelError::Write(e.to_string())),
            };
            let failed = result.is_err();
            write.complete(result);
            if failed {
                break;
            }
        }
        outbox.close();
        let _ = sink.close().await;
    });

    let notifier = &state.services.notifier;
    notifier.connect(&driver, channel).await;

    loop {
        tokio::select! {
            _ = &mut writer => {
                tracing::debug!(driver_id = %driver, connection_id = %connection_id, "Channel writer finished");
                break;
            }
            _ = shutdown.recv() => break,
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => handle_message(&state, &driver, text.as_str()).await,
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(driver_id = %driver, connection_id = %connection_id, error = %e, "Driver socket error");
                    break;
                }
            }
        }
    }

    notifier.disconnect(&driver, connection_id);
    writer.abort();
    tracing::info!(driver_id = %driver, connection_id = %connection_id, "Driver channel closed");
}

async fn handle_message(state: &AppState, driver: &DriverId, text: &str) {
    match serde_json::from_str::<DriverMessage>(text) {
        Ok(DriverMessage::Heartbeat { .. }) => {
            tracing::trace!(driver_id = %driver, "Heartbeat");
        }
        Ok(DriverMessage::Accept { ride_id }) => {
            match state
                .services
                .ledger
                .advance(ride_id, &Caller::driver(driver.as_str()), RideStatus::Accepted)
                .await
            {
                Ok(_) => tracing::info!(driver_id = %driver, ride_id = %ride_id, "Ride accepted over channel"),
                Err(e) => tracing::warn!(driver_id = %driver, ride_id = %ride_id, error = %e, "Accept rejected"),
            }
        }
        Err(e) => {
            tracing::warn!(driver_id = %driver, error = %e, "Ignoring malformed driver message");
        }
    }
}
