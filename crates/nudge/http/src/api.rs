//! REST API handlers.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use color_eyre::eyre::WrapErr as _;
use serde::Deserialize;

use nudge_core::{Account, Device, WakeupKind, WakeupMessage};
use nudge_gateway::PushGateway;
use nudge_storage::AccountStore;

use crate::ApiState;

/// Wakeup trigger parameters.
#[derive(Debug, Deserialize)]
pub struct WakeupParams {
    #[serde(default)]
    pub kind: Option<WakeupKind>,
}

/// Fire a wakeup at one device.
pub async fn wakeup_handler<S, G>(
    State(state): State<ApiState<S, G>>,
    Path((identifier, device_id)): Path<(String, i64)>,
    Query(params): Query<WakeupParams>,
) -> impl IntoResponse
where
    S: AccountStore,
    G: PushGateway<WakeupMessage> + 'static,
{
    let kind = params.kind.unwrap_or(WakeupKind::Notification);

    match wakeup_inner(&state, &identifier, device_id, kind) {
        Ok(true) => StatusCode::ACCEPTED,
        Ok(false) => StatusCode::NOT_FOUND,
        Err(e) => {
            tracing::error!(error = %e, account = %identifier, "failed to dispatch wakeup");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn wakeup_inner<S, G>(
    state: &ApiState<S, G>,
    identifier: &str,
    device_id: i64,
    kind: WakeupKind,
) -> color_eyre::eyre::Result<bool>
where
    S: AccountStore,
    G: PushGateway<WakeupMessage> + 'static,
{
    let account = state
        .store
        .account_by_identifier(identifier)
        .wrap_err("account lookup failed")?;

    let Some(account) = account else {
        return Ok(false);
    };
    let Some(device) = account.device(device_id) else {
        return Ok(false);
    };
    let Some(token) = device.push_token.clone() else {
        return Ok(false);
    };

    state.sender.send(WakeupMessage {
        destination_token: token,
        account_identifier: account.identifier,
        device_id,
        kind,
    });

    Ok(true)
}

/// Device registration request.
#[derive(Debug, Deserialize)]
pub struct RegisterDeviceRequest {
    #[serde(default)]
    pub push_token: Option<String>,
}

/// Register or replace a device's push token.
pub async fn register_device_handler<S, G>(
    State(state): State<ApiState<S, G>>,
    Path((identifier, device_id)): Path<(String, i64)>,
    Json(body): Json<RegisterDeviceRequest>,
) -> impl IntoResponse
where
    S: AccountStore,
    G: PushGateway<WakeupMessage> + 'static,
{
    match register_inner(&state.store, &identifier, device_id, body.push_token) {
        Ok(()) => StatusCode::NO_CONTENT,
        Err(e) => {
            tracing::error!(error = %e, account = %identifier, "failed to register device");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn register_inner<S: AccountStore>(
    store: &S,
    identifier: &str,
    device_id: i64,
    push_token: Option<String>,
) -> color_eyre::eyre::Result<()> {
    let mut account = store
        .account_by_identifier(identifier)
        .wrap_err("account lookup failed")?
        .unwrap_or_else(|| Account {
            identifier: identifier.to_string(),
            devices: Vec::new(),
        });

    // Stamping the write time is what arms the reconciler's freshness guard
    // against delivery reports that predate this registration.
    let now = chrono::Utc::now().timestamp_millis();

    match account.device_mut(device_id) {
        Some(device) => {
            device.push_token = push_token;
            device.last_push_timestamp = now;
        }
        None => account.devices.push(Device {
            id: device_id,
            push_token,
            last_push_timestamp: now,
        }),
    }

    store.update(&account).wrap_err("failed to persist account")
}

/// Dispatch counter snapshot.
pub async fn stats_handler<S, G>(State(state): State<ApiState<S, G>>) -> impl IntoResponse
where
    S: AccountStore,
    G: PushGateway<WakeupMessage> + 'static,
{
    Json(state.sender.metrics().snapshot())
}
