// SPDX-License-Identifier: Apache-2.0

//! Heartbeat-aware reconnection: a sink whose producer moved to a new
//! transport (or dropped off a scheme the sink cares about) needs to
//! re-resolve `AsConfigured` and reconnect, but only while the Keymaster
//! itself is known to be alive.

use std::time::Duration;

use matrix_keymaster::{HeartbeatWatcher, KeymasterClient};
use matrix_transport::{Scheme, Urn};

use crate::codec::Decode;
use crate::error::DataError;
use crate::selector::TransportSelector;
use crate::sink::DataSink;

const HEARTBEAT_WINDOW: Duration = Duration::from_secs(5);

/// Re-resolves `component.data_name`'s configured transport against the
/// Keymaster and, if it differs from what `sink` is currently connected to,
/// disconnects and reconnects. Returns `true` if a reconnect happened.
///
/// Refuses to act if `heartbeat` hasn't seen the Keymaster server within
/// the last 5 seconds — a stale Keymaster means `AsConfigured` can't be
/// trusted, so the existing connection (if any) is left alone.
pub fn reconcile<T, Sel>(
    sink: &DataSink<T, Sel>,
    client: &KeymasterClient,
    heartbeat: &HeartbeatWatcher,
    km_url: &Urn,
    component: &str,
    data_name: &str,
    transport_hint: Option<Scheme>,
) -> Result<bool, DataError>
where
    T: Decode + Send + 'static,
    Sel: TransportSelector,
{
    if !heartbeat.is_alive(HEARTBEAT_WINDOW) {
        return Err(DataError::SelectionFailed(
            "keymaster heartbeat stale, refusing to reconnect".to_string(),
        ));
    }

    let logical = client
        .get(&format!("components.{component}.Sources.{data_name}"))?
        .as_scalar()
        .ok_or_else(|| DataError::SelectionFailed(format!("Sources.{data_name} is not a scalar")))?
        .to_string();

    let configured_node =
        client.get(&format!("components.{component}.Transports.{logical}.AsConfigured"))?;
    let configured: Vec<Urn> = configured_node
        .as_sequence()
        .ok_or_else(|| {
            DataError::SelectionFailed(format!(
                "Transports.{logical}.AsConfigured is not a sequence"
            ))
        })?
        .iter()
        .filter_map(|n| n.as_scalar())
        .filter_map(|s| Urn::parse(s).ok())
        .collect();

    let desired = Sel::select(&configured, transport_hint)?;

    if sink.connected_urn().as_ref() == Some(&desired) {
        return Ok(false);
    }

    sink.disconnect()?;
    sink.connect(km_url, component, data_name, transport_hint)?;
    Ok(true)
}
