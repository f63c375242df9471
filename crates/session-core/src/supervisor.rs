//! Per-session connection supervisor.
//!
//! Each live session is driven by one spawned task that owns the connect,
//! pairing, event-pump and reconnect loop. The supervisor is the only
//! writer of lifecycle state transitions besides teardown, and it never
//! outlives its handle: every exit path either tears the session down or
//! happens because teardown aborted the task.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use qrcode::render::svg;
use qrcode::QrCode;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use rmsg_transport::{AuthState, DisconnectReason, TransportEvent};

use crate::errors::{Result, SessionError};
use crate::manager::{RemoveMode, SessionManager, TeardownFrom};
use crate::session::{PairingArtifact, SessionHandle, SessionState};

pub(crate) fn spawn(
    manager: Arc<SessionManager>,
    handle: Arc<SessionHandle>,
) -> JoinHandle<()> {
    tokio::spawn(run(manager, handle))
}

/// What the supervisor does after a connection attempt ends.
enum Flow {
    /// Try again after `delay`.
    Reconnect { delay: Duration },
    /// The session was torn down; stop supervising.
    Terminal,
}

async fn run(manager: Arc<SessionManager>, handle: Arc<SessionHandle>) {
    loop {
        match connect_once(&manager, &handle).await {
            Flow::Reconnect { delay } => {
                handle.set_state(SessionState::Reconnecting).await;
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            Flow::Terminal => return,
        }
    }
}

/// One connection attempt: open the transport and pump its events until the
/// connection ends or the session reaches a terminal decision.
async fn connect_once(manager: &Arc<SessionManager>, handle: &Arc<SessionHandle>) -> Flow {
    let auth = match manager.store().load(&handle.id, handle.variant).await {
        Ok(Some(auth)) => auth,
        Ok(None) => AuthState::empty(),
        Err(e) => {
            warn!(session = %handle.id, error = %e, "failed to read credentials, starting clean");
            AuthState::empty()
        }
    };

    let (transport, mut events) = match manager.factory().open(&handle.id, auth).await {
        Ok(opened) => opened,
        Err(e) => {
            warn!(session = %handle.id, error = %e, "transport open failed");
            return next_step_after_close(manager, handle, None).await;
        }
    };
    handle.set_transport(transport).await;

    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::CredentialsChanged { auth } => {
                if let Err(e) = manager.store().save(&handle.id, handle.variant, &auth).await {
                    warn!(session = %handle.id, error = %e, "failed to persist credentials");
                }
            }
            TransportEvent::PairingRequired { code } => {
                match deliver_artifact(handle, &code).await {
                    Delivery::Delivered => {
                        handle.set_state(SessionState::AwaitingPairing).await;
                        manager.arm_idle(handle).await;
                    }
                    Delivery::NoCaller => {
                        // The artifact is single-use and nobody is waiting
                        // for one; invalidate the half-born pairing.
                        info!(session = %handle.id, "pairing required but no caller, removing");
                        teardown(manager, handle, RemoveMode::Delete).await;
                        return Flow::Terminal;
                    }
                    Delivery::RenderFailed => {
                        teardown(manager, handle, RemoveMode::Delete).await;
                        return Flow::Terminal;
                    }
                }
            }
            TransportEvent::Connected => {
                handle.retries.reset();
                handle.set_state(SessionState::Open).await;
                if let Some(cell) = handle.take_creation().await {
                    cell.succeed();
                }
                manager.arm_idle(handle).await;
                info!(session = %handle.id, "session open");
            }
            TransportEvent::Disconnected { reason } => {
                handle.clear_transport().await;
                return next_step_after_close(manager, handle, Some(reason)).await;
            }
            TransportEvent::MessageReceived { message } => {
                if let Some(forwarder) = manager.forwarder() {
                    forwarder.notify(&handle.id, &message);
                }
            }
        }
    }

    // The event stream ended without a disconnect notice; treat it as a
    // lost connection.
    handle.clear_transport().await;
    next_step_after_close(manager, handle, Some(DisconnectReason::ConnectionLost)).await
}

/// Decide between another attempt and teardown after a connection ended.
async fn next_step_after_close(
    manager: &Arc<SessionManager>,
    handle: &Arc<SessionHandle>,
    reason: Option<DisconnectReason>,
) -> Flow {
    if reason.map(|r| r.is_logout()).unwrap_or(false) {
        info!(session = %handle.id, "logged out, removing session");
        teardown(manager, handle, RemoveMode::Delete).await;
        return Flow::Terminal;
    }

    match handle.retries.try_next_attempt() {
        Some(attempt) => {
            let immediate = reason.map(|r| r.wants_immediate_restart()).unwrap_or(false);
            let delay = if immediate {
                Duration::ZERO
            } else {
                manager.config().reconnect_interval
            };
            info!(
                session = %handle.id,
                attempt,
                max = handle.retries.max(),
                delay_ms = delay.as_millis() as u64,
                "scheduling reconnect"
            );
            Flow::Reconnect { delay }
        }
        None => {
            warn!(session = %handle.id, "reconnect budget exhausted, removing session");
            teardown(manager, handle, RemoveMode::Delete).await;
            Flow::Terminal
        }
    }
}

async fn teardown(manager: &Arc<SessionManager>, handle: &Arc<SessionHandle>, mode: RemoveMode) {
    if let Err(e) = manager
        .remove_with(&handle.id, mode, TeardownFrom::Supervisor, Some(handle.epoch))
        .await
    {
        debug!(session = %handle.id, error = %e, "supervisor teardown skipped");
    }
}

enum Delivery {
    Delivered,
    NoCaller,
    RenderFailed,
}

/// Hand the pairing artifact to the originator, if one is still waiting.
async fn deliver_artifact(handle: &Arc<SessionHandle>, code: &str) -> Delivery {
    let Some(sender) = handle.take_artifact_sender().await else {
        return Delivery::NoCaller;
    };
    match render_artifact(code) {
        Ok(artifact) => {
            if sender.send(artifact).is_err() {
                // The originator gave up before the artifact arrived.
                return Delivery::NoCaller;
            }
            // Joiners cannot be handed the artifact; tell them to retry
            // once pairing completes.
            if let Some(cell) = handle.take_creation().await {
                cell.fail_with(|| SessionError::pairing_pending(&handle.id));
            }
            Delivery::Delivered
        }
        Err(e) => {
            warn!(session = %handle.id, error = %e, "failed to render pairing artifact");
            drop(sender);
            if let Some(cell) = handle.take_creation().await {
                cell.fail_with(|| SessionError::artifact("pairing artifact rendering failed"));
            }
            Delivery::RenderFailed
        }
    }
}

/// Render the raw pairing string as a scannable SVG QR data URL.
fn render_artifact(code: &str) -> Result<PairingArtifact> {
    let qr = QrCode::new(code.as_bytes())
        .map_err(|e| SessionError::artifact(e.to_string()))?;
    let image = qr.render::<svg::Color>().min_dimensions(256, 256).build();
    let qr = format!("data:image/svg+xml;base64,{}", STANDARD.encode(image.as_bytes()));
    Ok(PairingArtifact { code: code.to_string(), qr })
}
