//! Control messages for an embedded video call.
//!
//! Two delivery modes:
//! - [`CallController::post`] hands the command to the transport and returns.
//!   There is no confirmation that the call frame acted on it.
//! - [`CallController::request`] tags the command with a request id and waits
//!   for the matching [`ControlAck`], up to the configured timeout.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::error::RealtimeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallCommand {
    ToggleAudio,
    ToggleVideo,
    ToggleScreenShare,
    Leave,
}

/// What goes over the transport. `request_id` is `None` for posts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlMessage {
    pub request_id: Option<Uuid>,
    pub command: CallCommand,
}

/// Reply from the call frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlAck {
    pub request_id: Uuid,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Carries control messages to the call frame.
pub trait ControlTransport: Send + Sync {
    fn deliver(&self, message: ControlMessage) -> Result<(), RealtimeError>;
}

impl ControlTransport for mpsc::Sender<ControlMessage> {
    fn deliver(&self, message: ControlMessage) -> Result<(), RealtimeError> {
        self.try_send(message)
            .map_err(|_| RealtimeError::ConnectionClosed)
    }
}

type Pending = Arc<Mutex<HashMap<Uuid, oneshot::Sender<ControlAck>>>>;

fn lock(pending: &Pending) -> MutexGuard<'_, HashMap<Uuid, oneshot::Sender<ControlAck>>> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Clears a request's waiter however `request` ends, including when the
/// caller drops the future.
struct PendingGuard<'a> {
    pending: &'a Pending,
    request_id: Uuid,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        lock(self.pending).remove(&self.request_id);
    }
}

pub struct CallController<T: ControlTransport> {
    transport: T,
    timeout: Duration,
    pending: Pending,
}

impl<T: ControlTransport> CallController<T> {
    pub fn new(transport: T, timeout: Duration) -> Self {
        Self {
            transport,
            timeout,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Fire-and-forget.
    pub fn post(&self, command: CallCommand) -> Result<(), RealtimeError> {
        log::debug!("Posting call command {command:?}");
        self.transport.deliver(ControlMessage {
            request_id: None,
            command,
        })
    }

    /// Send and wait for the acknowledgement.
    pub async fn request(&self, command: CallCommand) -> Result<ControlAck, RealtimeError> {
        let request_id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(request_id, tx);
        let _guard = PendingGuard {
            pending: &self.pending,
            request_id,
        };

        self.transport.deliver(ControlMessage {
            request_id: Some(request_id),
            command,
        })?;

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(ack)) => Ok(ack),
            Ok(Err(_)) => Err(RealtimeError::ConnectionClosed),
            Err(_) => {
                log::warn!("Call command {command:?} ({request_id}) timed out");
                Err(RealtimeError::Timeout(self.timeout))
            }
        }
    }

    /// Resolve a pending request. Returns `false` for unknown or late acks.
    pub fn handle_ack(&self, ack: ControlAck) -> bool {
        let waiter = lock(&self.pending).remove(&ack.request_id);
        match waiter {
            Some(tx) => tx.send(ack).is_ok(),
            None => {
                log::debug!("Ack for unknown request {}", ack.request_id);
                false
            }
        }
    }

    pub fn pending_requests(&self) -> usize {
        lock(&self.pending).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller(timeout_ms: u64) -> (Arc<CallController<mpsc::Sender<ControlMessage>>>, mpsc::Receiver<ControlMessage>) {
        let (tx, rx) = mpsc::channel(8);
        (Arc::new(CallController::new(tx, Duration::from_millis(timeout_ms))), rx)
    }

    #[tokio::test]
    async fn test_post_has_no_request_id() {
        let (controller, mut rx) = controller(100);
        controller.post(CallCommand::ToggleAudio).unwrap();
        let message = rx.recv().await.unwrap();
        assert_eq!(message.command, CallCommand::ToggleAudio);
        assert!(message.request_id.is_none());
        assert_eq!(controller.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_request_resolved_by_ack() {
        let (controller, mut rx) = controller(1_000);
        let responder = controller.clone();
        tokio::spawn(async move {
            let message = rx.recv().await.unwrap();
            responder
                .handle_ack(ControlAck {
                    request_id: message.request_id.unwrap(),
                    ok: true,
                    error: None,
                });
        });

        let ack = controller.request(CallCommand::ToggleVideo).await.unwrap();
        assert!(ack.ok);
        assert_eq!(controller.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_request_times_out() {
        let (controller, _rx) = controller(20);
        let result = controller.request(CallCommand::Leave).await;
        assert!(matches!(result, Err(RealtimeError::Timeout(_))));
        assert_eq!(controller.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_request_clears_pending() {
        let (controller, mut rx) = controller(10_000);
        let mut request = Box::pin(controller.request(CallCommand::ToggleAudio));

        // Poll until the command is out, then give up on the reply
        tokio::select! {
            _ = &mut request => panic!("request resolved without an ack"),
            message = rx.recv() => assert!(message.unwrap().request_id.is_some()),
        }
        assert_eq!(controller.pending_requests(), 1);
        drop(request);
        assert_eq!(controller.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_failed_delivery_clears_pending() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let controller = CallController::new(tx, Duration::from_millis(20));
        let result = controller.request(CallCommand::Leave).await;
        assert!(matches!(result, Err(RealtimeError::ConnectionClosed)));
        assert_eq!(controller.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_unknown_ack_ignored() {
        let (controller, _rx) = controller(20);
        let handled = controller.handle_ack(ControlAck {
            request_id: Uuid::new_v4(),
            ok: true,
            error: None,
        });
        assert!(!handled);
    }

    #[tokio::test]
    async fn test_closed_transport() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let controller = CallController::new(tx, Duration::from_millis(20));
        assert!(matches!(
            controller.post(CallCommand::ToggleScreenShare),
            Err(RealtimeError::ConnectionClosed)
        ));
    }

    #[test]
    fn test_command_wire_names() {
        let json = serde_json::to_string(&CallCommand::ToggleScreenShare).unwrap();
        assert_eq!(json, r#""toggle_screen_share""#);
    }
}
