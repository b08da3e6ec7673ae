//! PM2 daemon client.
//!
//! Connects to the daemon's two local sockets in the PM2 home directory:
//!
//! - `rpc.sock` carries request/reply calls. Each request frame is
//!   `[{"type":"call","method":M,"args":[A]}, id]` and the daemon answers
//!   with `[{"args":[...]} | {"error":E}, id]`. Replies are matched to
//!   callers by `id`, so concurrent cascades can share the connection.
//! - `pub.sock` is the event bus. Frames are `[topic, payload]`; only the
//!   `process:event` topic is turned into [`LifecycleEvent`]s.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use futures_util::StreamExt;
use interprocess::local_socket::tokio::{RecvHalf, SendHalf, Stream};
use interprocess::local_socket::traits::tokio::Stream as _;
use interprocess::local_socket::{GenericFilePath, ToFsName};
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::codec::{Encoder, FramedRead};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, trace, warn, Instrument};

use super::amp::{AmpArg, AmpCodec};
use super::wire::{parse_bus_event, parse_process_list};
use super::{EventSubscription, ProcessSupervisor};
use crate::models::event::LifecycleEvent;
use crate::models::process::ManagedProcess;
use crate::{AppError, Result};

/// RPC socket file name inside the PM2 home.
pub const RPC_SOCKET: &str = "rpc.sock";
/// Event bus socket file name inside the PM2 home.
pub const PUB_SOCKET: &str = "pub.sock";
/// Bus topic carrying process lifecycle transitions.
pub const BUS_EVENT: &str = "process:event";
/// RPC method returning the live process list.
pub const LIST_METHOD: &str = "getMonitorData";
/// RPC method restarting one process by `pm_id`.
pub const RESTART_METHOD: &str = "restartProcessId";

/// Capacity of the event channel between the bus reader and the controller.
const EVENT_BUFFER: usize = 256;

/// In-flight RPC calls keyed by request id. `None` once the connection
/// has closed, so late callers fail instead of waiting forever.
type PendingReplies = Arc<Mutex<Option<HashMap<String, oneshot::Sender<Value>>>>>;

/// Session with a running PM2 daemon.
pub struct Pm2Client {
    home: PathBuf,
    identity: String,
    next_id: AtomicU64,
    writer: Mutex<SendHalf>,
    pending: PendingReplies,
    reader: JoinHandle<()>,
}

impl Pm2Client {
    /// Open the RPC channel of the daemon rooted at `home`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Connection`] if `rpc.sock` cannot be reached.
    pub async fn connect(home: impl Into<PathBuf>) -> Result<Self> {
        let home = home.into();
        let rpc_path = home.join(RPC_SOCKET);

        let stream = open_socket(&rpc_path).await.map_err(|err| {
            AppError::Connection(format!("cannot reach {}: {err}", rpc_path.display()))
        })?;
        let (recv, send) = stream.split();

        let pending: PendingReplies = Arc::new(Mutex::new(Some(HashMap::new())));
        let reader = tokio::spawn(
            read_replies(recv, Arc::clone(&pending)).instrument(info_span!("pm2_rpc")),
        );

        info!(rpc = %rpc_path.display(), "connected to pm2 daemon");

        Ok(Self {
            home,
            identity: std::process::id().to_string(),
            next_id: AtomicU64::new(0),
            writer: Mutex::new(send),
            pending,
            reader,
        })
    }

    /// Subscribe to the daemon's event bus.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Subscription`] if `pub.sock` cannot be reached.
    pub async fn subscribe(&self, cancel: CancellationToken) -> Result<EventSubscription> {
        let pub_path = self.home.join(PUB_SOCKET);
        let stream = open_socket(&pub_path).await.map_err(|err| {
            AppError::Subscription(format!("cannot reach {}: {err}", pub_path.display()))
        })?;

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let reader = tokio::spawn(
            run_bus_reader(stream, tx, cancel.clone()).instrument(info_span!("pm2_bus")),
        );

        info!(bus = %pub_path.display(), "event bus launched");
        Ok(EventSubscription::new(rx, cancel, Some(reader)))
    }

    /// Issue one RPC call and return the reply's `args` array.
    async fn call(&self, method: &str, arg: Value) -> Result<Vec<Value>> {
        let id = format!(
            "{}:{}",
            self.identity,
            self.next_id.fetch_add(1, Ordering::Relaxed)
        );
        let (tx, rx) = oneshot::channel();

        {
            let mut guard = self.pending.lock().await;
            let Some(pending) = guard.as_mut() else {
                return Err(AppError::Connection("pm2 rpc connection is closed".into()));
            };
            pending.insert(id.clone(), tx);
        }

        let request = json!({ "type": "call", "method": method, "args": [arg] });
        let mut frame = BytesMut::new();
        AmpCodec::new().encode(vec![AmpArg::Json(request), AmpArg::Str(id.clone())], &mut frame)?;

        let written = async {
            let mut writer = self.writer.lock().await;
            writer.write_all(&frame).await?;
            writer.flush().await
        }
        .await;

        if let Err(err) = written {
            if let Some(pending) = self.pending.lock().await.as_mut() {
                pending.remove(&id);
            }
            return Err(AppError::Io(format!("failed to send {method}: {err}")));
        }

        debug!(method, id, "rpc request sent");

        let reply = rx.await.map_err(|_| {
            AppError::Connection(format!("pm2 rpc connection closed before {method} reply"))
        })?;
        reply_args(method, reply)
    }
}

impl Drop for Pm2Client {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl ProcessSupervisor for Pm2Client {
    fn list_processes(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ManagedProcess>>> + Send + '_>> {
        Box::pin(async move {
            let args = self
                .call(LIST_METHOD, json!({}))
                .await
                .map_err(|err| AppError::List(err.to_string()))?;
            let list = args
                .first()
                .ok_or_else(|| AppError::List(format!("{LIST_METHOD} returned no list")))?;
            parse_process_list(list).map_err(|err| AppError::List(err.to_string()))
        })
    }

    fn restart_process(&self, id: u64) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.call(RESTART_METHOD, json!({ "id": id, "env": {} }))
                .await
                .map(|_| ())
                .map_err(|err| AppError::Restart(format!("pm_id {id}: {err}")))
        })
    }
}

/// Read bus frames from `stream` and forward lifecycle events into `tx`.
///
/// Frames whose payload does not decode are skipped. The reader stops on
/// cancellation, end of stream, an I/O or framing error, or when the
/// receiving side is dropped. Closing `tx` signals the end of the bus.
pub async fn run_bus_reader<R>(
    stream: R,
    tx: mpsc::Sender<LifecycleEvent>,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(stream, AmpCodec::new());

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("bus reader cancelled");
                break;
            }

            item = framed.next() => match item {
                None => {
                    warn!("pm2 event bus closed");
                    break;
                }
                Some(Err(err)) => {
                    warn!(%err, "pm2 event bus framing lost, stopping");
                    break;
                }
                Some(Ok(frame)) => {
                    if let Some(event) = parse_bus_frame(frame) {
                        if tx.send(event).await.is_err() {
                            debug!("event receiver dropped, stopping bus reader");
                            break;
                        }
                    }
                }
            },
        }
    }
}

/// Turn one `[topic, payload]` bus frame into a lifecycle event.
///
/// Returns `None` for other topics and for malformed process events.
#[must_use]
pub fn parse_bus_frame(frame: Vec<AmpArg>) -> Option<LifecycleEvent> {
    let mut args = frame.into_iter();
    let topic = args.next()?;
    if topic.as_str() != Some(BUS_EVENT) {
        trace!(?topic, "ignoring bus topic");
        return None;
    }

    let Some(payload) = args.next().and_then(AmpArg::into_json) else {
        warn!("process event without json payload");
        return None;
    };

    match parse_bus_event(&payload) {
        Ok(event) => Some(event),
        Err(err) => {
            warn!(%err, "skipping malformed process event");
            None
        }
    }
}

async fn open_socket(path: &Path) -> std::io::Result<Stream> {
    let name = path.to_fs_name::<GenericFilePath>()?;
    Stream::connect(name).await
}

/// Route reply frames to their waiting callers until the socket closes.
async fn read_replies(recv: RecvHalf, pending: PendingReplies) {
    let mut framed = FramedRead::new(recv, AmpCodec::new());

    while let Some(item) = framed.next().await {
        match item {
            Ok(frame) => dispatch_reply(frame, &pending).await,
            Err(err) => {
                warn!(%err, "pm2 rpc framing lost");
                break;
            }
        }
    }

    warn!("pm2 rpc connection closed");
    // Dropping the senders wakes every in-flight caller with an error.
    pending.lock().await.take();
}

async fn dispatch_reply(mut frame: Vec<AmpArg>, pending: &PendingReplies) {
    let Some(AmpArg::Str(id)) = frame.pop() else {
        warn!("rpc reply without request id, skipping");
        return;
    };
    // An undecodable reply still completes its caller, which then fails on
    // the null envelope.
    let payload = frame
        .into_iter()
        .next()
        .and_then(AmpArg::into_json)
        .unwrap_or_else(|| {
            warn!(%id, "rpc reply payload is not json");
            Value::Null
        });

    let waiter = pending
        .lock()
        .await
        .as_mut()
        .and_then(|map| map.remove(&id));

    match waiter {
        Some(tx) => {
            let _ = tx.send(payload);
        }
        None => debug!(%id, "rpc reply for unknown request"),
    }
}

/// Unpack an axon-rpc reply envelope.
fn reply_args(method: &str, reply: Value) -> Result<Vec<Value>> {
    let Value::Object(mut envelope) = reply else {
        return Err(AppError::Protocol(format!("{method}: reply is not an object")));
    };

    if let Some(err) = envelope.remove("error").filter(|e| !e.is_null()) {
        let msg = match err {
            Value::String(s) => s,
            other => other.to_string(),
        };
        return Err(AppError::Protocol(format!("{method} failed: {msg}")));
    }

    match envelope.remove("args") {
        Some(Value::Array(args)) => Ok(args),
        _ => Ok(Vec::new()),
    }
}
