//! Local stand-in for a remote filesystem watcher.
//!
//! The remote `watch` call answers with a side-channel address. [`FsWatcher`]
//! connects to it in the background and turns the frames it receives into
//! [`WatcherEvent`]s on a broadcast channel, plus listener invocations for
//! `listener`-tagged frames.
//!
//! The protocol itself is the pure [`transition`] function; the background
//! task only feeds it inputs and carries out the effects it returns.

use fsremote_types::{CLOSE_FRAME, ErrorDescription, FrameSource, MarshalError, Value, WatchFrame};
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::constants::WATCH_EVENT_CAPACITY;

/// Local callback for `listener` frames: `(event_type, data)`.
pub type WatchListener = Arc<dyn Fn(&str, &Value) + Send + Sync>;

// ============================================================================
// State machine
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// Address known, socket not connected yet.
    Requesting { close_queued: bool },
    Connected,
    Closed,
    Errored,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WatchInput {
    Connected,
    Frame(WatchFrame),
    /// A line that did not decode as a frame.
    BadFrame(MarshalError),
    CloseRequested,
    TransportError(String),
    SocketClosed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WatchEffect {
    /// Write the `close` control frame.
    SendClose,
    EmitError(WatchError),
    EmitClose,
    Forward(WatchFrame),
}

/// Why a watcher reported an error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WatchError {
    /// The side-channel socket failed.
    #[error("watch transport error: {0}")]
    Transport(String),
    /// The remote watcher reported an error.
    #[error("{0}")]
    Remote(ErrorDescription),
    /// A frame could not be decoded.
    #[error(transparent)]
    Protocol(MarshalError),
}

/// Events observable on a [`FsWatcher`].
#[derive(Debug, Clone, PartialEq)]
pub enum WatcherEvent {
    /// Something under the watched path changed; `data` is the file name.
    Change { data: Value },
    Error(WatchError),
    /// Emitted exactly once, last.
    Close,
    /// A watcher frame with an event type this client has no variant for.
    Other { event_type: String, data: Value },
}

/// One protocol step.
pub fn transition(state: WatchState, input: WatchInput) -> (WatchState, Vec<WatchEffect>) {
    use WatchEffect as E;
    use WatchInput as I;
    use WatchState as S;

    match (state, input) {
        (S::Closed, _) => (S::Closed, vec![]),

        (S::Requesting { close_queued }, I::Connected) => {
            let effects = if close_queued { vec![E::SendClose] } else { vec![] };
            (S::Connected, effects)
        }
        (S::Requesting { .. }, I::CloseRequested) => (S::Requesting { close_queued: true }, vec![]),
        (S::Connected, I::CloseRequested) => (S::Connected, vec![E::SendClose]),

        (S::Requesting { .. } | S::Connected, I::TransportError(detail)) => {
            (S::Errored, vec![E::EmitError(WatchError::Transport(detail))])
        }
        (_, I::SocketClosed) => (S::Closed, vec![E::EmitClose]),

        (S::Connected, I::Frame(frame)) => {
            if frame.source == FrameSource::Watcher && frame.event_type == "close" {
                (S::Closed, vec![E::EmitClose])
            } else {
                (S::Connected, vec![E::Forward(frame)])
            }
        }
        (S::Connected, I::BadFrame(err)) => (S::Connected, vec![E::EmitError(WatchError::Protocol(err))]),

        (state, _) => (state, vec![]),
    }
}

// ============================================================================
// FsWatcher
// ============================================================================

struct Shared {
    state: Mutex<WatchState>,
    events: broadcast::Sender<WatcherEvent>,
    listener: Option<WatchListener>,
}

impl Shared {
    /// Apply one input, emit its events, and report whether a `close` frame
    /// must be written.
    fn step(&self, input: WatchInput) -> bool {
        let effects = {
            let mut state = self.state.lock();
            let (next, effects) = transition(*state, input);
            if next != *state {
                tracing::trace!(from = ?*state, to = ?next, "watch state");
            }
            *state = next;
            effects
        };

        let mut send_close = false;
        for effect in effects {
            match effect {
                WatchEffect::SendClose => send_close = true,
                WatchEffect::EmitError(err) => self.emit(WatcherEvent::Error(err)),
                WatchEffect::EmitClose => self.emit(WatcherEvent::Close),
                WatchEffect::Forward(frame) => self.forward(frame),
            }
        }
        send_close
    }

    fn forward(&self, frame: WatchFrame) {
        let data = frame.data.to_value();
        match frame.source {
            FrameSource::Listener => {
                if let Some(listener) = &self.listener {
                    listener(&frame.event_type, &data);
                }
            }
            FrameSource::Watcher => {
                let event = match frame.event_type.as_str() {
                    "change" => WatcherEvent::Change { data },
                    "error" => match frame.data {
                        fsremote_types::FrameData::Error(desc) => WatcherEvent::Error(WatchError::Remote(desc)),
                        _ => WatcherEvent::Error(WatchError::Remote(ErrorDescription {
                            name: "Error".into(),
                            message: data.to_string(),
                            code: None,
                        })),
                    },
                    _ => WatcherEvent::Other {
                        event_type: frame.event_type,
                        data,
                    },
                };
                self.emit(event);
            }
        }
    }

    fn emit(&self, event: WatcherEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Handle to a remote watcher.
///
/// Usable as soon as it is returned; the connection completes in the
/// background.
pub struct FsWatcher {
    shared: Arc<Shared>,
    close_tx: mpsc::UnboundedSender<()>,
    /// Stops the background task and drops the socket.
    cancel: CancellationToken,
    first_events: Mutex<Option<broadcast::Receiver<WatcherEvent>>>,
    addr: String,
}

impl std::fmt::Debug for FsWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsWatcher")
            .field("addr", &self.addr)
            .field("state", &self.state())
            .finish()
    }
}

impl FsWatcher {
    /// Start connecting to the watch side channel at `addr`.
    pub fn connect(addr: impl Into<String>, listener: Option<WatchListener>, runtime: &Handle) -> Self {
        let addr = addr.into();
        let (events, first) = broadcast::channel(WATCH_EVENT_CAPACITY);
        let shared = Arc::new(Shared {
            state: Mutex::new(WatchState::Requesting { close_queued: false }),
            events,
            listener,
        });
        let (close_tx, close_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        runtime.spawn(drive(Arc::clone(&shared), addr.clone(), close_rx, cancel.clone()));
        Self {
            shared,
            close_tx,
            cancel,
            first_events: Mutex::new(Some(first)),
            addr,
        }
    }

    /// Subscribe to events.
    ///
    /// The first subscriber sees every event since the watcher was created;
    /// later ones only see events from the moment they subscribe.
    pub fn events(&self) -> broadcast::Receiver<WatcherEvent> {
        self.first_events
            .lock()
            .take()
            .unwrap_or_else(|| self.shared.events.subscribe())
    }

    pub fn state(&self) -> WatchState {
        *self.shared.state.lock()
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Ask the remote side to stop watching. Completion is the
    /// [`WatcherEvent::Close`] event.
    pub fn close(&self) {
        if self.shared.step(WatchInput::CloseRequested) {
            let _ = self.close_tx.send(());
        }
    }
}

impl Drop for FsWatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn drive(
    shared: Arc<Shared>,
    addr: String,
    mut close_rx: mpsc::UnboundedReceiver<()>,
    cancel: CancellationToken,
) {
    let connected = tokio::select! {
        _ = cancel.cancelled() => {
            shared.step(WatchInput::SocketClosed);
            return;
        }
        connected = TcpStream::connect(&addr) => connected,
    };
    let stream = match connected {
        Ok(stream) => stream,
        Err(e) => {
            tracing::debug!(%addr, error = %e, "watch connect failed");
            shared.step(WatchInput::TransportError(e.to_string()));
            shared.step(WatchInput::SocketClosed);
            return;
        }
    };
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    if shared.step(WatchInput::Connected) {
        send_close(&shared, &mut writer).await;
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!(%addr, "watcher dropped, hanging up");
                break;
            }
            Some(()) = close_rx.recv() => send_close(&shared, &mut writer).await,
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let input = match WatchFrame::decode(&line) {
                        Ok(frame) => WatchInput::Frame(frame),
                        Err(e) => WatchInput::BadFrame(e),
                    };
                    shared.step(input);
                }
                Ok(None) => break,
                Err(e) => {
                    shared.step(WatchInput::TransportError(e.to_string()));
                    break;
                }
            },
        }
    }
    shared.step(WatchInput::SocketClosed);
}

async fn send_close(shared: &Shared, writer: &mut OwnedWriteHalf) {
    let line = format!("{CLOSE_FRAME}\n");
    if let Err(e) = writer.write_all(line.as_bytes()).await {
        shared.step(WatchInput::TransportError(e.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsremote_types::FrameData;

    fn change(name: &str) -> WatchFrame {
        WatchFrame::watcher("change", FrameData::Text(name.into()))
    }

    #[test]
    fn test_close_queued_until_connected() {
        let (state, effects) = transition(WatchState::Requesting { close_queued: false }, WatchInput::CloseRequested);
        assert_eq!(state, WatchState::Requesting { close_queued: true });
        assert!(effects.is_empty());

        let (state, effects) = transition(state, WatchInput::Connected);
        assert_eq!(state, WatchState::Connected);
        assert_eq!(effects, vec![WatchEffect::SendClose]);
    }

    #[test]
    fn test_connected_forwards_frames() {
        let (state, effects) = transition(WatchState::Connected, WatchInput::Frame(change("a.txt")));
        assert_eq!(state, WatchState::Connected);
        assert_eq!(effects, vec![WatchEffect::Forward(change("a.txt"))]);
    }

    #[test]
    fn test_close_emitted_once() {
        let (state, effects) = transition(WatchState::Connected, WatchInput::SocketClosed);
        assert_eq!(state, WatchState::Closed);
        assert_eq!(effects, vec![WatchEffect::EmitClose]);

        for input in [
            WatchInput::SocketClosed,
            WatchInput::CloseRequested,
            WatchInput::Frame(change("b")),
            WatchInput::TransportError("reset".into()),
        ] {
            let (next, effects) = transition(state, input);
            assert_eq!(next, WatchState::Closed);
            assert!(effects.is_empty());
        }
    }

    #[test]
    fn test_transport_error_then_close() {
        let (state, effects) = transition(WatchState::Connected, WatchInput::TransportError("reset".into()));
        assert_eq!(state, WatchState::Errored);
        assert_eq!(effects, vec![WatchEffect::EmitError(WatchError::Transport("reset".into()))]);

        let (state, effects) = transition(state, WatchInput::Frame(change("c")));
        assert_eq!(state, WatchState::Errored);
        assert!(effects.is_empty());

        let (state, effects) = transition(state, WatchInput::SocketClosed);
        assert_eq!(state, WatchState::Closed);
        assert_eq!(effects, vec![WatchEffect::EmitClose]);
    }

    #[test]
    fn test_remote_close_frame_closes() {
        let frame = WatchFrame::watcher("close", FrameData::None);
        let (state, effects) = transition(WatchState::Connected, WatchInput::Frame(frame));
        assert_eq!(state, WatchState::Closed);
        assert_eq!(effects, vec![WatchEffect::EmitClose]);
    }

    #[test]
    fn test_bad_frame_keeps_connection() {
        let err = MarshalError::MalformedEnvelope("nope".into());
        let (state, effects) = transition(WatchState::Connected, WatchInput::BadFrame(err.clone()));
        assert_eq!(state, WatchState::Connected);
        assert_eq!(effects, vec![WatchEffect::EmitError(WatchError::Protocol(err))]);
    }

    #[test]
    fn test_remote_error_frame_is_remote_variant() {
        let (tx, mut rx) = broadcast::channel(8);
        let shared = Shared {
            state: Mutex::new(WatchState::Connected),
            events: tx,
            listener: None,
        };
        let desc = ErrorDescription {
            name: "Error".into(),
            message: "EPERM: operation not permitted, watch".into(),
            code: Some("EPERM".into()),
        };
        shared.step(WatchInput::Frame(WatchFrame::watcher("error", FrameData::Error(desc.clone()))));
        assert_eq!(rx.try_recv().unwrap(), WatcherEvent::Error(WatchError::Remote(desc)));
    }

    #[test]
    fn test_listener_frames_go_to_listener_only() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let (tx, mut rx) = broadcast::channel(8);
        let shared = Shared {
            state: Mutex::new(WatchState::Connected),
            events: tx,
            listener: Some(Arc::new(move |event_type: &str, data: &Value| {
                sink.lock().push((event_type.to_string(), data.clone()));
            })),
        };
        shared.step(WatchInput::Frame(WatchFrame::listener("rename", FrameData::Text("new.txt".into()))));
        assert_eq!(seen.lock().as_slice(), &[("rename".to_string(), Value::from("new.txt"))]);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unreachable_address_errors_then_closes() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let watcher = FsWatcher::connect(addr, None, &Handle::current());
        let mut events = watcher.events();
        assert!(matches!(events.recv().await.unwrap(), WatcherEvent::Error(WatchError::Transport(_))));
        assert_eq!(events.recv().await.unwrap(), WatcherEvent::Close);
        assert_eq!(watcher.state(), WatchState::Closed);
    }
}
