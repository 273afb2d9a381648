//! Push channel abstraction
//!
//! The tracker talks to a [`ChannelConnector`] so the WebSocket transport can
//! be swapped for the in-process [`MockConnector`] in tests.

use async_trait::async_trait;
use futures_util::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::endpoints::Endpoints;
use crate::job::JobId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Connection error: {0}")]
    Connect(String),

    #[error("Channel error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, ChannelError>;

/// Opens one status channel per job id
#[async_trait]
pub trait ChannelConnector: Send + Sync + 'static {
    async fn connect(&self, job_id: &JobId) -> Result<Box<dyn StatusStream>>;
}

/// An open status channel delivering text frames
#[async_trait]
pub trait StatusStream: Send {
    /// Next text frame; `None` once the peer has closed the channel
    async fn next_frame(&mut self) -> Option<Result<String>>;

    /// Close the channel. Never fails; closing twice is harmless.
    async fn close(&mut self);
}

/// WebSocket connector for `/ws/status/{job_id}`
#[derive(Debug, Clone)]
pub struct WsConnector {
    endpoints: Endpoints,
}

impl WsConnector {
    pub fn new(endpoints: Endpoints) -> Self {
        Self { endpoints }
    }
}

#[async_trait]
impl ChannelConnector for WsConnector {
    async fn connect(&self, job_id: &JobId) -> Result<Box<dyn StatusStream>> {
        let url = self.endpoints.status(job_id.as_str());
        debug!(%url, "Opening status channel");

        let (socket, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| ChannelError::Connect(e.to_string()))?;

        Ok(Box::new(WsStatusStream {
            socket,
            closed: false,
        }))
    }
}

struct WsStatusStream {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
    closed: bool,
}

#[async_trait]
impl StatusStream for WsStatusStream {
    async fn next_frame(&mut self) -> Option<Result<String>> {
        if self.closed {
            return None;
        }

        loop {
            match self.socket.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => return Some(Ok(text)),
                    // Not a status frame; treated like any other malformed message
                    Err(_) => return Some(Ok(String::new())),
                },
                Ok(Message::Close(_)) => {
                    self.closed = true;
                    return None;
                }
                // Pings are answered by tungstenite on the next read
                Ok(_) => continue,
                Err(e) => return Some(Err(ChannelError::Transport(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.socket.close(None).await {
            debug!(error = %e, "Status channel close failed");
        }
    }
}

/// Frame scripted into a [`MockConnector`] connection
#[derive(Debug, Clone)]
pub enum MockFrame {
    Text(String),
    Error(String),
}

#[derive(Default)]
struct MockState {
    pending: HashMap<JobId, VecDeque<mpsc::UnboundedReceiver<MockFrame>>>,
    opened: Vec<JobId>,
    closed: Vec<JobId>,
}

/// In-process connector for tests and offline development.
///
/// Every [`MockConnector::script`] call queues one future connection for a job
/// id; connecting without a queued script fails with [`ChannelError::Connect`].
#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a connection for `job_id` and return its feed
    pub fn script(&self, job_id: impl Into<JobId>) -> MockFeed {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock()
            .pending
            .entry(job_id.into())
            .or_default()
            .push_back(rx);
        MockFeed { tx }
    }

    /// Job ids in the order their connections were opened
    pub fn opened(&self) -> Vec<JobId> {
        self.lock().opened.clone()
    }

    /// Job ids whose connections were closed by the client
    pub fn closed(&self) -> Vec<JobId> {
        self.lock().closed.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        // A panic while holding the lock only happens inside a failing test
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ChannelConnector for MockConnector {
    async fn connect(&self, job_id: &JobId) -> Result<Box<dyn StatusStream>> {
        let mut state = self.lock();
        let rx = state
            .pending
            .get_mut(job_id)
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| ChannelError::Connect(format!("no scripted channel for {job_id}")))?;
        state.opened.push(job_id.clone());
        drop(state);

        tracing::info!(%job_id, "Mock channel opened");
        Ok(Box::new(MockStream {
            job_id: job_id.clone(),
            rx,
            state: self.state.clone(),
            closed: false,
        }))
    }
}

/// Sending side of a scripted mock connection. Dropping it ends the connection.
pub struct MockFeed {
    tx: mpsc::UnboundedSender<MockFrame>,
}

impl MockFeed {
    pub fn send(&self, frame: impl Into<String>) {
        let _ = self.tx.send(MockFrame::Text(frame.into()));
    }

    pub fn send_status(&self, status: &str) {
        self.send(serde_json::json!({ "status": status }).to_string());
    }

    pub fn fail(&self, message: impl Into<String>) {
        let _ = self.tx.send(MockFrame::Error(message.into()));
    }

    /// Simulate the server hanging up
    pub fn disconnect(self) {}
}

struct MockStream {
    job_id: JobId,
    rx: mpsc::UnboundedReceiver<MockFrame>,
    state: Arc<Mutex<MockState>>,
    closed: bool,
}

#[async_trait]
impl StatusStream for MockStream {
    async fn next_frame(&mut self) -> Option<Result<String>> {
        if self.closed {
            return None;
        }
        match self.rx.recv().await? {
            MockFrame::Text(text) => Some(Ok(text)),
            MockFrame::Error(message) => Some(Err(ChannelError::Transport(message))),
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.rx.close();
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        state.closed.push(self.job_id.clone());
    }
}
