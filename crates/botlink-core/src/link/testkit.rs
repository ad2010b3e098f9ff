//! Scripted connector + transport fakes for driving the link without sockets.

use std::collections::VecDeque;
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{
    ports::{Connector, Frame, Transport},
    Error, Result,
};

/// Test-side handle to a scripted transport: feed inbound frames, inspect
/// what the session wrote, and end the stream.
#[derive(Clone)]
pub struct TransportHandle {
    incoming: Arc<Mutex<Option<mpsc::UnboundedSender<Frame>>>>,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

impl TransportHandle {
    pub fn feed(&self, frame: Frame) {
        if let Some(tx) = self.incoming.lock().unwrap().as_ref() {
            let _ = tx.send(frame);
        }
    }

    pub fn feed_text(&self, frame: impl Into<String>) {
        self.feed(Frame::Text(frame.into()));
    }

    /// Drop the inbound sender; the session sees end-of-stream.
    pub fn end_input(&self) {
        let _ = self.incoming.lock().unwrap().take();
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub struct FakeTransport {
    incoming: mpsc::UnboundedReceiver<Frame>,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send_text(&mut self, frame: &str) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Transport("transport closed".to_string()));
        }
        self.sent.lock().unwrap().push(frame.to_string());
        Ok(())
    }

    async fn next_frame(&mut self) -> Option<Frame> {
        self.incoming.recv().await
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

enum Outcome {
    Refuse,
    Accept(FakeTransport),
}

/// Connector whose outcomes are scripted in advance. Once the script runs
/// out, further attempts are refused.
pub struct FakeConnector {
    outcomes: Mutex<VecDeque<Outcome>>,
    attempts: AtomicUsize,
    last_headers: Mutex<Vec<(String, String)>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            attempts: AtomicUsize::new(0),
            last_headers: Mutex::new(Vec::new()),
        }
    }

    pub fn push_refuse(&self) {
        self.outcomes.lock().unwrap().push_back(Outcome::Refuse);
    }

    /// Script a successful connect; returns the handle driving the transport
    /// that attempt will hand out.
    pub fn push_accept(&self) -> TransportHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let transport = FakeTransport {
            incoming: rx,
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        };
        self.outcomes
            .lock()
            .unwrap()
            .push_back(Outcome::Accept(transport));

        TransportHandle {
            incoming: Arc::new(Mutex::new(Some(tx))),
            sent,
            closed,
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn last_headers(&self) -> Vec<(String, String)> {
        self.last_headers.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(
        &self,
        _uri: &str,
        headers: &[(String, String)],
    ) -> Result<Box<dyn Transport>> {
        let _ = self.attempts.fetch_add(1, Ordering::SeqCst);
        *self.last_headers.lock().unwrap() = headers.to_vec();

        match self.outcomes.lock().unwrap().pop_front() {
            Some(Outcome::Accept(transport)) => Ok(Box::new(transport)),
            Some(Outcome::Refuse) | None => Err(Error::Connect("connection refused".to_string())),
        }
    }
}
