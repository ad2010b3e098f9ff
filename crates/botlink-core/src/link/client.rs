//! Public handle to the backend link.
//!
//! Constructed once at startup and injected into collaborators; there is no
//! process-wide client instance. Cloning the handle is cheap and all clones
//! drive the same link.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use serde_json::Value;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    backoff::Backoff,
    config::Config,
    credentials::Credentials,
    envelope::MessageKind,
    link::{session::Session, supervisor::Supervisor},
    ports::Connector,
    Error, Result,
};

const OUTGOING_QUEUE: usize = 64;
const NOTIFICATION_QUEUE: usize = 64;

#[derive(Clone)]
pub struct LinkClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    outgoing_tx: mpsc::Sender<MessageKind>,
    notifications: broadcast::Sender<Value>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
    supervisor: Mutex<Option<Supervisor>>,
    // Consumed by `stop()` only; `join()` observes completion through
    // `done_tx` so the two never race over the handle.
    handle: Mutex<Option<JoinHandle<()>>>,
    outcome: Arc<Mutex<Option<Result<()>>>>,
    done_tx: watch::Sender<bool>,
}

impl LinkClient {
    pub fn new(
        cfg: Arc<Config>,
        connector: Arc<dyn Connector>,
        credentials: Arc<dyn Credentials>,
    ) -> Self {
        let (outgoing_tx, outgoing_rx) = mpsc::channel(OUTGOING_QUEUE);
        let (notifications, _) = broadcast::channel(NOTIFICATION_QUEUE);
        let connected = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();

        let session = Session::new(cfg.ws_uri(), connector, Arc::clone(&credentials));
        let backoff = Backoff::new(cfg.reconnect_min_delay, cfg.reconnect_max_delay);
        let supervisor = Supervisor::new(
            cfg,
            session,
            credentials,
            backoff,
            outgoing_rx,
            notifications.clone(),
            Arc::clone(&connected),
            cancel.clone(),
        );

        let (done_tx, _) = watch::channel(false);

        Self {
            inner: Arc::new(ClientInner {
                outgoing_tx,
                notifications,
                connected,
                cancel,
                supervisor: Mutex::new(Some(supervisor)),
                handle: Mutex::new(None),
                outcome: Arc::new(Mutex::new(None)),
                done_tx,
            }),
        }
    }

    /// Spawn the reconnect supervisor. No-op if already started.
    pub async fn start(&self) {
        let Some(supervisor) = self.inner.supervisor.lock().await.take() else {
            return;
        };
        let outcome = Arc::clone(&self.inner.outcome);
        let done_tx = self.inner.done_tx.clone();
        let handle = tokio::spawn(async move {
            let res = supervisor.run().await;
            *outcome.lock().await = Some(res);
            let _ = done_tx.send(true);
        });
        *self.inner.handle.lock().await = Some(handle);
    }

    /// Stop the link and wait for shutdown. Interrupts an in-progress
    /// connect, receive loop, or backoff wait; the transport is closed by
    /// the time this returns. Safe to call more than once, and safe to call
    /// while another task is parked in [`join`](Self::join).
    pub async fn stop(&self) {
        self.inner.cancel.cancel();
        self.inner.connected.store(false, Ordering::SeqCst);
        match self.inner.handle.lock().await.take() {
            Some(handle) => {
                let _ = handle.await;
            }
            None => {
                // Either never started, or a previous stop already awaited
                // shutdown; in the latter case completion is already marked.
                if self.inner.supervisor.lock().await.is_none() {
                    let mut done = self.inner.done_tx.subscribe();
                    let _ = done.wait_for(|done| *done).await;
                }
            }
        }
    }

    /// Wait for the supervisor to end on its own. [`Error::LinkAbandoned`]
    /// is the only unrecoverable condition surfaced here. Does not take over
    /// shutdown: a concurrent [`stop`](Self::stop) still waits for the
    /// transport to close.
    pub async fn join(&self) -> Result<()> {
        if self.inner.supervisor.lock().await.is_some() {
            return Ok(());
        }
        let mut done = self.inner.done_tx.subscribe();
        if done.wait_for(|done| *done).await.is_err() {
            return Ok(());
        }
        self.inner.outcome.lock().await.take().unwrap_or(Ok(()))
    }

    /// Whether a session is currently connected. Collaborators gate
    /// privileged actions on this before sending.
    pub fn connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Queue one message for the current session.
    pub async fn send(&self, kind: MessageKind) -> Result<()> {
        if !self.connected() {
            return Err(Error::NotConnected);
        }
        self.inner
            .outgoing_tx
            .send(kind)
            .await
            .map_err(|_| Error::NotConnected)
    }

    /// Queue an application payload as a `notification` frame.
    pub async fn notify(&self, data: Value) -> Result<()> {
        self.send(MessageKind::Notification { data }).await
    }

    /// Subscribe to payloads the backend pushes at us. Delivery never blocks
    /// the receive loop; slow subscribers observe lag, not backpressure.
    pub fn subscribe(&self) -> broadcast::Receiver<Value> {
        self.inner.notifications.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthMode, RetryPolicy};
    use crate::credentials::SignedSecret;
    use crate::envelope::{sign, verify, Envelope};
    use crate::link::testkit::FakeConnector;
    use serde_json::json;
    use std::time::{Duration, Instant};
    use tokio::time::sleep;

    const SECRET: &[u8] = b"client-secret";

    fn test_cfg(retry_policy: RetryPolicy) -> Arc<Config> {
        Arc::new(Config {
            server_addr: "backend.test".to_string(),
            server_port: 8080,
            secret: String::from_utf8(SECRET.to_vec()).unwrap(),
            api_key: None,
            auth_mode: AuthMode::Signed,
            connect_timeout: Duration::from_secs(1),
            reconnect_min_delay: Duration::from_millis(10),
            reconnect_max_delay: Duration::from_millis(20),
            heartbeat_timeout: Duration::from_secs(5),
            liveness_check_interval: Duration::from_millis(10),
            expiry_tolerance_secs: 30,
            retry_policy,
        })
    }

    fn client_with(cfg: Arc<Config>, connector: Arc<FakeConnector>) -> LinkClient {
        LinkClient::new(cfg, connector, Arc::new(SignedSecret::new(SECRET.to_vec())))
    }

    fn signed(kind: MessageKind) -> String {
        sign(&Envelope::new(kind), SECRET).unwrap()
    }

    /// Poll until the condition holds or the deadline passes.
    async fn wait_for(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not met in time");
            sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn connects_and_reports_connected() {
        let connector = Arc::new(FakeConnector::new());
        let handle = connector.push_accept();
        let client = client_with(test_cfg(RetryPolicy::Unbounded), Arc::clone(&connector));

        client.start().await;
        wait_for(|| client.connected()).await;

        let sent = handle.sent();
        assert_eq!(verify(&sent[0], SECRET, 30).unwrap().message, MessageKind::Auth);

        client.stop().await;
        assert!(!client.connected());
        assert!(handle.closed());
    }

    #[tokio::test]
    async fn ping_is_answered_with_pong_carrying_the_same_id() {
        let connector = Arc::new(FakeConnector::new());
        let handle = connector.push_accept();
        let client = client_with(test_cfg(RetryPolicy::Unbounded), Arc::clone(&connector));

        client.start().await;
        wait_for(|| client.connected()).await;

        handle.feed_text(signed(MessageKind::Ping {
            id: "abc".to_string(),
        }));

        wait_for(|| handle.sent().len() >= 2).await;
        let pong = verify(&handle.sent()[1], SECRET, 30).unwrap();
        assert_eq!(
            pong.message,
            MessageKind::Pong {
                id: "abc".to_string()
            }
        );

        client.stop().await;
    }

    #[tokio::test]
    async fn notifications_reach_subscribers() {
        let connector = Arc::new(FakeConnector::new());
        let handle = connector.push_accept();
        let client = client_with(test_cfg(RetryPolicy::Unbounded), Arc::clone(&connector));
        let mut notifications = client.subscribe();

        client.start().await;
        wait_for(|| client.connected()).await;

        handle.feed_text(signed(MessageKind::Notification {
            data: json!({"event": "raid_scheduled"}),
        }));

        let data = tokio::time::timeout(Duration::from_secs(2), notifications.recv())
            .await
            .expect("notification not delivered")
            .unwrap();
        assert_eq!(data, json!({"event": "raid_scheduled"}));

        client.stop().await;
    }

    #[tokio::test]
    async fn bad_frames_are_dropped_and_the_loop_continues() {
        let connector = Arc::new(FakeConnector::new());
        let handle = connector.push_accept();
        let client = client_with(test_cfg(RetryPolicy::Unbounded), Arc::clone(&connector));
        let mut notifications = client.subscribe();

        client.start().await;
        wait_for(|| client.connected()).await;

        handle.feed_text("not a frame at all");
        handle.feed_text(signed(MessageKind::Notification { data: json!(1) }));

        let data = tokio::time::timeout(Duration::from_secs(2), notifications.recv())
            .await
            .expect("loop should have survived the bad frame")
            .unwrap();
        assert_eq!(data, json!(1));
        assert!(client.connected());

        client.stop().await;
    }

    #[tokio::test]
    async fn transport_end_triggers_a_reconnect() {
        let connector = Arc::new(FakeConnector::new());
        let first = connector.push_accept();
        let _second = connector.push_accept();
        let client = client_with(test_cfg(RetryPolicy::Unbounded), Arc::clone(&connector));

        client.start().await;
        wait_for(|| client.connected()).await;

        first.end_input();
        wait_for(|| connector.attempts() == 2).await;
        wait_for(|| client.connected()).await;

        client.stop().await;
    }

    #[tokio::test]
    async fn inactivity_forces_a_reconnect_cycle() {
        let mut cfg = (*test_cfg(RetryPolicy::Unbounded)).clone();
        cfg.heartbeat_timeout = Duration::from_millis(50);
        let cfg = Arc::new(cfg);

        let connector = Arc::new(FakeConnector::new());
        let silent = connector.push_accept();
        let _replacement = connector.push_accept();
        let client = client_with(cfg, Arc::clone(&connector));

        client.start().await;
        wait_for(|| client.connected()).await;

        // Feed nothing: the watchdog should close the session and the
        // supervisor should dial again.
        wait_for(|| connector.attempts() == 2).await;
        assert!(silent.closed());

        client.stop().await;
    }

    #[tokio::test]
    async fn abandons_after_connect_failure_at_max_backoff() {
        let connector = Arc::new(FakeConnector::new());
        let client = client_with(test_cfg(RetryPolicy::AbandonAtMax), Arc::clone(&connector));

        client.start().await;
        // min=10ms, max=20ms: fail, wait 10, fail, wait 20, fail -> abandon.
        let res = tokio::time::timeout(Duration::from_secs(2), client.join())
            .await
            .expect("supervisor should have given up");

        assert!(matches!(res, Err(Error::LinkAbandoned { attempts: 3 })));
        assert_eq!(connector.attempts(), 3);
        assert!(!client.connected());
    }

    #[tokio::test]
    async fn unbounded_policy_keeps_retrying() {
        let connector = Arc::new(FakeConnector::new());
        let client = client_with(test_cfg(RetryPolicy::Unbounded), Arc::clone(&connector));

        client.start().await;
        wait_for(|| connector.attempts() >= 5).await;

        client.stop().await;
    }

    #[tokio::test]
    async fn stop_interrupts_a_backoff_wait() {
        let mut cfg = (*test_cfg(RetryPolicy::Unbounded)).clone();
        cfg.reconnect_min_delay = Duration::from_secs(30);
        cfg.reconnect_max_delay = Duration::from_secs(30);
        let cfg = Arc::new(cfg);

        let connector = Arc::new(FakeConnector::new());
        let client = client_with(cfg, Arc::clone(&connector));

        client.start().await;
        wait_for(|| connector.attempts() == 1).await;

        let started = Instant::now();
        client.stop().await;
        assert!(started.elapsed() < Duration::from_secs(2));
        // The backoff wait was aborted: no further dial happened.
        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test]
    async fn stop_still_awaits_shutdown_while_join_is_in_flight() {
        let connector = Arc::new(FakeConnector::new());
        let handle = connector.push_accept();
        let client = client_with(test_cfg(RetryPolicy::Unbounded), Arc::clone(&connector));

        client.start().await;
        wait_for(|| client.connected()).await;

        // The binary's select! polls join() concurrently with the shutdown
        // signal and drops it when the signal wins.
        let waiter = {
            let client = client.clone();
            tokio::spawn(async move { client.join().await })
        };
        sleep(Duration::from_millis(20)).await;
        waiter.abort();

        client.stop().await;
        assert!(handle.closed());
        assert!(!client.connected());
    }

    #[tokio::test]
    async fn join_reports_the_outcome_without_consuming_the_handle() {
        let connector = Arc::new(FakeConnector::new());
        let client = client_with(test_cfg(RetryPolicy::AbandonAtMax), Arc::clone(&connector));

        client.start().await;
        let res = tokio::time::timeout(Duration::from_secs(2), client.join())
            .await
            .expect("supervisor should have given up");
        assert!(matches!(res, Err(Error::LinkAbandoned { .. })));

        // Shutdown still has a handle to await.
        client.stop().await;
    }

    #[tokio::test]
    async fn send_fails_fast_when_not_connected() {
        let connector = Arc::new(FakeConnector::new());
        let client = client_with(test_cfg(RetryPolicy::Unbounded), connector);

        let err = client.notify(json!({"x": 1})).await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));
    }

    #[tokio::test]
    async fn queued_sends_reach_the_wire_signed() {
        let connector = Arc::new(FakeConnector::new());
        let handle = connector.push_accept();
        let client = client_with(test_cfg(RetryPolicy::Unbounded), Arc::clone(&connector));

        client.start().await;
        wait_for(|| client.connected()).await;

        client.notify(json!({"cmd": "update_entry"})).await.unwrap();
        wait_for(|| handle.sent().len() >= 2).await;

        let envelope = verify(&handle.sent()[1], SECRET, 30).unwrap();
        assert_eq!(
            envelope.message,
            MessageKind::Notification {
                data: json!({"cmd": "update_entry"})
            }
        );

        client.stop().await;
    }

    #[tokio::test]
    async fn start_twice_is_a_no_op() {
        let connector = Arc::new(FakeConnector::new());
        let _handle = connector.push_accept();
        let client = client_with(test_cfg(RetryPolicy::Unbounded), Arc::clone(&connector));

        client.start().await;
        client.start().await;
        wait_for(|| client.connected()).await;
        assert_eq!(connector.attempts(), 1);

        client.stop().await;
        client.stop().await;
    }
}
