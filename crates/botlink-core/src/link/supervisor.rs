//! Reconnect supervision: connect, run one cycle, back off, repeat.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    backoff::Backoff,
    config::{Config, RetryPolicy},
    credentials::Credentials,
    dispatch::{dispatch, Action},
    envelope::{verify, MessageKind},
    link::{
        liveness::{ActivityTracker, LivenessMonitor},
        session::Session,
    },
    ports::Frame,
    Error, Result,
};

/// Why one connected cycle ended.
enum CycleEnd {
    TransportEnded,
    InactivityTimeout,
    Stopped,
}

pub(crate) struct Supervisor {
    cfg: Arc<Config>,
    session: Session,
    credentials: Arc<dyn Credentials>,
    backoff: Backoff,
    outgoing_rx: mpsc::Receiver<MessageKind>,
    notifications: broadcast::Sender<Value>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl Supervisor {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        cfg: Arc<Config>,
        session: Session,
        credentials: Arc<dyn Credentials>,
        backoff: Backoff,
        outgoing_rx: mpsc::Receiver<MessageKind>,
        notifications: broadcast::Sender<Value>,
        connected: Arc<AtomicBool>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            cfg,
            session,
            credentials,
            backoff,
            outgoing_rx,
            notifications,
            connected,
            cancel,
        }
    }

    /// Run connect cycles until stopped or, under
    /// [`RetryPolicy::AbandonAtMax`], until a connect attempt fails after a
    /// full wait at maximum backoff.
    pub(crate) async fn run(mut self) -> Result<()> {
        let mut cycles: u32 = 0;
        // True once we have sat out a full max-length backoff wait.
        let mut waited_max = false;

        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            cycles += 1;

            let connect_res = tokio::select! {
                () = self.cancel.cancelled() => break,
                res = self.session.connect() => res,
            };

            match connect_res {
                Ok(()) => {
                    info!(cycle = cycles, "link established");
                    self.backoff.reset();
                    waited_max = false;
                    self.connected.store(true, Ordering::SeqCst);

                    let end = self.run_cycle().await;

                    self.connected.store(false, Ordering::SeqCst);
                    let _ = self.session.close().await;

                    match end {
                        CycleEnd::Stopped => break,
                        CycleEnd::TransportEnded => info!(cycle = cycles, "transport ended"),
                        CycleEnd::InactivityTimeout => {
                            warn!(cycle = cycles, "session closed for inactivity");
                        }
                    }
                }
                Err(e) => {
                    warn!(cycle = cycles, error = %e, "connect failed");
                    if waited_max && self.cfg.retry_policy == RetryPolicy::AbandonAtMax {
                        warn!(cycle = cycles, "giving up: backoff exhausted");
                        self.connected.store(false, Ordering::SeqCst);
                        return Err(Error::LinkAbandoned { attempts: cycles });
                    }
                }
            }

            if self.cancel.is_cancelled() {
                break;
            }

            let delay = self.backoff.next_delay();
            waited_max = delay >= self.backoff.max();
            info!(
                cycle = cycles,
                delay_ms = delay.as_millis() as u64,
                "reconnecting after backoff"
            );
            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = sleep(delay) => {}
            }
        }

        let _ = self.session.close().await;
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// One connected cycle: pump outgoing sends, verify and dispatch inbound
    /// frames, and watch for inactivity, until something ends the session.
    async fn run_cycle(&mut self) -> CycleEnd {
        let tracker = Arc::new(ActivityTracker::new());
        let monitor = LivenessMonitor::new(
            Arc::clone(&tracker),
            self.cfg.liveness_check_interval,
            self.cfg.heartbeat_timeout,
        );
        let expired = monitor.expired();
        tokio::pin!(expired);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => return CycleEnd::Stopped,

                idle = &mut expired => {
                    warn!(
                        idle_ms = idle.as_millis() as u64,
                        timeout_ms = self.cfg.heartbeat_timeout.as_millis() as u64,
                        "no traffic within heartbeat timeout"
                    );
                    return CycleEnd::InactivityTimeout;
                }

                outgoing = self.outgoing_rx.recv() => {
                    // Sender half dropping means the client handle is gone.
                    let Some(kind) = outgoing else { return CycleEnd::Stopped };
                    if let Err(e) = self.session.send(kind).await {
                        warn!(error = %e, "outgoing send failed");
                        return CycleEnd::TransportEnded;
                    }
                }

                frame = self.session.recv() => {
                    let Some(frame) = frame else { return CycleEnd::TransportEnded };
                    tracker.touch();
                    let Frame::Text(raw) = frame else { continue };
                    if let Err(e) = self.handle_frame(&raw).await {
                        warn!(error = %e, "reply failed");
                        return CycleEnd::TransportEnded;
                    }
                }
            }
        }
    }

    /// Verify one frame and execute its dispatch action. Verification
    /// failures are logged and dropped; only transport write failures
    /// propagate (they end the cycle).
    async fn handle_frame(&mut self, raw: &str) -> Result<()> {
        let envelope = match verify(
            raw,
            self.credentials.signing_secret(),
            self.cfg.expiry_tolerance_secs,
        ) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "dropping unverifiable frame");
                return Ok(());
            }
        };

        debug!(message_id = %envelope.message_id, "frame verified");
        match dispatch(envelope.message) {
            Action::Reply(kind) => self.session.send(kind).await?,
            Action::Forward(data) => {
                // Subscribers consume at their own pace; a send to zero
                // receivers is not an error.
                let _ = self.notifications.send(data);
            }
            Action::Ignore => debug!(message_id = %envelope.message_id, "no action for frame"),
        }
        Ok(())
    }
}
