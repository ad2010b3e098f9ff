//! Pure dispatch of verified inbound envelopes.
//!
//! Each message kind maps to one declared side effect; executing the effect
//! (writing the reply, forwarding to subscribers, logging) is the session
//! loop's job.

use serde_json::Value;

use crate::envelope::MessageKind;

/// The side effect a verified envelope asks for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    /// Write a reply frame back to the transport.
    Reply(MessageKind),
    /// Hand the payload to notification subscribers.
    Forward(Value),
    /// Log only.
    Ignore,
}

pub fn dispatch(kind: MessageKind) -> Action {
    match kind {
        // Transport keepalive courtesy: echo the correlation id.
        MessageKind::Ping { id } => Action::Reply(MessageKind::Pong { id }),
        MessageKind::Notification { data } => Action::Forward(data),
        MessageKind::Pong { .. } | MessageKind::Auth | MessageKind::Unknown => Action::Ignore,
    }
}
