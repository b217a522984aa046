//! Notification fan-out: persisted rows, push messages and real-time events

pub mod fanout;
pub mod fcm;
pub mod push;
pub mod realtime;

pub use fanout::Notifier;
pub use fcm::FcmClient;
pub use push::{DisabledPush, PushError, PushMessage, PushReport, PushSender};
pub use realtime::{Audience, Envelope, EventName, RealtimeHub};
