//! Notification sink seam for offline push delivery.
//!
//! The engine hands every delivered message to the sink when the recipient
//! registered a push address. Transport (APNs, FCM, Expo) lives outside the
//! core; the contract here is fire-and-forget. Implementations must not
//! block the caller and must swallow their own failures (log them, never
//! propagate them), so push latency and outages can never affect a
//! delivery transaction that has already committed.

/// Receives delivered messages for offline push formatting.
pub trait NotificationSink: Send + Sync {
    /// Hands one delivered message to the push transport.
    ///
    /// `push_token` is the recipient's registered delivery address,
    /// `sender_name` the display name shown in the notification, `body`
    /// the message text. Infallible by contract: implementations log
    /// failures and return.
    fn notify(&self, push_token: &str, sender_name: &str, body: &str);
}

/// Sink that only logs. Useful as a default and in deployments without a
/// push transport.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&self, push_token: &str, sender_name: &str, body: &str) {
        log::info!(
            "push to {push_token}: from {sender_name}, {} chars",
            body.len()
        );
    }
}
