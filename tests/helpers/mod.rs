//! Shared fixtures for integration tests.

use std::sync::{Arc, Mutex};

use hearth_core::auth::{AuthUser, StaticAuthenticator};
use hearth_core::notify::NotificationSink;
use hearth_core::service::FamilyService;

/// One captured push hand-off: (push token, sender name, body).
pub type PushRecord = (String, String, String);

/// Sink that records every hand-off for assertions.
#[derive(Debug, Default)]
pub struct CaptureSink {
    records: Mutex<Vec<PushRecord>>,
}

impl CaptureSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn records(&self) -> Vec<PushRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl NotificationSink for CaptureSink {
    fn notify(&self, push_token: &str, sender_name: &str, body: &str) {
        self.records.lock().unwrap().push((
            push_token.to_string(),
            sender_name.to_string(),
            body.to_string(),
        ));
    }
}

pub fn auth_user(id: &str) -> AuthUser {
    AuthUser {
        id: id.to_string(),
        email: format!("{id}@example.com"),
    }
}

/// Service over an in-memory store with a capture sink and bearer tokens
/// `tok-alice` / `tok-bob`.
pub fn service_with_sink() -> (FamilyService, Arc<CaptureSink>) {
    let authenticator = StaticAuthenticator::new()
        .with_token("tok-alice", "alice", "alice@example.com")
        .with_token("tok-bob", "bob", "bob@example.com");
    let sink = CaptureSink::new();
    let sink_seam: Arc<dyn NotificationSink> = sink.clone();
    let service =
        FamilyService::in_memory(Arc::new(authenticator), sink_seam).expect("in-memory service");
    (service, sink)
}

/// Registers Alice and Bob, puts both in one circle (Alice admin), and
/// returns the circle id.
pub fn family_of_two(service: &FamilyService) -> String {
    service
        .register_member(&auth_user("alice"), "Alice")
        .expect("register alice");
    service
        .register_member(&auth_user("bob"), "Bob")
        .expect("register bob");
    let circle = service
        .create_circle("alice", "Family")
        .expect("create circle");
    let invitation = service.invite("alice", &circle.id).expect("invite");
    service
        .redeem_invitation("bob", &invitation.token)
        .expect("redeem");
    circle.id
}
