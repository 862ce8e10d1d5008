//! High-level service facade.
//!
//! [`FamilyService`] wires the store, the delivery engine, the fan-out hub,
//! the notification sink, and the authentication seam into the operation
//! surface an HTTP layer maps onto one-to-one: profiles, state changes,
//! rosters, circles, invitations, and the message lifecycle. All actor
//! authorization happens here, against the identity the authenticator
//! returned.
//!
//! # Example
//!
//! ```ignore
//! use std::path::Path;
//! use std::sync::Arc;
//! use hearth_core::notify::LogSink;
//! use hearth_core::service::FamilyService;
//!
//! let service = FamilyService::new(Path::new("/data/hearth"), authenticator, Arc::new(LogSink))?;
//! let user = service.authenticate(bearer)?;
//! let circles = service.list_circles(&user.id)?;
//! ```

use std::path::Path;
use std::sync::Arc;

use uuid::Uuid;

use crate::auth::{AuthUser, Authenticator};
use crate::circle::{generate_token, Circle, CircleMembership, Invitation, MemberRole};
use crate::delivery::DeliveryEngine;
use crate::error::{CoreError, Result};
use crate::message::Message;
use crate::notify::NotificationSink;
use crate::presence::{DeliveryTrigger, Member, MemberState};
use crate::realtime::{FanoutHub, RealtimeEvent};
use crate::store::{StateChange, Store};

fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// The family-coordination operation surface.
pub struct FamilyService {
    store: Arc<Store>,
    hub: Arc<FanoutHub>,
    sink: Arc<dyn NotificationSink>,
    engine: DeliveryEngine,
    authenticator: Arc<dyn Authenticator>,
}

impl FamilyService {
    /// Creates a service with its database under `data_dir`.
    ///
    /// Creates the directory and database if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if initialization fails.
    pub fn new(
        data_dir: &Path,
        authenticator: Arc<dyn Authenticator>,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .map_err(|e| CoreError::Storage(format!("Failed to create data directory: {e}")))?;
        let store = Arc::new(Store::new(&data_dir.join("hearth.db"))?);
        Ok(Self::assemble(store, authenticator, sink))
    }

    /// Creates a service over an in-memory database for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if initialization fails.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn in_memory(
        authenticator: Arc<dyn Authenticator>,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Self> {
        let store = Arc::new(Store::in_memory()?);
        Ok(Self::assemble(store, authenticator, sink))
    }

    fn assemble(
        store: Arc<Store>,
        authenticator: Arc<dyn Authenticator>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let hub = Arc::new(FanoutHub::new());
        let engine = DeliveryEngine::new(Arc::clone(&store), Arc::clone(&hub), Arc::clone(&sink));
        Self {
            store,
            hub,
            sink,
            engine,
            authenticator,
        }
    }

    /// The live-channel registry, for the transport layer to connect and
    /// disconnect subscriber sessions.
    #[must_use]
    pub fn hub(&self) -> &Arc<FanoutHub> {
        &self.hub
    }

    // ==================== Identity ====================

    /// Resolves a bearer credential to an identity.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Unauthorized`] for a missing, invalid, or
    /// expired credential.
    pub fn authenticate(&self, bearer: &str) -> Result<AuthUser> {
        self.authenticator.authenticate(bearer)
    }

    // ==================== Profiles & presence ====================

    /// Registers the authenticated user's member profile.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Conflict`] if the profile already exists.
    pub fn register_member(&self, user: &AuthUser, name: &str) -> Result<Member> {
        self.store.create_member(&user.id, name, now_ts())
    }

    /// Fetches a member profile.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if no such member exists.
    pub fn profile(&self, member_id: &str) -> Result<Member> {
        self.store.get_member(member_id)
    }

    /// Stores the actor's push-delivery address.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the actor has no profile.
    pub fn set_push_token(&self, actor_id: &str, push_token: &str) -> Result<()> {
        self.store.set_push_token(actor_id, push_token, now_ts())
    }

    /// Reports a member's new presence state and delivers whatever was
    /// waiting on it. Members may only change their own state.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Forbidden`]: actor is not the member.
    /// - [`CoreError::NotFound`]: no such member.
    pub fn change_state(
        &self,
        actor_id: &str,
        member_id: &str,
        new_state: MemberState,
    ) -> Result<StateChange> {
        if actor_id != member_id {
            return Err(CoreError::Forbidden(
                "members may only change their own state".to_string(),
            ));
        }
        self.engine.report_state(member_id, new_state)
    }

    /// The members of a circle with their current states. Restricted to
    /// the circle's own members.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NotFound`]: no such circle.
    /// - [`CoreError::Forbidden`]: actor is not a member.
    pub fn roster(&self, actor_id: &str, circle_id: &str) -> Result<Vec<Member>> {
        self.store.get_circle(circle_id)?;
        self.require_membership(circle_id, actor_id)?;
        self.store.list_circle_members(circle_id)
    }

    // ==================== Circles & invitations ====================

    /// Creates a circle; the actor becomes its first admin.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the actor has no profile.
    pub fn create_circle(&self, actor_id: &str, name: &str) -> Result<Circle> {
        self.store
            .create_circle(&new_id(), name, actor_id, now_ts())
    }

    /// The circles the actor belongs to.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_circles(&self, actor_id: &str) -> Result<Vec<Circle>> {
        self.store.list_circles_for(actor_id)
    }

    /// Issues a single-use invitation into a circle. Admins only.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NotFound`]: no such circle.
    /// - [`CoreError::Forbidden`]: actor is not an admin of the circle.
    pub fn invite(&self, actor_id: &str, circle_id: &str) -> Result<Invitation> {
        self.store.get_circle(circle_id)?;
        let membership = self.require_membership(circle_id, actor_id)?;
        if membership.role != MemberRole::Admin {
            return Err(CoreError::Forbidden(
                "only circle admins may invite".to_string(),
            ));
        }
        self.store
            .create_invitation(&new_id(), circle_id, actor_id, &generate_token(), now_ts())
    }

    /// Redeems an invitation token, joining the actor to its circle.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NotFound`]: unknown token or unregistered actor.
    /// - [`CoreError::InvalidState`]: token already redeemed.
    /// - [`CoreError::Conflict`]: actor already belongs to the circle.
    pub fn redeem_invitation(&self, actor_id: &str, token: &str) -> Result<CircleMembership> {
        self.store.redeem_invitation(token, actor_id, now_ts())
    }

    // ==================== Messages ====================

    /// Sends a message to a circle member.
    ///
    /// With the "now" trigger the message is delivered at creation and the
    /// recipient is nudged in real time with the full payload (plus a push
    /// hand-off if they registered an address). Deferred triggers leave the
    /// message pending and the recipient unaware.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NotFound`]: unknown recipient or circle.
    /// - [`CoreError::Forbidden`]: sender or recipient not in the circle.
    pub fn send_message(
        &self,
        actor_id: &str,
        recipient_id: &str,
        circle_id: &str,
        body: &str,
        trigger: DeliveryTrigger,
    ) -> Result<Message> {
        let recipient = self.store.get_member(recipient_id)?;
        self.store.get_circle(circle_id)?;
        self.require_membership(circle_id, actor_id)?;
        self.require_membership(circle_id, recipient_id)?;

        let message = self.store.create_message(
            &new_id(),
            actor_id,
            recipient_id,
            circle_id,
            body,
            trigger,
            now_ts(),
        )?;

        if !trigger.is_deferred() {
            self.hub
                .publish(recipient_id, RealtimeEvent::Message(message.clone()));
            if let Some(push_token) = recipient.push_token {
                let sender_name = self
                    .store
                    .get_member(actor_id)
                    .map_or_else(|_| actor_id.to_string(), |m| m.name);
                self.sink.notify(&push_token, &sender_name, &message.body);
            }
        }

        Ok(message)
    }

    /// Edits the text of the actor's own pending message.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NotFound`]: no such message.
    /// - [`CoreError::Forbidden`]: actor is not the sender.
    /// - [`CoreError::InvalidState`]: message is delivered or canceled.
    pub fn edit_message(&self, actor_id: &str, message_id: &str, body: &str) -> Result<Message> {
        self.store.edit_message(message_id, actor_id, body)
    }

    /// Cancels the actor's own pending message. Terminal.
    ///
    /// # Errors
    ///
    /// Same as [`edit_message`](Self::edit_message).
    pub fn cancel_message(&self, actor_id: &str, message_id: &str) -> Result<Message> {
        self.store.cancel_message(message_id, actor_id)
    }

    /// Everything the actor may see: their own messages in any status plus
    /// messages delivered to them, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_messages(&self, actor_id: &str) -> Result<Vec<Message>> {
        self.store.list_visible(actor_id)
    }

    /// Only the messages delivered to the actor, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_delivered(&self, actor_id: &str) -> Result<Vec<Message>> {
        self.store.list_delivered(actor_id)
    }

    fn require_membership(&self, circle_id: &str, member_id: &str) -> Result<CircleMembership> {
        self.store.membership(circle_id, member_id)?.ok_or_else(|| {
            CoreError::Forbidden(format!("not a member of circle: {circle_id}"))
        })
    }
}
