//! Hearth Core Library
//!
//! Core functionality for Hearth - family coordination with state-triggered
//! messaging. Members of a circle report a presence state (at work, en
//! route, at home) and exchange messages that are either delivered
//! immediately or held until the recipient's state transition releases
//! them.
//!
//! # Architecture
//!
//! ```text
//! FamilyService (operation surface)
//!     ├── DeliveryEngine (state changes -> deliveries -> notifications)
//!     │       ├── Store (SQLite: members, circles, invitations, messages)
//!     │       ├── FanoutHub (best-effort realtime channels)
//!     │       └── NotificationSink (offline push seam)
//!     └── Authenticator (credential seam)
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![deny(unsafe_code)]

pub mod auth;
pub mod circle;
pub mod delivery;
pub mod error;
pub mod message;
pub mod notify;
pub mod presence;
pub mod realtime;
pub mod service;
pub mod store;

pub use error::{CoreError, Result};
pub use service::FamilyService;
