//! vanbox-core - Core library for Vanbox
//!
//! This crate contains the entry model, the session context, the Supabase
//! adapters, the notification channel, and the entry lifecycle controller
//! that ties them together.

pub mod auth;
pub mod clock;
pub mod config;
pub mod controller;
pub mod error;
pub mod export;
pub mod models;
pub mod notify;
pub mod session;
pub mod store;
pub mod util;

pub use controller::{EntryController, Outcome};
pub use error::{OperationError, StoreError, StoreResult};
pub use models::{Entry, EntryId, NewEntry};
pub use notify::{Notification, NotificationCenter, NotificationKind};
pub use session::Session;
