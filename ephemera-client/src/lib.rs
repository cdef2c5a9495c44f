#![cfg_attr(not(test), forbid(unsafe_code))]
#![deny(warnings, clippy::pedantic)]
#![allow(clippy::multiple_crate_versions)] // TODO(deps-001): remove once transitive dependencies converge.

//! Client-side synchronization and expiration engine for Ephemera.
//!
//! A [`ChatSession`] keeps a local, ordered message view consistent with the
//! server through optimistic sends, a change feed subscription with bounded
//! reconnects, and periodic reconciliation, while sweeping expired messages out
//! of the view. [`CleanupService`] purges expired rows and stale identities on
//! the server side.

pub mod cleanup;
pub mod clock;
pub mod error;
pub mod http;
pub mod presence;
pub mod remote;
pub mod send;
pub mod session;
pub mod sse;
pub mod store;
pub mod subscription;
pub mod sync;

pub use cleanup::{CleanupReport, CleanupService};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ClientError, ClientResult};
pub use http::HttpRemoteStore;
pub use remote::{ChannelStatus, FeedChannel, FeedSignal, RemoteStore};
pub use session::{ChatSession, Notice, SessionHandle};
pub use store::MessageStore;
pub use subscription::{SubscriptionHandle, SubscriptionManager, SubscriptionState};
