//! Data models for the relay-link client library.
//!
//! Transport-facing messages ([`TransportEvent`], [`SubscribeRequest`]),
//! identifiers, and the caller-facing option and snapshot types.

mod reconnect_policy;
mod remote_error;
mod resume_marker;
mod subscribe_request;
mod subscription_info;
mod subscription_options;
mod transport_event;
mod transport_id;


pub use reconnect_policy::ReconnectPolicy;
pub use remote_error::RemoteError;
pub use resume_marker::ResumeMarker;
pub use subscribe_request::SubscribeRequest;
pub use subscription_info::{SubscriptionInfo, SubscriptionStatus};
pub use subscription_options::SubscriptionOptions;
pub use transport_event::TransportEvent;
pub use transport_id::TransportId;
