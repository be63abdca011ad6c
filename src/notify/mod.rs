//! Notifications delivered to host code after settings change.

pub mod subscriber;

pub use subscriber::{SubscriberRegistry, SubscriptionHandle};
