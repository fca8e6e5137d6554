//! Inter-module event API
//!
//! Topic patterns and the tenant-scoped event router modules publish to and
//! subscribe through.

pub mod events;
pub mod topic;

pub use events::{
    handler_fn, DeliveryError, DeliveryHealth, EventEnvelope, EventHandler, EventPayload,
    EventRouter, ModuleEvents, PublishReceipt, RouterError, SubscriptionHandle,
};
pub use topic::{validate_topic, TopicPattern};
