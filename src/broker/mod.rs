pub mod engine;
pub mod message;
pub mod queue;
pub mod sink;
pub mod topic;

pub use engine::{Broker, SubscriptionEnd};
pub use message::{Delivery, Message, Notification, PublishReceipt, dead_letter_topic, message_id};
pub use sink::DeliverySink;
pub use topic::{Topic, TopicRegistry};

#[cfg(test)]
mod tests;
