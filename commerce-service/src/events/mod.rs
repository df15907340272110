pub mod bus;

pub use bus::{DispatchSummary, EventBus, Subscriber, SubscriberRegistry};
