mod subscriptions;

pub use subscriptions::SubscriptionManager;
