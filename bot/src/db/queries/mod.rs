pub mod channels;
pub mod snapshot;
pub mod subscriptions;
pub mod trackings;
