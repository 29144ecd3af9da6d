pub mod activity;
pub mod broadcaster;
pub mod identity;
pub mod simulation;
pub mod subscriptions;
