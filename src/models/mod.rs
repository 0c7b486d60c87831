pub mod event;
pub mod message;
pub mod order;
pub mod profile;
