pub mod auth;
pub mod chat;
pub mod conversation;
pub mod event;
pub mod message;
pub mod presence;
pub mod session;
