pub mod connection_registry;
pub mod conversation_service;
pub mod gateway;
pub mod health_service;
pub mod identity_service;
pub mod message_service;
pub mod presence_service;
pub mod room_router;
