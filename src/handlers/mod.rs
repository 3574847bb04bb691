pub mod callable_handlers;
pub mod event_handlers;
pub mod health_handlers;
pub mod http_handlers;
