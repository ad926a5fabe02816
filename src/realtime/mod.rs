pub mod event;
pub mod gateway;
pub mod registry;

pub use event::RealtimeEvent;
pub use gateway::Gateway;
pub use registry::ConnectionRegistry;
