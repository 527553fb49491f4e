pub mod config;
pub mod content;
pub mod message;
pub mod request;
pub mod telemetry;

pub use config::Config;
pub use content::*;
pub use message::Envelope;
pub use request::*;
pub use telemetry::TraceContext;
