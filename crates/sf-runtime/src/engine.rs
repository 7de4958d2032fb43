mod dispatch;
mod interpolate;
mod lifecycle;
mod routing;


pub use dispatch::GraphFuture;
pub use lifecycle::{Engine, EngineOptions, InputTimeoutHook, ENGINE_INVALID_GRAPH};
