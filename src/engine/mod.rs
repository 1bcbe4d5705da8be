mod core;
mod cycles;
mod loops;

pub use self::core::{Engine, EngineHooks};
