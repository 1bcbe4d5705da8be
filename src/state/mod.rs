pub mod orderbook;
pub mod symbol_state;
pub mod window;

// Re-export the per-symbol state types for convenient access
// (e.g. `use crate::state::SymbolState`).
pub use orderbook::{OrderBookL2, OrderBookSource};
pub use symbol_state::SymbolState;
pub use window::WindowedBuffer;
