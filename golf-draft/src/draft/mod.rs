pub mod engine;
pub mod loader;
pub mod pick;
pub mod scheduler;
pub mod state;
