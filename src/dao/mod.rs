/// Database model definitions.
pub mod models;
/// Typed per-room access to the shared store.
pub mod room;
/// Shared store abstraction and its backends.
pub mod room_store;
/// Storage abstraction layer for database operations.
pub mod storage;
/// Typed access to stored candidate track lists.
pub mod tracklists;
