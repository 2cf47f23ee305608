/// Persistence of participants, dialogues, turns, reactions and trophies.
pub mod dialogue_store;
/// Database model definitions.
pub mod models;
/// Storage abstraction layer for database operations.
pub mod storage;
