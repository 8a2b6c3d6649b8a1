// src/storage/mod.rs

pub mod key_record;
pub mod memory;

pub use key_record::{KeyId, KeyRecord, KeyStatus, KeyView};
pub use memory::KeyRegistry;
