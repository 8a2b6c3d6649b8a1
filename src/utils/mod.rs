// src/utils/mod.rs

pub mod crypto;

pub use crypto::{mask_key, workload_slot};
