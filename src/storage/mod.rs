// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Durable key-value backends.
//!
//! - [`memory::InMemoryStore`]: volatile, for tests and ephemeral sessions
//! - [`sqlite::SqliteStore`]: SQLite file, survives restarts

pub mod traits;
pub mod memory;
pub mod sqlite;

pub use traits::{DurableStore, StorageError};
pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;
