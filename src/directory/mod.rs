//! Directory Engine
//!
//! The single authority for key→node resolution and for every mutation of
//! the key-mapping tables.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  Directory                                                │
//! │  - resolves keys to KeySemaphores                        │
//! │  - primary / resource-row / secondary-key CRUD           │
//! │  - enforces the read-only gate inside each mutation      │
//! │  - drives cascading deletes as one atomic unit           │
//! ├──────────────────────────────────────────────────────────┤
//! │  DirectoryTables                                          │
//! │  - primary key → semaphores                              │
//! │  - resource row id → primary key                         │
//! │  - secondary key → row ids                               │
//! ├──────────────────────────────────────────────────────────┤
//! │  KeySemaphore                                             │
//! │  - persisted key → node binding + key-level read-only    │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod directory;
pub mod semaphore;
mod store;

pub use directory::Directory;
pub use semaphore::KeySemaphore;
