//! Sparse Image Writer
//!
//! Writes Android sparse images to block storage without touching
//! don't-care regions and expanding fill chunks on the fly.
//!
//! # Layout
//!
//! ```text
//!   ┌──────────────┬──────────────┬─────────────┬──────────────┬─────┐
//!   │ file header  │ chunk header │ payload     │ chunk header │ ... │
//!   │ (28 bytes)   │ (12 bytes)   │ RAW / FILL  │              │     │
//!   └──────────────┴──────────────┴─────────────┴──────────────┴─────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use sparse::{BlockIoStorage, FlashSession};
//!
//! let mut storage = BlockIoStorage::new(disk, part.start_lba, part.num_blocks());
//! let mut session = FlashSession::new();
//! let stats = session.store_sparse_image(&mut storage, 0, &image)?;
//! ```

#![no_std]

extern crate alloc;

pub mod error;
pub mod format;
pub mod storage;
pub mod writer;

pub use error::{Result, SparseError};
pub use format::{is_sparse_image, ChunkHeader, ChunkType, SparseHeader};
pub use storage::{BlockIoStorage, SparseStorage};
pub use writer::{FlashSession, SparseStats};
