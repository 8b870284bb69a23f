//! Block-structured columnar storage engine (§2, §3, §4.3–§4.4, §4.7–§4.8).
//!
//! Hourly files with sparse metadata-driven skipping, compression, and a
//! "final resource state" side-index enabling consistent point-in-time
//! reads. See [`format`] for the byte-exact file layout, [`writer`] and
//! [`reader`] for the write/read paths, [`cache`] for the shared decoded-
//! block LRU, and [`registry`] for file enumeration and hour bookkeeping.

pub mod cache;
pub mod format;
pub mod reader;
pub mod registry;
pub mod writer;
