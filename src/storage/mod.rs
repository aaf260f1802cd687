//! Storage layer: positional page I/O over a single heap file.
//!
//! This module provides the abstraction for reading and writing pages to
//! disk. The file format is deliberately bare: pages at dense offsets,
//! nothing else.

mod heap_file;

pub use heap_file::{HeapFile, PageFile};
