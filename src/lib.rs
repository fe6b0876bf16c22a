//! dbpf-merge: DBPF save-container codec and resource-level merger.
//!
//! The crate provides:
//! - A tolerant DBPF reader/writer (`dbpf`)
//! - Payload codecs: zlib deflate and RefPack (`compress`)
//! - Container comparison and merge strategies (`merge`)
//! - File-oriented helpers (`io`)
//! - An optional CLI (`cli` feature)
//!
//! # Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use dbpf_merge::io::load_container;
//! use dbpf_merge::merge::{MergeEngine, Strategy};
//!
//! let newer = load_container(Path::new("Slot_00000002.save")).unwrap();
//! let older = load_container(Path::new("Slot_00000001.save")).unwrap();
//!
//! let (merged, result) = MergeEngine::new().merge(&newer, &older, Strategy::SmartMerge);
//! println!("{} resources, {} restored", result.total, result.from_older);
//! merged.save("Slot_00000003.save").unwrap();
//! ```

pub mod compress;
pub mod dbpf;
pub mod io;
pub mod merge;

#[cfg(feature = "cli")]
pub mod cli;
