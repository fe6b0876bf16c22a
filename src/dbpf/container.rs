// DBPF container: header + index + resource map.
//
// Loading is tolerant. Only a missing or foreign header is fatal; every other
// defect (short index, offsets past the end, undecodable payloads, repeated
// keys) is recorded as a `LoadWarning` and loading carries on with whatever
// could be recovered.
//
// Saving always writes the normalized form: canonical header, payloads
// uncompressed in map order, then a plain 28-byte-per-record index.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::Path;

use indexmap::IndexMap;

use super::header::{FormatError, HEADER_SIZE, Header};
use super::index::{self, IndexLayout, ResourceRecord};
use super::{Resource, ResourceKey, type_name};
use crate::compress::{self, deflate};

// ---------------------------------------------------------------------------
// Errors and warnings
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("container exceeds the 4 GiB addressable by the index ({0} bytes)")]
    TooLarge(usize),
}

/// A recoverable defect found while loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadWarning {
    /// The outer deflate layer could not be inflated; the raw stream was used.
    OuterLayerCorrupt { reason: String },
    /// The index extends past the end of the stream and was cut short.
    IndexClamped {
        offset: u32,
        size: u32,
        stream_len: usize,
    },
    /// Fewer index records could be decoded than the header declares.
    IndexTruncated { declared: u32, read: usize },
    /// A record points past the end of the stream; the resource was skipped.
    OffsetOutOfRange {
        key: ResourceKey,
        offset: u32,
        stream_len: usize,
    },
    /// A record's data runs past the end of the stream and was cut short.
    DataTruncated {
        key: ResourceKey,
        declared: u32,
        available: usize,
    },
    /// A deflate payload was malformed; its raw bytes were kept.
    DecompressionFailed { key: ResourceKey, reason: String },
    /// Decoded payload length differs from the declared memory size.
    SizeMismatch {
        key: ResourceKey,
        declared: u32,
        actual: usize,
    },
    /// A key appeared more than once; the later record won.
    DuplicateKey { key: ResourceKey },
}

impl fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OuterLayerCorrupt { reason } => {
                write!(f, "outer deflate layer unreadable ({reason}), using raw stream")
            }
            Self::IndexClamped {
                offset,
                size,
                stream_len,
            } => write!(
                f,
                "index at {offset} (+{size}) overruns stream of {stream_len} bytes, truncated"
            ),
            Self::IndexTruncated { declared, read } => {
                write!(f, "index declares {declared} records, only {read} readable")
            }
            Self::OffsetOutOfRange {
                key,
                offset,
                stream_len,
            } => write!(
                f,
                "{key}: offset {offset} past end of stream ({stream_len} bytes), skipped"
            ),
            Self::DataTruncated {
                key,
                declared,
                available,
            } => write!(f, "{key}: {declared} bytes declared, {available} available"),
            Self::DecompressionFailed { key, reason } => {
                write!(f, "{key}: decompression failed ({reason}), keeping raw bytes")
            }
            Self::SizeMismatch {
                key,
                declared,
                actual,
            } => write!(f, "{key}: decoded {actual} bytes, expected {declared}"),
            Self::DuplicateKey { key } => write!(f, "{key}: duplicate key, later record kept"),
        }
    }
}

// ---------------------------------------------------------------------------
// Options / stats
// ---------------------------------------------------------------------------

/// Settings for serializing a container.
#[derive(Debug, Clone, Default)]
pub struct SaveOptions {
    /// Wrap the finished stream in a deflate layer (only kept if it saves
    /// at least 10%).
    pub outer_deflate: bool,
}

/// Summary of a container's contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statistics {
    pub version: String,
    pub resource_count: usize,
    pub total_size: u64,
    pub type_counts: BTreeMap<String, usize>,
}

// ---------------------------------------------------------------------------
// Container
// ---------------------------------------------------------------------------

/// An in-memory DBPF container.
#[derive(Debug, Clone, Default)]
pub struct Container {
    header: Header,
    layout: IndexLayout,
    resources: IndexMap<ResourceKey, Resource>,
    warnings: Vec<LoadWarning>,
}

impl Container {
    /// Empty container with a canonical header.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty container carrying another container's version information.
    pub fn with_header(header: Header) -> Self {
        Self {
            header,
            ..Self::default()
        }
    }

    /// Decode a container from a complete byte stream.
    pub fn load(bytes: &[u8]) -> Result<Self, ContainerError> {
        let mut warnings = Vec::new();

        let inflated;
        let stream: &[u8] = if deflate::has_signature(bytes) {
            match deflate::decompress(bytes) {
                Ok(data) => {
                    log::debug!("outer deflate layer: {} -> {} bytes", bytes.len(), data.len());
                    inflated = data;
                    &inflated
                }
                Err(e) => {
                    push_warning(
                        &mut warnings,
                        LoadWarning::OuterLayerCorrupt {
                            reason: e.to_string(),
                        },
                    );
                    bytes
                }
            }
        } else {
            bytes
        };

        let header = Header::parse(stream)?;

        let index_start = (header.index_offset as usize).min(stream.len());
        let index_end = (header.index_offset as usize)
            .saturating_add(header.index_size as usize)
            .min(stream.len());
        if index_end - index_start < header.index_size as usize {
            push_warning(
                &mut warnings,
                LoadWarning::IndexClamped {
                    offset: header.index_offset,
                    size: header.index_size,
                    stream_len: stream.len(),
                },
            );
        }

        let parsed = index::parse_index(&stream[index_start..index_end], header.index_entry_count);
        if parsed.truncated {
            warnings.push(LoadWarning::IndexTruncated {
                declared: header.index_entry_count,
                read: parsed.records.len(),
            });
        }

        let mut container = Self {
            header,
            layout: parsed.layout,
            resources: IndexMap::with_capacity(parsed.records.len()),
            warnings,
        };
        for record in &parsed.records {
            if let Some(resource) = container.load_resource(stream, record) {
                container.insert_loaded(resource);
            }
        }

        log::debug!(
            "loaded DBPF {} container: {} resources, {} warnings",
            container.header.version_string(),
            container.resources.len(),
            container.warnings.len()
        );
        Ok(container)
    }

    /// Read a container file from disk.
    pub fn load_path(path: impl AsRef<Path>) -> Result<Self, ContainerError> {
        let bytes = std::fs::read(path)?;
        Self::load(&bytes)
    }

    fn load_resource(&mut self, stream: &[u8], record: &ResourceRecord) -> Option<Resource> {
        let key = record.key;
        let start = record.offset as usize;
        if start > stream.len() {
            self.warn(LoadWarning::OffsetOutOfRange {
                key,
                offset: record.offset,
                stream_len: stream.len(),
            });
            return None;
        }

        let end = start.saturating_add(record.file_size as usize).min(stream.len());
        let raw = &stream[start..end];
        if raw.len() < record.file_size as usize {
            self.warn(LoadWarning::DataTruncated {
                key,
                declared: record.file_size,
                available: raw.len(),
            });
        }

        let data = if record.compressed && record.file_size != record.mem_size {
            match compress::decompress(raw, record.mem_size as usize) {
                Ok(data) => data,
                Err(e) => {
                    self.warn(LoadWarning::DecompressionFailed {
                        key,
                        reason: e.to_string(),
                    });
                    raw.to_vec()
                }
            }
        } else {
            raw.to_vec()
        };

        // Logged at debug only: common for raw fallbacks.
        if data.len() != record.mem_size as usize {
            let mismatch = LoadWarning::SizeMismatch {
                key,
                declared: record.mem_size,
                actual: data.len(),
            };
            log::debug!("{mismatch}");
            self.warnings.push(mismatch);
        }

        Some(Resource::new(key, data))
    }

    fn insert_loaded(&mut self, resource: Resource) {
        let key = resource.key;
        if self.resources.insert(key, resource).is_some() {
            self.warn(LoadWarning::DuplicateKey { key });
        }
    }

    fn warn(&mut self, warning: LoadWarning) {
        push_warning(&mut self.warnings, warning);
    }

    // -----------------------------------------------------------------------
    // Access
    // -----------------------------------------------------------------------

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn layout(&self) -> IndexLayout {
        self.layout
    }

    /// Defects recovered from while loading.
    pub fn warnings(&self) -> &[LoadWarning] {
        &self.warnings
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn get(&self, key: &ResourceKey) -> Option<&Resource> {
        self.resources.get(key)
    }

    pub fn contains_key(&self, key: &ResourceKey) -> bool {
        self.resources.contains_key(key)
    }

    /// Keys in map (load/insertion) order.
    pub fn keys(&self) -> impl Iterator<Item = &ResourceKey> {
        self.resources.keys()
    }

    /// Resources in map (load/insertion) order.
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    /// Sum of all payload lengths.
    pub fn total_size(&self) -> u64 {
        self.resources.values().map(|r| r.len() as u64).sum()
    }

    pub fn statistics(&self) -> Statistics {
        let mut type_counts = BTreeMap::new();
        for key in self.resources.keys() {
            *type_counts.entry(type_name(key.type_id)).or_insert(0) += 1;
        }
        Statistics {
            version: self.header.version_string(),
            resource_count: self.resources.len(),
            total_size: self.total_size(),
            type_counts,
        }
    }

    // -----------------------------------------------------------------------
    // Bulk mutation
    // -----------------------------------------------------------------------

    /// Insert or replace a resource; returns the one it replaced.
    pub fn insert(&mut self, resource: Resource) -> Option<Resource> {
        self.resources.insert(resource.key, resource)
    }

    /// Insert or replace every resource from `iter`.
    pub fn extend<I: IntoIterator<Item = Resource>>(&mut self, iter: I) {
        for resource in iter {
            self.insert(resource);
        }
    }

    // -----------------------------------------------------------------------
    // Serialization
    // -----------------------------------------------------------------------

    /// Serialize with default options.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ContainerError> {
        self.to_bytes_with(&SaveOptions::default())
    }

    /// Serialize: header shell, uncompressed payloads, index, header patch.
    pub fn to_bytes_with(&self, opts: &SaveOptions) -> Result<Vec<u8>, ContainerError> {
        let shell = Header {
            minor_version: self.header.minor_version,
            index_type: self.header.index_type,
            ..Header::default()
        };

        let total = self.total_size() as usize;
        let mut out = Vec::with_capacity(HEADER_SIZE + total + 4 + self.len() * index::RECORD_SIZE);
        out.extend_from_slice(&shell.serialize());

        let mut records = Vec::with_capacity(self.resources.len());
        for resource in self.resources.values() {
            let offset = addressable(out.len())?;
            let size = addressable(resource.len())?;
            out.extend_from_slice(resource.data());
            records.push(ResourceRecord {
                key: resource.key,
                offset,
                file_size: size,
                mem_size: size,
                compressed: false,
            });
        }

        let index_offset = addressable(out.len())?;
        let index_bytes = index::build_index(&records);
        let index_size = addressable(index_bytes.len())?;
        let count = addressable(records.len())?;
        out.extend_from_slice(&index_bytes);
        Header::patch_index(&mut out, count, index_offset, index_size);

        if opts.outer_deflate {
            return Ok(compress::compress(&out)?.into_owned());
        }
        Ok(out)
    }

    /// Write the container to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ContainerError> {
        self.save_with(path, &SaveOptions::default())
    }

    pub fn save_with(&self, path: impl AsRef<Path>, opts: &SaveOptions) -> Result<(), ContainerError> {
        let bytes = self.to_bytes_with(opts)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

impl FromIterator<Resource> for Container {
    fn from_iter<I: IntoIterator<Item = Resource>>(iter: I) -> Self {
        let mut container = Self::new();
        container.extend(iter);
        container
    }
}

fn push_warning(warnings: &mut Vec<LoadWarning>, warning: LoadWarning) {
    log::warn!("{warning}");
    warnings.push(warning);
}

fn addressable(n: usize) -> Result<u32, ContainerError> {
    u32::try_from(n).map_err(|_| ContainerError::TooLarge(n))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
