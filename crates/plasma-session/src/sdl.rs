//! Synchronized state records.
//!
//! A state payload is a postcard-encoded [`StateRecord`]. Its first field is
//! the [`StateHeader`], so the descriptor name and version can be read without
//! decoding the variables. Descriptors are registered up front; a record whose
//! descriptor or version is unknown means client and server disagree on the
//! schema, and the session treats that as fatal.

use bitflags::bitflags;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Descriptor whose state must stay dirty after being applied.
pub const AVATAR_PHYSICAL_DESCRIPTOR: &str = "avatarPhysical";

/// Errors raised while reading or validating state records.
#[derive(Debug, thiserror::Error)]
pub enum SdlError {
    /// No descriptor is registered under this name.
    #[error("unknown state descriptor {name} (version {version})")]
    UnknownDescriptor {
        /// Descriptor name from the record.
        name: String,
        /// Descriptor version from the record.
        version: u16,
    },

    /// The descriptor exists, but not in this version.
    #[error("state descriptor {name} version {version} does not match known versions {known:?}")]
    VersionMismatch {
        /// Descriptor name from the record.
        name: String,
        /// Descriptor version from the record.
        version: u16,
        /// Versions this client knows.
        known: Vec<u16>,
    },

    /// A variable is not part of the descriptor.
    #[error("state descriptor {descriptor} has no variable {variable}")]
    UnknownVariable {
        /// Descriptor name.
        descriptor: String,
        /// Offending variable.
        variable: String,
    },

    /// The payload is not a valid record.
    #[error("malformed state record: {0}")]
    Malformed(#[from] postcard::Error),
}

/// Leading part of every record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateHeader {
    /// Descriptor (schema) name.
    pub descriptor: String,
    /// Descriptor version.
    pub version: u16,
}

/// One variable of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateVariable {
    /// Variable name.
    pub name: String,
    /// Encoded value.
    pub value: Vec<u8>,
    /// Changed since the last send.
    pub dirty: bool,
}

/// A full state record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    /// Descriptor name and version.
    pub header: StateHeader,
    /// Variable values.
    pub variables: Vec<StateVariable>,
}

impl StateRecord {
    /// Encode for an [`plasma_net::SdlState`] payload.
    pub fn encode(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    /// Decode a full record.
    pub fn decode(bytes: &[u8]) -> Result<Self, SdlError> {
        Ok(postcard::from_bytes(bytes)?)
    }
}

/// Read only the header of an encoded record.
pub fn read_header(bytes: &[u8]) -> Result<StateHeader, SdlError> {
    let (header, _rest) = postcard::take_from_bytes::<StateHeader>(bytes)?;
    Ok(header)
}

bitflags! {
    /// How a received record is applied to its object.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ApplyFlags: u8 {
        /// Mark every variable dirty after applying.
        const MAKE_DIRTY = 1 << 0;
        /// Keep dirty variables dirty after applying.
        const KEEP_DIRTY = 1 << 1;
    }
}

/// Flags for applying a record with `header`.
pub fn apply_flags(header: &StateHeader, initial_state: bool) -> ApplyFlags {
    let mut flags = ApplyFlags::empty();
    flags.set(ApplyFlags::MAKE_DIRTY, initial_state);
    flags.set(
        ApplyFlags::KEEP_DIRTY,
        header.descriptor.eq_ignore_ascii_case(AVATAR_PHYSICAL_DESCRIPTOR),
    );
    flags
}

/// A known schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    /// Descriptor name.
    pub name: String,
    /// Descriptor version.
    pub version: u16,
    /// Variable names.
    pub variables: Vec<String>,
}

impl Descriptor {
    /// Build a descriptor from its parts.
    pub fn new<I, S>(name: impl Into<String>, version: u16, variables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            version,
            variables: variables.into_iter().map(Into::into).collect(),
        }
    }

    fn has_variable(&self, name: &str) -> bool {
        self.variables.iter().any(|v| v == name)
    }
}

/// Registered descriptors, looked up by case-insensitive name and exact version.
#[derive(Debug, Default)]
pub struct DescriptorRegistry {
    by_name: FxHashMap<String, Vec<Descriptor>>,
}

impl DescriptorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `descriptor`, replacing any entry with the same name and version.
    pub fn register(&mut self, descriptor: Descriptor) {
        let versions = self
            .by_name
            .entry(descriptor.name.to_ascii_lowercase())
            .or_default();
        versions.retain(|d| d.version != descriptor.version);
        versions.push(descriptor);
    }

    /// Number of registered descriptor versions.
    pub fn len(&self) -> usize {
        self.by_name.values().map(Vec::len).sum()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Find the descriptor matching `header`.
    pub fn find(&self, header: &StateHeader) -> Result<&Descriptor, SdlError> {
        let Some(versions) = self.by_name.get(&header.descriptor.to_ascii_lowercase()) else {
            return Err(SdlError::UnknownDescriptor {
                name: header.descriptor.clone(),
                version: header.version,
            });
        };
        versions
            .iter()
            .find(|d| d.version == header.version)
            .ok_or_else(|| SdlError::VersionMismatch {
                name: header.descriptor.clone(),
                version: header.version,
                known: versions.iter().map(|d| d.version).collect(),
            })
    }

    /// Decode `bytes` fully and check every variable against its descriptor.
    pub fn validate(&self, bytes: &[u8]) -> Result<StateRecord, SdlError> {
        let record = StateRecord::decode(bytes)?;
        let descriptor = self.find(&record.header)?;
        if let Some(var) = record
            .variables
            .iter()
            .find(|v| !descriptor.has_variable(&v.name))
        {
            return Err(SdlError::UnknownVariable {
                descriptor: descriptor.name.clone(),
                variable: var.name.clone(),
            });
        }
        Ok(record)
    }
}
