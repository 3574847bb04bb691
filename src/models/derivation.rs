//! Requests and results of the image derivation pipeline.

use crate::models::object::ObjectReference;
use serde::Serialize;
use std::path::PathBuf;

/// Basename prefix reserved for generated thumbnails.
pub const THUMBNAIL_PREFIX: &str = "thumb_";

/// Content type of every derived artifact.
pub const DERIVED_CONTENT_TYPE: &str = "image/jpeg";

pub const THUMBNAIL_BOUND: u32 = 150;
pub const COMPRESSED_BOUND: u32 = 1024;
pub const DEFAULT_QUALITY: u8 = 75;

/// How a source image is mapped into a bounding box.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FitMode {
    /// Shrink to fit, preserving aspect ratio, never crop or upscale.
    Inside,
    /// Scale to cover the box and center-crop to exactly fill it.
    Outside,
}

/// One artifact to derive from the source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DerivationTarget {
    pub max_width: u32,
    pub max_height: u32,
    pub fit: FitMode,
    /// JPEG quality, 1–100.
    pub quality: u8,
    /// Basename prefix of the sibling artifact. `None` replaces the source object.
    pub name_prefix: Option<String>,
}

impl DerivationTarget {
    /// Small crop-to-fill thumbnail written next to the source.
    pub fn thumbnail() -> Self {
        Self {
            max_width: THUMBNAIL_BOUND,
            max_height: THUMBNAIL_BOUND,
            fit: FitMode::Outside,
            quality: DEFAULT_QUALITY,
            name_prefix: Some(THUMBNAIL_PREFIX.to_string()),
        }
    }

    /// Bounded re-encode that overwrites the source.
    pub fn compressed_original() -> Self {
        Self {
            max_width: COMPRESSED_BOUND,
            max_height: COMPRESSED_BOUND,
            fit: FitMode::Inside,
            quality: DEFAULT_QUALITY,
            name_prefix: None,
        }
    }

    pub fn replaces_source(&self) -> bool {
        self.name_prefix.is_none()
    }

    /// Destination key for this target's output.
    pub fn destination_key(&self, source: &ObjectReference) -> String {
        match &self.name_prefix {
            Some(prefix) => source.sibling_key(prefix),
            None => source.key.clone(),
        }
    }

    /// Scratch file name for this target's output.
    pub fn scratch_name(&self, source: &ObjectReference) -> String {
        match &self.name_prefix {
            Some(prefix) => format!("{}{}", prefix, source.basename()),
            None => format!("compressed_{}", source.basename()),
        }
    }
}

/// A source object plus the ordered artifacts to derive from it.
///
/// Targets are applied in order; each consumes the previous target's output,
/// the first consumes the decoded source.
#[derive(Clone, Debug)]
pub struct DerivationRequest {
    pub source: ObjectReference,
    pub targets: Vec<DerivationTarget>,
}

impl DerivationRequest {
    /// Thumbnail only, source untouched. Used by the upload trigger.
    pub fn thumbnail_only(source: ObjectReference) -> Self {
        Self {
            source,
            targets: vec![DerivationTarget::thumbnail()],
        }
    }

    /// Compressed replacement of the source followed by a thumbnail. Used by the batch sweep.
    pub fn compress_and_thumbnail(source: ObjectReference) -> Self {
        Self {
            source,
            targets: vec![
                DerivationTarget::compressed_original(),
                DerivationTarget::thumbnail(),
            ],
        }
    }
}

/// A transformed file waiting in scratch space to be published.
#[derive(Clone, Debug)]
pub struct DerivedArtifact {
    pub local_path: PathBuf,
    pub destination: ObjectReference,
    pub content_type: &'static str,
}

/// Why an object was not processed.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NotAnImage,
    AlreadyThumbnail,
}

/// Result of one pipeline run. Failures are values, not errors.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DerivationOutcome {
    Skipped { reason: SkipReason },
    Published { artifacts: Vec<ObjectReference> },
    Failed { key: String, reason: String },
}

impl DerivationOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}
