//! Image resolution
//!
//! Two tables resolve a `(name, version)` pair to a concrete image: the
//! machine image table from the controller configuration, and the component
//! image vector shipped with the binary (`images.yaml`). Both use exact
//! matching on name and version; the first matching entry wins.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::MachineImage;
use crate::{Error, Result};

/// Environment variable naming a file whose entries override the embedded vector
pub const IMAGEVECTOR_OVERWRITE_ENV: &str = "IMAGEVECTOR_OVERWRITE";

/// Image name of the audit-forwarder sidecar
pub const IMAGE_AUDIT_FORWARDER: &str = "auditforwarder";

const EMBEDDED_IMAGES: &str = include_str!("../images.yaml");

/// Find a machine image by exact name and version
pub fn find_machine_image<'a>(
    images: &'a [MachineImage],
    name: &str,
    version: &str,
) -> Result<&'a MachineImage> {
    images
        .iter()
        .find(|i| i.name == name && i.version == version)
        .ok_or_else(|| Error::not_found("machine image", format!("{name}:{version}")))
}

/// One entry of the component image vector
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImageSource {
    /// Logical component name
    pub name: String,
    /// Where the image is built from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_repository: Option<String>,
    /// Image repository
    pub repository: String,
    /// Tag or digest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Version this entry applies to; `None` matches version-less lookups only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl ImageSource {
    /// Render the pullable image reference
    pub fn reference(&self) -> String {
        match self.tag.as_deref() {
            Some(tag) if tag.starts_with("sha256:") => format!("{}@{}", self.repository, tag),
            Some(tag) => format!("{}:{}", self.repository, tag),
            None => self.repository.clone(),
        }
    }
}

/// The component image vector
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ImageVector {
    /// Entries in lookup order
    pub images: Vec<ImageSource>,
}

impl ImageVector {
    /// Parse an image vector document
    pub fn from_yaml(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw)
            .map_err(|e| Error::serialization_for_kind("ImageVector", e.to_string()))
    }

    /// Load the embedded vector, applying the override file if one is configured
    pub fn load() -> Result<Self> {
        let mut vector = Self::from_yaml(EMBEDDED_IMAGES)?;
        if let Ok(path) = std::env::var(IMAGEVECTOR_OVERWRITE_ENV) {
            let overrides = Self::from_file(Path::new(&path))?;
            info!(
                path = %path,
                entries = overrides.images.len(),
                "Applying image vector overrides"
            );
            vector.merge(overrides);
        }
        debug!(entries = vector.images.len(), "Image vector loaded");
        Ok(vector)
    }

    /// Read an image vector from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::invalid_config(format!("failed to read image vector {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&raw)
    }

    /// Replace entries with the same `(name, version)`, append the rest
    pub fn merge(&mut self, overrides: ImageVector) {
        for image in overrides.images {
            match self
                .images
                .iter_mut()
                .find(|i| i.name == image.name && i.version == image.version)
            {
                Some(existing) => *existing = image,
                None => self.images.push(image),
            }
        }
    }

    /// Find an image by exact name and version
    pub fn find_image(&self, name: &str, version: Option<&str>) -> Result<&ImageSource> {
        self.images
            .iter()
            .find(|i| i.name == name && i.version.as_deref() == version)
            .ok_or_else(|| match version {
                Some(v) => Error::not_found("image", format!("{name}:{v}")),
                None => Error::not_found("image", name),
            })
    }
}
