//! Persistence layer.
//!
//! Saves and loads the master token catalog to/from a JSON file. The file
//! is rewritten only when its content would change, so repeated merges
//! over unchanged exchange data cause no I/O beyond the comparison read.

use anyhow::Result;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::types::{ArbError, MasterCatalog};

/// Default catalog file path.
pub const DEFAULT_CATALOG_FILE: &str = "master_list.json";

/// Write the catalog if it differs from what is on disk.
///
/// Returns `true` if the file was written.
pub fn persist_catalog(catalog: &MasterCatalog, path: Option<&str>) -> Result<bool> {
    let path = path.unwrap_or(DEFAULT_CATALOG_FILE);
    let json = catalog.to_json()?;

    if Path::new(path).exists() {
        let existing = std::fs::read(path)
            .map_err(|e| ArbError::CatalogIo(format!("failed to read {path}: {e}")))?;
        if existing == json.as_bytes() {
            debug!(path, tokens = catalog.len(), "Catalog unchanged, skipping write");
            return Ok(false);
        }
    } else if let Some(dir) = Path::new(path).parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .map_err(|e| ArbError::CatalogIo(format!("failed to create {}: {e}", dir.display())))?;
    }

    std::fs::write(path, &json)
        .map_err(|e| ArbError::CatalogIo(format!("failed to write {path}: {e}")))?;

    info!(path, tokens = catalog.len(), "Catalog saved");
    Ok(true)
}

/// Load the catalog from disk.
/// Returns None if the file doesn't exist or can't be parsed (rebuild).
pub fn load_catalog(path: Option<&str>) -> Result<Option<MasterCatalog>> {
    let path = path.unwrap_or(DEFAULT_CATALOG_FILE);

    if !Path::new(path).exists() {
        info!(path, "No saved catalog found, will merge from exchanges");
        return Ok(None);
    }

    let bytes = std::fs::read(path)
        .map_err(|e| ArbError::CatalogIo(format!("failed to read {path}: {e}")))?;
    let json = match String::from_utf8(bytes) {
        Ok(json) => json,
        Err(e) => {
            warn!(path, error = %e, "Saved catalog is corrupt, will rebuild");
            return Ok(None);
        }
    };

    match MasterCatalog::from_json(&json) {
        Ok(catalog) => {
            info!(path, tokens = catalog.len(), "Catalog loaded from disk");
            Ok(Some(catalog))
        }
        Err(e) => {
            warn!(path, error = %e, "Saved catalog is corrupt, will rebuild");
            Ok(None)
        }
    }
}

/// Delete the catalog file (for testing or reset).
pub fn delete_catalog(path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_CATALOG_FILE);
    if Path::new(path).exists() {
        std::fs::remove_file(path)
            .map_err(|e| ArbError::CatalogIo(format!("failed to delete {path}: {e}")))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
