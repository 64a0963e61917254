//! Contract Descriptor Loading
//!
//! The deployment tooling records the contract's address and ABI in a
//! JSON artifact (`contract_info/SensorData.json` by default). The
//! artifact is read once at startup; a missing or malformed file halts
//! initialization, there is nothing sensible to monitor without it.
//!
//! The artifact may carry extra fields next to `address` and `abi` (the
//! tooling also writes the deployer's key there); everything unknown is
//! ignored.

use std::path::Path;

use crate::application::ports::ContractDescriptor;

/// Why the descriptor artifact could not be used.
#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    /// The artifact file could not be read.
    #[error("Cannot read contract descriptor '{path}': {source}")]
    Unreadable {
        /// Path to the artifact.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// The artifact is not valid JSON.
    #[error("Contract descriptor '{path}' is not valid JSON: {source}")]
    Malformed {
        /// Path to the artifact.
        path: String,
        /// The underlying parse error.
        source: serde_json::Error,
    },

    /// The artifact parsed but carries no usable contract address.
    #[error("Contract descriptor '{path}' has no contract address")]
    MissingAddress {
        /// Path to the artifact.
        path: String,
    },

    /// The artifact parsed but its ABI is missing or not an array.
    #[error("Contract descriptor '{path}' has no ABI array")]
    MissingAbi {
        /// Path to the artifact.
        path: String,
    },
}

/// Load and validate the contract descriptor artifact.
///
/// # Errors
///
/// Returns a [`DescriptorError`] naming the offending path when the file
/// is unreadable, not JSON, or lacks the address or ABI.
pub fn load_descriptor(path: &Path) -> Result<ContractDescriptor, DescriptorError> {
    let shown = path.display().to_string();

    let raw = std::fs::read_to_string(path).map_err(|source| DescriptorError::Unreadable {
        path: shown.clone(),
        source,
    })?;

    let descriptor: ContractDescriptor =
        serde_json::from_str(&raw).map_err(|source| DescriptorError::Malformed {
            path: shown.clone(),
            source,
        })?;

    if descriptor.address.trim().is_empty() {
        return Err(DescriptorError::MissingAddress { path: shown });
    }
    if !descriptor.abi.is_array() {
        return Err(DescriptorError::MissingAbi { path: shown });
    }

    tracing::info!(path = %shown, address = %descriptor.address, "Contract descriptor loaded");
    Ok(descriptor)
}
