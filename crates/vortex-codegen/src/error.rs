//! Error types for code generation

use thiserror::Error;

/// Result type alias for code-generation operations
pub type Result<T> = std::result::Result<T, CodegenError>;

/// Errors that can occur while generating a register program
#[derive(Debug, Error)]
pub enum CodegenError {
    /// The network was rejected by validation or planning
    #[error("Network rejected: {count} fatal diagnostic(s); see the diagnostic list")]
    Rejected {
        /// Number of fatal diagnostics recorded
        count: usize,
    },

    /// A computed value does not fit its register field
    #[error("Layer {layer}: {field} value {value} exceeds {bits} bit(s) on this device")]
    FieldOverflow {
        /// Offending layer id
        layer: usize,
        /// Register field name
        field: &'static str,
        /// Value that did not fit
        value: i64,
        /// Field width on the selected device
        bits: u32,
    },

    /// A memory region ran out of space
    #[error("Layer {layer}: {region} needs {needed} but only {available} available")]
    Capacity {
        /// Offending layer id
        layer: usize,
        /// Memory region description
        region: String,
        /// Required amount
        needed: usize,
        /// Region capacity
        available: usize,
    },

    /// The reference simulator failed to produce an output tensor
    #[error("Simulator failed on layer {layer}: {reason}")]
    Simulator {
        /// Offending layer id
        layer: usize,
        /// Reason for failure
        reason: String,
    },

    /// I/O error while writing an artifact
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },
}

impl CodegenError {
    /// Create a field overflow error
    pub const fn field_overflow(layer: usize, field: &'static str, value: i64, bits: u32) -> Self {
        Self::FieldOverflow {
            layer,
            field,
            value,
            bits,
        }
    }

    /// Create a capacity error
    pub fn capacity(layer: usize, region: impl Into<String>, needed: usize, available: usize) -> Self {
        Self::Capacity {
            layer,
            region: region.into(),
            needed,
            available,
        }
    }

    /// Create a simulator error
    pub fn simulator(layer: usize, reason: impl Into<String>) -> Self {
        Self::Simulator {
            layer,
            reason: reason.into(),
        }
    }
}
