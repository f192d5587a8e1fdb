//! Error handling for the voxelizer pipelines
//!
//! Fatal configuration problems surface as `VoxelizerError` from constructors.
//! Caller misuse that breaks an internal invariant panics instead.

/// Main error type for the voxelizers
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VoxelizerError {
    // Configuration Errors
    #[error("Compute kernel not found: {name}")]
    KernelNotFound { name: String },

    #[error("Feature disabled: {0}")]
    FeatureDisabled(String),

    #[error("Invalid config: {field} = {value} ({reason})")]
    InvalidConfig {
        field: String,
        value: String,
        reason: String,
    },

    // Scene Errors
    #[error("Instance not found: {id}")]
    InstanceNotFound { id: u64 },

    #[error("Instance already added: {id}")]
    DuplicateInstance { id: u64 },

    // GPU Errors
    #[error("Resource creation failed for {resource}: {reason}")]
    ResourceCreationFailed { resource: String, reason: String },

    #[error("State error: expected {expected}, actual {actual}")]
    StateError { expected: String, actual: String },

    // Generic fallback for unexpected errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Type alias for Results in the voxelizers
pub type VoxelizerResult<T> = Result<T, VoxelizerError>;

/// Convert Option to Result with context
pub trait OptionExt<T> {
    fn ok_or_voxelizer<F>(self, f: F) -> VoxelizerResult<T>
    where
        F: FnOnce() -> VoxelizerError;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_voxelizer<F>(self, f: F) -> VoxelizerResult<T>
    where
        F: FnOnce() -> VoxelizerError,
    {
        self.ok_or_else(f)
    }
}

/// Extension trait for adding context to errors
pub trait ErrorContext<T> {
    fn context(self, msg: &str) -> VoxelizerResult<T>;
    fn with_context<F>(self, f: F) -> VoxelizerResult<T>
    where
        F: FnOnce() -> String;
}

impl<T> ErrorContext<T> for VoxelizerResult<T> {
    fn context(self, msg: &str) -> VoxelizerResult<T> {
        self.map_err(|e| VoxelizerError::Internal {
            message: format!("{}: {}", msg, e),
        })
    }

    fn with_context<F>(self, f: F) -> VoxelizerResult<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| VoxelizerError::Internal {
            message: format!("{}: {}", f(), e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = VoxelizerError::KernelNotFound {
            name: "VCT/Voxelizer".to_string(),
        };
        assert_eq!(err.to_string(), "Compute kernel not found: VCT/Voxelizer");
    }

    #[test]
    fn test_option_ext() {
        let opt: Option<i32> = None;
        let result = opt.ok_or_voxelizer(|| VoxelizerError::InstanceNotFound { id: 7 });
        assert_eq!(result, Err(VoxelizerError::InstanceNotFound { id: 7 }));
    }

    #[test]
    fn test_error_context() {
        let result: VoxelizerResult<i32> = Err(VoxelizerError::FeatureDisabled(
            "compute shaders".to_string(),
        ));
        let err = result.context("creating voxel volumes").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Internal error: creating voxel volumes: Feature disabled: compute shaders"
        );
    }
}
