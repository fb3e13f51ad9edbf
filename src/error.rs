//! Error types shared across the pipeline.

use thiserror::Error;

use crate::material::ComposeError;

/// Errors produced by composer and material operations.
///
/// Deferral (`NotReady`) is the only variant the frame loop treats as routine:
/// the composer skips the frame and retries. Everything else is surfaced.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A required async resource has not finished loading yet.
    #[error("resource not ready: {resource}")]
    NotReady { resource: &'static str },

    /// A sized GPU resource could not be allocated.
    #[error("allocation failed for '{label}' at {width}x{height}")]
    Allocation {
        label: &'static str,
        width: u32,
        height: u32,
    },

    /// A uniform bundle was asked for a name it does not carry.
    #[error("uniform not found in bundle: {name}")]
    UnknownUniform { name: String },

    /// A uniform value did not match its declared slot size.
    #[error("uniform size mismatch for '{name}': slot is {expected} bytes, value is {got}")]
    UniformSize {
        name: String,
        expected: usize,
        got: usize,
    },

    /// The swapchain could not deliver a frame.
    #[error("surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),

    /// Shader-stage composition failed at material build time.
    #[error(transparent)]
    Compose(#[from] ComposeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_ready_names_the_resource() {
        let err = PipelineError::NotReady {
            resource: "antialias area table",
        };
        let msg = format!("{err}");
        assert!(
            msg.contains("antialias area table"),
            "expected resource name in: {msg}"
        );
    }

    #[test]
    fn allocation_includes_label_and_dimensions() {
        let err = PipelineError::Allocation {
            label: "composer target",
            width: 0,
            height: 768,
        };
        let msg = format!("{err}");
        assert!(msg.contains("composer target"), "missing label in: {msg}");
        assert!(msg.contains("0x768"), "missing dimensions in: {msg}");
    }

    #[test]
    fn unknown_uniform_includes_name() {
        let err = PipelineError::UnknownUniform {
            name: "flow_offset".into(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("flow_offset"), "missing name in: {msg}");
    }

    #[test]
    fn uniform_size_includes_both_sizes() {
        let err = PipelineError::UniformSize {
            name: "flow_scale".into(),
            expected: 8,
            got: 16,
        };
        let msg = format!("{err}");
        assert!(msg.contains("flow_scale"), "missing name in: {msg}");
        assert!(msg.contains('8'), "missing slot size in: {msg}");
        assert!(msg.contains("16"), "missing value size in: {msg}");
    }

    #[test]
    fn pipeline_error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PipelineError>();
    }

    #[test]
    fn pipeline_error_implements_std_error() {
        fn assert_std_error<T: std::error::Error>() {}
        assert_std_error::<PipelineError>();
    }
}
