use thiserror::Error;

/// Recoverable model-construction and validation failures.
///
/// Weight-magnitude violations are never errors; they are handled by
/// saturation in `SpinNet::clip_weights`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("network needs at least one unit")]
    EmptyNet,

    #[error("invalid partition: {sensors} sensors + {motors} motors exceeds {netsize} units")]
    InvalidPartition {
        netsize: usize,
        sensors: usize,
        motors: usize,
    },

    #[error(
        "target statistics shape mismatch: expected {expected_means} means and \
         {expected_rows} correlation rows of width {expected_cols}, \
         got {got_means} means and {got_values} correlation values"
    )]
    TargetShape {
        expected_means: usize,
        expected_rows: usize,
        expected_cols: usize,
        got_means: usize,
        got_values: usize,
    },

    #[error("gradient buffers sized for {expected} units, agent has {got}")]
    SizeMismatch { expected: usize, got: usize },
}
