//! Loaded model representation

use crate::error::{ModelError, Result};
use crate::parser;
use std::fs;
use std::path::Path;

/// Element type of a model tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// Unsigned 8-bit (quantized activations)
    UInt8,
    /// Signed 8-bit
    Int8,
    /// Signed 16-bit
    Int16,
    /// IEEE 754 single precision
    Float32,
}

impl DataType {
    /// Size of one element in bytes
    pub const fn size_bytes(self) -> usize {
        match self {
            Self::UInt8 | Self::Int8 => 1,
            Self::Int16 => 2,
            Self::Float32 => 4,
        }
    }

    /// Wire tag used in the container tensor tables
    pub const fn tag(self) -> u8 {
        match self {
            Self::UInt8 => 0,
            Self::Int8 => 1,
            Self::Int16 => 2,
            Self::Float32 => 3,
        }
    }

    /// Decode a wire tag
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::UInt8),
            1 => Some(Self::Int8),
            2 => Some(Self::Int16),
            3 => Some(Self::Float32),
            _ => None,
        }
    }
}

/// Metadata for one input or output tensor
#[derive(Debug, Clone)]
pub struct TensorInfo {
    name: String,
    shape: Vec<usize>,
    dtype: DataType,
}

impl TensorInfo {
    /// Create tensor metadata
    pub fn new(name: impl Into<String>, shape: Vec<usize>, dtype: DataType) -> Self {
        Self {
            name: name.into(),
            shape,
            dtype,
        }
    }

    /// Tensor name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tensor shape
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Element type
    pub const fn dtype(&self) -> DataType {
        self.dtype
    }

    /// Total tensor size in bytes
    pub fn size_bytes(&self) -> usize {
        self.shape.iter().product::<usize>() * self.dtype.size_bytes()
    }
}

/// A loaded `.dxnn` model
///
/// Holds the metadata the runtime needs to size buffers and validate
/// submissions. Weight and register-map sections stay on disk; the compute
/// backend is responsible for anything beyond the tensor tables.
#[derive(Debug, Clone)]
pub struct Model {
    version: u32,
    compiler_version: String,
    name: String,
    inputs: Vec<TensorInfo>,
    outputs: Vec<TensorInfo>,
}

impl Model {
    /// Load a model from a `.dxnn` file
    ///
    /// # Errors
    ///
    /// Returns `FileNotFound` if the path does not exist, otherwise any
    /// parse error from [`Model::from_bytes`].
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!("Loading model from {}", path.display());

        if !path.exists() {
            return Err(ModelError::FileNotFound {
                path: path.to_path_buf(),
            });
        }

        let data = fs::read(path)?;
        Self::from_bytes(&data)
    }

    /// Parse a model from container bytes
    ///
    /// # Errors
    ///
    /// Returns an error if the container is malformed.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let header = parser::parse_header(data)?;

        tracing::info!(
            "Model '{}': .dxnn v{}, compiler {}",
            header.name,
            header.version,
            header.compiler_version
        );

        Ok(Self {
            version: header.version,
            compiler_version: header.compiler_version,
            name: header.name,
            inputs: header.inputs,
            outputs: header.outputs,
        })
    }

    /// Build a model directly from tensor metadata, without a container.
    ///
    /// Used by embedders and tests that drive the engine with a synthetic
    /// model instead of a compiled file.
    pub fn from_parts(
        name: impl Into<String>,
        inputs: Vec<TensorInfo>,
        outputs: Vec<TensorInfo>,
    ) -> Self {
        Self {
            version: parser::MAX_FILE_VERSION,
            compiler_version: String::new(),
            name: name.into(),
            inputs,
            outputs,
        }
    }

    /// Model name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `.dxnn` file-format version
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// Version of the compiler that produced the container
    pub fn compiler_version(&self) -> &str {
        &self.compiler_version
    }

    /// Input tensor table, in declaration order
    pub fn inputs(&self) -> &[TensorInfo] {
        &self.inputs
    }

    /// Output tensor table, in declaration order
    pub fn outputs(&self) -> &[TensorInfo] {
        &self.outputs
    }

    /// Total size of all input tensors for one inference, in bytes
    pub fn input_size(&self) -> usize {
        self.inputs.iter().map(TensorInfo::size_bytes).sum()
    }

    /// Total size of all output tensors for one inference, in bytes
    pub fn output_size(&self) -> usize {
        self.outputs.iter().map(TensorInfo::size_bytes).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::test_support::build_container;

    #[test]
    fn missing_file_is_reported() {
        let err = Model::from_file("/nonexistent/model.dxnn").unwrap_err();
        assert!(matches!(err, ModelError::FileNotFound { .. }));
    }

    #[test]
    fn sizes_sum_over_tensors() {
        let data = build_container(
            6,
            "two_head",
            &[
                TensorInfo::new("a", vec![8, 8], DataType::UInt8),
                TensorInfo::new("b", vec![16], DataType::Int16),
            ],
            &[TensorInfo::new("out", vec![10], DataType::Float32)],
        );
        let model = Model::from_bytes(&data).unwrap();
        assert_eq!(model.input_size(), 64 + 32);
        assert_eq!(model.output_size(), 40);
        assert_eq!(model.name(), "two_head");
        assert_eq!(model.version(), 6);
    }

    #[test]
    fn from_parts_matches_parsed_surface() {
        let model = Model::from_parts(
            "synthetic",
            vec![TensorInfo::new("in", vec![4], DataType::UInt8)],
            vec![TensorInfo::new("out", vec![4], DataType::UInt8)],
        );
        assert_eq!(model.input_size(), 4);
        assert_eq!(model.output_size(), 4);
    }
}
