//! Software (virtual NPU) backend
//!
//! A pure-CPU stand-in for the device: same call contract, deterministic
//! output, optional simulated execution latency. This is what CI and the
//! engine's own tests dispatch against, and the fallback when no device
//! node is present.
//!
//! The output is not a neural-network result; kernel execution is outside
//! this tree. Each output byte is a checksum-seeded ramp over the input,
//! which is enough for callers to assert that the right input produced the
//! right output in the right order.

use crate::backend::{BackendType, ComputeBackend};
use crate::error::Result;
use dxnn_model::Model;
use std::time::Duration;

/// Virtual-NPU backend
#[derive(Debug)]
pub struct SoftwareBackend {
    cores: usize,
    latency: Option<Duration>,
}

impl SoftwareBackend {
    /// Default simulated core count, matching the nominal device
    pub const DEFAULT_CORES: usize = 3;

    /// Create a software backend for a model
    pub fn new(model: &Model) -> Self {
        tracing::debug!(
            "Software backend for '{}': {} bytes in, {} bytes out",
            model.name(),
            model.input_size(),
            model.output_size()
        );
        Self {
            cores: Self::DEFAULT_CORES,
            latency: None,
        }
    }

    /// Set the simulated core count
    #[must_use]
    pub fn with_cores(mut self, cores: usize) -> Self {
        self.cores = cores.max(1);
        self
    }

    /// Add a fixed simulated execution latency per inference
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// The transform this backend applies, exposed so callers can compute
    /// expected outputs.
    pub fn expected_output(input: &[u8], output_size: usize) -> Vec<u8> {
        let seed = input.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
        (0..output_size)
            .map(|i| seed.wrapping_add(i as u8))
            .collect()
    }
}

impl ComputeBackend for SoftwareBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Software
    }

    fn core_count(&self) -> usize {
        self.cores
    }

    fn infer(&self, input: &[u8], output: &mut [u8]) -> Result<()> {
        if let Some(latency) = self.latency {
            std::thread::sleep(latency);
        }

        let seed = input.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
        for (i, byte) in output.iter_mut().enumerate() {
            *byte = seed.wrapping_add(i as u8);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dxnn_model::{DataType, TensorInfo};

    fn test_model() -> Model {
        Model::from_parts(
            "sw_test",
            vec![TensorInfo::new("in", vec![8], DataType::UInt8)],
            vec![TensorInfo::new("out", vec![4], DataType::UInt8)],
        )
    }

    #[test]
    fn output_is_deterministic() {
        let backend = SoftwareBackend::new(&test_model());
        let input = [1u8, 2, 3, 4, 5, 6, 7, 8];

        let mut a = [0u8; 4];
        let mut b = [0u8; 4];
        backend.infer(&input, &mut a).unwrap();
        backend.infer(&input, &mut b).unwrap();

        assert_eq!(a, b);
        assert_eq!(a.to_vec(), SoftwareBackend::expected_output(&input, 4));
    }

    #[test]
    fn distinct_inputs_distinct_outputs() {
        let backend = SoftwareBackend::new(&test_model());
        let mut a = [0u8; 4];
        let mut b = [0u8; 4];
        backend.infer(&[0u8; 8], &mut a).unwrap();
        backend.infer(&[1u8; 8], &mut b).unwrap();
        assert_ne!(a, b);
    }
}
