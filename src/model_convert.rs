//! Foreign model weight import (§6 `model-convert`).
//!
//! The original tool links against the ONNX/TensorFlow/PyTorch protobuf
//! schemas to decode their checkpoint formats. This build carries no such
//! decoder dependency, so each importer reports a clear
//! `HarmonicsError::Serialization` instead of silently producing an empty
//! weight set.

use crate::error::{HarmonicsError, Result};
use crate::serialize::weights::WeightSet;

pub fn import_onnx_weights(_path: &std::path::Path) -> Result<WeightSet> {
    Err(HarmonicsError::Serialization(
        "ONNX import requires an ONNX protobuf decoder, not linked in this build".to_string(),
    ))
}

pub fn import_tensorflow_weights(_path: &std::path::Path) -> Result<WeightSet> {
    Err(HarmonicsError::Serialization(
        "TensorFlow checkpoint import requires a TF protobuf decoder, not linked in this build".to_string(),
    ))
}

pub fn import_pytorch_weights(_path: &std::path::Path) -> Result<WeightSet> {
    Err(HarmonicsError::Serialization(
        "PyTorch checkpoint import requires a pickle/zip decoder, not linked in this build".to_string(),
    ))
}
