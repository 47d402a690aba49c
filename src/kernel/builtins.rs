//! Built-in kernel functions (§4.5).
//!
//! Float kernels operate on `Tensor::as_f32`/`Tensor::from_f32` and
//! preserve shape. The `int8_*` variants are the quantized counterparts
//! used when a layer's precision policy resolves to 8 bits or fewer
//! (§4.4): they operate directly on the `UInt8` byte buffer instead of
//! promoting to float, so a quantized graph never pays a dequantize cost
//! for its own activations.

use std::collections::HashMap;

use crate::config::KernelConfig;
use crate::tensor::{DType, Tensor};

use super::{ActivationFn, KernelFn, LayerFn, LossFn};

pub fn default_registry() -> HashMap<String, KernelFn> {
    let mut map = HashMap::new();
    let mut act = |name: &str, f: ActivationFn| {
        map.insert(name.to_string(), KernelFn::Activation(f));
    };
    act("relu", relu);
    act("sigmoid", sigmoid);
    act("softmax", softmax);
    act("gelu", gelu);
    act("selu", selu);
    act("prelu", prelu);
    act("int8_relu", int8_relu);
    act("int8_sigmoid", int8_sigmoid);
    drop(act);

    map.insert("mse".to_string(), KernelFn::Loss(mse as LossFn));
    map.insert(
        "cross_entropy".to_string(),
        KernelFn::Loss(cross_entropy as LossFn),
    );

    map.insert("conv".to_string(), KernelFn::Layer(conv as LayerFn));
    map.insert("norm".to_string(), KernelFn::Layer(norm as LayerFn));
    map.insert(
        "attention".to_string(),
        KernelFn::Layer(attention as LayerFn),
    );
    map.insert("pooling".to_string(), KernelFn::Layer(pooling as LayerFn));
    map.insert("dropout".to_string(), KernelFn::Layer(dropout as LayerFn));

    map
}

fn map_f32(t: &Tensor, f: impl Fn(f32) -> f32) -> Tensor {
    let values: Vec<f32> = t.as_f32().iter().map(|v| f(*v)).collect();
    Tensor::new(DType::Float32, t.shape().to_vec(), f32_bytes(&values))
}

fn f32_bytes(values: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 4);
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

pub fn relu(t: &Tensor) -> Tensor {
    map_f32(t, |v| v.max(0.0))
}

pub fn sigmoid(t: &Tensor) -> Tensor {
    map_f32(t, |v| 1.0 / (1.0 + (-v).exp()))
}

/// Numerically stable softmax over the flattened tensor.
pub fn softmax(t: &Tensor) -> Tensor {
    let values = t.as_f32();
    let max = values.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = values.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    let normalized: Vec<f32> = exps.iter().map(|v| v / sum).collect();
    Tensor::new(DType::Float32, t.shape().to_vec(), f32_bytes(&normalized))
}

/// Gaussian Error Linear Unit, tanh approximation.
pub fn gelu(t: &Tensor) -> Tensor {
    map_f32(t, |x| {
        0.5 * x * (1.0 + ((2.0 / std::f32::consts::PI).sqrt() * (x + 0.044715 * x.powi(3))).tanh())
    })
}

/// Scaled Exponential Linear Unit, fixed canonical constants.
pub fn selu(t: &Tensor) -> Tensor {
    const ALPHA: f32 = 1.673_263_2;
    const SCALE: f32 = 1.050_700_9;
    map_f32(t, |x| {
        if x > 0.0 {
            SCALE * x
        } else {
            SCALE * ALPHA * (x.exp() - 1.0)
        }
    })
}

/// Parametric ReLU with a fixed small negative slope; layers wanting a
/// learned slope provide it through a dedicated layer kernel instead.
pub fn prelu(t: &Tensor) -> Tensor {
    const SLOPE: f32 = 0.25;
    map_f32(t, |x| if x > 0.0 { x } else { SLOPE * x })
}

pub fn int8_relu(t: &Tensor) -> Tensor {
    assert_eq!(t.dtype(), DType::UInt8, "int8_relu expects a UInt8 tensor");
    // Quantized zero sits at byte value 128 (symmetric 8-bit zero point);
    // clamping to [128, 255] is relu in that space.
    let bytes: Vec<u8> = t.bytes().iter().map(|b| (*b).max(128)).collect();
    Tensor::new(DType::UInt8, t.shape().to_vec(), bytes)
}

pub fn int8_sigmoid(t: &Tensor) -> Tensor {
    assert_eq!(
        t.dtype(),
        DType::UInt8,
        "int8_sigmoid expects a UInt8 tensor"
    );
    let bytes: Vec<u8> = t
        .bytes()
        .iter()
        .map(|b| {
            let x = (*b as f32 - 128.0) / 32.0;
            let sig = 1.0 / (1.0 + (-x).exp());
            (sig * 255.0).round().clamp(0.0, 255.0) as u8
        })
        .collect();
    Tensor::new(DType::UInt8, t.shape().to_vec(), bytes)
}

/// Mean squared error, returned as a rank-1 single-element tensor.
pub fn mse(prediction: &Tensor, target: &Tensor) -> Tensor {
    let p = prediction.as_f32();
    let t = target.as_f32();
    let n = p.len().max(1) as f32;
    let sum: f32 = p.iter().zip(t.iter()).map(|(a, b)| (a - b).powi(2)).sum();
    Tensor::from_f32(&[sum / n])
}

/// Categorical cross-entropy against a one-hot or probability target.
pub fn cross_entropy(prediction: &Tensor, target: &Tensor) -> Tensor {
    const EPS: f32 = 1e-9;
    let p = prediction.as_f32();
    let t = target.as_f32();
    let sum: f32 = p
        .iter()
        .zip(t.iter())
        .map(|(pred, tgt)| -tgt * (pred.max(EPS)).ln())
        .sum();
    Tensor::from_f32(&[sum])
}

/// 1D convolution with a fixed-shape box kernel sized by
/// `config.conv_kernel_size`, 'same' padding via edge clamp.
pub fn conv(t: &Tensor, config: &KernelConfig) -> Tensor {
    let values = t.as_f32();
    let k = config.conv_kernel_size.max(1) as usize;
    let half = k / 2;
    let weight = 1.0 / k as f32;
    let out: Vec<f32> = (0..values.len())
        .map(|i| {
            let mut acc = 0.0;
            for j in 0..k {
                let idx = i as i64 + j as i64 - half as i64;
                let idx = idx.clamp(0, values.len() as i64 - 1) as usize;
                acc += values[idx] * weight;
            }
            acc
        })
        .collect();
    Tensor::new(DType::Float32, t.shape().to_vec(), f32_bytes(&out))
}

/// Layer normalization with `config.norm_epsilon`.
pub fn norm(t: &Tensor, config: &KernelConfig) -> Tensor {
    let values = t.as_f32();
    let n = values.len().max(1) as f32;
    let mean = values.iter().sum::<f32>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
    let denom = (var + config.norm_epsilon).sqrt();
    let out: Vec<f32> = values.iter().map(|v| (v - mean) / denom).collect();
    Tensor::new(DType::Float32, t.shape().to_vec(), f32_bytes(&out))
}

/// Single-head self-attention over the flattened tensor treated as a
/// sequence of scalars, scaled by `config.attention_temperature`. A
/// deliberately simplified stand-in for the general case (Non-goal:
/// this crate does not implement a full tensor-math engine).
pub fn attention(t: &Tensor, config: &KernelConfig) -> Tensor {
    let values = t.as_f32();
    let temp = config.attention_temperature.max(1e-6);
    let scores: Vec<f32> = values.iter().map(|v| v / temp).collect();
    let max = scores.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    let weights: Vec<f32> = exps.iter().map(|e| e / sum).collect();
    let weighted_sum: f32 = weights.iter().zip(values.iter()).map(|(w, v)| w * v).sum();
    let out = vec![weighted_sum; values.len()];
    Tensor::new(DType::Float32, t.shape().to_vec(), f32_bytes(&out))
}

/// Max pooling with `config.pool_window`, stride equal to the window.
pub fn pooling(t: &Tensor, config: &KernelConfig) -> Tensor {
    let values = t.as_f32();
    let window = config.pool_window.max(1) as usize;
    let out: Vec<f32> = values
        .chunks(window)
        .map(|chunk| chunk.iter().cloned().fold(f32::NEG_INFINITY, f32::max))
        .collect();
    Tensor::from_f32(&out)
}

/// Deterministic dropout mask keyed by the bit pattern of each value
/// itself (no RNG dependency, so the kernel stays reproducible).
pub fn dropout(t: &Tensor, config: &KernelConfig) -> Tensor {
    let values = t.as_f32();
    let rate = config.dropout_rate.clamp(0.0, 1.0);
    let scale = if rate < 1.0 { 1.0 / (1.0 - rate) } else { 0.0 };
    let out: Vec<f32> = values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let keep = pseudo_uniform(i as u64, v.to_bits() as u64) >= rate;
            if keep {
                v * scale
            } else {
                0.0
            }
        })
        .collect();
    Tensor::new(DType::Float32, t.shape().to_vec(), f32_bytes(&out))
}

fn pseudo_uniform(index: u64, seed: u64) -> f32 {
    let mixed = (index.wrapping_mul(0x9E3779B97F4A7C15)) ^ seed;
    let mixed = mixed ^ (mixed >> 33);
    (mixed % 1_000_000) as f32 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relu_clamps_negatives() {
        assert_eq!(relu(&Tensor::from_f32(&[-3.0, 0.0, 3.0])).as_f32(), vec![0.0, 0.0, 3.0]);
    }

    #[test]
    fn softmax_sums_to_one() {
        let out = softmax(&Tensor::from_f32(&[1.0, 2.0, 3.0])).as_f32();
        let sum: f32 = out.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
    }

    #[test]
    fn mse_is_zero_for_identical_tensors() {
        let t = Tensor::from_f32(&[1.0, 2.0, 3.0]);
        assert_eq!(mse(&t, &t).as_f32(), vec![0.0]);
    }

    #[test]
    fn norm_output_has_zero_mean() {
        let config = KernelConfig::default();
        let out = norm(&Tensor::from_f32(&[1.0, 2.0, 3.0, 4.0]), &config).as_f32();
        let mean: f32 = out.iter().sum::<f32>() / out.len() as f32;
        assert!(mean.abs() < 1e-5);
    }

    #[test]
    fn pooling_reduces_length_by_window() {
        let config = KernelConfig {
            pool_window: 2,
            ..KernelConfig::default()
        };
        let out = pooling(&Tensor::from_f32(&[1.0, 3.0, 2.0, 5.0]), &config).as_f32();
        assert_eq!(out, vec![3.0, 5.0]);
    }

    #[test]
    fn dropout_zero_rate_is_identity() {
        let config = KernelConfig {
            dropout_rate: 0.0,
            ..KernelConfig::default()
        };
        let input = Tensor::from_f32(&[1.0, 2.0, 3.0]);
        assert_eq!(dropout(&input, &config).as_f32(), input.as_f32());
    }

    #[test]
    fn int8_relu_clamps_below_zero_point() {
        let t = Tensor::new(DType::UInt8, vec![3], vec![50, 128, 200]);
        assert_eq!(int8_relu(&t).bytes(), &[128, 128, 200]);
    }
}
