//! `.hnwt` codec: trained layer weights (§4.10).
//!
//! A weight file is a flat list of named tensors, one per layer that
//! carries trainable state. Layout intentionally mirrors `graph.rs`'s
//! primitives so the two formats read the same way side by side.

use std::collections::BTreeMap;

use crate::error::{HarmonicsError, Result};
use crate::serialize::{read_framed, write_framed, Reader};
use crate::tensor::{DType, Tensor};

const MAGIC: &[u8; 4] = b"HNWT";
const VERSION: u32 = 1;

/// Layer name -> trained tensor. `BTreeMap` keeps encoding order
/// deterministic regardless of insertion order.
pub type WeightSet = BTreeMap<String, Tensor>;

pub fn encode(weights: &WeightSet) -> Vec<u8> {
    use crate::serialize::{write_str, write_u64, write_u8};

    let mut body = Vec::new();
    write_u64(&mut body, weights.len() as u64);
    for (name, tensor) in weights {
        write_str(&mut body, name);
        write_u8(&mut body, tensor.dtype().tag());
        write_u64(&mut body, tensor.shape().len() as u64);
        for dim in tensor.shape() {
            write_u64(&mut body, *dim);
        }
        crate::serialize::write_bytes(&mut body, tensor.bytes());
    }

    let mut out = Vec::new();
    write_framed(&mut out, MAGIC, VERSION, &body).expect("writing to Vec never fails");
    out
}

pub fn decode(bytes: &[u8]) -> Result<WeightSet> {
    let (version, body) = read_framed(bytes, MAGIC).map_err(io_err)?;
    if version != VERSION {
        return Err(HarmonicsError::Serialization(format!(
            "unsupported .hnwt version {}",
            version
        )));
    }
    let mut r = Reader::new(&body);
    let n = r.read_u64().map_err(io_err)? as usize;
    let mut out = WeightSet::new();
    for _ in 0..n {
        let name = r.read_str().map_err(io_err)?;
        let tag = r.read_u8().map_err(io_err)?;
        let dtype = DType::from_tag(tag)
            .ok_or_else(|| HarmonicsError::Serialization(format!("bad dtype tag {}", tag)))?;
        let rank = r.read_u64().map_err(io_err)? as usize;
        let mut shape = Vec::with_capacity(rank);
        for _ in 0..rank {
            shape.push(r.read_u64().map_err(io_err)?);
        }
        let bytes = r.read_bytes().map_err(io_err)?;
        out.insert(name, Tensor::new(dtype, shape, bytes));
    }
    Ok(out)
}

fn io_err(e: std::io::Error) -> HarmonicsError {
    HarmonicsError::Serialization(e.to_string())
}
