//! Checkpoint codec: graph digest + weights + optimizer step counter
//! (§4.7, §4.10).
//!
//! A checkpoint pins the exact graph it was produced against via its
//! digest. Loading a checkpoint against a differently-shaped graph is a
//! hard error (`HarmonicsError::CheckpointMismatch`) rather than a silent
//! best-effort restore.

use crate::error::{HarmonicsError, Result};
use crate::hash::ContentHash;
use crate::serialize::{read_framed, write_framed, Reader};
use crate::serialize::weights::{self, WeightSet};

const MAGIC: &[u8; 4] = b"HCKP";
const VERSION: u32 = 1;

pub struct Checkpoint {
    pub graph_digest: ContentHash,
    pub step: u64,
    pub weights: WeightSet,
}

pub fn encode(cp: &Checkpoint) -> Vec<u8> {
    use crate::serialize::{write_bytes, write_u64};

    let mut body = Vec::new();
    write_bytes(&mut body, cp.graph_digest.as_bytes());
    write_u64(&mut body, cp.step);
    let weight_bytes = weights::encode(&cp.weights);
    write_bytes(&mut body, &weight_bytes);

    let mut out = Vec::new();
    write_framed(&mut out, MAGIC, VERSION, &body).expect("writing to Vec never fails");
    out
}

/// Decode a checkpoint and verify it was produced against `expected_graph_digest`.
pub fn decode(bytes: &[u8], expected_graph_digest: ContentHash) -> Result<Checkpoint> {
    let (version, body) = read_framed(bytes, MAGIC)?;
    if version != VERSION {
        return Err(HarmonicsError::Serialization(format!(
            "unsupported checkpoint version {}",
            version
        )));
    }
    let mut r = Reader::new(&body);
    let digest_bytes = r.read_bytes().map_err(io_err)?;
    if digest_bytes.len() != 32 {
        return Err(HarmonicsError::Serialization(
            "malformed graph digest in checkpoint".to_string(),
        ));
    }
    let mut digest_array = [0u8; 32];
    digest_array.copy_from_slice(&digest_bytes);
    let graph_digest = ContentHash::from_bytes(digest_array);

    if graph_digest != expected_graph_digest {
        return Err(HarmonicsError::CheckpointMismatch {
            checkpoint_digest: graph_digest.to_hex(),
            graph_digest: expected_graph_digest.to_hex(),
        });
    }

    let step = r.read_u64().map_err(io_err)?;
    let weight_bytes = r.read_bytes().map_err(io_err)?;
    let weights = weights::decode(&weight_bytes)?;

    Ok(Checkpoint {
        graph_digest,
        step,
        weights,
    })
}

fn io_err(e: std::io::Error) -> HarmonicsError {
    HarmonicsError::Serialization(e.to_string())
}
