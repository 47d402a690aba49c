//! Checkpoint save/load for a running `CycleRuntime` (§4.7, §4.10).

use std::fs;
use std::path::Path;

use crate::error::{HarmonicsError, Result};
use crate::runtime::CycleRuntime;
use crate::serialize::checkpoint::{self, Checkpoint};
use crate::serialize::weights::WeightSet;

pub fn save(path: impl AsRef<Path>, runtime: &CycleRuntime, step: u64, weights: &WeightSet) -> Result<()> {
    let cp = Checkpoint {
        graph_digest: runtime.graph().digest(),
        step,
        weights: weights.clone(),
    };
    let bytes = checkpoint::encode(&cp);
    let path = path.as_ref();
    fs::write(path, bytes).map_err(|e| {
        tracing::warn!(path = %path.display(), error = %e, "checkpoint write failed");
        HarmonicsError::from(e)
    })
}

/// Load a checkpoint, verifying it matches `runtime`'s current graph
/// digest exactly (§4.10: loading against a different graph is a hard
/// error, not a best-effort partial restore).
pub fn load(path: impl AsRef<Path>, runtime: &CycleRuntime) -> Result<(u64, WeightSet)> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| {
        tracing::warn!(path = %path.display(), error = %e, "checkpoint read failed");
        HarmonicsError::from(e)
    })?;
    let cp = checkpoint::decode(&bytes, runtime.graph().digest()).inspect_err(|e| {
        tracing::warn!(path = %path.display(), error = %e, "checkpoint decode failed");
    })?;
    Ok((cp.step, cp.weights))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::DeploymentDescriptor;
    use crate::syntax::lexer::Lexer;
    use crate::syntax::parser::Parser;
    use crate::tensor::Tensor;

    fn build(src: &str) -> crate::ir::Graph {
        let (tokens, diags) = Lexer::new(src).tokenize();
        assert!(diags.is_empty());
        let ast = Parser::new(tokens).parse_declarations().unwrap();
        crate::ir::builder::build_graph(&ast).unwrap()
    }

    #[test]
    fn save_then_load_round_trips_against_same_graph() {
        let g = build("producer p {1}; consumer c {1}; cycle { p -> c; }");
        let rt = CycleRuntime::new(g, DeploymentDescriptor::default()).unwrap();

        let mut weights = WeightSet::new();
        weights.insert("l".to_string(), Tensor::from_f32(&[1.0, 2.0]));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.hckp");
        save(&path, &rt, 7, &weights).unwrap();

        let (step, loaded) = load(&path, &rt).unwrap();
        assert_eq!(step, 7);
        assert_eq!(loaded["l"].as_f32(), vec![1.0, 2.0]);
    }

    #[test]
    fn load_against_different_graph_is_rejected() {
        let g1 = build("producer p {1}; consumer c {1}; cycle { p -> c; }");
        let rt1 = CycleRuntime::new(g1, DeploymentDescriptor::default()).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.hckp");
        save(&path, &rt1, 0, &WeightSet::new()).unwrap();

        let g2 = build("producer p {2}; consumer c {2}; cycle { p -> c; }");
        let rt2 = CycleRuntime::new(g2, DeploymentDescriptor::default()).unwrap();
        let err = load(&path, &rt2).unwrap_err();
        assert!(matches!(err, HarmonicsError::CheckpointMismatch { .. }));
    }
}
