use std::path::PathBuf;
use std::process;

use clap::Args;

#[derive(Args)]
pub struct ModelConvertArgs {
    /// Import ONNX initializer weights
    #[arg(long)]
    pub onnx: bool,
    /// Import a TensorFlow checkpoint
    #[arg(long)]
    pub tensorflow: bool,
    /// Import a PyTorch checkpoint
    #[arg(long)]
    pub pytorch: bool,
    pub input: PathBuf,
    /// Output .hnwt file (default: weights.hnwt)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn cmd_model_convert(args: ModelConvertArgs) {
    let ModelConvertArgs {
        onnx,
        tensorflow,
        pytorch,
        input,
        output,
    } = args;

    let result = match (onnx, tensorflow, pytorch) {
        (true, false, false) => harmonics::model_convert::import_onnx_weights(&input),
        (false, true, false) => harmonics::model_convert::import_tensorflow_weights(&input),
        (false, false, true) => harmonics::model_convert::import_pytorch_weights(&input),
        _ => {
            eprintln!("error: specify exactly one of --onnx, --tensorflow, --pytorch");
            process::exit(1);
        }
    };

    let weights = match result {
        Ok(w) => w,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    };

    let out_path = output.unwrap_or_else(|| PathBuf::from("weights.hnwt"));
    let bytes = harmonics::serialize::weights::encode(&weights);
    if let Err(e) = std::fs::write(&out_path, bytes) {
        eprintln!("error: cannot write '{}': {}", out_path.display(), e);
        process::exit(1);
    }
}
