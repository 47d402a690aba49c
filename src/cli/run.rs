use std::path::PathBuf;
use std::process;

use clap::Args;

use harmonics::policy::PrecisionPolicy;
use harmonics::runtime::{CycleRuntime, DeploymentDescriptor};

use super::load_graph_file;

#[derive(Args)]
pub struct RunArgs {
    /// Compiled .hgr graph file
    pub graph: PathBuf,
    /// Enable secure chain-of-custody hashing
    #[arg(long)]
    pub secure: bool,
    /// Max precision bits
    #[arg(long, default_value_t = 32)]
    pub bits: u32,
    /// Additional plugin search path (unused: no plugin loader in this build)
    #[arg(long)]
    pub plugin_path: Option<PathBuf>,
}

pub fn cmd_run(args: RunArgs) {
    let RunArgs {
        graph,
        secure,
        bits,
        plugin_path,
    } = args;
    if let Some(path) = &plugin_path {
        eprintln!(
            "warning: --plugin-path {} ignored, this build has no plugin loader",
            path.display()
        );
    }

    let g = load_graph_file(&graph);
    let descriptor = DeploymentDescriptor {
        policy: PrecisionPolicy::MaxBits(bits),
        secure,
        ..DeploymentDescriptor::default()
    };

    let mut rt = match CycleRuntime::new(g, descriptor) {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = rt.step() {
        eprintln!("error: {}", e);
        process::exit(1);
    }

    if secure {
        if let Some(chain) = rt.chain_hash() {
            println!("proof: {}", chain);
        }
    }
}
