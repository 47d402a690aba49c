use std::path::PathBuf;
use std::process;

use clap::Args;

use super::load_source_graph;

#[derive(Args)]
pub struct CompileArgs {
    /// Input source file
    pub input: PathBuf,
    /// Output .hgr file (default: graph.hgr)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn cmd_compile(args: CompileArgs) {
    let CompileArgs { input, output } = args;
    let graph = load_source_graph(&input);
    let bytes = harmonics::serialize::graph::encode(&graph);

    let out_path = output.unwrap_or_else(|| PathBuf::from("graph.hgr"));
    if let Err(e) = std::fs::write(&out_path, &bytes) {
        eprintln!("error: cannot write '{}': {}", out_path.display(), e);
        process::exit(1);
    }
    eprintln!("Compiled -> {}", out_path.display());
}
