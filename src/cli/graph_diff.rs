use std::path::PathBuf;
use std::process;

use clap::{Args, Subcommand};

use harmonics::graph_diff::{diff_graphs, merge_graphs, FlowDiff, GraphDiff};

use super::load_graph_file;

#[derive(Subcommand)]
pub enum GraphDiffCommand {
    /// Print changes required to transform graph1 into graph2
    Diff(GraphDiffArgs),
    /// Apply changes from graph2 onto graph1 and write the result
    Merge(GraphDiffArgs),
}

#[derive(Args)]
pub struct GraphDiffArgs {
    pub graph1: PathBuf,
    pub graph2: PathBuf,
    /// Output path (diff: stdout if omitted; merge: overwrites graph1 if omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn cmd_graph_diff(cmd: GraphDiffCommand) {
    match cmd {
        GraphDiffCommand::Diff(args) => cmd_diff(args),
        GraphDiffCommand::Merge(args) => cmd_merge(args),
    }
}

fn cmd_diff(args: GraphDiffArgs) {
    let g1 = load_graph_file(&args.graph1);
    let g2 = load_graph_file(&args.graph2);
    let diff = diff_graphs(&g1, &g2);
    let rendered = render_diff(&diff);

    match args.output {
        Some(path) => {
            if let Err(e) = std::fs::write(&path, rendered) {
                eprintln!("error: cannot write '{}': {}", path.display(), e);
                process::exit(1);
            }
        }
        None => print!("{}", rendered),
    }
}

fn cmd_merge(args: GraphDiffArgs) {
    let g1 = load_graph_file(&args.graph1);
    let g2 = load_graph_file(&args.graph2);
    let merged = merge_graphs(&g1, &g2);

    let out_path = args.output.unwrap_or(args.graph1);
    let bytes = harmonics::serialize::graph::encode(&merged);
    if let Err(e) = std::fs::write(&out_path, bytes) {
        eprintln!("error: cannot write '{}': {}", out_path.display(), e);
        process::exit(1);
    }
}

fn render_diff(diff: &GraphDiff) -> String {
    let mut out = String::new();
    for l in &diff.added_layers {
        out.push_str(&format!("+ layer {}\n", l.name));
    }
    for name in &diff.removed_layers {
        out.push_str(&format!("- layer {}\n", name));
    }
    for f in &diff.added_flows {
        out.push_str(&flow_line('+', f));
    }
    for f in &diff.removed_flows {
        out.push_str(&flow_line('-', f));
    }
    out
}

fn flow_line(sign: char, f: &FlowDiff) -> String {
    let mut line = format!("{} flow {} -> {}", sign, f.src, f.dst);
    if f.backward {
        line.push_str(" [backward]");
    }
    if let Some(func) = &f.function {
        line.push_str(&format!(" ({})", func));
    }
    line.push('\n');
    line
}
