use std::path::PathBuf;

use clap::Args;

use super::load_graph_file;

#[derive(Args)]
pub struct GraphInfoArgs {
    /// Compiled .hgr graph file
    pub graph: PathBuf,
}

pub fn cmd_graph_info(args: GraphInfoArgs) {
    let g = load_graph_file(&args.graph);

    for p in &g.producers {
        println!("producer {}", p.name);
    }
    for l in &g.layers {
        println!("layer {}", l.name);
    }
    for c in &g.consumers {
        println!("consumer {}", c.name);
    }

    for line in &g.cycle {
        let src = g.node_name(line.source);
        for arrow in &line.arrows {
            let dst = g.node_name(arrow.target);
            let sep = if arrow.backward { "~>" } else { "->" };
            match &arrow.function {
                Some(f) => println!("{} {} {} ({})", src, sep, dst, f),
                None => println!("{} {} {}", src, sep, dst),
            }
        }
    }
}
