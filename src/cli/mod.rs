pub mod compile;
pub mod dataset_cache;
pub mod graph_diff;
pub mod graph_info;
pub mod model_convert;
pub mod plugin_packager;
pub mod run;

use std::path::Path;
use std::process;

use harmonics::ir::Graph;
use harmonics::syntax::lexer::Lexer;
use harmonics::syntax::parser::Parser;

/// Lex and parse a `.hrm` source file into a validated graph, printing
/// diagnostics and exiting on failure (every subcommand that reads
/// source text funnels through here, mirroring `compile_file`'s
/// parse-then-build shape).
pub fn load_source_graph(path: &Path) -> Graph {
    let source = std::fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("error: cannot read '{}': {}", path.display(), e);
        process::exit(1);
    });

    let (tokens, diags) = Lexer::new(&source).tokenize();
    if !diags.is_empty() {
        let filename = path.to_string_lossy();
        harmonics::diagnostic::render_diagnostics(&diags, &filename, &source);
        process::exit(1);
    }

    let ast = match Parser::new(tokens).parse_declarations() {
        Ok(ast) => ast,
        Err(diag) => {
            diag.render(&path.to_string_lossy(), &source);
            process::exit(1);
        }
    };

    match harmonics::ir::builder::build_graph(&ast) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    }
}

/// Load a compiled `.hgr` graph file, exiting on failure.
pub fn load_graph_file(path: &Path) -> Graph {
    let bytes = std::fs::read(path).unwrap_or_else(|e| {
        eprintln!("error: cannot read '{}': {}", path.display(), e);
        process::exit(1);
    });
    harmonics::serialize::graph::decode(&bytes).unwrap_or_else(|e| {
        eprintln!("error: {}", e);
        process::exit(1);
    })
}
