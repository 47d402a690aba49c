mod cli;

use clap::{Parser, Subcommand};

use cli::compile::CompileArgs;
use cli::dataset_cache::DatasetCacheCommand;
use cli::graph_diff::GraphDiffCommand;
use cli::graph_info::GraphInfoArgs;
use cli::model_convert::ModelConvertArgs;
use cli::plugin_packager::PluginPackagerCommand;
use cli::run::RunArgs;

#[derive(Parser)]
#[command(name = "harmonics", version, about = "Dataflow runtime for heterogeneous neural computation graphs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse and build a source file into a compiled .hgr graph
    Compile(CompileArgs),
    /// Execute a compiled graph once against dummy inputs
    Run(RunArgs),
    /// Print a compiled graph's nodes and cycle lines
    GraphInfo(GraphInfoArgs),
    /// Compare or merge two compiled graphs
    GraphDiff {
        #[command(subcommand)]
        action: GraphDiffCommand,
    },
    /// Synchronize a cached dataset between machines
    DatasetCache {
        #[command(subcommand)]
        action: DatasetCacheCommand,
    },
    /// Import foreign model weights into .hnwt
    ModelConvert(ModelConvertArgs),
    /// Package or install a plugin archive
    PluginPackager {
        #[command(subcommand)]
        action: PluginPackagerCommand,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Compile(args) => cli::compile::cmd_compile(args),
        Command::Run(args) => cli::run::cmd_run(args),
        Command::GraphInfo(args) => cli::graph_info::cmd_graph_info(args),
        Command::GraphDiff { action } => cli::graph_diff::cmd_graph_diff(action),
        Command::DatasetCache { action } => cli::dataset_cache::cmd_dataset_cache(action),
        Command::ModelConvert(args) => cli::model_convert::cmd_model_convert(args),
        Command::PluginPackager { action } => cli::plugin_packager::cmd_plugin_packager(action),
    }
}
