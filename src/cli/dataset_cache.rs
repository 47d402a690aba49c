use std::path::PathBuf;
use std::process;

use clap::{Args, Subcommand};

#[derive(Subcommand)]
pub enum DatasetCacheCommand {
    /// Fetch a cache from a remote host
    Download(TransferArgs),
    /// Send a local cache to a remote host
    Upload(TransferArgs),
    /// Serve a local cache for download
    ServeDownload(ServeArgs),
    /// Accept an uploaded cache
    ServeUpload(ServeArgs),
    /// Print a BLAKE3 digest of a cache file
    Hash(HashArgs),
}

#[derive(Args)]
pub struct TransferArgs {
    pub path: PathBuf,
    pub host: String,
    pub port: u16,
}

#[derive(Args)]
pub struct ServeArgs {
    pub path: PathBuf,
    pub port: Option<u16>,
}

#[derive(Args)]
pub struct HashArgs {
    pub path: PathBuf,
}

pub fn cmd_dataset_cache(cmd: DatasetCacheCommand) {
    match cmd {
        DatasetCacheCommand::Hash(args) => cmd_hash(args),
        DatasetCacheCommand::Download(_) | DatasetCacheCommand::Upload(_) => {
            not_implemented("dataset-cache transfer requires a TCP producer/consumer, not wired in this build")
        }
        DatasetCacheCommand::ServeDownload(_) | DatasetCacheCommand::ServeUpload(_) => {
            not_implemented("dataset-cache serving requires a socket server, not wired in this build")
        }
    }
}

fn cmd_hash(args: HashArgs) {
    use std::io::Read;

    let mut file = std::fs::File::open(&args.path).unwrap_or_else(|e| {
        eprintln!("error: cannot open '{}': {}", args.path.display(), e);
        process::exit(1);
    });

    let mut hasher = blake3::Hasher::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = file.read(&mut buf).unwrap_or_else(|e| {
            eprintln!("error: reading '{}': {}", args.path.display(), e);
            process::exit(1);
        });
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    println!("{}", hasher.finalize().to_hex());
}

fn not_implemented(message: &str) -> ! {
    eprintln!("error: {}", message);
    process::exit(1);
}
