use std::path::PathBuf;
use std::process::{self, Command};

use clap::{Args, Subcommand};

#[derive(Subcommand)]
pub enum PluginPackagerCommand {
    /// Archive a plugin directory
    Package(PackageArgs),
    /// Unpack a plugin archive into a directory
    Install(InstallArgs),
}

#[derive(Args)]
pub struct PackageArgs {
    pub directory: PathBuf,
    pub archive: PathBuf,
}

#[derive(Args)]
pub struct InstallArgs {
    pub archive: PathBuf,
    pub directory: PathBuf,
}

pub fn cmd_plugin_packager(cmd: PluginPackagerCommand) {
    match cmd {
        PluginPackagerCommand::Package(args) => cmd_package(args),
        PluginPackagerCommand::Install(args) => cmd_install(args),
    }
}

fn cmd_package(args: PackageArgs) {
    if !args.directory.exists() {
        eprintln!("error: directory not found: {}", args.directory.display());
        process::exit(1);
    }
    let status = Command::new("tar")
        .arg("--zstd")
        .arg("-cf")
        .arg(&args.archive)
        .arg("-C")
        .arg(&args.directory)
        .arg(".")
        .status();
    exit_on_failure(status);
}

fn cmd_install(args: InstallArgs) {
    if let Err(e) = std::fs::create_dir_all(&args.directory) {
        eprintln!("error: cannot create '{}': {}", args.directory.display(), e);
        process::exit(1);
    }
    let status = Command::new("tar")
        .arg("--zstd")
        .arg("-xf")
        .arg(&args.archive)
        .arg("-C")
        .arg(&args.directory)
        .status();
    exit_on_failure(status);
}

fn exit_on_failure(status: std::io::Result<std::process::ExitStatus>) {
    match status {
        Ok(s) if s.success() => {}
        Ok(s) => process::exit(s.code().unwrap_or(1)),
        Err(e) => {
            eprintln!("error: failed to run tar: {}", e);
            process::exit(1);
        }
    }
}
