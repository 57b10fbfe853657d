pub mod sync;

use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};
use std::ffi::OsString;

pub use sync::SyncArgs;

#[derive(Debug, Parser)]
#[command(
    name = "s3sync",
    version,
    about = "Synchronize a local directory with an S3 bucket prefix",
    arg_required_else_help = true
)]
pub struct Cli {
    /// Also write debug logs to stderr
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sync new and updated files from SRC to DST
    Sync(SyncArgs),
}

impl Cli {
    /// 解析命令行，并按出现顺序收集 --exclude / --include
    pub fn try_parse_ordered<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = Self::command().try_get_matches_from(args)?;
        let mut cli = Self::from_arg_matches(&matches)?;

        let Command::Sync(ref mut sync_args) = cli.command;
        if let Some(sub) = matches.subcommand_matches("sync") {
            sync_args.filter_rules = sync::ordered_filter_rules(sub);
        }

        Ok(cli)
    }
}

/// 执行子命令，返回进程退出码
pub async fn dispatch(cli: Cli) -> i32 {
    match cli.command {
        Command::Sync(args) => sync::run(args).await,
    }
}
