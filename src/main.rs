use s3sync_lib::commands::{dispatch, Cli};
use s3sync_lib::logging::init_logging;
use std::process;

#[tokio::main]
async fn main() {
    // 参数错误由 clap 输出并以 2 退出
    let cli = match Cli::try_parse_ordered(std::env::args_os()) {
        Ok(cli) => cli,
        Err(err) => err.exit(),
    };

    init_logging(cli.debug);
    tracing::debug!("命令行参数: {:?}", cli);

    let exit_code = dispatch(cli).await;
    process::exit(exit_code);
}
