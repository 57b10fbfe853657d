//! sync 子命令：参数、预检查、输出与退出码

use crate::config::S3Config;
use crate::core::{
    CompareConfig, Direction, ExitStatus, FilterRule, ItemWarning, OutcomeStatus, Side,
    StorageClassPolicy, SyncAction, SyncConfig, SyncEngine, SyncPlan, SyncReport,
    TransferOutcome,
};
use crate::error::SyncError;
use crate::storage::{create_storage, Location, Storage, StorageOptions};
use clap::{ArgMatches, Args};
use std::io::{self, Write};
use std::sync::Arc;
use tracing::{info, warn};

/// --storage-class 可选值
const UPLOAD_STORAGE_CLASSES: [&str; 8] = [
    "STANDARD",
    "REDUCED_REDUNDANCY",
    "STANDARD_IA",
    "ONEZONE_IA",
    "INTELLIGENT_TIERING",
    "GLACIER",
    "DEEP_ARCHIVE",
    "GLACIER_IR",
];

#[derive(Debug, Clone, Args)]
pub struct SyncArgs {
    /// Local directory or s3://bucket/prefix to read from
    pub source: String,

    /// Local directory or s3://bucket/prefix to write to
    pub destination: String,

    /// Display the operations that would be performed without running them
    #[arg(long)]
    pub dryrun: bool,

    /// Do not display any output
    #[arg(long)]
    pub quiet: bool,

    /// Only display errors and warnings that fail the run
    #[arg(long)]
    pub only_show_errors: bool,

    /// Delete destination files that do not exist in the source
    #[arg(long)]
    pub delete: bool,

    /// Exclude keys matching PATTERN (repeatable, applied in order)
    #[arg(long, value_name = "PATTERN")]
    pub exclude: Vec<String>,

    /// Re-include keys matching PATTERN (repeatable, applied in order)
    #[arg(long, value_name = "PATTERN")]
    pub include: Vec<String>,

    /// Compare files by size only
    #[arg(long)]
    pub size_only: bool,

    /// When downloading, transfer files whose timestamps differ at all
    #[arg(long)]
    pub exact_timestamps: bool,

    /// Silently skip objects in GLACIER or DEEP_ARCHIVE storage
    #[arg(long)]
    pub ignore_glacier_warnings: bool,

    /// Download GLACIER objects anyway (they must already be restored)
    #[arg(long)]
    pub force_glacier_transfer: bool,

    /// Storage class for uploaded objects
    #[arg(long, value_name = "CLASS", value_parser = UPLOAD_STORAGE_CLASSES)]
    pub storage_class: Option<String>,

    /// Redirect requests for uploaded objects to URL
    #[arg(long, value_name = "URL")]
    pub website_redirect: Option<String>,

    /// Do not follow symbolic links in the local directory
    #[arg(long)]
    pub no_follow_symlinks: bool,

    /// AWS region of the bucket
    #[arg(long, env = "AWS_REGION")]
    pub region: Option<String>,

    /// Custom S3 endpoint (S3-compatible services)
    #[arg(long, value_name = "URL")]
    pub endpoint_url: Option<String>,

    /// --exclude / --include in command-line order
    #[arg(skip)]
    pub filter_rules: Vec<FilterRule>,
}

impl SyncArgs {
    /// 命令行参数覆盖配置文件
    pub fn s3_config(&self, mut config: S3Config) -> S3Config {
        if let Some(ref region) = self.region {
            config.region = Some(region.clone());
        }
        if let Some(ref endpoint) = self.endpoint_url {
            config.endpoint_url = Some(endpoint.clone());
        }
        config
    }

    pub fn sync_config(&self, max_concurrent_requests: usize) -> SyncConfig {
        SyncConfig {
            max_concurrent_requests,
            dry_run: self.dryrun,
            compare: CompareConfig {
                size_only: self.size_only,
                exact_timestamps: self.exact_timestamps,
                delete: self.delete,
            },
            policy: StorageClassPolicy {
                ignore_warnings: self.ignore_glacier_warnings,
                force_transfer: self.force_glacier_transfer,
            },
            filter_rules: self.filter_rules.clone(),
            storage_class: self.storage_class.clone(),
            website_redirect: self.website_redirect.clone(),
        }
    }
}

/// 按命令行出现顺序合并 --exclude 与 --include
pub fn ordered_filter_rules(matches: &ArgMatches) -> Vec<FilterRule> {
    let kinds: [(&str, fn(String) -> FilterRule); 2] = [
        ("exclude", FilterRule::Exclude),
        ("include", FilterRule::Include),
    ];

    let mut indexed = Vec::new();
    for (id, make) in kinds {
        if let (Some(indices), Some(values)) =
            (matches.indices_of(id), matches.get_many::<String>(id))
        {
            indexed.extend(indices.zip(values).map(|(i, v)| (i, make(v.clone()))));
        }
    }

    indexed.sort_by_key(|(i, _)| *i);
    indexed.into_iter().map(|(_, rule)| rule).collect()
}

/// 用户可见的输出：操作写 stdout，警告和错误写 stderr
pub struct Printer<'a> {
    out: &'a mut dyn Write,
    err: &'a mut dyn Write,
    quiet: bool,
    only_show_errors: bool,
    write_failed: bool,
}

impl<'a> Printer<'a> {
    pub fn new(out: &'a mut dyn Write, err: &'a mut dyn Write, args: &SyncArgs) -> Self {
        Self {
            out,
            err,
            quiet: args.quiet,
            only_show_errors: args.only_show_errors,
            write_failed: false,
        }
    }

    /// 输出是否出现过写入错误（如管道已关闭）
    pub fn write_failed(&self) -> bool {
        self.write_failed
    }

    /// 写入失败只记录一次日志，不中断同步
    fn record(&mut self, result: io::Result<()>) {
        if let Err(e) = result {
            if !self.write_failed {
                warn!("写入终端输出失败: {}", e);
            }
            self.write_failed = true;
        }
    }

    fn operation(&mut self, line: &str) {
        if !self.quiet && !self.only_show_errors {
            let result = writeln!(self.out, "{}", line);
            self.record(result);
        }
    }

    fn warning(&mut self, line: &str) {
        if !self.quiet && !self.only_show_errors {
            let result = writeln!(self.err, "warning: {}", line);
            self.record(result);
        }
    }

    fn error(&mut self, line: &str) {
        if !self.quiet {
            let result = writeln!(self.err, "{}", line);
            self.record(result);
        }
    }

    fn fatal(&mut self, err: &SyncError) {
        match err.exit_status() {
            ExitStatus::Usage => self.error(&format!("error: {}", err)),
            _ => self.error(&format!("fatal error: {}", err)),
        }
    }
}

/// 判断同步方向：必须一端本地、一端 S3
pub fn resolve_direction(source: &Location, dest: &Location) -> Result<Direction, SyncError> {
    match (source, dest) {
        (Location::Local(_), Location::S3(_)) => Ok(Direction::Upload),
        (Location::S3(_), Location::Local(_)) => Ok(Direction::Download),
        _ => Err(SyncError::UnsupportedPaths {
            source_path: source.to_string(),
            dest_path: dest.to_string(),
        }),
    }
}

/// 本地源目录必须存在
pub fn check_local_source(source: &Location) -> Result<(), SyncError> {
    let Location::Local(path) = source else {
        return Ok(());
    };
    match std::fs::metadata(path) {
        Err(_) => Err(SyncError::PathNotFound { path: path.clone() }),
        Ok(metadata) if !metadata.is_dir() => Err(SyncError::NotADirectory { path: path.clone() }),
        Ok(_) => Ok(()),
    }
}

/// 运行 sync 子命令
pub async fn run(args: SyncArgs) -> i32 {
    let mut out = io::stdout();
    let mut err = io::stderr();
    run_with_output(args, &mut out, &mut err).await.code()
}

pub async fn run_with_output(
    args: SyncArgs,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> ExitStatus {
    let mut printer = Printer::new(out, err, &args);

    let (source, dest, direction, max_concurrent) = match open_storages(&args).await {
        Ok(opened) => opened,
        Err(e) => {
            warn!("同步未开始: {}", e);
            printer.fatal(&e);
            return e.exit_status();
        }
    };

    sync_with_storages(&args, source, dest, direction, max_concurrent, &mut printer).await
}

async fn open_storages(
    args: &SyncArgs,
) -> Result<(Arc<dyn Storage>, Arc<dyn Storage>, Direction, usize), SyncError> {
    let source = Location::parse(&args.source)?;
    let dest = Location::parse(&args.destination)?;
    let direction = resolve_direction(&source, &dest)?;
    check_local_source(&source)?;

    let s3 = args.s3_config(S3Config::load(&crate::dirs::app_config_dir()));
    s3.validate()?;
    let max_concurrent = s3.max_concurrent_requests;
    let options = StorageOptions {
        s3,
        follow_symlinks: !args.no_follow_symlinks,
    };

    let source_storage = create_storage(&source, &options).await?;
    let dest_storage = create_storage(&dest, &options).await?;

    Ok((source_storage, dest_storage, direction, max_concurrent))
}

/// 使用给定的存储执行完整流程
pub async fn sync_with_storages(
    args: &SyncArgs,
    source: Arc<dyn Storage>,
    dest: Arc<dyn Storage>,
    direction: Direction,
    max_concurrent: usize,
    printer: &mut Printer<'_>,
) -> ExitStatus {
    info!(
        "同步: {} -> {} ({:?})",
        source.name(),
        dest.name(),
        direction
    );

    let engine = SyncEngine::new(source, dest, direction, args.sync_config(max_concurrent));

    let plan = match engine.plan().await {
        Ok(plan) => plan,
        Err(e) => {
            printer.fatal(&e);
            return e.exit_status();
        }
    };

    print_warnings(&engine, &plan, printer);

    let outcomes = engine.execute(&plan).await;
    print_outcomes(&engine, &outcomes, printer);

    SyncReport::new(&plan, &outcomes).exit_status()
}

fn print_warnings(engine: &SyncEngine, plan: &SyncPlan, printer: &mut Printer<'_>) {
    for decision in plan.warnings() {
        let Some(warning) = &decision.warning else {
            continue;
        };
        let path = match warning.side() {
            Side::Source => engine.source().display_path(&decision.key),
            Side::Dest => engine.dest().display_path(&decision.key),
        };
        let line = match warning {
            ItemWarning::IncompatibleStorageClass { class } => format!(
                "Skipping file {}. Object is of storage class {}. Unable to perform download \
                 operations on {} objects. You must restore the object to be able to perform \
                 the operation.",
                path, class, class
            ),
            ItemWarning::InvalidTimestamp { raw, .. } => format!(
                "File {} has an invalid timestamp ({}). The file is transferred without \
                 comparing modification times.",
                path, raw
            ),
            ItemWarning::Unreadable { reason, .. } => format!("Skipping file {}. {}", path, reason),
            ItemWarning::UnsafeKey => format!(
                "Skipping file {}. The key refers to a location outside of {}.",
                path,
                engine.dest().name()
            ),
        };
        printer.warning(&line);
    }
}

fn print_outcomes(engine: &SyncEngine, outcomes: &[TransferOutcome], printer: &mut Printer<'_>) {
    for outcome in outcomes {
        let target = match outcome.action {
            SyncAction::Upload | SyncAction::Download => format!(
                "{} to {}",
                engine.source().display_path(&outcome.key),
                engine.dest().display_path(&outcome.key)
            ),
            SyncAction::Delete => engine.dest().display_path(&outcome.key),
            SyncAction::Skip | SyncAction::Error => continue,
        };

        match &outcome.status {
            OutcomeStatus::Done => printer.operation(&format!("{}: {}", outcome.action, target)),
            OutcomeStatus::DryRun => {
                printer.operation(&format!("(dryrun) {}: {}", outcome.action, target))
            }
            OutcomeStatus::Failed(e) => {
                printer.error(&format!("{} failed: {} {}", outcome.action, target, e))
            }
        }
    }
}
