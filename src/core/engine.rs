use crate::core::comparator::{CompareConfig, Direction, FileComparator};
use crate::core::entry::Origin;
use crate::core::filter::{FilterRule, PathFilter, StorageClassPolicy};
use crate::core::plan::{SyncAction, SyncDecision, SyncPlan};
use crate::core::report::{OutcomeStatus, SyncReport, TransferOutcome};
use crate::core::scanner::FileScanner;
use crate::error::SyncError;
use crate::storage::{Storage, WriteOptions};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, error, info};

/// 默认最大并发请求数
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 10;

/// 同步配置
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// 最大并发请求数
    pub max_concurrent_requests: usize,
    /// 只输出将要执行的操作
    pub dry_run: bool,
    pub compare: CompareConfig,
    pub policy: StorageClassPolicy,
    /// --exclude / --include，按命令行顺序
    pub filter_rules: Vec<FilterRule>,
    /// 上传时使用的存储类型
    pub storage_class: Option<String>,
    /// 上传时设置的网站重定向地址
    pub website_redirect: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            dry_run: false,
            compare: CompareConfig::default(),
            policy: StorageClassPolicy::default(),
            filter_rules: Vec::new(),
            storage_class: None,
            website_redirect: None,
        }
    }
}

/// 计划执行器
#[async_trait]
pub trait Executor: Send + Sync {
    /// 每个传输决策执行一次，结果按计划顺序返回
    async fn execute(&self, plan: &SyncPlan) -> Vec<TransferOutcome>;
}

/// 基于信号量限流的并行执行器，不做重试
pub struct TransferExecutor {
    source: Arc<dyn Storage>,
    dest: Arc<dyn Storage>,
    max_concurrent: usize,
    upload_options: WriteOptions,
    dry_run: bool,
}

impl TransferExecutor {
    pub fn new(source: Arc<dyn Storage>, dest: Arc<dyn Storage>, config: &SyncConfig) -> Self {
        Self {
            source,
            dest,
            max_concurrent: config.max_concurrent_requests.max(1),
            upload_options: WriteOptions {
                modified: None,
                storage_class: config.storage_class.clone(),
                website_redirect: config.website_redirect.clone(),
            },
            dry_run: config.dry_run,
        }
    }

    /// 执行单个动作，返回传输字节数
    async fn execute_action(
        decision: &SyncDecision,
        source: &dyn Storage,
        dest: &dyn Storage,
        upload_options: &WriteOptions,
    ) -> Result<u64> {
        let key = decision.key.as_str();
        match decision.action {
            SyncAction::Upload | SyncAction::Download => {
                debug!("复制: {} ({}字节)", key, decision.entry.size);

                let body = source
                    .read(key)
                    .await
                    .with_context(|| format!("读取失败: {}", source.display_path(key)))?;
                let bytes = body.size;

                // 下载时保留对象的修改时间
                let options = if decision.action == SyncAction::Download {
                    WriteOptions {
                        modified: decision.entry.last_modified.as_datetime(),
                        ..Default::default()
                    }
                } else {
                    upload_options.clone()
                };

                dest.write(key, body, &options)
                    .await
                    .with_context(|| format!("写入失败: {}", dest.display_path(key)))?;
                debug!("  写入完成: {}", key);
                Ok(bytes)
            }
            SyncAction::Delete => {
                dest.delete(key)
                    .await
                    .with_context(|| format!("删除失败: {}", dest.display_path(key)))?;
                Ok(0)
            }
            SyncAction::Skip | SyncAction::Error => Ok(0),
        }
    }
}

#[async_trait]
impl Executor for TransferExecutor {
    async fn execute(&self, plan: &SyncPlan) -> Vec<TransferOutcome> {
        let transfers: Vec<SyncDecision> = plan.transfers().cloned().collect();

        if self.dry_run {
            return transfers
                .into_iter()
                .map(|d| TransferOutcome {
                    key: d.key,
                    action: d.action,
                    bytes: 0,
                    status: OutcomeStatus::DryRun,
                })
                .collect();
        }

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut handles = Vec::with_capacity(transfers.len());

        for decision in transfers {
            let key = decision.key.clone();
            let action = decision.action;

            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    handles.push((key, action, None, Some(e.to_string())));
                    continue;
                }
            };

            let source = self.source.clone();
            let dest = self.dest.clone();
            let upload_options = self.upload_options.clone();

            let handle = tokio::spawn(async move {
                let result = Self::execute_action(
                    &decision,
                    source.as_ref(),
                    dest.as_ref(),
                    &upload_options,
                )
                .await;
                drop(permit);
                result
            });

            handles.push((key, action, Some(handle), None));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (key, action, handle, spawn_error) in handles {
            let result = match (handle, spawn_error) {
                (Some(handle), _) => match handle.await {
                    Ok(result) => result.map_err(|e| format!("{:#}", e)),
                    Err(e) => Err(e.to_string()),
                },
                (None, Some(e)) => Err(e),
                (None, None) => Err("任务未启动".to_string()),
            };

            let outcome = match result {
                Ok(bytes) => TransferOutcome {
                    key,
                    action,
                    bytes,
                    status: OutcomeStatus::Done,
                },
                Err(e) => {
                    error!("{} 失败: {}: {}", action, key, e);
                    TransferOutcome {
                        key,
                        action,
                        bytes: 0,
                        status: OutcomeStatus::Failed(e),
                    }
                }
            };
            outcomes.push(outcome);
        }

        outcomes
    }
}

/// 同步引擎：列表 -> 比较 -> 过滤 -> 执行
pub struct SyncEngine {
    source: Arc<dyn Storage>,
    dest: Arc<dyn Storage>,
    direction: Direction,
    config: SyncConfig,
}

impl SyncEngine {
    pub fn new(
        source: Arc<dyn Storage>,
        dest: Arc<dyn Storage>,
        direction: Direction,
        config: SyncConfig,
    ) -> Self {
        Self {
            source,
            dest,
            direction,
            config,
        }
    }

    pub fn source(&self) -> &dyn Storage {
        self.source.as_ref()
    }

    pub fn dest(&self) -> &dyn Storage {
        self.dest.as_ref()
    }

    /// 生成同步计划
    pub async fn plan(&self) -> Result<SyncPlan, SyncError> {
        let filter = PathFilter::new(&self.config.filter_rules)?;
        let scanner = FileScanner::new(filter);

        let (source_origin, dest_origin) = match self.direction {
            Direction::Upload => (Origin::Local, Origin::Remote),
            Direction::Download => (Origin::Remote, Origin::Local),
        };

        let source = scanner
            .scan(self.source.as_ref(), source_origin)
            .await
            .map_err(|e| SyncError::listing(self.source.name(), e))?;
        let dest = scanner
            .scan(self.dest.as_ref(), dest_origin)
            .await
            .map_err(|e| SyncError::listing(self.dest.name(), e))?;

        let comparator = FileComparator::with_config(self.config.compare.clone());
        let plan = self
            .config
            .policy
            .apply(comparator.compare(source, dest, self.direction));

        let summary = plan.summarize();
        info!(
            "同步计划: 上传 {}, 下载 {}, 删除 {}, 跳过 {}, 拒绝 {}, 共 {} 字节",
            summary.upload_count,
            summary.download_count,
            summary.delete_count,
            summary.skip_count,
            summary.error_count,
            summary.total_transfer_bytes()
        );

        Ok(plan)
    }

    /// 执行计划
    pub async fn execute(&self, plan: &SyncPlan) -> Vec<TransferOutcome> {
        let executor = TransferExecutor::new(self.source.clone(), self.dest.clone(), &self.config);
        self.execute_with(&executor, plan).await
    }

    pub async fn execute_with(
        &self,
        executor: &dyn Executor,
        plan: &SyncPlan,
    ) -> Vec<TransferOutcome> {
        let start = Instant::now();
        let outcomes = executor.execute(plan).await;
        let report = SyncReport::new(plan, &outcomes);
        info!("同步完成 ({:?}): {}", start.elapsed(), report);
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entry::StorageClass;
    use crate::core::report::ExitStatus;
    use crate::storage::{ScriptedResponse, ScriptedStorage};
    use bytes::Bytes;
    use std::sync::Mutex;

    const TIME: &str = "2014-01-09T20:45:49.000Z";

    fn engine(
        source: Arc<ScriptedStorage>,
        dest: Arc<ScriptedStorage>,
        direction: Direction,
        config: SyncConfig,
    ) -> SyncEngine {
        SyncEngine::new(source, dest, direction, config)
    }

    #[tokio::test]
    async fn test_upload_plan_and_execute() {
        let local = Arc::new(ScriptedStorage::new(
            "/data",
            vec![
                ScriptedResponse::Listing(vec![ScriptedStorage::object(
                    "index.html", 5, TIME, "",
                )]),
                ScriptedResponse::Get(Bytes::from_static(b"hello")),
            ],
        ));
        let remote = Arc::new(ScriptedStorage::new(
            "s3://bucket/",
            vec![ScriptedResponse::Listing(vec![]), ScriptedResponse::Put],
        ));
        let config = SyncConfig {
            storage_class: Some("STANDARD_IA".to_string()),
            website_redirect: Some("http://someserver".to_string()),
            ..Default::default()
        };

        let engine = engine(local.clone(), remote.clone(), Direction::Upload, config);
        let plan = engine.plan().await.unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.decisions()[0].action, SyncAction::Upload);

        let outcomes = engine.execute(&plan).await;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status, OutcomeStatus::Done);
        assert_eq!(outcomes[0].bytes, 5);

        assert_eq!(remote.operations(), vec!["ListObjectsV2", "PutObject"]);
        let put = &remote.calls()[1];
        assert_eq!(put.path.as_deref(), Some("index.html"));
        let options = put.options.clone().unwrap();
        assert_eq!(options.storage_class.as_deref(), Some("STANDARD_IA"));
        assert_eq!(options.website_redirect.as_deref(), Some("http://someserver"));
        assert_eq!(options.modified, None);
    }

    #[tokio::test]
    async fn test_download_sets_modified_time() {
        let remote = Arc::new(ScriptedStorage::new(
            "s3://bucket/",
            vec![
                ScriptedResponse::Listing(vec![ScriptedStorage::object("a.txt", 3, TIME, "")]),
                ScriptedResponse::Get(Bytes::from_static(b"abc")),
            ],
        ));
        let local = Arc::new(ScriptedStorage::new(
            "/data",
            vec![ScriptedResponse::Listing(vec![]), ScriptedResponse::Put],
        ));

        let engine = engine(
            remote.clone(),
            local.clone(),
            Direction::Download,
            SyncConfig::default(),
        );
        let plan = engine.plan().await.unwrap();
        let outcomes = engine.execute(&plan).await;
        assert_eq!(outcomes[0].status, OutcomeStatus::Done);

        let write = &local.calls()[1];
        let modified = write.options.as_ref().and_then(|o| o.modified).unwrap();
        assert_eq!(modified.timestamp(), 1_389_300_349);
    }

    #[tokio::test]
    async fn test_glacier_download_not_executed() {
        let remote = Arc::new(ScriptedStorage::new(
            "s3://bucket/",
            vec![ScriptedResponse::Listing(vec![ScriptedStorage::object(
                "foo", 100, "00:00:00Z", "GLACIER",
            )])],
        ));
        let local = Arc::new(ScriptedStorage::new(
            "/data",
            vec![ScriptedResponse::Listing(vec![])],
        ));

        let engine = engine(
            remote.clone(),
            local.clone(),
            Direction::Download,
            SyncConfig::default(),
        );
        let plan = engine.plan().await.unwrap();
        assert_eq!(plan.decisions()[0].action, SyncAction::Error);
        assert_eq!(
            plan.decisions()[0].entry.storage_class,
            StorageClass::Glacier
        );

        let outcomes = engine.execute(&plan).await;
        assert!(outcomes.is_empty());
        assert_eq!(
            SyncReport::new(&plan, &outcomes).exit_status(),
            ExitStatus::CompletedWithWarnings
        );
        assert_eq!(remote.operations(), vec!["ListObjectsV2"]);
        assert_eq!(local.operations(), vec!["ListObjectsV2"]);
    }

    #[tokio::test]
    async fn test_failure_recorded_not_aborted() {
        let local = Arc::new(ScriptedStorage::new(
            "/data",
            vec![
                ScriptedResponse::Listing(vec![
                    ScriptedStorage::object("a", 1, TIME, ""),
                    ScriptedStorage::object("b", 1, TIME, ""),
                ]),
                ScriptedResponse::Get(Bytes::from_static(b"a")),
                ScriptedResponse::Get(Bytes::from_static(b"b")),
            ],
        ));
        let remote = Arc::new(ScriptedStorage::new(
            "s3://bucket/",
            vec![
                ScriptedResponse::Listing(vec![]),
                ScriptedResponse::Failure("AccessDenied".to_string()),
                ScriptedResponse::Failure("AccessDenied".to_string()),
            ],
        ));
        let config = SyncConfig {
            max_concurrent_requests: 1,
            ..Default::default()
        };

        let engine = engine(local, remote, Direction::Upload, config);
        let plan = engine.plan().await.unwrap();
        let outcomes = engine.execute(&plan).await;

        let keys: Vec<_> = outcomes.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert!(outcomes.iter().all(|o| o.is_failed()));
        assert_eq!(
            SyncReport::new(&plan, &outcomes).exit_status(),
            ExitStatus::TransferFailed
        );
    }

    #[tokio::test]
    async fn test_dry_run_calls_nothing() {
        let local = Arc::new(ScriptedStorage::new(
            "/data",
            vec![ScriptedResponse::Listing(vec![ScriptedStorage::object(
                "a", 1, TIME, "",
            )])],
        ));
        let remote = Arc::new(ScriptedStorage::new(
            "s3://bucket/",
            vec![ScriptedResponse::Listing(vec![])],
        ));
        let config = SyncConfig {
            dry_run: true,
            ..Default::default()
        };

        let engine = engine(local.clone(), remote.clone(), Direction::Upload, config);
        let plan = engine.plan().await.unwrap();
        let outcomes = engine.execute(&plan).await;

        assert_eq!(outcomes[0].status, OutcomeStatus::DryRun);
        assert_eq!(local.operations(), vec!["ListObjectsV2"]);
        assert_eq!(remote.operations(), vec!["ListObjectsV2"]);
    }

    #[tokio::test]
    async fn test_listing_failure_is_fatal() {
        let local = Arc::new(ScriptedStorage::new("/data", vec![ScriptedResponse::Listing(vec![])]));
        let remote = Arc::new(ScriptedStorage::new(
            "s3://bucket/",
            vec![ScriptedResponse::Failure("NoSuchBucket".to_string())],
        ));

        let engine = engine(local, remote, Direction::Upload, SyncConfig::default());
        let err = engine.plan().await.unwrap_err();
        assert_eq!(err.exit_status(), ExitStatus::Fatal);
        assert!(err.to_string().contains("NoSuchBucket"));
    }

    struct RecordingExecutor {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Executor for RecordingExecutor {
        async fn execute(&self, plan: &SyncPlan) -> Vec<TransferOutcome> {
            let mut seen = self.seen.lock().unwrap();
            plan.transfers()
                .map(|d| {
                    seen.push(d.key.clone());
                    TransferOutcome {
                        key: d.key.clone(),
                        action: d.action,
                        bytes: d.entry.size,
                        status: OutcomeStatus::Done,
                    }
                })
                .collect()
        }
    }

    #[tokio::test]
    async fn test_custom_executor_receives_transfers_only() {
        let local = Arc::new(ScriptedStorage::new(
            "/data",
            vec![ScriptedResponse::Listing(vec![
                ScriptedStorage::object("new", 1, TIME, ""),
                ScriptedStorage::object("same", 1, TIME, ""),
            ])],
        ));
        let remote = Arc::new(ScriptedStorage::new(
            "s3://bucket/",
            vec![ScriptedResponse::Listing(vec![
                ScriptedStorage::object("same", 1, TIME, ""),
            ])],
        ));

        let engine = engine(local, remote, Direction::Upload, SyncConfig::default());
        let plan = engine.plan().await.unwrap();
        let executor = RecordingExecutor {
            seen: Mutex::new(Vec::new()),
        };
        let outcomes = engine.execute_with(&executor, &plan).await;

        assert_eq!(outcomes.len(), 1);
        assert_eq!(*executor.seen.lock().unwrap(), vec!["new".to_string()]);
    }
}
