use crate::core::plan::{ActionSummary, SyncAction, SyncPlan};
use std::fmt;

/// 进程退出状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ExitStatus {
    Success,
    /// 存在警告（时间戳无效、存储类型不兼容）
    CompletedWithWarnings,
    /// 至少一个传输失败
    TransferFailed,
    /// 命令行参数错误
    Usage,
    /// 致命错误，同步未执行
    Fatal,
}

impl ExitStatus {
    pub fn code(&self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::TransferFailed => 1,
            ExitStatus::CompletedWithWarnings | ExitStatus::Usage => 2,
            ExitStatus::Fatal => 255,
        }
    }
}

/// 单个传输的执行结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeStatus {
    Done,
    Failed(String),
    /// 预演模式，未实际执行
    DryRun,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    pub key: String,
    pub action: SyncAction,
    pub bytes: u64,
    pub status: OutcomeStatus,
}

impl TransferOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, OutcomeStatus::Failed(_))
    }
}

/// 同步报告
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub summary: ActionSummary,
    pub files_uploaded: usize,
    pub files_downloaded: usize,
    pub files_deleted: usize,
    pub files_failed: usize,
    pub bytes_transferred: u64,
    pub warnings: usize,
    pub errors: Vec<String>,
}

impl SyncReport {
    pub fn new(plan: &SyncPlan, outcomes: &[TransferOutcome]) -> Self {
        let summary = plan.summarize();
        let mut report = Self {
            warnings: summary.warning_count,
            summary,
            ..Default::default()
        };

        for outcome in outcomes {
            match &outcome.status {
                OutcomeStatus::Done => {
                    report.bytes_transferred += outcome.bytes;
                    match outcome.action {
                        SyncAction::Upload => report.files_uploaded += 1,
                        SyncAction::Download => report.files_downloaded += 1,
                        SyncAction::Delete => report.files_deleted += 1,
                        SyncAction::Skip | SyncAction::Error => {}
                    }
                }
                OutcomeStatus::Failed(e) => {
                    report.files_failed += 1;
                    report.errors.push(format!("{}: {}", outcome.key, e));
                }
                OutcomeStatus::DryRun => {}
            }
        }

        report
    }

    /// 失败优先于警告，警告优先于成功
    pub fn exit_status(&self) -> ExitStatus {
        if self.files_failed > 0 {
            ExitStatus::TransferFailed
        } else if self.warnings > 0 {
            ExitStatus::CompletedWithWarnings
        } else {
            ExitStatus::Success
        }
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "上传 {}, 下载 {}, 删除 {}, 跳过 {}, 失败 {}, 警告 {}, 传输 {} 字节",
            self.files_uploaded,
            self.files_downloaded,
            self.files_deleted,
            self.summary.skip_count,
            self.files_failed,
            self.warnings,
            self.bytes_transferred
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entry::{FileEntry, LastModified, Origin, StorageClass};
    use crate::core::plan::{ItemWarning, Side, SyncDecision};

    fn decision(key: &str, action: SyncAction) -> SyncDecision {
        SyncDecision::new(
            action,
            FileEntry {
                key: key.to_string(),
                size: 4,
                last_modified: LastModified::from_unix(0, 0),
                storage_class: StorageClass::Standard,
                origin: Origin::Local,
            },
        )
    }

    fn outcome(key: &str, action: SyncAction, status: OutcomeStatus) -> TransferOutcome {
        TransferOutcome {
            key: key.to_string(),
            action,
            bytes: 4,
            status,
        }
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(ExitStatus::Success.code(), 0);
        assert_eq!(ExitStatus::TransferFailed.code(), 1);
        assert_eq!(ExitStatus::CompletedWithWarnings.code(), 2);
        assert_eq!(ExitStatus::Usage.code(), 2);
        assert_eq!(ExitStatus::Fatal.code(), 255);
    }

    #[test]
    fn test_empty_report_is_success() {
        let report = SyncReport::new(&SyncPlan::default(), &[]);
        assert_eq!(report.exit_status(), ExitStatus::Success);
    }

    #[test]
    fn test_warning_gives_status_two() {
        let plan = SyncPlan::new(vec![decision("a", SyncAction::Upload).with_warning(
            ItemWarning::InvalidTimestamp {
                side: Side::Source,
                raw: "-100000000000".to_string(),
            },
        )]);
        let outcomes = vec![outcome("a", SyncAction::Upload, OutcomeStatus::Done)];

        let report = SyncReport::new(&plan, &outcomes);
        assert_eq!(report.files_uploaded, 1);
        assert_eq!(report.bytes_transferred, 4);
        assert_eq!(report.exit_status(), ExitStatus::CompletedWithWarnings);
    }

    #[test]
    fn test_failure_takes_precedence() {
        let plan = SyncPlan::new(vec![
            decision("a", SyncAction::Upload),
            decision("b", SyncAction::Error).with_warning(ItemWarning::IncompatibleStorageClass {
                class: StorageClass::Glacier,
            }),
        ]);
        let outcomes = vec![outcome(
            "a",
            SyncAction::Upload,
            OutcomeStatus::Failed("AccessDenied".to_string()),
        )];

        let report = SyncReport::new(&plan, &outcomes);
        assert_eq!(report.files_failed, 1);
        assert_eq!(report.errors, vec!["a: AccessDenied".to_string()]);
        assert_eq!(report.exit_status(), ExitStatus::TransferFailed);
    }

    #[test]
    fn test_dryrun_transfers_nothing() {
        let plan = SyncPlan::new(vec![decision("a", SyncAction::Upload)]);
        let outcomes = vec![outcome("a", SyncAction::Upload, OutcomeStatus::DryRun)];
        let report = SyncReport::new(&plan, &outcomes);
        assert_eq!(report.files_uploaded, 0);
        assert_eq!(report.bytes_transferred, 0);
        assert_eq!(report.exit_status(), ExitStatus::Success);
    }
}
