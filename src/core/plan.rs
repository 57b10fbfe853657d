use crate::core::entry::{FileEntry, StorageClass};
use std::fmt;

/// 同步动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    /// 本地 -> 远程
    Upload,
    /// 远程 -> 本地
    Download,
    /// 删除目标中多余的文件
    Delete,
    /// 跳过（文件相同，或按策略忽略）
    Skip,
    /// 按策略拒绝，不执行传输
    Error,
}

impl SyncAction {
    /// 需要交给执行器的动作
    pub fn is_transfer(&self) -> bool {
        matches!(self, SyncAction::Upload | SyncAction::Download | SyncAction::Delete)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncAction::Upload => "upload",
            SyncAction::Download => "download",
            SyncAction::Delete => "delete",
            SyncAction::Skip => "skip",
            SyncAction::Error => "error",
        }
    }
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 警告对应的一端
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Source,
    Dest,
}

/// 单个条目的警告，不会中断整个同步
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemWarning {
    /// 修改时间无法表示为有效时间戳，不做时间比较直接传输
    InvalidTimestamp { side: Side, raw: String },
    /// 归档类型的对象需要先恢复才能下载
    IncompatibleStorageClass { class: StorageClass },
    /// 列表中的条目无法读取，不传输也不删除
    Unreadable { side: Side, reason: String },
    /// 键包含 .. 或绝对路径，写入会超出目标目录
    UnsafeKey,
}

impl ItemWarning {
    pub fn side(&self) -> Side {
        match self {
            ItemWarning::InvalidTimestamp { side, .. } | ItemWarning::Unreadable { side, .. } => {
                *side
            }
            ItemWarning::IncompatibleStorageClass { .. } | ItemWarning::UnsafeKey => Side::Source,
        }
    }
}

impl fmt::Display for ItemWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemWarning::InvalidTimestamp { raw, .. } => {
                write!(f, "invalid timestamp ({})", raw)
            }
            ItemWarning::IncompatibleStorageClass { class } => {
                write!(f, "incompatible storage class {}", class)
            }
            ItemWarning::Unreadable { reason, .. } => write!(f, "unreadable: {}", reason),
            ItemWarning::UnsafeKey => f.write_str("key outside the destination"),
        }
    }
}

/// 针对单个键的决策
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncDecision {
    pub key: String,
    pub action: SyncAction,
    /// 传输/跳过时为源条目，删除时为目标条目
    pub entry: FileEntry,
    pub warning: Option<ItemWarning>,
}

impl SyncDecision {
    pub fn new(action: SyncAction, entry: FileEntry) -> Self {
        Self {
            key: entry.key.clone(),
            action,
            entry,
            warning: None,
        }
    }

    pub fn with_warning(mut self, warning: ItemWarning) -> Self {
        self.warning = Some(warning);
        self
    }
}

/// 一次同步的完整计划，按键升序，创建后不可修改
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    decisions: Vec<SyncDecision>,
}

impl SyncPlan {
    /// 决策按键排序；同一个键只保留第一条
    pub fn new(mut decisions: Vec<SyncDecision>) -> Self {
        decisions.sort_by(|a, b| a.key.cmp(&b.key));
        decisions.dedup_by(|later, earlier| later.key == earlier.key);
        Self { decisions }
    }

    pub fn decisions(&self) -> &[SyncDecision] {
        &self.decisions
    }

    pub fn into_decisions(self) -> Vec<SyncDecision> {
        self.decisions
    }

    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.decisions.len()
    }

    /// 需要执行的决策
    pub fn transfers(&self) -> impl Iterator<Item = &SyncDecision> {
        self.decisions.iter().filter(|d| d.action.is_transfer())
    }

    /// 带警告的决策
    pub fn warnings(&self) -> impl Iterator<Item = &SyncDecision> {
        self.decisions.iter().filter(|d| d.warning.is_some())
    }

    /// 统计同步动作
    pub fn summarize(&self) -> ActionSummary {
        let mut summary = ActionSummary::default();

        for decision in &self.decisions {
            match decision.action {
                SyncAction::Upload => {
                    summary.upload_count += 1;
                    summary.upload_bytes += decision.entry.size;
                }
                SyncAction::Download => {
                    summary.download_count += 1;
                    summary.download_bytes += decision.entry.size;
                }
                SyncAction::Delete => summary.delete_count += 1,
                SyncAction::Skip => summary.skip_count += 1,
                SyncAction::Error => summary.error_count += 1,
            }
            if decision.warning.is_some() {
                summary.warning_count += 1;
            }
        }

        summary
    }
}

/// 动作统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionSummary {
    pub upload_count: usize,
    pub upload_bytes: u64,
    pub download_count: usize,
    pub download_bytes: u64,
    pub delete_count: usize,
    pub skip_count: usize,
    pub error_count: usize,
    pub warning_count: usize,
}

impl ActionSummary {
    pub fn total_transfer_bytes(&self) -> u64 {
        self.upload_bytes + self.download_bytes
    }

    pub fn transfer_count(&self) -> usize {
        self.upload_count + self.download_count + self.delete_count
    }
}
