use crate::core::entry::{FileEntry, LastModified};
use crate::core::plan::{ItemWarning, Side, SyncAction, SyncDecision, SyncPlan};
use crate::core::scanner::{Listing, UnreadableEntry};
use crate::storage::is_relative_key;
use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::{debug, warn};

/// 同步方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// 本地 -> S3
    Upload,
    /// S3 -> 本地
    Download,
}

impl Direction {
    fn transfer_action(self) -> SyncAction {
        match self {
            Direction::Upload => SyncAction::Upload,
            Direction::Download => SyncAction::Download,
        }
    }
}

/// 文件比较结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileRelation {
    /// 文件相同
    Equal,
    /// 大小不同
    Different,
    /// 目标比源旧
    DestOlder,
    /// 时间不同（--exact-timestamps）
    TimeMismatch,
    /// 时间戳无效，无法比较
    Unknown { side: Side, raw: String },
}

/// 比较配置
#[derive(Debug, Clone, Default)]
pub struct CompareConfig {
    /// 只比较大小
    pub size_only: bool,
    /// 下载时要求时间完全一致
    pub exact_timestamps: bool,
    /// 删除目标中多余的文件
    pub delete: bool,
}

/// 文件比较器
#[derive(Default)]
pub struct FileComparator {
    config: CompareConfig,
}

impl FileComparator {
    pub fn with_config(config: CompareConfig) -> Self {
        Self { config }
    }

    /// 比较同一个键的源和目标
    pub fn compare_files(
        &self,
        source: &FileEntry,
        dest: &FileEntry,
        direction: Direction,
    ) -> FileRelation {
        // 大小不同，肯定不同
        if source.size != dest.size {
            debug!(
                "文件大小不同: {} (src={}, dst={})",
                source.key, source.size, dest.size
            );
            return FileRelation::Different;
        }

        if self.config.size_only {
            return FileRelation::Equal;
        }

        let (src_time, dst_time) = match (&source.last_modified, &dest.last_modified) {
            (LastModified::At(s), LastModified::At(d)) => (*s, *d),
            (LastModified::Invalid(raw), _) => {
                return FileRelation::Unknown {
                    side: Side::Source,
                    raw: raw.clone(),
                };
            }
            (_, LastModified::Invalid(raw)) => {
                return FileRelation::Unknown {
                    side: Side::Dest,
                    raw: raw.clone(),
                };
            }
        };

        if dst_time < src_time {
            debug!(
                "目标文件较旧: {} (src_time={}, dst_time={})",
                source.key, src_time, dst_time
            );
            return FileRelation::DestOlder;
        }

        if self.config.exact_timestamps && direction == Direction::Download && dst_time != src_time
        {
            return FileRelation::TimeMismatch;
        }

        FileRelation::Equal
    }

    /// 传输决策；键会逃出目标目录时拒绝
    fn transfer(src: FileEntry, action: SyncAction) -> SyncDecision {
        if is_relative_key(&src.key) {
            SyncDecision::new(action, src)
        } else {
            warn!("拒绝不安全的键: {}", src.key);
            SyncDecision::new(SyncAction::Error, src).with_warning(ItemWarning::UnsafeKey)
        }
    }

    /// 对两个有序列表做归并，生成按键升序的计划
    ///
    /// 无法读取的条目不会被传输，目标中与之对应的键也不会被删除。
    pub fn compare(&self, source: Listing, dest: Listing, direction: Direction) -> SyncPlan {
        let transfer = direction.transfer_action();
        let (source, source_unreadable) = source.into_parts();
        let (dest, dest_unreadable) = dest.into_parts();
        let protected = |key: &str| {
            source_unreadable
                .iter()
                .chain(dest_unreadable.iter())
                .any(|u| u.covers(key))
        };

        let mut decisions = Vec::with_capacity(source.len());
        let mut src_iter = source.into_iter().peekable();
        let mut dst_iter = dest.into_iter().peekable();

        loop {
            let order = match (src_iter.peek(), dst_iter.peek()) {
                (Some(s), Some(d)) => s.key.cmp(&d.key),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => break,
            };

            match order {
                // 只有源有
                Ordering::Less => {
                    let Some(src) = src_iter.next() else { break };
                    let warning = match &src.last_modified {
                        LastModified::Invalid(raw) => Some(ItemWarning::InvalidTimestamp {
                            side: Side::Source,
                            raw: raw.clone(),
                        }),
                        LastModified::At(_) => None,
                    };
                    let mut decision = Self::transfer(src, transfer);
                    if decision.warning.is_none() {
                        decision.warning = warning;
                    }
                    decisions.push(decision);
                }

                // 两边都有
                Ordering::Equal => {
                    let (Some(src), Some(dst)) = (src_iter.next(), dst_iter.next()) else {
                        break;
                    };
                    let decision = match self.compare_files(&src, &dst, direction) {
                        FileRelation::Equal => SyncDecision::new(SyncAction::Skip, src),
                        FileRelation::Different
                        | FileRelation::DestOlder
                        | FileRelation::TimeMismatch => Self::transfer(src, transfer),
                        FileRelation::Unknown { side, raw } => {
                            let decision = Self::transfer(src, transfer);
                            if decision.warning.is_some() {
                                decision
                            } else {
                                decision.with_warning(ItemWarning::InvalidTimestamp { side, raw })
                            }
                        }
                    };
                    decisions.push(decision);
                }

                // 只有目标有
                Ordering::Greater => {
                    let Some(dst) = dst_iter.next() else { break };
                    if !self.config.delete {
                        continue;
                    }
                    if protected(&dst.key) {
                        debug!("存在无法读取的条目，不删除: {}", dst.key);
                        continue;
                    }
                    decisions.push(SyncDecision::new(SyncAction::Delete, dst));
                }
            }
        }

        Self::add_unreadable(&mut decisions, source_unreadable, dest_unreadable);
        SyncPlan::new(decisions)
    }

    /// 源中无法读取的条目记为错误，目标中的记为跳过；已有决策的键不重复
    fn add_unreadable(
        decisions: &mut Vec<SyncDecision>,
        source: Vec<UnreadableEntry>,
        dest: Vec<UnreadableEntry>,
    ) {
        let mut decided: HashSet<String> = decisions.iter().map(|d| d.key.clone()).collect();
        let sides = [
            (Side::Source, SyncAction::Error, source),
            (Side::Dest, SyncAction::Skip, dest),
        ];

        for (side, action, entries) in sides {
            for entry in entries {
                if !decided.insert(entry.key.clone()) {
                    continue;
                }
                decisions.push(
                    SyncDecision::new(action, entry.to_file_entry()).with_warning(
                        ItemWarning::Unreadable {
                            side,
                            reason: entry.reason,
                        },
                    ),
                );
            }
        }
    }
}
