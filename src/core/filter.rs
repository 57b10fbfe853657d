//! 过滤：路径规则（--exclude / --include）与存储类型策略

use crate::core::plan::{ItemWarning, SyncAction, SyncDecision, SyncPlan};
use crate::error::SyncError;
use regex::Regex;
use tracing::debug;

/// 路径规则，按命令行顺序给出
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterRule {
    Exclude(String),
    Include(String),
}

/// 路径过滤器：最后一条匹配的规则生效，默认包含
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    rules: Vec<(bool, Regex)>,
}

impl PathFilter {
    pub fn new(rules: &[FilterRule]) -> Result<Self, SyncError> {
        let mut compiled = Vec::with_capacity(rules.len());
        for rule in rules {
            let (include, pattern) = match rule {
                FilterRule::Exclude(p) => (false, p),
                FilterRule::Include(p) => (true, p),
            };
            let re = Regex::new(&glob_to_regex(pattern)).map_err(|e| SyncError::InvalidPattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
            compiled.push((include, re));
        }
        Ok(Self { rules: compiled })
    }

    /// 检查相对路径是否参与同步
    pub fn is_included(&self, path: &str) -> bool {
        let included = self
            .rules
            .iter()
            .rev()
            .find(|(_, re)| re.is_match(path))
            .map_or(true, |(include, _)| *include);

        if !included {
            debug!("排除文件: {}", path);
        }
        included
    }
}

/// 将通配符模式转换为正则：* 匹配任意字符（包括 /），? 匹配单个字符，[...] 为字符组
fn glob_to_regex(pattern: &str) -> String {
    let mut re = String::from("^");
    let mut chars = pattern.chars();

    while let Some(c) = chars.next() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            '[' => {
                let mut class = String::new();
                let mut closed = false;
                for n in chars.by_ref() {
                    if n == ']' {
                        closed = true;
                        break;
                    }
                    class.push(n);
                }

                if closed && !class.is_empty() {
                    re.push('[');
                    let body = match class.strip_prefix('!') {
                        Some(rest) => {
                            re.push('^');
                            rest
                        }
                        None => class.as_str(),
                    };
                    re.push_str(&body.replace('\\', "\\\\").replace('[', "\\["));
                    re.push(']');
                } else {
                    // 未闭合的 [ 按字面匹配
                    re.push_str(&regex::escape(&format!("[{}", class)));
                    if closed {
                        re.push_str(&regex::escape("]"));
                    }
                }
            }
            other => re.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }

    re.push('$');
    re
}

/// 存储类型策略：归档对象（GLACIER / DEEP_ARCHIVE）不能直接下载
#[derive(Debug, Clone, Copy, Default)]
pub struct StorageClassPolicy {
    /// 跳过归档对象且不输出警告
    pub ignore_warnings: bool,
    /// 强制下载（对象已恢复）
    pub force_transfer: bool,
}

impl StorageClassPolicy {
    /// 对计划中的每个决策应用策略，返回新的计划
    pub fn apply(&self, plan: SyncPlan) -> SyncPlan {
        SyncPlan::new(
            plan.into_decisions()
                .into_iter()
                .map(|d| self.check(d))
                .collect(),
        )
    }

    /// 检查单个决策；拒绝时覆盖之前的警告
    pub fn check(&self, decision: SyncDecision) -> SyncDecision {
        if decision.action != SyncAction::Download
            || !decision.entry.storage_class.is_restricted()
            || self.force_transfer
        {
            return decision;
        }

        let class = decision.entry.storage_class.clone();
        if self.ignore_warnings {
            debug!("忽略归档对象: {} ({})", decision.key, class);
            SyncDecision {
                action: SyncAction::Skip,
                warning: None,
                ..decision
            }
        } else {
            SyncDecision {
                action: SyncAction::Error,
                warning: Some(ItemWarning::IncompatibleStorageClass { class }),
                ..decision
            }
        }
    }
}
