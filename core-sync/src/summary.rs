//! Pass results and the one-line messages shown to the user

use bridge_traits::ItemKey;
use core_runtime::events::SyncPass;

use crate::error::FileError;

/// Failing file names listed before "and N more"
pub const DEFAULT_MESSAGE_LIMIT: usize = 5;

/// Outcome of a send or retrieve pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSummary {
    pub pass: SyncPass,
    pub succeeded: Vec<ItemKey>,
    /// Tracked files whose record or external copy had vanished
    pub cleaned: Vec<ItemKey>,
    pub errors: Vec<FileError>,
}

impl SyncSummary {
    pub fn new(pass: SyncPass) -> Self {
        Self {
            pass,
            succeeded: Vec::new(),
            cleaned: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn succeeded_count(&self) -> usize {
        self.succeeded.len()
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Summary line listing at most `limit` failing file names
    pub fn message(&self, limit: usize) -> String {
        let verb = match self.pass {
            SyncPass::Send => "Sent",
            SyncPass::Retrieve => "Retrieved",
            SyncPass::Check => "Checked",
        };

        let count = self.succeeded.len();
        let mut message = format!("{} {} {}", verb, count, plural(count));

        if !self.cleaned.is_empty() {
            message.push_str(&format!(", cleaned up {}", self.cleaned.len()));
        }

        if !self.errors.is_empty() {
            let names: Vec<&str> = self
                .errors
                .iter()
                .take(limit)
                .map(|e| e.filename.as_str())
                .collect();
            message.push_str(&format!("; {} failed: {}", self.errors.len(), names.join(", ")));

            let rest = self.errors.len().saturating_sub(limit);
            if rest > 0 {
                message.push_str(&format!(" and {} more", rest));
            }
        }

        message
    }
}

/// Outcome of a modification check
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckSummary {
    pub checked: usize,
    /// Files that moved from on-external to modified
    pub newly_modified: usize,
    /// Files whose modified marker was removed again
    pub reverted: usize,
    /// Tracked markers without a readable record, now cleared
    pub orphaned: usize,
}

impl CheckSummary {
    pub fn changed(&self) -> usize {
        self.newly_modified + self.reverted + self.orphaned
    }

    pub fn message(&self) -> String {
        format!(
            "Checked {} {}: {} modified, {} reverted",
            self.checked,
            plural(self.checked),
            self.newly_modified,
            self.reverted
        )
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        "file"
    } else {
        "files"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FileErrorKind;

    fn failing(n: usize) -> Vec<FileError> {
        (0..n)
            .map(|i| {
                FileError::new(
                    ItemKey::new(format!("K{}", i)),
                    format!("f{}.pdf", i),
                    FileErrorKind::SourceMissing,
                )
            })
            .collect()
    }

    #[test]
    fn test_message_without_errors() {
        let mut summary = SyncSummary::new(SyncPass::Send);
        summary.succeeded.push(ItemKey::new("A"));
        assert_eq!(summary.message(DEFAULT_MESSAGE_LIMIT), "Sent 1 file");
    }

    #[test]
    fn test_message_caps_failed_names() {
        let mut summary = SyncSummary::new(SyncPass::Retrieve);
        summary.succeeded = vec![ItemKey::new("A"), ItemKey::new("B")];
        summary.cleaned = vec![ItemKey::new("C")];
        summary.errors = failing(7);

        assert_eq!(
            summary.message(DEFAULT_MESSAGE_LIMIT),
            "Retrieved 2 files, cleaned up 1; 7 failed: f0.pdf, f1.pdf, f2.pdf, f3.pdf, f4.pdf and 2 more"
        );
    }

    #[test]
    fn test_check_message() {
        let summary = CheckSummary {
            checked: 3,
            newly_modified: 1,
            reverted: 0,
            orphaned: 0,
        };
        assert_eq!(summary.message(), "Checked 3 files: 1 modified, 0 reverted");
        assert_eq!(summary.changed(), 1);
    }
}
