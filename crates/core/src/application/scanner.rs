// Process scanner
use std::sync::Arc;
use tracing::debug;

use crate::domain::{ProcessPatterns, ProcessRecord};
use crate::port::{ProcessTable, ProcessTableError};

/// Finds live processes whose command line mentions any of a set of patterns
#[derive(Clone)]
pub struct ProcessScanner {
    table: Arc<dyn ProcessTable>,
}

impl ProcessScanner {
    pub fn new(table: Arc<dyn ProcessTable>) -> Self {
        Self { table }
    }

    /// Snapshot the process table and keep the matching records
    ///
    /// Every returned record matches at least one pattern, and every matching
    /// process in the snapshot is returned. An unreadable table is an error,
    /// never an empty result.
    pub async fn scan(
        &self,
        patterns: &ProcessPatterns,
    ) -> Result<Vec<ProcessRecord>, ProcessTableError> {
        let snapshot = self.table.enumerate().await?;
        let total = snapshot.len();

        let matches: Vec<ProcessRecord> = snapshot
            .into_iter()
            .filter(|record| patterns.matches(&record.command_line))
            .collect();

        debug!(
            patterns = %patterns,
            scanned = %total,
            matched = %matches.len(),
            "Process table scanned"
        );

        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::process_table::mocks::MockProcessTable;

    fn scanner(table: &MockProcessTable) -> ProcessScanner {
        ProcessScanner::new(Arc::new(table.clone()))
    }

    #[tokio::test]
    async fn test_scan_is_sound_and_complete() {
        let table = MockProcessTable::with_processes([
            (100, "/usr/local/bin/hyperkit -A -u -F /state/hyperkit.pid"),
            (101, "vpnkit --ethernet fd:3 --port fd:4"),
            (102, "/bin/zsh -l"),
            (103, "linuxkit run hyperkit -console-file"),
            (104, "/usr/sbin/sshd -D"),
        ]);
        let patterns = ProcessPatterns::new(["linuxkit", "hyperkit", "vpnkit"]);

        let found = scanner(&table).scan(&patterns).await.unwrap();

        let pids: Vec<i64> = found.iter().map(|r| i64::from(r.pid)).collect();
        assert_eq!(pids, vec![100, 101, 103]);
        assert!(found.iter().all(|r| patterns.matches(&r.command_line)));
    }

    #[tokio::test]
    async fn test_scan_is_case_sensitive() {
        let table = MockProcessTable::with_processes([(7, "HyperKit.app")]);

        let found = scanner(&table)
            .scan(&ProcessPatterns::new(["hyperkit"]))
            .await
            .unwrap();

        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_empty_patterns_match_nothing() {
        let table = MockProcessTable::with_processes([(1, "init"), (2, "hyperkit")]);

        let found = scanner(&table).scan(&ProcessPatterns::default()).await.unwrap();

        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_table_is_an_error() {
        let table = MockProcessTable::new();
        table.set_unavailable(true);

        let result = scanner(&table).scan(&ProcessPatterns::new(["vpnkit"])).await;

        assert!(matches!(result, Err(ProcessTableError::Unavailable(_))));
    }
}
