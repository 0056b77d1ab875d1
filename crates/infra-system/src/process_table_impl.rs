// Process table implementation
// reason: sysinfo for cross-platform process enumeration
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use sysinfo::{Pid as SysPid, ProcessStatus, System};
use tracing::debug;

use lifecheck_core::domain::{Pid, ProcessRecord};
use lifecheck_core::port::{ProcessTable, ProcessTableError};

/// Process table backed by sysinfo
///
/// Each `enumerate` refreshes the full process list. Entries that can never
/// be acted on are left out of the snapshot:
/// - the caller's own process and its ancestors (a pattern may match the test
///   runner itself, or a `cargo run`/`sudo` parent carrying the same argv)
/// - zombies (already dead, only waiting for their parent)
/// - threads, which sysinfo lists alongside processes on Linux
pub struct SysinfoProcessTable {
    system: Arc<Mutex<System>>,
}

impl SysinfoProcessTable {
    pub fn new() -> Self {
        Self {
            system: Arc::new(Mutex::new(System::new())),
        }
    }
}

impl Default for SysinfoProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

/// `own` and every ancestor reachable through `parent_of`
fn lineage(own: SysPid, parent_of: impl Fn(SysPid) -> Option<SysPid>) -> HashSet<SysPid> {
    let mut lineage = HashSet::from([own]);
    let mut cursor = parent_of(own);
    while let Some(pid) = cursor {
        if !lineage.insert(pid) {
            break;
        }
        cursor = parent_of(pid);
    }
    lineage
}

fn snapshot(system: &Mutex<System>) -> Result<Vec<ProcessRecord>, ProcessTableError> {
    if !sysinfo::IS_SUPPORTED_SYSTEM {
        return Err(ProcessTableError::Unavailable(
            "process listing is not supported on this platform".to_string(),
        ));
    }
    let own_pid = sysinfo::get_current_pid()
        .map_err(|e| ProcessTableError::Unavailable(format!("own pid unknown: {}", e)))?;

    let mut sys = system
        .lock()
        .map_err(|_| ProcessTableError::Unavailable("process table lock poisoned".to_string()))?;
    sys.refresh_processes();

    // A listing that does not even contain us was not really read
    if sys.process(own_pid).is_none() {
        return Err(ProcessTableError::Unavailable(
            "own process missing from listing".to_string(),
        ));
    }

    let lineage = lineage(own_pid, |pid| sys.process(pid).and_then(|p| p.parent()));

    let mut threads = HashSet::new();
    for (pid, process) in sys.processes() {
        if let Some(tasks) = process.tasks() {
            threads.extend(tasks.iter().filter(|task| *task != pid).copied());
        }
    }

    let mut records = Vec::new();
    for (pid, process) in sys.processes() {
        if lineage.contains(pid) || threads.contains(pid) || process.status() == ProcessStatus::Zombie {
            continue;
        }
        let Ok(pid) = Pid::new(i64::from(pid.as_u32())) else {
            continue;
        };
        let command_line = if process.cmd().is_empty() {
            process.name().to_string()
        } else {
            process.cmd().join(" ")
        };
        records.push(ProcessRecord::new(pid, command_line));
    }

    records.sort_by_key(|r| r.pid);
    Ok(records)
}

#[async_trait]
impl ProcessTable for SysinfoProcessTable {
    async fn enumerate(&self) -> Result<Vec<ProcessRecord>, ProcessTableError> {
        let system = self.system.clone();
        let records = tokio::task::spawn_blocking(move || snapshot(&system))
            .await
            .map_err(|e| ProcessTableError::Unavailable(format!("listing task failed: {}", e)))??;

        debug!(processes = %records.len(), "Process table enumerated");
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_enumerate_lists_processes() {
        let table = SysinfoProcessTable::new();

        let records = table.enumerate().await.unwrap();

        assert!(!records.is_empty());
        assert!(records.iter().all(|r| !r.command_line.is_empty()));
    }

    #[tokio::test]
    async fn test_enumerate_excludes_own_process() {
        let table = SysinfoProcessTable::new();
        let own = i64::from(std::process::id());

        let records = table.enumerate().await.unwrap();

        assert!(records.iter().all(|r| i64::from(r.pid) != own));
    }

    #[test]
    fn test_lineage_follows_parents_to_the_root() {
        let parents: std::collections::HashMap<SysPid, SysPid> = [(40, 30), (30, 1)]
            .into_iter()
            .map(|(child, parent)| (SysPid::from(child), SysPid::from(parent)))
            .collect();

        let lineage = lineage(SysPid::from(40), |pid| parents.get(&pid).copied());

        let expected: HashSet<SysPid> = [40, 30, 1].into_iter().map(SysPid::from).collect();
        assert_eq!(lineage, expected);
    }

    #[test]
    fn test_lineage_stops_on_a_parent_cycle() {
        let lineage = lineage(SysPid::from(7), |pid| {
            Some(if pid == SysPid::from(7) { SysPid::from(8) } else { SysPid::from(7) })
        });

        assert_eq!(lineage.len(), 2);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_enumerate_excludes_parent_process() {
        let parent = i64::from(std::os::unix::process::parent_id());

        let records = SysinfoProcessTable::new().enumerate().await.unwrap();

        assert!(records.iter().all(|r| i64::from(r.pid) != parent));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_enumerate_sees_child_command_line() {
        let mut child = tokio::process::Command::new("sleep")
            .arg("37.5")
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        let child_pid = i64::from(child.id().unwrap());

        let records = SysinfoProcessTable::new().enumerate().await.unwrap();

        let record = records.iter().find(|r| i64::from(r.pid) == child_pid).unwrap();
        assert!(record.command_line.contains("37.5"));

        child.kill().await.unwrap();
    }
}
