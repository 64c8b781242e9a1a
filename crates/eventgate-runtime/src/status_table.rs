//! Folds the source status stream into a per-source table.

use std::collections::BTreeMap;
use std::fmt::Write;

use tokio::sync::mpsc;

use eventgate_core::{SourceId, SourcePhase, SourceStatus};

#[derive(Debug, Default)]
pub struct StatusTable {
    rows: BTreeMap<SourceId, SourceStatus>,
}

impl StatusTable {
    /// `Removed` drops the row; every other phase replaces it.
    pub fn apply(&mut self, status: SourceStatus) {
        if status.phase == SourcePhase::Removed {
            self.rows.remove(&status.id);
        } else {
            self.rows.insert(status.id.clone(), status);
        }
    }

    pub fn get(&self, id: &SourceId) -> Option<&SourceStatus> {
        self.rows.get(id)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Plain-text table ordered by source name.
    pub fn render(&self) -> String {
        let mut rows: Vec<&SourceStatus> = self.rows.values().collect();
        rows.sort_by(|a, b| a.display_name.cmp(&b.display_name));

        let width = rows
            .iter()
            .map(|s| s.display_name.len())
            .max()
            .unwrap_or(0)
            .max("SOURCE".len());
        let mut out = format!("{:<width$}  {:<12}  {:<9}  MESSAGE\n", "SOURCE", "ID", "PHASE");
        for s in rows {
            let _ = writeln!(
                out,
                "{:<width$}  {:<12}  {:<9}  {}",
                s.display_name,
                s.id.short(),
                s.phase.as_str(),
                s.message
            );
        }
        out
    }
}

/// Consume statuses until every sender is gone, logging each transition.
pub async fn collect_statuses(mut rx: mpsc::Receiver<SourceStatus>) -> StatusTable {
    let mut table = StatusTable::default();
    while let Some(status) = rx.recv().await {
        match status.phase {
            SourcePhase::Error => tracing::warn!(
                source = %status.display_name,
                id = %status.id.short(),
                phase = %status.phase,
                "{}",
                status.message
            ),
            _ => tracing::info!(
                source = %status.display_name,
                id = %status.id.short(),
                phase = %status.phase,
                "{}",
                status.message
            ),
        }
        table.apply(status);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(key: &str, phase: SourcePhase, message: &str) -> SourceStatus {
        SourceStatus {
            id: SourceId::derive(key, "cfg"),
            phase,
            message: message.to_owned(),
            display_name: key.to_owned(),
        }
    }

    #[test]
    fn upserts_and_removes() {
        let mut table = StatusTable::default();
        table.apply(status("a", SourcePhase::Running, "event source is running"));
        table.apply(status("b", SourcePhase::Error, "bad"));
        table.apply(status("a", SourcePhase::Completed, "event source has been stopped"));
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.get(&SourceId::derive("a", "cfg")).map(|s| s.phase),
            Some(SourcePhase::Completed)
        );

        table.apply(status("b", SourcePhase::Removed, "event source removed"));
        assert_eq!(table.len(), 1);
        assert!(table.get(&SourceId::derive("b", "cfg")).is_none());
    }

    #[test]
    fn render_lists_sources_by_name() {
        let mut table = StatusTable::default();
        table.apply(status("zeta", SourcePhase::Running, "event source is running"));
        table.apply(status("alpha", SourcePhase::Error, "event source is not valid"));

        let text = table.render();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("SOURCE"));
        assert!(lines[1].starts_with("alpha"));
        assert!(lines[1].contains("error"));
        assert!(lines[2].starts_with("zeta"));
        assert!(lines[2].ends_with("event source is running"));
    }

    #[tokio::test]
    async fn collects_until_senders_drop() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(status("a", SourcePhase::Running, "")).await.expect("send");
        tx.send(status("b", SourcePhase::Running, "")).await.expect("send");
        tx.send(status("a", SourcePhase::Removed, "")).await.expect("send");
        drop(tx);

        let table = collect_statuses(rx).await;
        assert_eq!(table.len(), 1);
        assert!(!table.is_empty());
    }
}
