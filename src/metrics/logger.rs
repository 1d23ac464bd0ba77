use super::MetricsSnapshot;
use anyhow::Result;
use csv::Writer;
use std::fs::File;
use std::path::Path;

pub struct MetricsLogger {
    writer: Writer<File>,
}

impl MetricsLogger {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let writer = Writer::from_path(path)?;
        Ok(Self { writer })
    }

    pub fn log(&mut self, snapshot: &MetricsSnapshot) -> Result<()> {
        self.writer.serialize(snapshot)?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn log_batch(&mut self, snapshots: &[MetricsSnapshot]) -> Result<()> {
        for snapshot in snapshots {
            self.writer.serialize(snapshot)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricsCollector;

    #[test]
    fn writes_header_and_rows() {
        let path = std::env::temp_dir().join(format!("siegesim_logger_{}.csv", std::process::id()));
        let metrics = MetricsCollector::new();
        metrics.request_emitted(false);
        metrics.save_snapshot(1000.0);
        metrics.save_snapshot(2000.0);

        let mut logger = MetricsLogger::new(&path).unwrap();
        logger.log_batch(&metrics.get_snapshots()).unwrap();
        drop(logger);

        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert!(lines.next().unwrap().starts_with("timestamp,requests_emitted"));
        assert_eq!(lines.count(), 2);
        let _ = std::fs::remove_file(&path);
    }
}
