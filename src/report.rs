// CSV reporting for structure-search results

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

/// Single-writer CSV report of candidate outcomes, one row per completed
/// synthesis task: `uid,seconds,"structure",1,success`.
pub struct SearchReport {
    file: File,
}

impl SearchReport {
    pub fn create(path: &Path) -> io::Result<SearchReport> {
        Ok(SearchReport {
            file: File::create(path)?,
        })
    }

    /// Append one row and flush, so partially completed searches stay
    /// observable on disk.
    pub fn record(
        &mut self,
        uid: usize,
        seconds: f64,
        structure: &str,
        success: bool,
    ) -> io::Result<()> {
        writeln!(self.file, "{uid},{seconds},\"{structure}\",1,{success}")?;
        self.file.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_rows_are_flushed_csv() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("search.csv");

        let mut report = SearchReport::create(&path).expect("create report");
        report
            .record(0, 1.5, "(Set(OpaqueInt))", false)
            .expect("record");
        report
            .record(1, 0.25, "(Map(OpaqueInt, OrBool))", true)
            .expect("record");

        let contents = std::fs::read_to_string(&path).expect("read report");
        let rows: Vec<&str> = contents.lines().collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], "0,1.5,\"(Set(OpaqueInt))\",1,false");
        assert_eq!(rows[1], "1,0.25,\"(Map(OpaqueInt, OrBool))\",1,true");
    }
}
