use anyhow::{anyhow, Result};
use csv::WriterBuilder;
use indexmap::IndexSet;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use super::record::Record;
use crate::utils::dirs::ensure_parent_dir;

#[derive(Debug, Clone)]
pub struct Table {
    records: Vec<Record>,
    schema: Vec<String>,
    qualifier: String,
    delimiter: u8,
}

impl Table {
    pub fn new(qualifier: &str) -> Self {
        Self {
            records: Vec::new(),
            schema: Vec::new(),
            qualifier: qualifier.to_string(),
            delimiter: b',',
        }
    }

    pub fn with_schema(mut self, columns: Vec<String>) -> Self {
        self.schema = columns;
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn columns(&self) -> Vec<String> {
        if self.records.is_empty() {
            return self.schema.clone();
        }

        let mut columns = IndexSet::new();
        for record in &self.records {
            for key in record.keys() {
                if !columns.contains(key) {
                    columns.insert(key.clone());
                }
            }
        }
        columns.into_iter().collect()
    }

    pub fn header(&self) -> Vec<String> {
        self.columns()
            .iter()
            .map(|column| strip_qualifier(column, &self.qualifier))
            .collect()
    }

    pub fn write_to<W: Write>(&self, writer: W) -> Result<()> {
        let columns = self.columns();
        let mut writer = WriterBuilder::new()
            .has_headers(false)
            .delimiter(self.delimiter)
            .from_writer(writer);

        if !columns.is_empty() {
            writer.write_record(self.header())?;
        }

        for record in &self.records {
            writer.write_record(columns.iter().map(|column| {
                record
                    .get(column)
                    .and_then(|value| value.as_deref())
                    .unwrap_or("")
            }))?;
        }

        writer.flush()?;
        Ok(())
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        ensure_parent_dir(path)?;
        let file = File::create(path)
            .map_err(|e| anyhow!("Failed to create output file {:?}: {}", path, e))?;
        self.write_to(file)?;
        log::debug!("Wrote {} rows to {:?}", self.records.len(), path);
        Ok(())
    }
}

pub fn strip_qualifier(column: &str, qualifier: &str) -> String {
    if qualifier.is_empty() {
        column.to_string()
    } else {
        column.replace(qualifier, "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(pairs: &[(&str, Option<&str>)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.map(str::to_string)))
            .collect()
    }

    fn render(table: &Table) -> String {
        let mut out = Vec::new();
        table.write_to(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn columns_are_first_seen_union() {
        let mut table = Table::new("irs:");
        table.push(record(&[("OBJECT_ID", Some("1")), ("A", Some("x"))]));
        table.push(record(&[("OBJECT_ID", Some("2")), ("B", Some("y,z")), ("A", None)]));

        assert_eq!(table.columns(), vec!["OBJECT_ID", "A", "B"]);
        assert_eq!(render(&table), "OBJECT_ID,A,B\n1,x,\n2,,\"y,z\"\n");
    }

    #[test]
    fn strips_namespace_qualifier_from_header() {
        let mut table = Table::new("irs:");
        table.push(record(&[("irs:ReturnHeader/irs:ReturnTs", Some("t"))]));
        assert_eq!(table.header(), vec!["ReturnHeader/ReturnTs"]);
    }

    #[test]
    fn empty_table_writes_schema_header() {
        let table = Table::new("irs:").with_schema(vec!["OBJECT_ID".into(), "irs:A".into()]);
        assert_eq!(render(&table), "OBJECT_ID,A\n");
    }

    #[test]
    fn output_is_deterministic() {
        let mut table = Table::new("irs:").with_delimiter(b'\t');
        for i in 0..5 {
            table.push(record(&[("K", Some(i.to_string().as_str())), ("V", Some("v"))]));
        }
        assert_eq!(render(&table), render(&table));
        assert!(render(&table).starts_with("K\tV\n0\tv\n"));
    }

    #[test]
    fn write_creates_missing_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("result").join("2024").join("out.csv");

        let mut table = Table::new("irs:");
        table.push(record(&[("A", Some("1"))]));
        table.write(&path).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "A\n1\n");
    }
}
