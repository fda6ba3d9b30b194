use form990::core::config::FieldSchema;
use form990::core::types::{DocumentSource, IndexRecord, Manifest, ManifestSource, Period};
use form990::error::SourceError;
use form990::extract::{Document, FieldSpecifier, Namespace};
use form990::pipeline::{self, Mode, Request};
use form990::ReturnType;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const COLUMNS: [&str; 6] = [
    "RETURN_ID",
    "EIN",
    "TAXPAYER_NAME",
    "RETURN_TYPE",
    "OBJECT_ID",
    "XML_BATCH_ID",
];

const ACME: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<Return xmlns="http://www.irs.gov/efile" returnVersion="2023v4.0">
  <ReturnHeader>
    <Filer>
      <EIN>012345678</EIN>
      <BusinessName>
        <BusinessNameLine1Txt>Acme Trust</BusinessNameLine1Txt>
      </BusinessName>
    </Filer>
  </ReturnHeader>
  <ReturnData>
    <IRS990ScheduleC>
      <VolunteerHoursCnt>120</VolunteerHoursCnt>
    </IRS990ScheduleC>
  </ReturnData>
</Return>"#;

const HOPE: &str = r#"<Return xmlns="http://www.irs.gov/efile">
  <ReturnHeader>
    <Filer>
      <BusinessName>
        <BusinessNameLine1Txt>Hope Inc</BusinessNameLine1Txt>
      </BusinessName>
    </Filer>
  </ReturnHeader>
  <ReturnData>
    <IRS990ScheduleC>
      <VolunteerHoursCnt></VolunteerHoursCnt>
    </IRS990ScheduleC>
  </ReturnData>
</Return>"#;

const GRANTS: &str = r#"<Return xmlns="http://www.irs.gov/efile">
  <ReturnData>
    <IRS990ScheduleI>
      <RecipientTable>
        <RecipientBusinessName><BusinessNameLine1Txt>First Food Bank</BusinessNameLine1Txt></RecipientBusinessName>
        <CashGrantAmt>5000</CashGrantAmt>
      </RecipientTable>
      <RecipientTable>
        <RecipientBusinessName><BusinessNameLine1Txt>Second Shelter</BusinessNameLine1Txt></RecipientBusinessName>
        <CashGrantAmt>2500</CashGrantAmt>
      </RecipientTable>
      <RecipientTable>
        <RecipientBusinessName><BusinessNameLine1Txt>Third Clinic</BusinessNameLine1Txt></RecipientBusinessName>
      </RecipientTable>
    </IRS990ScheduleI>
  </ReturnData>
</Return>"#;

/// In-memory manifest and documents keyed by OBJECT_ID.
struct FakeSource {
    rows: Vec<[&'static str; 6]>,
    documents: HashMap<&'static str, &'static str>,
    manifest_available: bool,
}

impl FakeSource {
    fn new(rows: Vec<[&'static str; 6]>, documents: &[(&'static str, &'static str)]) -> Self {
        Self {
            rows,
            documents: documents.iter().cloned().collect(),
            manifest_available: true,
        }
    }
}

#[async_trait::async_trait]
impl ManifestSource for FakeSource {
    async fn fetch_manifest(
        &self,
        period: Period,
        return_type: &ReturnType,
    ) -> Result<Manifest, SourceError> {
        if !self.manifest_available {
            return Err(SourceError::ManifestUnavailable {
                period,
                reason: "index download failed".to_string(),
            });
        }

        let records = self
            .rows
            .iter()
            .map(|row| {
                let columns: IndexMap<String, String> = COLUMNS
                    .iter()
                    .zip(row.iter())
                    .map(|(c, v)| (c.to_string(), v.to_string()))
                    .collect();
                IndexRecord::from_columns(period, columns).unwrap()
            })
            .filter(|record| &record.return_type == return_type)
            .collect();

        Ok(Manifest {
            period,
            columns: COLUMNS.iter().map(|c| c.to_string()).collect(),
            records,
        })
    }
}

#[async_trait::async_trait]
impl DocumentSource for FakeSource {
    async fn fetch_document(
        &self,
        object_id: &str,
        _batch_id: Option<&str>,
        _period: Period,
    ) -> Result<Document, SourceError> {
        let xml = self
            .documents
            .get(object_id)
            .ok_or_else(|| SourceError::not_found(object_id, "not in any extracted batch"))?;
        Document::parse(xml).map_err(|e| SourceError::malformed(object_id, e))
    }
}

fn period() -> Period {
    Period::new(2024).unwrap()
}

fn specs(list: &[&str]) -> Vec<FieldSpecifier> {
    list.iter().map(|s| FieldSpecifier::from(*s)).collect()
}

fn request(mode: Mode, output: &Path) -> Request {
    Request {
        period: period(),
        return_type: ReturnType::Form990,
        mode,
        output: output.to_path_buf(),
        show_progress: false,
    }
}

fn read_rows(path: &Path) -> Vec<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .unwrap();
    reader
        .records()
        .map(|row| row.unwrap().iter().map(str::to_string).collect())
        .collect()
}

#[tokio::test]
async fn full_table_skips_missing_document() {
    let source = FakeSource::new(
        vec![
            ["R1", "012345678", "ACME TRUST", "990", "1001", "B1"],
            ["R2", "987654321", "GONE FOUNDATION", "990", "1002", "B1"],
        ],
        &[("1001", ACME)],
    );
    let schema = FieldSchema {
        all: specs(&["ReturnHeader/Filer/BusinessName/BusinessNameLine1Txt"]),
        ..FieldSchema::default()
    };

    let dir = tempdir().unwrap();
    let output = dir.path().join("result/2024/2024_csv_index.csv");
    let summary = pipeline::run(
        &source,
        &schema,
        &request(Mode::Full, &output),
        &Namespace::irs_efile(),
    )
    .await
    .unwrap();

    assert_eq!(summary.processed, 2);
    assert_eq!(summary.written, 1);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].object_id, "1002");

    let rows = read_rows(&output);
    assert_eq!(rows.len(), 2);
    assert_eq!(
        rows[0],
        vec![
            "RETURN_ID",
            "EIN",
            "TAXPAYER_NAME",
            "RETURN_TYPE",
            "OBJECT_ID",
            "XML_BATCH_ID",
            "ReturnHeader/Filer/BusinessName/BusinessNameLine1Txt",
        ]
    );
    assert_eq!(rows[1][4], "1001");
    assert_eq!(rows[1][6], "Acme Trust");
}

#[tokio::test]
async fn malformed_document_is_skipped_and_run_continues() {
    let source = FakeSource::new(
        vec![
            ["R1", "444444444", "BROKEN FUND", "990", "1005", "B1"],
            ["R2", "012345678", "ACME TRUST", "990", "1001", "B1"],
        ],
        &[("1005", "<Return><ReturnHeader></Return>"), ("1001", ACME)],
    );
    let schema = FieldSchema {
        all: specs(&["ReturnHeader/Filer/BusinessName/BusinessNameLine1Txt"]),
        ..FieldSchema::default()
    };

    let dir = tempdir().unwrap();
    let output = dir.path().join("2024_csv_index.csv");
    let summary = pipeline::run(
        &source,
        &schema,
        &request(Mode::Full, &output),
        &Namespace::irs_efile(),
    )
    .await
    .unwrap();

    assert_eq!(summary.processed, 2);
    assert_eq!(summary.written, 1);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].object_id, "1005");
    assert!(summary.failed[0].reason.contains("malformed"));

    let rows = read_rows(&output);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1][4], "1001");
    assert_eq!(rows[1][6], "Acme Trust");
}

#[tokio::test]
async fn recipient_table_has_one_row_per_group() {
    let source = FakeSource::new(
        vec![["R1", "111111111", "GIVING FUND", "990", "2001", "B1"]],
        &[("2001", GRANTS)],
    );
    let schema = FieldSchema {
        recipient: specs(&["RecipientBusinessName/BusinessNameLine1Txt", "CashGrantAmt"]),
        ..FieldSchema::default()
    };

    let dir = tempdir().unwrap();
    let output = dir.path().join("recipient_table_2024.csv");
    let summary = pipeline::run(
        &source,
        &schema,
        &request(Mode::Recipients, &output),
        &Namespace::irs_efile(),
    )
    .await
    .unwrap();
    assert_eq!(summary.written, 3);

    let rows = read_rows(&output);
    assert_eq!(
        rows[0],
        vec!["OBJECT_ID", "RecipientBusinessName/BusinessNameLine1Txt", "CashGrantAmt"]
    );
    assert_eq!(rows.len(), 4);
    assert!(rows[1..].iter().all(|row| row[0] == "2001"));
    assert_eq!(rows[3], vec!["2001", "Third Clinic", ""]);
}

#[tokio::test]
async fn schedule_table_keeps_only_populated_filings() {
    let source = FakeSource::new(
        vec![
            ["R1", "012345678", "ACME TRUST", "990", "1001", "B1"],
            ["R2", "222222222", "HOPE INC", "990", "1003", "B2"],
            ["R3", "333333333", "SMALL CLUB", "990EZ", "1004", "B2"],
        ],
        &[("1001", ACME), ("1003", HOPE)],
    );
    let mut schema = FieldSchema::default();
    schema.schedules.insert(
        "C".to_string(),
        specs(&[
            "ReturnData/IRS990ScheduleC/VolunteerHoursCnt",
            "ReturnData/IRS990ScheduleC/PoliticalExpendituresAmt",
        ]),
    );

    let dir = tempdir().unwrap();
    let output = dir.path().join("schedule_c_2024.csv");
    let summary = pipeline::run(
        &source,
        &schema,
        &request(Mode::Schedule("c".to_string()), &output),
        &Namespace::irs_efile(),
    )
    .await
    .unwrap();

    assert_eq!(summary.processed, 2);
    assert_eq!(summary.filtered, vec!["1003".to_string()]);
    let rows = read_rows(&output);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1][4], "1001");
    assert_eq!(rows[1][6], "120");
}

#[tokio::test]
async fn empty_manifest_still_writes_header() {
    let source = FakeSource::new(Vec::new(), &[]);
    let schema = FieldSchema {
        all: specs(&["ReturnHeader/ReturnTs"]),
        ..FieldSchema::default()
    };

    let dir = tempdir().unwrap();
    let output = dir.path().join("nested/out.csv");
    let summary = pipeline::run(
        &source,
        &schema,
        &request(Mode::Full, &output),
        &Namespace::irs_efile(),
    )
    .await
    .unwrap();

    assert_eq!(summary.written, 0);
    let content = fs::read_to_string(&output).unwrap();
    assert_eq!(
        content,
        "RETURN_ID,EIN,TAXPAYER_NAME,RETURN_TYPE,OBJECT_ID,XML_BATCH_ID,ReturnHeader/ReturnTs\n"
    );
}

#[tokio::test]
async fn manifest_failure_ends_the_run() {
    let mut source = FakeSource::new(Vec::new(), &[]);
    source.manifest_available = false;
    let schema = FieldSchema {
        all: specs(&["ReturnHeader/ReturnTs"]),
        ..FieldSchema::default()
    };

    let dir = tempdir().unwrap();
    let output = dir.path().join("out.csv");
    let err = pipeline::run(
        &source,
        &schema,
        &request(Mode::Full, &output),
        &Namespace::irs_efile(),
    )
    .await
    .unwrap_err();

    assert!(err.to_string().contains("unavailable"));
    assert!(!output.exists());
}

#[tokio::test]
async fn repeated_runs_are_byte_identical() {
    let source = FakeSource::new(
        vec![
            ["R1", "012345678", "ACME TRUST", "990", "1001", "B1"],
            ["R2", "222222222", "HOPE INC", "990", "1003", "B2"],
        ],
        &[("1001", ACME), ("1003", HOPE)],
    );
    let schema = FieldSchema {
        all: specs(&[
            "ReturnHeader/Filer/BusinessName/BusinessNameLine1Txt",
            "ReturnHeader/Filer/EIN",
        ]),
        ..FieldSchema::default()
    };

    let dir = tempdir().unwrap();
    let first = dir.path().join("first.csv");
    let second = dir.path().join("second.csv");
    let namespace = Namespace::irs_efile();
    pipeline::run(&source, &schema, &request(Mode::Full, &first), &namespace)
        .await
        .unwrap();
    pipeline::run(&source, &schema, &request(Mode::Full, &second), &namespace)
        .await
        .unwrap();

    assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
}
