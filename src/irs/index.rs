use anyhow::{anyhow, Result};
use csv::ReaderBuilder;
use indexmap::IndexMap;
use reqwest::Client;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use url::Url;

use super::return_type::ReturnType;
use crate::core::config::Config;
use crate::core::types::{IndexRecord, Manifest, Period, OBJECT_ID_COLUMN, RETURN_TYPE_COLUMN};
use crate::utils::http::fetch_and_save;
use crate::utils::rate_limit::RateLimiter;

pub fn index_url(base_url: &Url, period: Period) -> Result<Url> {
    Ok(base_url.join(&format!("{}/index_{}.csv", period, period))?)
}

pub fn index_path(config: &Config, period: Period) -> PathBuf {
    config.index_dir().join(format!("index_{}.csv", period))
}

pub async fn ensure_index(
    client: &Client,
    config: &Config,
    rate_limiter: &RateLimiter,
    period: Period,
) -> Result<PathBuf> {
    let path = index_path(config, period);
    if path.exists() {
        log::info!("Using existing index CSV for year {}", period);
        return Ok(path);
    }

    let url = index_url(&config.base_url, period)?;
    log::info!("Downloading index CSV for year {}", period);
    let bytes = fetch_and_save(
        client,
        &url,
        &path,
        &config.user_agent,
        mime::TEXT_CSV,
        rate_limiter,
    )
    .await?;
    log::info!("Downloaded index CSV for year {} ({} bytes)", period, bytes);
    Ok(path)
}

pub fn load_manifest(path: &Path, period: Period, return_type: &ReturnType) -> Result<Manifest> {
    let file = File::open(path).map_err(|e| anyhow!("Failed to open index {:?}: {}", path, e))?;
    parse_manifest(file, period, return_type)
}

// Reads an index CSV, keeping rows whose `RETURN_TYPE` matches.
// Rows without an object id are logged and dropped; a file without the
// required columns is an error.
pub fn parse_manifest<R: Read>(
    reader: R,
    period: Period,
    return_type: &ReturnType,
) -> Result<Manifest> {
    let mut csv_reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let columns: Vec<String> = csv_reader.headers()?.iter().map(str::to_string).collect();
    for required in [OBJECT_ID_COLUMN, RETURN_TYPE_COLUMN] {
        if !columns.iter().any(|c| c == required) {
            return Err(anyhow!("index has no {} column", required));
        }
    }

    let mut records = Vec::new();
    let mut total = 0usize;
    for (line, row) in csv_reader.records().enumerate() {
        let row = row?;
        total += 1;

        let values: IndexMap<String, String> = columns
            .iter()
            .zip(row.iter())
            .map(|(column, value)| (column.clone(), value.to_string()))
            .collect();

        match IndexRecord::from_columns(period, values) {
            Ok(record) if &record.return_type == return_type => records.push(record),
            Ok(_) => {}
            Err(e) => log::warn!("Skipping index row {}: {}", line + 2, e),
        }
    }

    log::info!(
        "Index {}: {} of {} rows have return type {}",
        period,
        records.len(),
        total,
        return_type
    );

    Ok(Manifest {
        period,
        columns,
        records,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX: &str = "\
RETURN_ID,FILING_TYPE,EIN,TAX_PERIOD,SUB_DATE,TAXPAYER_NAME,RETURN_TYPE,DLN,OBJECT_ID,XML_BATCH_ID
19000001,EFILE,012345678,202312,2024-05-13,ACME TRUST,990,93493133000014,202401234567890123,2024_TEOS_XML_01A
19000002,EFILE,987654321,202312,2024-05-14,SMALL CLUB,990EZ,93493133000015,202401234567890124,2024_TEOS_XML_01A
19000003,EFILE,111111111,202306,2024-05-15,\"HOPE, INC\",990,93493133000016,202401234567890125,2024_TEOS_XML_02A
19000004,EFILE,222222222,202306,2024-05-15,NO ID,990,93493133000017,,2024_TEOS_XML_02A
";

    #[test]
    fn keeps_matching_return_type_in_order() {
        let period = Period::new(2024).unwrap();
        let manifest = parse_manifest(INDEX.as_bytes(), period, &ReturnType::Form990).unwrap();

        assert_eq!(manifest.columns.len(), 10);
        let ids: Vec<&str> = manifest.records.iter().map(|r| r.object_id.as_str()).collect();
        assert_eq!(ids, vec!["202401234567890123", "202401234567890125"]);

        let second = &manifest.records[1];
        assert_eq!(second.columns["TAXPAYER_NAME"], "HOPE, INC");
        // Leading zeros survive; nothing is parsed as a number.
        assert_eq!(manifest.records[0].columns["EIN"], "012345678");
        assert_eq!(second.batch_id.as_deref(), Some("2024_TEOS_XML_02A"));
    }

    #[test]
    fn missing_required_column_is_an_error() {
        let period = Period::new(2022).unwrap();
        let err = parse_manifest("RETURN_ID,RETURN_TYPE\n1,990\n".as_bytes(), period, &ReturnType::Form990)
            .unwrap_err();
        assert!(err.to_string().contains("OBJECT_ID"));
    }

    #[test]
    fn index_location() {
        let config = Config::new(Path::new("data"), "https://example.com/xml").unwrap();
        let period = Period::new(2024).unwrap();
        assert_eq!(
            index_url(&config.base_url, period).unwrap().as_str(),
            "https://example.com/xml/2024/index_2024.csv"
        );
        assert_eq!(
            index_path(&config, period),
            Path::new("data/index_file/index_2024.csv")
        );
    }
}
