use anyhow::{anyhow, Result};
use indexmap::IndexMap;
use serde::Deserialize;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use url::Url;

use super::types::Period;
use crate::extract::{FieldSpecifier, Namespace};

pub const DEFAULT_BASE_URL: &str = "https://apps.irs.gov/pub/epostcard/990/xml/";
pub const DEFAULT_DOWNLOADS_PAGE: &str =
    "https://www.irs.gov/charities-non-profits/form-990-series-downloads";
pub const DEFAULT_USER_AGENT: &str = "software@example.com";
pub const DEFAULT_MAX_CONCURRENT_DOWNLOADS: usize = 4;

pub const ALL_VARIABLES_FILE: &str = "all_variables.csv";
pub const RECIPIENT_VARIABLES_FILE: &str = "recipient_variables.csv";
pub const VARIABLES_COLUMN: &str = "Variables";

#[derive(Clone, Debug)]
pub struct Config {
    pub data_dir: PathBuf,
    pub result_dir: PathBuf,
    pub variables_dir: PathBuf,
    pub base_url: Url,
    pub downloads_page: Url,
    pub user_agent: String,
    pub max_concurrent_downloads: usize,
    pub namespace: Namespace,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let data_dir = PathBuf::from(
            std::env::var("FORM990_DATA_DIR").unwrap_or_else(|_| "data".to_string()),
        );
        let result_dir = PathBuf::from(
            std::env::var("FORM990_RESULT_DIR").unwrap_or_else(|_| "result".to_string()),
        );
        let variables_dir = PathBuf::from(
            std::env::var("FORM990_VARIABLES_DIR").unwrap_or_else(|_| "variables".to_string()),
        );

        let base_url = std::env::var("FORM990_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let base_url = parse_base_url(&base_url)?;

        let downloads_page = std::env::var("FORM990_DOWNLOADS_PAGE")
            .unwrap_or_else(|_| DEFAULT_DOWNLOADS_PAGE.to_string());
        let downloads_page = Url::parse(&downloads_page)
            .map_err(|e| anyhow!("FORM990_DOWNLOADS_PAGE is not a valid URL: {}", e))?;

        let user_agent =
            std::env::var("USER_AGENT").unwrap_or_else(|_| DEFAULT_USER_AGENT.to_string());

        let max_concurrent_downloads = match std::env::var("FORM990_MAX_CONCURRENT_DOWNLOADS") {
            Ok(value) => value.parse::<usize>().map_err(|e| {
                anyhow!("FORM990_MAX_CONCURRENT_DOWNLOADS must be a number: {}", e)
            })?,
            Err(_) => DEFAULT_MAX_CONCURRENT_DOWNLOADS,
        };

        Ok(Self {
            data_dir,
            result_dir,
            variables_dir,
            base_url,
            downloads_page,
            user_agent,
            max_concurrent_downloads: max_concurrent_downloads.max(1),
            namespace: Namespace::irs_efile(),
        })
    }

    pub fn index_dir(&self) -> PathBuf {
        self.data_dir.join("index_file")
    }

    pub fn xml_dir(&self, period: Period) -> PathBuf {
        self.data_dir.join("xml_files").join(period.to_string())
    }

    pub fn result_path(&self, period: Period, file_name: &str) -> PathBuf {
        self.result_dir.join(period.to_string()).join(file_name)
    }

    pub fn new(data_dir: &Path, base_url: &str) -> Result<Self> {
        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            result_dir: data_dir.join("result"),
            variables_dir: PathBuf::from("variables"),
            base_url: parse_base_url(base_url)?,
            downloads_page: Url::parse(DEFAULT_DOWNLOADS_PAGE)?,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_concurrent_downloads: DEFAULT_MAX_CONCURRENT_DOWNLOADS,
            namespace: Namespace::irs_efile(),
        })
    }
}

pub fn parse_base_url(raw: &str) -> Result<Url> {
    let with_slash = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{}/", raw)
    };
    Url::parse(&with_slash).map_err(|e| anyhow!("Invalid base URL {}: {}", raw, e))
}

#[derive(Debug, Deserialize)]
struct VariableRow {
    #[serde(rename = "Variables")]
    variable: String,
}

#[derive(Debug, Clone, Default)]
pub struct FieldSchema {
    pub all: Vec<FieldSpecifier>,
    pub recipient: Vec<FieldSpecifier>,
    pub schedules: IndexMap<String, Vec<FieldSpecifier>>,
}

impl FieldSchema {
    pub fn load(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(anyhow!("Variables directory {:?} does not exist", dir));
        }

        let all = load_optional(&dir.join(ALL_VARIABLES_FILE))?;
        let recipient = load_optional(&dir.join(RECIPIENT_VARIABLES_FILE))?;

        let mut entries: Vec<_> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .collect();
        entries.sort();

        let mut schedules = IndexMap::new();
        for path in entries {
            let Some(letter) = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(schedule_letter)
            else {
                continue;
            };
            schedules.insert(letter, load_variables(&path)?);
        }

        log::debug!(
            "Loaded field schema from {:?}: {} fields, {} recipient fields, schedules [{}]",
            dir,
            all.len(),
            recipient.len(),
            schedules.keys().cloned().collect::<Vec<_>>().join(", ")
        );

        Ok(Self {
            all,
            recipient,
            schedules,
        })
    }

    pub fn schedule(&self, letter: &str) -> Option<&[FieldSpecifier]> {
        self.schedules
            .get(&letter.trim().to_uppercase())
            .map(Vec::as_slice)
    }
}

fn schedule_letter(file_name: &str) -> Option<String> {
    let letter = file_name
        .strip_prefix("schedule_")?
        .strip_suffix("_variables.csv")?;
    if letter.is_empty() {
        None
    } else {
        Some(letter.to_uppercase())
    }
}

fn load_optional(path: &Path) -> Result<Vec<FieldSpecifier>> {
    if path.exists() {
        load_variables(path)
    } else {
        log::debug!("No variables file at {:?}", path);
        Ok(Vec::new())
    }
}

pub fn load_variables(path: &Path) -> Result<Vec<FieldSpecifier>> {
    let file = fs::File::open(path)
        .map_err(|e| anyhow!("Failed to open variables file {:?}: {}", path, e))?;
    parse_variables(file).map_err(|e| anyhow!("Failed to read variables file {:?}: {}", path, e))
}

pub fn parse_variables<R: Read>(reader: R) -> Result<Vec<FieldSpecifier>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    if !headers.iter().any(|h| h == VARIABLES_COLUMN) {
        return Err(anyhow!("missing '{}' column", VARIABLES_COLUMN));
    }

    let mut specifiers = Vec::new();
    for row in csv_reader.deserialize::<VariableRow>() {
        let row = row?;
        if !row.variable.is_empty() {
            specifiers.push(FieldSpecifier::new(row.variable));
        }
    }
    Ok(specifiers)
}
