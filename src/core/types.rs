use anyhow::{anyhow, Result};
use chrono::Datelike;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::SourceError;
use crate::extract::Document;
use crate::irs::ReturnType;

pub const FIRST_PUBLIC_YEAR: u16 = 2018;
pub const FIRST_BATCHED_YEAR: u16 = 2024;

pub const OBJECT_ID_COLUMN: &str = "OBJECT_ID";
pub const RETURN_TYPE_COLUMN: &str = "RETURN_TYPE";
pub const BATCH_ID_COLUMN: &str = "XML_BATCH_ID";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Period(u16);

impl Period {
    pub fn new(year: u16) -> Result<Self> {
        if year < FIRST_PUBLIC_YEAR {
            return Err(anyhow!(
                "Year must be {} or later. IRS does not have data before {}.",
                FIRST_PUBLIC_YEAR,
                FIRST_PUBLIC_YEAR
            ));
        }
        let latest = chrono::Utc::now().year() + 1;
        if i32::from(year) > latest {
            return Err(anyhow!("Year {} is in the future (latest is {})", year, latest));
        }
        Ok(Period(year))
    }

    pub fn year(&self) -> u16 {
        self.0
    }

    pub fn uses_batch_index(&self) -> bool {
        self.0 >= FIRST_BATCHED_YEAR
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub object_id: String,
    pub return_type: ReturnType,
    pub batch_id: Option<String>,
    pub period: Period,
    pub columns: IndexMap<String, String>,
}

impl IndexRecord {
    pub fn from_columns(period: Period, columns: IndexMap<String, String>) -> Result<Self> {
        let object_id = columns
            .get(OBJECT_ID_COLUMN)
            .filter(|id| !id.is_empty())
            .cloned()
            .ok_or_else(|| anyhow!("Index row has no {}", OBJECT_ID_COLUMN))?;

        let return_type = columns
            .get(RETURN_TYPE_COLUMN)
            .ok_or_else(|| anyhow!("Index row {} has no {}", object_id, RETURN_TYPE_COLUMN))?
            .parse::<ReturnType>()
            .map_err(|e| anyhow!("Index row {}: {}", object_id, e))?;

        let batch_id = columns
            .get(BATCH_ID_COLUMN)
            .filter(|id| !id.is_empty())
            .cloned();

        Ok(Self {
            object_id,
            return_type,
            batch_id,
            period,
            columns,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub period: Period,
    pub columns: Vec<String>,
    pub records: Vec<IndexRecord>,
}

impl Manifest {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait::async_trait]
pub trait ManifestSource: Send + Sync {
    async fn fetch_manifest(
        &self,
        period: Period,
        return_type: &ReturnType,
    ) -> Result<Manifest, SourceError>;
}

#[async_trait::async_trait]
pub trait DocumentSource: Send + Sync {
    // Warm-up hook run once before extraction, e.g. to download archives.
    async fn prepare(&self, _manifest: &Manifest) -> Result<()> {
        Ok(())
    }

    async fn fetch_document(
        &self,
        object_id: &str,
        batch_id: Option<&str>,
        period: Period,
    ) -> Result<Document, SourceError>;
}
