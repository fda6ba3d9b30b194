use anyhow::{anyhow, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use zip::ZipArchive;

use crate::utils::dirs::ensure_dir;

pub const MAX_MEMBER_SIZE: u64 = 200_000_000;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ExtractSummary {
    pub extracted: usize,
    pub skipped: usize,
    pub duplicates: Vec<String>,
}

// Unpacks every file member of `zip_path` directly into `dest`.
// Member paths are flattened to their file names, so filings land at
// `dest/{OBJECT_ID}_public.xml` whatever folder the archive nests them in.
pub fn extract_archive(zip_path: &Path, dest: &Path) -> Result<ExtractSummary> {
    let file = File::open(zip_path)
        .map_err(|e| anyhow!("Failed to open archive {:?}: {}", zip_path, e))?;
    let mut archive = ZipArchive::new(BufReader::new(file))
        .map_err(|e| anyhow!("Failed to read archive {:?}: {}", zip_path, e))?;

    ensure_dir(dest)?;
    let mut summary = ExtractSummary::default();

    for i in 0..archive.len() {
        let mut member = archive.by_index(i)?;
        if member.is_dir() {
            continue;
        }

        let name = member.name().to_string();
        if member.size() > MAX_MEMBER_SIZE {
            log::warn!(
                "Skipping {} in {:?}: {} bytes exceeds the member size limit",
                name,
                zip_path,
                member.size()
            );
            summary.skipped += 1;
            continue;
        }

        let Some(file_name) = member
            .enclosed_name()
            .and_then(|path| path.file_name().map(PathBuf::from))
        else {
            log::warn!("Skipping unsafe member path {} in {:?}", name, zip_path);
            summary.skipped += 1;
            continue;
        };

        let target = dest.join(file_name);
        let duplicate = target.exists();

        let mut out = File::create(&target)
            .map_err(|e| anyhow!("Failed to create {:?}: {}", target, e))?;
        if copy_bounded(&mut member, &mut out, MAX_MEMBER_SIZE)?.is_none() {
            // Declared size was below the limit but the stream was not.
            drop(out);
            fs::remove_file(&target)?;
            log::warn!(
                "Skipping {} in {:?}: content exceeds the member size limit",
                name,
                zip_path
            );
            summary.skipped += 1;
            continue;
        }

        if duplicate {
            log::warn!("Duplicate file {} in {:?}", name, zip_path);
            summary.duplicates.push(name);
        }
        summary.extracted += 1;
    }

    log::info!(
        "Extracted {} files from {:?} ({} duplicates, {} skipped)",
        summary.extracted,
        zip_path,
        summary.duplicates.len(),
        summary.skipped
    );
    Ok(summary)
}

// Copies at most `limit` bytes. `None` when the reader had more.
fn copy_bounded<R: Read, W: Write>(reader: R, writer: &mut W, limit: u64) -> Result<Option<u64>> {
    let mut bounded = reader.take(limit + 1);
    let copied = io::copy(&mut bounded, writer)?;
    if copied > limit {
        Ok(None)
    } else {
        Ok(Some(copied))
    }
}

pub fn log_duplicates(log_path: &Path, zip_path: &Path, duplicates: &[String]) -> Result<()> {
    if duplicates.is_empty() {
        return Ok(());
    }
    let mut log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .map_err(|e| anyhow!("Failed to open duplicate log {:?}: {}", log_path, e))?;
    for name in duplicates {
        writeln!(log, "Duplicate file: {}", name)?;
        writeln!(log, "Zip file: {}", zip_path.display())?;
    }
    Ok(())
}

// Extracts `archives` into a staging folder and renames it to `dest` once
// every archive succeeded. `dest` therefore only ever exists complete.
pub fn install_archives(archives: &[PathBuf], dest: &Path, duplicate_log: &Path) -> Result<ExtractSummary> {
    let staging = staging_dir(dest);
    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }

    let mut total = ExtractSummary::default();
    for zip_path in archives {
        let summary = match extract_archive(zip_path, &staging) {
            Ok(summary) => summary,
            Err(e) => {
                let _ = fs::remove_dir_all(&staging);
                return Err(e);
            }
        };
        log_duplicates(duplicate_log, zip_path, &summary.duplicates)?;
        total.extracted += summary.extracted;
        total.skipped += summary.skipped;
        total.duplicates.extend(summary.duplicates);
    }

    ensure_dir(&staging)?;
    fs::rename(&staging, dest)
        .map_err(|e| anyhow!("Failed to move {:?} to {:?}: {}", staging, dest, e))?;
    Ok(total)
}

fn staging_dir(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    dest.with_file_name(name)
}
