use anyhow::{anyhow, Result};
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use std::collections::BTreeMap;
use url::Url;

use crate::core::types::Period;
use crate::utils::http::fetch_text;
use crate::utils::rate_limit::RateLimiter;

static LEGACY_BATCHES: Lazy<BTreeMap<u16, Vec<&'static str>>> = Lazy::new(|| {
    BTreeMap::from([
        (
            2023,
            vec![
                "2023_TEOS_XML_01A",
                "2023_TEOS_XML_02A",
                "2023_TEOS_XML_03A",
                "2023_TEOS_XML_04A",
                "2023_TEOS_XML_05A",
                "2023_TEOS_XML_05B",
                "2023_TEOS_XML_06A",
                "2023_TEOS_XML_07A",
                "2023_TEOS_XML_08A",
                "2023_TEOS_XML_09A",
                "2023_TEOS_XML_10A",
                "2023_TEOS_XML_11A",
                "2023_TEOS_XML_11B",
                "2023_TEOS_XML_11C",
                "2023_TEOS_XML_12A",
            ],
        ),
        (
            2022,
            vec![
                "2022_TEOS_XML_01A",
                "2022_TEOS_XML_01B",
                "2022_TEOS_XML_01C",
                "2022_TEOS_XML_01D",
                "2022_TEOS_XML_01E",
                "2022_TEOS_XML_01F",
                "2022_TEOS_XML_11A",
                "2022_TEOS_XML_11B",
                "2022_TEOS_XML_11C",
            ],
        ),
        (
            2021,
            vec![
                "2021_TEOS_XML_01A",
                "2021_TEOS_XML_01B",
                "2021_TEOS_XML_01C",
                "2021_TEOS_XML_01D",
                "2021_TEOS_XML_01E",
                "2021_TEOS_XML_01F",
                "2021_TEOS_XML_01G",
                "2021_TEOS_XML_01H",
            ],
        ),
        (
            2020,
            vec![
                "2020_TEOS_XML_CT1",
                "download990xml_2020_1",
                "download990xml_2020_2",
                "download990xml_2020_3",
                "download990xml_2020_4",
                "download990xml_2020_5",
                "download990xml_2020_6",
                "download990xml_2020_7",
                "download990xml_2020_8",
            ],
        ),
        (
            2019,
            vec![
                "2019_TEOS_XML_CT1",
                "download990xml_2019_1",
                "download990xml_2019_2",
                "download990xml_2019_3",
                "download990xml_2019_4",
                "download990xml_2019_5",
                "download990xml_2019_6",
                "download990xml_2019_7",
                "download990xml_2019_8",
            ],
        ),
        (
            2018,
            vec![
                "2018_TEOS_XML_CT1",
                "2018_TEOS_XML_CT2",
                "2018_TEOS_XML_CT3",
                "download990xml_2018_1",
                "download990xml_2018_2",
                "download990xml_2018_3",
                "download990xml_2018_4",
                "download990xml_2018_5",
                "download990xml_2018_6",
                "download990xml_2018_7",
            ],
        ),
    ])
});

static YEAR_IN_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)/(?P<year>\d{4})/[^/]+\.zip$").expect("year pattern is valid"));

pub fn batch_url(base_url: &Url, period: Period, batch_id: &str) -> Result<Url> {
    Ok(base_url.join(&format!("{}/{}.zip", period, batch_id))?)
}

pub fn legacy_batch_urls(base_url: &Url, period: Period) -> Result<Option<Vec<Url>>> {
    let Some(batches) = LEGACY_BATCHES.get(&period.year()) else {
        return Ok(None);
    };
    let urls = batches
        .iter()
        .map(|batch| batch_url(base_url, period, batch))
        .collect::<Result<Vec<_>>>()?;
    Ok(Some(urls))
}

pub fn parse_batch_links(html: &str, page_url: &Url) -> Result<Vec<Url>> {
    let document = Html::parse_document(html);
    let selector =
        Selector::parse("a[href]").map_err(|e| anyhow!("Invalid link selector: {:?}", e))?;

    let links = document
        .select(&selector)
        .filter_map(|anchor| anchor.value().attr("href"))
        .map(str::trim)
        .filter(|href| href.to_ascii_lowercase().ends_with(".zip"))
        .filter_map(|href| match page_url.join(href) {
            Ok(url) => Some(url),
            Err(e) => {
                log::debug!("Ignoring unparseable link {}: {}", href, e);
                None
            }
        })
        .unique()
        .collect();
    Ok(links)
}

pub fn links_for_period(links: &[Url], period: Period) -> Vec<Url> {
    let year = period.to_string();
    links
        .iter()
        .filter(|url| {
            YEAR_IN_PATH
                .captures(url.path())
                .map_or(false, |caps| &caps["year"] == year)
        })
        .cloned()
        .collect()
}

pub async fn discover_batches(
    client: &Client,
    page_url: &Url,
    user_agent: &str,
    rate_limiter: &RateLimiter,
) -> Result<Vec<Url>> {
    let html = fetch_text(client, page_url, user_agent, rate_limiter).await?;
    let links = parse_batch_links(&html, page_url)?;
    log::info!("Found {} archive links on {}", links.len(), page_url);
    Ok(links)
}
