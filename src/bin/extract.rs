use anyhow::{anyhow, Result};
use form990::core::config::load_variables;
use form990::extract::{extract_fields, extract_group, Document, GroupSpec, Namespace};
use std::path::PathBuf;
use structopt::StructOpt;

#[derive(StructOpt, Debug)]
#[structopt(name = "form990-extract", about = "Extract fields from one Form 990 XML file")]
struct Opt {
    /// XML return to read
    #[structopt(parse(from_os_str))]
    input: PathBuf,

    /// CSV file with a Variables column
    #[structopt(long, parse(from_os_str))]
    variables: PathBuf,

    /// Emit one record per element with this tag, e.g. RecipientTable
    #[structopt(long)]
    group: Option<String>,

    /// Identifier stored in the OBJECT_ID column of group records
    #[structopt(long)]
    key: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let opt = Opt::from_args();

    if !opt.input.exists() {
        eprintln!("Input file does not exist: {:?}", opt.input);
        std::process::exit(1);
    }

    let specifiers = load_variables(&opt.variables)?;
    let bytes = tokio::fs::read(&opt.input)
        .await
        .map_err(|e| anyhow!("Failed to read {:?}: {}", opt.input, e))?;
    let document = Document::from_bytes(&bytes)?;
    let namespace = Namespace::irs_efile();

    let output = match &opt.group {
        Some(tag) => {
            let key = match &opt.key {
                Some(key) => key.clone(),
                None => object_id_from_file_name(&opt.input),
            };
            let group = GroupSpec::new(tag.as_str(), specifiers);
            serde_json::to_string_pretty(&extract_group(&document, &group, &key, &namespace))?
        }
        None => serde_json::to_string_pretty(&extract_fields(&document, &specifiers, &namespace))?,
    };
    println!("{}", output);
    Ok(())
}

/// `202401234567890123_public.xml` -> `202401234567890123`
fn object_id_from_file_name(path: &std::path::Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    stem.strip_suffix("_public").unwrap_or(&stem).to_string()
}
