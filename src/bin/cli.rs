use anyhow::Result;
use colored::*;
use form990::{
    core::config::{Config, FieldSchema},
    irs::batches::links_for_period,
    pipeline::{self, Mode, Request},
    IrsSource, Period, ReturnType,
};
use std::path::PathBuf;
use structopt::StructOpt;

#[derive(StructOpt, Debug)]
#[structopt(
    name = "form990-cli",
    about = "Build CSV tables from IRS Form 990 e-file XML returns"
)]
struct Opt {
    /// Processing year of the IRS index (2018 or later)
    #[structopt(long, default_value = "2024")]
    year: u16,

    /// Return type to keep from the index, e.g. 990, 990EZ, 990PF
    #[structopt(long, default_value = "990")]
    form: ReturnType,

    /// Build the Schedule I recipient table instead of the full table
    #[structopt(long)]
    recipient: bool,

    /// Build a table of filings that populate this schedule, e.g. C
    #[structopt(long, conflicts_with = "recipient")]
    schedule: Option<String>,

    /// Directory holding all_variables.csv and friends
    #[structopt(long, parse(from_os_str))]
    variables_dir: Option<PathBuf>,

    /// Cache directory for index files, archives and extracted XML
    #[structopt(long, parse(from_os_str))]
    data_dir: Option<PathBuf>,

    #[structopt(long, parse(from_os_str))]
    result_dir: Option<PathBuf>,

    /// Write the table here instead of the result directory
    #[structopt(long, parse(from_os_str))]
    output: Option<PathBuf>,

    /// Archives downloaded at the same time
    #[structopt(long)]
    concurrency: Option<usize>,

    #[structopt(long)]
    no_progress: bool,

    /// Print the archive links for the year from the IRS downloads page and exit
    #[structopt(long)]
    list_batches: bool,
}

impl Opt {
    fn mode(&self) -> Mode {
        match (&self.schedule, self.recipient) {
            (Some(letter), _) => Mode::Schedule(letter.clone()),
            (None, true) => Mode::Recipients,
            (None, false) => Mode::Full,
        }
    }

    fn apply(&self, config: &mut Config) {
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(dir) = &self.result_dir {
            config.result_dir = dir.clone();
        }
        if let Some(dir) = &self.variables_dir {
            config.variables_dir = dir.clone();
        }
        if let Some(limit) = self.concurrency {
            config.max_concurrent_downloads = limit.max(1);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let opt = Opt::from_args();

    let period = Period::new(opt.year)?;
    if let ReturnType::Other(name) = &opt.form {
        log::warn!(
            "Unrecognized return type {}, known types are {}",
            name,
            ReturnType::list_types()
        );
    }
    let mut config = Config::from_env()?;
    opt.apply(&mut config);

    let namespace = config.namespace.clone();
    let source = IrsSource::new(config)?;

    if opt.list_batches {
        let links = source.discover_batches().await?;
        let links = links_for_period(&links, period);
        if links.is_empty() {
            println!("{}", format!("No archives listed for {}", period).yellow());
        }
        for link in links {
            println!("{}", link);
        }
        return Ok(());
    }

    let schema = FieldSchema::load(&source.config().variables_dir)?;
    let mut request = Request::new(source.config(), period, opt.form.clone(), opt.mode())
        .with_progress(!opt.no_progress);
    if let Some(output) = &opt.output {
        request = request.with_output(output.clone());
    }

    match pipeline::run(&source, &schema, &request, &namespace).await {
        Ok(summary) => {
            println!(
                "{} {} rows written to {}",
                "✓".green(),
                summary.written.to_string().bold(),
                request.output.display()
            );
            if !summary.filtered.is_empty() {
                println!(
                    "  {}",
                    format!("{} filings without {} data", summary.filtered.len(), request.mode.label())
                        .dimmed()
                );
            }
            if !summary.failed.is_empty() {
                println!(
                    "  {}",
                    format!("{} filings could not be read", summary.failed.len()).yellow()
                );
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}
