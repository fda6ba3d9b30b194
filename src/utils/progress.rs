use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

const TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg:>40}";
const DONE_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] [{bar:40.green/blue}] {pos}/{len} {msg:>40}";

#[derive(Clone)]
pub struct ProgressTracker {
    progress_bar: Option<ProgressBar>,
    label: String,
}

impl ProgressTracker {
    pub fn new(total: u64, label: &str) -> Self {
        let pb = ProgressBar::new(total);
        if let Ok(style) = ProgressStyle::default_bar().template(TEMPLATE) {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_message(label.to_string());
        Self {
            progress_bar: Some(pb),
            label: label.to_string(),
        }
    }

    pub fn hidden() -> Self {
        Self {
            progress_bar: None,
            label: String::new(),
        }
    }

    pub fn update_message(&self, message: &str) {
        if let Some(pb) = &self.progress_bar {
            pb.set_message(format!("{} - {}", self.label, message));
        }
    }

    pub fn increment(&self, delta: u64) {
        if let Some(pb) = &self.progress_bar {
            pb.inc(delta);
        }
    }

    pub fn finish(&self) {
        if let Some(pb) = &self.progress_bar {
            if let Ok(style) = ProgressStyle::default_bar().template(DONE_TEMPLATE) {
                pb.set_style(style.progress_chars("#>-"));
            }
            pb.finish_with_message(format!("Complete [{}]", self.label));
        }
    }
}
