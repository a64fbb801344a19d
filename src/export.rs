use crate::error::Result;
use crate::pipeline::normalize::match_key;
use crate::pipeline::{CategorizedLeads, RunReport};
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Writes the run's output views to timestamped JSON files, one file per
/// view plus the run report.
pub struct Exporter {
    output_dir: PathBuf,
}

impl Exporter {
    pub fn new<P: AsRef<Path>>(output_dir: P) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
        }
    }

    pub fn export(
        &self,
        categorized: &CategorizedLeads,
        report: &RunReport,
    ) -> Result<Vec<String>> {
        fs::create_dir_all(&self.output_dir)?;

        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let stem = format!(
            "{}_{}_{}",
            file_slug(&report.niche),
            file_slug(&report.city),
            timestamp
        );

        let mut written = Vec::new();
        written.push(self.write_json(&format!("{stem}_all_leads.json"), &categorized.all)?);
        written.push(self.write_json(&format!("{stem}_no_website.json"), &categorized.no_website)?);
        written.push(self.write_json(
            &format!("{stem}_has_website.json"),
            &categorized.has_website,
        )?);
        written.push(self.write_json(&format!("{stem}_high_priority.json"), &categorized.high)?);
        written.push(self.write_json(&format!("{stem}_summary.json"), report)?);

        info!("💾 Exported {} files to {}", written.len(), self.output_dir.display());
        Ok(written)
    }

    fn write_json<T: serde::Serialize>(&self, filename: &str, value: &T) -> Result<String> {
        let filepath = self.output_dir.join(filename);
        let json_content = serde_json::to_string_pretty(value)?;
        fs::write(&filepath, json_content)?;
        Ok(filepath.to_string_lossy().to_string())
    }
}

/// Lowercased ascii slug safe for filenames.
fn file_slug(value: &str) -> String {
    match_key(value).replace(' ', "_")
}
