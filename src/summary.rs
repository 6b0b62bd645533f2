//! End-of-run artifacts: `results.json` and `summary.txt`.

use crate::{format_percentage, Item, ResultRecord, ScraperError};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::info;

pub const RESULTS_FILE: &str = "results.json";
pub const SUMMARY_FILE: &str = "summary.txt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteCount {
    pub site: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub total: usize,
    pub succeeded: usize,
    /// Items without a record, in catalog order
    pub missing: Vec<String>,
    /// Downloads per site, most productive first
    pub sites: Vec<SiteCount>,
}

impl Summary {
    pub fn compute(items: &[Item], results: &BTreeMap<String, ResultRecord>) -> Self {
        let missing = items
            .iter()
            .filter(|item| !results.contains_key(&item.name))
            .map(|item| item.name.clone())
            .collect();

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for record in results.values() {
            *counts.entry(record.provider_id.as_str()).or_insert(0) += 1;
        }

        let mut sites: Vec<SiteCount> = counts
            .into_iter()
            .map(|(site, count)| SiteCount {
                site: site.to_string(),
                count,
            })
            .collect();
        sites.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.site.cmp(&b.site)));

        Self {
            total: items.len(),
            succeeded: results.len(),
            missing,
            sites,
        }
    }

    pub fn success_rate(&self) -> String {
        format_percentage(self.succeeded, self.total)
    }

    /// The `summary.txt` text.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Total asanas: {}\n", self.total));
        out.push_str(&format!("Successfully downloaded: {}\n", self.succeeded));
        out.push_str(&format!("Success rate: {}%\n\n", self.success_rate()));

        out.push_str("Missing asanas:\n");
        for name in &self.missing {
            out.push_str(&format!("- {name}\n"));
        }

        out.push_str("\nSources breakdown:\n");
        for site in &self.sites {
            out.push_str(&format!(
                "{}: {} images ({}%)\n",
                site.site,
                site.count,
                format_percentage(site.count, self.succeeded)
            ));
        }

        out
    }
}

/// Paths of the written artifacts.
#[derive(Debug, Clone)]
pub struct OutputFiles {
    pub results: PathBuf,
    pub summary: PathBuf,
}

/// Write `results.json` (pretty-printed) and `summary.txt` into `output_dir`.
pub async fn write_outputs(
    output_dir: &Path,
    results: &BTreeMap<String, ResultRecord>,
    summary: &Summary,
) -> Result<OutputFiles, ScraperError> {
    tokio::fs::create_dir_all(output_dir).await?;

    let results_path = output_dir.join(RESULTS_FILE);
    let json = serde_json::to_string_pretty(results)?;
    tokio::fs::write(&results_path, json).await?;
    info!("Results saved to {}", results_path.display());

    let summary_path = output_dir.join(SUMMARY_FILE);
    tokio::fs::write(&summary_path, summary.render()).await?;
    info!("Summary saved to {}", summary_path.display());

    Ok(OutputFiles {
        results: results_path,
        summary: summary_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(names: &[&str]) -> Vec<Item> {
        names
            .iter()
            .map(|name| Item {
                name: name.to_string(),
                category: "Test".to_string(),
            })
            .collect()
    }

    fn record(site: &str) -> ResultRecord {
        ResultRecord {
            url: format!("https://{site}/img.jpg"),
            source_page: format!("https://{site}/page"),
            local_path: PathBuf::from("yoga_images/img.jpg"),
            provider_id: site.to_string(),
        }
    }

    #[test]
    fn test_seven_items_five_successes() {
        let items = items(&["A", "B", "C", "D", "E", "F", "G"]);
        let mut results = BTreeMap::new();
        for (name, site) in [
            ("A", "pexels.com"),
            ("C", "google.com"),
            ("D", "pexels.com"),
            ("E", "yogajournal.com"),
            ("G", "pexels.com"),
        ] {
            results.insert(name.to_string(), record(site));
        }

        let summary = Summary::compute(&items, &results);
        assert_eq!(summary.success_rate(), "71.43");
        assert_eq!(summary.missing, vec!["B", "F"]);

        assert_eq!(
            summary.render(),
            "Total asanas: 7\n\
             Successfully downloaded: 5\n\
             Success rate: 71.43%\n\
             \n\
             Missing asanas:\n\
             - B\n\
             - F\n\
             \n\
             Sources breakdown:\n\
             pexels.com: 3 images (60.00%)\n\
             google.com: 1 images (20.00%)\n\
             yogajournal.com: 1 images (20.00%)\n"
        );
    }

    #[test]
    fn test_empty_run_renders_zero_rate() {
        let summary = Summary::compute(&[], &BTreeMap::new());
        assert_eq!(summary.success_rate(), "0.00");
        assert!(summary.render().starts_with("Total asanas: 0\n"));
    }

    #[tokio::test]
    async fn test_write_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let output_dir = dir.path().join("nested");
        let items = items(&["A", "B"]);
        let mut results = BTreeMap::new();
        results.insert("A".to_string(), record("healthline.com"));

        let summary = Summary::compute(&items, &results);
        let files = write_outputs(&output_dir, &results, &summary).await.unwrap();

        let written: BTreeMap<String, ResultRecord> =
            serde_json::from_str(&std::fs::read_to_string(&files.results).unwrap()).unwrap();
        assert_eq!(written, results);

        let text = std::fs::read_to_string(&files.summary).unwrap();
        assert!(text.contains("Success rate: 50.00%\n"));
        assert!(text.contains("- B\n"));
        assert!(text.contains("healthline.com: 1 images (100.00%)\n"));
    }
}
