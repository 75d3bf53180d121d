use crate::model::{Breach, ScanReport};
use anyhow::Result;
use std::fmt::Write;
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
struct BreachRow {
    #[tabled(rename = "Registry")]
    registry: String,
    #[tabled(rename = "Package")]
    package: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Published")]
    published: String,
    #[tabled(rename = "Manifest")]
    manifest: String,
}

impl From<&Breach> for BreachRow {
    fn from(breach: &Breach) -> Self {
        Self {
            registry: breach.registry.to_string(),
            package: truncate(&breach.id, 50),
            version: truncate(&breach.version, 50),
            published: format!(
                "{} ({} days ago)",
                breach.published_at.format("%Y-%m-%d %H:%M UTC"),
                breach.days_ago
            ),
            manifest: breach.manifest_path.clone(),
        }
    }
}

/// Renders the breach table followed by the run summary.
pub fn format_text(report: &ScanReport) -> String {
    let summary = &report.summary;
    let mut out = String::new();

    if !report.breaches.is_empty() {
        let rows: Vec<BreachRow> = report.breaches.iter().map(BreachRow::from).collect();
        let table = Table::new(rows).with(Style::rounded()).to_string();
        let _ = writeln!(out, "{}", table);
        let _ = writeln!(out);
    }

    let _ = writeln!(
        out,
        "Checked a total of {} packages across {} manifest files.",
        summary.scanned_package_count + summary.skipped_package_count,
        summary.included_manifest_count
    );
    if summary.skipped_package_count > 0 {
        let _ = writeln!(
            out,
            " - {} packages were skipped because they are explicitly allowed.",
            summary.skipped_package_count
        );
    }
    if summary.breaching_package_count > 0 {
        let _ = writeln!(
            out,
            " - {} packages were published less than {} days ago.",
            summary.breaching_package_count, report.max_release_days_ago
        );
    } else {
        let _ = writeln!(
            out,
            "No packages were published less than {} days ago.",
            report.max_release_days_ago
        );
    }
    let _ = writeln!(
        out,
        "Scanned {} manifest files, skipped {} manifest files.",
        summary.included_manifest_count, summary.skipped_manifest_count
    );

    out
}

pub fn print_text(report: &ScanReport) -> Result<()> {
    print!("{}", format_text(report));
    Ok(())
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{}...", kept)
    }
}
