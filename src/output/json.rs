use crate::model::ScanReport;
use anyhow::Result;

pub fn format_json(report: &ScanReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

pub fn print_json(report: &ScanReport) -> Result<()> {
    println!("{}", format_json(report)?);
    Ok(())
}
