use crate::model::{ScanResult, Severity};
use anyhow::Result;
use std::fmt::Write;
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
struct PackageRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Type")]
    purl_type: String,
    #[tabled(rename = "Location")]
    location: String,
    #[tabled(rename = "Layer")]
    layer: String,
}

#[derive(Tabled)]
struct VulnRow {
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Package")]
    package: String,
    #[tabled(rename = "Summary")]
    summary: String,
    #[tabled(rename = "Fixed In")]
    fixed_in: String,
    #[tabled(rename = "VEX")]
    vex: String,
}

#[derive(Tabled)]
struct FindingRow {
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Advisory")]
    advisory: String,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Target")]
    target: String,
}

#[derive(Tabled)]
struct PluginRow {
    #[tabled(rename = "Plugin")]
    name: String,
    #[tabled(rename = "Version")]
    version: u32,
    #[tabled(rename = "Reason")]
    reason: String,
}

pub fn print_cli_table(result: &ScanResult) -> Result<()> {
    print!("{}", render_table(result));
    Ok(())
}

/// Renders the human-readable report.
pub fn render_table(result: &ScanResult) -> String {
    let mut out = String::new();
    let inventory = &result.inventory;

    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Scan completed at: {} ({} ms)",
        result.end_time.format("%Y-%m-%d %H:%M:%S UTC"),
        (result.end_time - result.start_time).num_milliseconds()
    );
    let _ = writeln!(out);

    if inventory.packages.is_empty() {
        let _ = writeln!(out, "No packages found.");
    } else {
        let _ = writeln!(out, "Found {} packages:", inventory.packages.len());
        let _ = writeln!(out);

        let rows: Vec<PackageRow> = inventory
            .packages
            .iter()
            .map(|p| PackageRow {
                name: truncate(&p.name, 40),
                version: format_version(&p.version),
                purl_type: p.purl_type.clone(),
                location: truncate(&p.locations.join(", "), 50),
                layer: p
                    .layer_details
                    .as_ref()
                    .map(|l| format!("{} {}", l.index, truncate(&l.diff_id, 19)))
                    .unwrap_or_else(|| "-".to_string()),
            })
            .collect();

        let _ = writeln!(out, "{}", Table::new(rows).with(Style::rounded()));
    }

    if !inventory.package_vulns.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Found {} vulnerabilities:", inventory.package_vulns.len());
        let _ = writeln!(out);

        let mut vulns: Vec<_> = inventory.package_vulns.iter().collect();
        vulns.sort_by(|a, b| b.severity.cmp(&a.severity));

        let rows: Vec<VulnRow> = vulns
            .iter()
            .map(|v| VulnRow {
                severity: format_severity(&v.severity),
                id: v.id.clone(),
                package: format!("{}@{}", v.package_name, v.package_version),
                summary: truncate(&v.summary, 50),
                fixed_in: v.fixed_version.clone().unwrap_or_else(|| "-".to_string()),
                vex: if v.exploitability_signals.is_empty() {
                    "-".to_string()
                } else {
                    "not affected".to_string()
                },
            })
            .collect();

        let _ = writeln!(out, "{}", Table::new(rows).with(Style::rounded()));
    }

    if !inventory.generic_findings.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Found {} findings:", inventory.generic_findings.len());
        let _ = writeln!(out);

        let rows: Vec<FindingRow> = inventory
            .generic_findings
            .iter()
            .map(|f| FindingRow {
                severity: format_severity(&f.advisory.severity),
                advisory: format!("{}/{}", f.advisory.id.publisher, f.advisory.id.reference),
                title: truncate(&f.advisory.title, 50),
                target: truncate(&f.target.location, 40),
            })
            .collect();

        let _ = writeln!(out, "{}", Table::new(rows).with(Style::rounded()));
    }

    let failed: Vec<PluginRow> = result
        .failed_plugins()
        .map(|s| PluginRow {
            name: s.name.clone(),
            version: s.version,
            reason: truncate(&s.status.failure_reason, 60),
        })
        .collect();
    if !failed.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "{} plugins failed:", failed.len());
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", Table::new(failed).with(Style::rounded()));
    }

    let _ = writeln!(out);
    write_summary(&mut out, result);
    out
}

fn write_summary(out: &mut String, result: &ScanResult) {
    let count = |severity: Severity| {
        result
            .inventory
            .package_vulns
            .iter()
            .filter(|v| v.severity == severity)
            .count()
    };

    let _ = writeln!(out, "Summary:");
    let _ = writeln!(out, "  Total packages: {}", result.inventory.packages.len());
    if !result.inventory.package_vulns.is_empty() {
        let _ = writeln!(
            out,
            "  Vulnerabilities: {} critical, {} high, {} medium, {} low",
            count(Severity::Critical),
            count(Severity::High),
            count(Severity::Medium),
            count(Severity::Low)
        );
    }
    let _ = writeln!(
        out,
        "  Plugins: {} run, {} failed",
        result.plugin_status.len(),
        result.failed_plugins().count()
    );

    if result.status.is_success() {
        let _ = writeln!(out, "  Status: \x1b[32mSUCCEEDED\x1b[0m");
    } else {
        let _ = writeln!(out, "  Status: \x1b[31mFAILED\x1b[0m");
        for line in result.status.failure_reason.lines() {
            let _ = writeln!(out, "    {}", line);
        }
    }
}

fn format_severity(severity: &Severity) -> String {
    match severity {
        Severity::Critical => "\x1b[31mCRITICAL\x1b[0m".to_string(),
        Severity::High => "\x1b[91mHIGH\x1b[0m".to_string(),
        Severity::Medium => "\x1b[33mMEDIUM\x1b[0m".to_string(),
        Severity::Low => "\x1b[32mLOW\x1b[0m".to_string(),
        Severity::Unknown => "UNKNOWN".to_string(),
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{}...", kept)
    }
}

fn format_version(version: &str) -> String {
    if version.is_empty() {
        "-".to_string()
    } else {
        version.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::new_scan_result;
    use crate::error::ScanError;
    use crate::model::{Inventory, Package, PluginStatus, ScanStatus};
    use chrono::Utc;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a-very-long-package-name", 10), "a-very-...");
        assert_eq!(truncate("ünïcödé-name", 8), "ünïcö...");
    }

    #[test]
    fn test_render_lists_packages_and_failures() {
        let now = Utc::now();
        let result = new_scan_result(
            now,
            now,
            vec![PluginStatus {
                name: "vulns/osv".to_string(),
                version: 0,
                status: ScanStatus::failed("network unreachable"),
            }],
            Inventory {
                packages: vec![Package::new("lodash", "4.17.21", "npm").with_location("package-lock.json")],
                ..Default::default()
            },
            Some(&ScanError::plugin("vulns/osv", anyhow::anyhow!("network unreachable"))),
        );

        let text = render_table(&result);
        assert!(text.contains("Found 1 packages"));
        assert!(text.contains("lodash"));
        assert!(text.contains("1 plugins failed"));
        assert!(text.contains("FAILED"));
        assert!(text.contains("plugin vulns/osv failed: network unreachable"));
    }
}
