//! Console and markdown text for the grouped reports.
//!
//! Everything writes to an `io::Write` as it goes, so output produced before a fatal error
//! stays on the terminal.

use std::io::{self, Write};

use crate::config::BuildDefinition;
use crate::providers::azure::types::{Build, BuildArtifact, BuildLog, Timeline};
use crate::providers::azure::url_utils::uri_display_name;
use crate::reports::{
    BuildReport, BuildResultSummary, HelixLogRow, HelixUriListing, JobReport, ReportContext,
    TestReport,
};

const INDENT: &str = "  ";

fn indent(level: usize) -> String {
    INDENT.repeat(level)
}

/// Keeps markdown renderers from turning `@name` into a mention.
pub fn escape_at_sign(text: &str) -> String {
    text.replace('@', "@<!-- -->")
}

/// Text for a markdown table cell: pipes would otherwise split the cell.
pub fn escape_table_cell(text: &str) -> String {
    escape_at_sign(&text.replace('|', "\\|"))
}

pub fn write_build_result_summary(out: &mut impl Write, summary: &BuildResultSummary) -> io::Result<()> {
    writeln!(
        out,
        "{:<20}{:>5.1}%  {}",
        summary.name, summary.success_rate, summary.outcomes
    )
}

pub fn write_definitions(
    out: &mut impl Write,
    definitions: &[BuildDefinition],
    ctx: &ReportContext,
) -> io::Result<()> {
    for definition in definitions {
        writeln!(
            out,
            "{:<20}{}",
            definition.name,
            ctx.build_definition_uri(definition.id)
        )?;
    }
    Ok(())
}

pub fn write_builds(out: &mut impl Write, builds: &[Build], ctx: &ReportContext) -> io::Result<()> {
    for build in builds {
        writeln!(
            out,
            "{}\t{}\t{}",
            build.id,
            build.result_label(),
            ctx.build_uri(build.id)
        )?;
    }
    Ok(())
}

pub fn write_build_logs(out: &mut impl Write, logs: &[BuildLog]) -> io::Result<()> {
    for log in logs {
        let lines = log.line_count.map(|n| n.to_string()).unwrap_or_default();
        writeln!(
            out,
            "{}\t{}\t{lines}",
            log.id,
            log.log_type.as_deref().unwrap_or_default()
        )?;
    }
    Ok(())
}

/// Records nested under their parents, in server order within each level.
pub fn write_timeline(out: &mut impl Write, timeline: &Timeline) -> io::Result<()> {
    write_timeline_level(out, timeline, None, 0)
}

fn write_timeline_level(
    out: &mut impl Write,
    timeline: &Timeline,
    parent_id: Option<&str>,
    level: usize,
) -> io::Result<()> {
    for record in timeline
        .records
        .iter()
        .filter(|r| r.parent_id.as_deref() == parent_id)
    {
        write!(
            out,
            "{}{} {}",
            indent(level),
            record.record_type.as_deref().unwrap_or("Record"),
            record.name
        )?;
        if let Some(result) = &record.result {
            write!(out, " [{result}]")?;
        }
        if let Some(log) = &record.log {
            write!(out, " log {}", log.id)?;
        }
        writeln!(out)?;
        write_timeline_level(out, timeline, Some(&record.id), level + 1)?;
    }
    Ok(())
}

pub fn write_artifacts(out: &mut impl Write, artifacts: &[BuildArtifact]) -> io::Result<()> {
    for artifact in artifacts {
        let resource = artifact.resource.as_ref();
        writeln!(
            out,
            "{}\t{}\t{}",
            artifact.name,
            resource
                .and_then(|r| r.resource_type.as_deref())
                .unwrap_or_default(),
            resource
                .and_then(|r| r.download_url.as_deref())
                .unwrap_or_default()
        )?;
    }
    Ok(())
}

pub fn write_helix_uris(
    out: &mut impl Write,
    listing: &HelixUriListing,
    console_texts: &[String],
) -> io::Result<()> {
    writeln!(out, "Console Logs")?;
    for (i, uri) in listing.console_uris.iter().enumerate() {
        writeln!(out, "{uri}")?;
        if let Some(text) = console_texts.get(i) {
            writeln!(out, "{text}")?;
        }
    }
    writeln!(out)?;

    write_uri_section(out, "Test Results", &listing.test_results_uris)?;
    writeln!(out)?;
    write_uri_section(out, "Core Logs", &listing.core_dump_uris)
}

/// Omits the header entirely when there are no URIs.
fn write_uri_section(out: &mut impl Write, header: &str, uris: &[String]) -> io::Result<()> {
    if uris.is_empty() {
        return Ok(());
    }
    writeln!(out, "{header}")?;
    for uri in uris {
        writeln!(out, "{uri}")?;
    }
    Ok(())
}

pub fn write_build_report(out: &mut impl Write, report: &BuildReport) -> io::Result<()> {
    writeln!(out, "{} {}", report.build.build_id, report.build.build_uri)?;
    for run in &report.runs {
        writeln!(out, "{}{}", indent(1), run.run_name)?;
        for test in &run.tests {
            match test.failing_since {
                Some(since) => writeln!(out, "{}{} (since {since})", indent(2), test.title)?,
                None => writeln!(out, "{}{}", indent(2), test.title)?,
            }
        }
    }
    Ok(())
}

pub fn write_build_report_markdown(out: &mut impl Write, report: &BuildReport) -> io::Result<()> {
    writeln!(
        out,
        "## [#{}]({})",
        report.build.build_id, report.build.build_uri
    )?;
    writeln!(out, "|Configuration|Test|Failing Since|")?;
    writeln!(out, "| --- | --- | --- |")?;
    for run in &report.runs {
        let run_name = escape_table_cell(&run.run_name);
        for test in &run.tests {
            let since = test
                .failing_since
                .map(|id| id.to_string())
                .unwrap_or_default();
            writeln!(out, "|{run_name}|{}|{since}|", escape_table_cell(&test.title))?;
        }
    }
    writeln!(out)
}

pub fn write_test_report(out: &mut impl Write, report: &TestReport, verbose: bool) -> io::Result<()> {
    writeln!(out, "{} {}", report.title, report.failure_count)?;
    if !verbose {
        return Ok(());
    }

    writeln!(out, "{}Builds", indent(1))?;
    for build in &report.builds {
        writeln!(out, "{}{}", indent(2), build.build.build_uri)?;
    }

    writeln!(out, "{}Test Runs", indent(1))?;
    for run in &report.test_runs {
        writeln!(out, "{}{}\t{}", indent(2), run.count, run.run_name)?;
    }
    Ok(())
}

pub fn write_test_report_markdown(out: &mut impl Write, report: &TestReport) -> io::Result<()> {
    writeln!(out, "## {}", report.title)?;
    writeln!(out)?;

    writeln!(out, "### Builds")?;
    writeln!(out, "|Build|Test Failure Count|")?;
    writeln!(out, "| --- | --- |")?;
    for build in &report.builds {
        writeln!(
            out,
            "|[#{}]({})|{}|",
            build.build.build_id, build.build.build_uri, build.count
        )?;
    }

    writeln!(out, "### Configurations")?;
    for run in &report.test_runs {
        writeln!(out, "- {}", escape_at_sign(&run.run_name))?;
    }

    writeln!(out, "### Helix Logs")?;
    writeln!(out, "|Build|Console|Core|Test Results|")?;
    writeln!(out, "| --- | --- | --- | --- |")?;
    for row in &report.helix_logs {
        writeln!(out, "{}", helix_log_row(row))?;
    }
    writeln!(out)
}

fn helix_log_row(row: &HelixLogRow) -> String {
    let cell = |uri: &Option<String>, fallback: &str| match uri {
        Some(uri) => format!("[{}]({uri})", uri_display_name(uri, fallback)),
        None => String::new(),
    };

    format!(
        "|[#{}]({})|{}|{}|{}|",
        row.build.build_id,
        row.build.build_uri,
        cell(&row.logs.console_uri, "console"),
        cell(&row.logs.core_dump_uri, "core"),
        cell(&row.logs.test_results_uri, "testResults.xml"),
    )
}

pub fn write_job_report(out: &mut impl Write, report: &JobReport, verbose: bool) -> io::Result<()> {
    writeln!(out, "{}", report.run_name)?;
    if verbose {
        writeln!(out, "{}Builds", indent(1))?;
        for build in &report.builds {
            writeln!(out, "{}{}", indent(2), build.build_uri)?;
        }

        writeln!(out, "{}Test Cases", indent(1))?;
        for test_case in &report.test_cases {
            writeln!(out, "{}{} ({})", indent(2), test_case.title, test_case.count)?;
        }
    } else {
        writeln!(out, "{}Builds {}", indent(1), report.builds.len())?;
        writeln!(out, "{}Test Cases {}", indent(1), report.test_case_count)?;
    }
    Ok(())
}

pub fn write_job_report_markdown(out: &mut impl Write, report: &JobReport) -> io::Result<()> {
    writeln!(out, "## {}", escape_at_sign(&report.run_name))?;
    writeln!(out)?;

    writeln!(out, "### Builds")?;
    for build in &report.builds {
        writeln!(out, "- [#{}]({})", build.build_id, build.build_uri)?;
    }

    writeln!(out, "### Test Cases")?;
    writeln!(out, "|Test|Failure Count|")?;
    writeln!(out, "| --- | --- |")?;
    for test_case in &report.test_cases {
        writeln!(
            out,
            "|{}|{}|",
            escape_table_cell(&test_case.title),
            test_case.count
        )?;
    }
    writeln!(out)
}
