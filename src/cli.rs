use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};
use futures::{future, stream, StreamExt, TryStreamExt};
use log::info;
use serde::Serialize;

use crate::auth::PersonalAccessToken;
use crate::config::{
    self, BUILD_DEFINITIONS, DEFAULT_BASE_URL, DEFAULT_BUILD_COUNT, DEFAULT_ORGANIZATION,
    DEFAULT_PROJECT,
};
use crate::error::RunfoError;
use crate::providers::azure::build_source;
use crate::providers::azure::build_test_info::{BuildTestInfoCollection, HelixTestRunResult};
use crate::providers::azure::client::DevOpsClient;
use crate::providers::azure::collector::TestResultCollector;
use crate::providers::azure::helix::{self, HelixNamingClassifier};
use crate::render;
use crate::reports::{self, FailedTestsReport, GroupedReport, ReportContext};

#[derive(Parser)]
#[command(name = "runfo")]
#[command(author, version, about = "Build and test failure info for Azure DevOps", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Personal access token (optional, public projects can be read anonymously)
    #[arg(short, long, env = "AZDO_TOKEN", global = true, hide_env_values = true)]
    token: Option<String>,

    /// Azure DevOps instance URL
    #[arg(short, long, default_value = DEFAULT_BASE_URL, global = true)]
    url: String,

    /// Organization owning the builds
    #[arg(short, long, env = "AZDO_ORGANIZATION", default_value = DEFAULT_ORGANIZATION, global = true)]
    organization: String,

    /// Project within the organization
    #[arg(short = 'P', long, default_value = DEFAULT_PROJECT, global = true)]
    project: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Success ratio of recent builds for every known definition
    BuildResults {
        /// Number of builds to consider per definition
        #[arg(short, long, default_value_t = DEFAULT_BUILD_COUNT)]
        count: usize,
    },

    /// Helix log URIs for the failed tests of a build
    Helix {
        /// Build id
        #[arg(short, long)]
        build: i32,

        /// Also print the console log contents
        #[arg(short, long, default_value_t = false)]
        verbose: bool,
    },

    /// List the known build definitions
    Definitions,

    /// Recent non pull request builds of a definition
    Builds {
        /// Definition name or id
        #[arg(short, long)]
        definition: String,

        /// Number of builds to list
        #[arg(short, long, default_value_t = DEFAULT_BUILD_COUNT)]
        count: usize,
    },

    /// Failed tests of a build, or of the recent builds of a definition
    Tests(TestsArgs),

    /// List the logs of a build, or print one of them
    Logs {
        /// Build id
        #[arg(short, long)]
        build: i32,

        /// Log id to print
        #[arg(short, long)]
        log: Option<i32>,

        /// First line to print
        #[arg(long, requires = "log")]
        start_line: Option<u32>,

        /// Last line to print
        #[arg(long, requires = "log")]
        end_line: Option<u32>,
    },

    /// Download every log of a build as a zip archive
    DownloadLogs {
        /// Build id
        #[arg(short, long)]
        build: i32,

        /// Destination file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Print the timeline of a build (stages, jobs and tasks)
    Timeline {
        /// Build id
        #[arg(short, long)]
        build: i32,

        /// Timeline id, for a timeline other than the build's own
        #[arg(long)]
        id: Option<String>,

        /// Only records changed after this change id
        #[arg(long, requires = "id")]
        change_id: Option<i32>,
    },

    /// List the artifacts of a build, or show or download one of them
    Artifacts {
        /// Build id
        #[arg(short, long)]
        build: i32,

        /// Artifact name
        #[arg(short, long)]
        name: Option<String>,

        /// Download the named artifact as a zip archive to this file
        #[arg(short, long, requires = "name")]
        file: Option<PathBuf>,
    },
}

#[derive(Args)]
#[command(group(ArgGroup::new("target").required(true).args(["build", "definition"])))]
struct TestsArgs {
    /// Build id
    #[arg(short, long)]
    build: Option<i32>,

    /// Definition name or id
    #[arg(short, long)]
    definition: Option<String>,

    /// Number of builds to aggregate for a definition
    #[arg(short, long, default_value_t = DEFAULT_BUILD_COUNT)]
    count: usize,

    /// How failures are grouped
    #[arg(short, long, value_enum, default_value_t = Grouping::Builds)]
    grouping: Grouping,

    /// Markdown tables with build and log links
    #[arg(short, long, default_value_t = false)]
    markdown: bool,

    /// Verbose output
    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    /// Print the grouped data as JSON
    #[arg(long, default_value_t = false, conflicts_with = "markdown")]
    json: bool,

    /// Pretty print JSON output
    #[arg(long, default_value_t = false, requires = "json")]
    pretty: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Grouping {
    Builds,
    Tests,
    Jobs,
}

impl Cli {
    pub async fn execute(&self) -> Result<()> {
        let token = PersonalAccessToken::from_optional(self.token.as_deref());
        let client = DevOpsClient::new(&self.url, &self.organization, token)?;
        let ctx = ReportContext {
            organization_url: client.organization_url().to_string(),
            project: self.project.clone(),
        };
        let mut out = io::stdout();

        match &self.command {
            Commands::BuildResults { count } => {
                self.build_results(&client, *count, &mut out).await
            }
            Commands::Helix { build, verbose } => {
                self.helix(&client, *build, *verbose, &mut out).await
            }
            Commands::Definitions => {
                render::write_definitions(&mut out, &BUILD_DEFINITIONS, &ctx)?;
                Ok(())
            }
            Commands::Builds { definition, count } => {
                let definition_id = config::resolve_definition_id(definition)?;
                let builds =
                    build_source::list_builds(&client, &self.project, &[definition_id], *count)
                        .await?;
                render::write_builds(&mut out, &builds, &ctx)?;
                Ok(())
            }
            Commands::Tests(args) => self.tests(&client, &ctx, args, &mut out).await,
            Commands::Logs {
                build,
                log,
                start_line,
                end_line,
            } => {
                if let Some(log_id) = log {
                    let text = client
                        .get_build_log(&self.project, *build, *log_id, *start_line, *end_line)
                        .await?;
                    write!(out, "{text}")?;
                } else {
                    let logs = client.list_build_logs(&self.project, *build).await?;
                    render::write_build_logs(&mut out, &logs)?;
                }
                Ok(())
            }
            Commands::DownloadLogs { build, file } => {
                let written = client.download_build_logs(&self.project, *build, file).await?;
                writeln!(out, "{} ({written} bytes)", file.display())?;
                Ok(())
            }
            Commands::Timeline {
                build,
                id,
                change_id,
            } => {
                let timeline = match id {
                    Some(id) => {
                        client
                            .get_timeline_by_id(&self.project, *build, id, *change_id)
                            .await?
                    }
                    None => client.get_timeline(&self.project, *build).await?,
                };
                render::write_timeline(&mut out, &timeline)?;
                Ok(())
            }
            Commands::Artifacts { build, name, file } => {
                self.artifacts(&client, *build, name.as_deref(), file.as_deref(), &mut out)
                    .await
            }
        }
    }

    async fn artifacts(
        &self,
        client: &DevOpsClient,
        build_id: i32,
        name: Option<&str>,
        file: Option<&std::path::Path>,
        out: &mut impl Write,
    ) -> Result<()> {
        match (name, file) {
            (Some(name), Some(file)) => {
                let written = client
                    .download_artifact(&self.project, build_id, name, file)
                    .await?;
                writeln!(out, "{} ({written} bytes)", file.display())?;
            }
            (Some(name), None) => {
                let artifact = client.get_artifact(&self.project, build_id, name).await?;
                render::write_artifacts(out, &[artifact])?;
            }
            (None, _) => {
                let artifacts = client.list_artifacts(&self.project, build_id).await?;
                render::write_artifacts(out, &artifacts)?;
            }
        }
        Ok(())
    }

    async fn build_results(&self, client: &DevOpsClient, count: usize, out: &mut impl Write) -> Result<()> {
        let project = self.project.as_str();
        info!("Summarizing {count} builds for {} definitions", BUILD_DEFINITIONS.len());

        let summaries = future::try_join_all(BUILD_DEFINITIONS.iter().map(|definition| async move {
            let builds = build_source::list_builds(client, project, &[definition.id], count).await?;
            Ok::<_, RunfoError>(reports::summarize_build_results(
                definition.name,
                definition.id,
                &builds,
            ))
        }))
        .await?;

        for summary in &summaries {
            render::write_build_result_summary(out, summary)?;
        }
        Ok(())
    }

    async fn helix(&self, client: &DevOpsClient, build_id: i32, verbose: bool, out: &mut impl Write) -> Result<()> {
        let classifier = HelixNamingClassifier;
        let collector = TestResultCollector::new(client, &self.project, &classifier);
        let info = collector.collect_build_id(build_id).await?;

        let failures = reports::work_item_failures(&info);
        let logs = helix::fetch_log_infos(client, &self.project, &failures).await?;
        let listing = reports::list_helix_uris(&logs);

        let console_texts: Vec<String> = if verbose {
            stream::iter(&listing.console_uris)
                .map(|uri| client.get_external_text(uri))
                .buffered(helix::CONCURRENCY)
                .try_collect()
                .await?
        } else {
            Vec::new()
        };

        render::write_helix_uris(out, &listing, &console_texts)?;
        Ok(())
    }

    async fn tests(
        &self,
        client: &DevOpsClient,
        ctx: &ReportContext,
        args: &TestsArgs,
        out: &mut impl Write,
    ) -> Result<()> {
        let classifier = HelixNamingClassifier;
        let collector = TestResultCollector::new(client, &self.project, &classifier);

        if let Some(build_id) = args.build {
            let info = collector.collect_build_id(build_id).await?;
            let report = reports::build_report(&info, ctx);

            if args.json {
                let collection = BuildTestInfoCollection::new(vec![info]);
                let grouped = GroupedReport::Builds(vec![report]);
                return self.write_json(out, &collection, grouped, args.pretty);
            }
            if args.markdown {
                render::write_build_report_markdown(out, &report)?;
            } else {
                render::write_build_report(out, &report)?;
            }
            return Ok(());
        }

        let definition = args.definition.as_deref().unwrap_or_default();
        let definition_id = config::resolve_definition_id(definition)?;
        let collection = collector.collect_definition(definition_id, args.count).await?;
        info!(
            "Definition {definition_id}: {} failures across {} builds",
            collection.total_failures(),
            collection.len()
        );

        match args.grouping {
            Grouping::Builds => {
                let grouped = reports::group_by_builds(&collection, ctx);
                if args.json {
                    return self.write_json(out, &collection, GroupedReport::Builds(grouped), args.pretty);
                }
                for report in &grouped {
                    if args.markdown {
                        render::write_build_report_markdown(out, report)?;
                    } else {
                        render::write_build_report(out, report)?;
                    }
                }
            }
            Grouping::Tests => {
                let with_logs = args.markdown || (args.json && args.verbose);
                let mut grouped = Vec::new();
                for mut report in reports::group_by_tests(&collection, ctx) {
                    if with_logs {
                        let failures = collection.helix_results_for_title(&report.title);
                        let results: Vec<&HelixTestRunResult> = failures.iter().map(|f| f.result).collect();
                        let logs = helix::fetch_log_infos(client, &self.project, &results).await?;
                        report.helix_logs = reports::helix_log_rows(&failures, logs, ctx);
                    }

                    if args.json {
                        grouped.push(report);
                    } else if args.markdown {
                        render::write_test_report_markdown(out, &report)?;
                    } else {
                        render::write_test_report(out, &report, args.verbose)?;
                    }
                }
                if args.json {
                    return self.write_json(out, &collection, GroupedReport::Tests(grouped), args.pretty);
                }
            }
            Grouping::Jobs => {
                let grouped = reports::group_by_jobs(&collection, ctx);
                if args.json {
                    return self.write_json(out, &collection, GroupedReport::Jobs(grouped), args.pretty);
                }
                for report in &grouped {
                    if args.markdown {
                        render::write_job_report_markdown(out, report)?;
                    } else {
                        render::write_job_report(out, report, args.verbose)?;
                    }
                }
            }
        }

        Ok(())
    }

    fn write_json(
        &self,
        out: &mut impl Write,
        collection: &BuildTestInfoCollection,
        report: GroupedReport,
        pretty: bool,
    ) -> Result<()> {
        let report = FailedTestsReport {
            project: self.project.clone(),
            collected_at: Utc::now(),
            builds_analyzed: collection.len(),
            total_failures: collection.total_failures(),
            report,
        };
        write_json(out, &report, pretty)
    }
}

fn write_json<T: Serialize>(out: &mut impl Write, value: &T, pretty: bool) -> Result<()> {
    let json_output = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    writeln!(out, "{json_output}")?;
    Ok(())
}
