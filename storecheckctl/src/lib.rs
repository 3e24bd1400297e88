use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use storecheck_core::browser::{BrowserError, BrowserLauncher, BrowserSession, LaunchOverrides};
use storecheck_core::http::{
    preview, ClientError, FailureKind, FetchOutcome, ShopClient, ShopRequest, StorefrontApi,
};
use storecheck_core::report::{NoopSink, ReportError, Reporter};
use storecheck_core::suite::{ApiSuite, SuiteRunner, SuiteSummary, UiSuite};
use storecheck_core::{load_config, ConfigError, StorecheckConfig, StorefrontPage};
use thiserror::Error;
use tracing::info;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("http client error: {0}")]
    Client(#[from] ClientError),
    #[error("browser error: {0}")]
    Browser(#[from] BrowserError),
    #[error("report error: {0}")]
    Report(#[from] ReportError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("{failed} test(s) did not complete in suite {suite}")]
    ExecutionFailed { suite: String, failed: usize },
    #[error("{failed} check(s) reported a failed verdict in suite {suite}")]
    FailedVerdicts { suite: String, failed: usize },
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Storefront smoke checks over HTTP and Chromium", long_about = None)]
pub struct Cli {
    /// Path to storecheck.toml; built-in defaults when omitted
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Overrides target.base_url
    #[arg(long)]
    pub base_url: Option<String>,
    /// Overrides reporting.results_dir
    #[arg(long)]
    pub results_dir: Option<PathBuf>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    /// Exit non-zero when any check reports a failed verdict
    #[arg(long, default_value_t = false)]
    pub strict: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Runs the HTTP suite
    Api,
    /// Runs the browser suite
    Ui(UiArgs),
    /// Runs the HTTP suite, then the browser suite
    All(UiArgs),
    /// Sends one request through the HTTP helper
    Fetch(FetchArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct UiArgs {
    /// Shows the browser window
    #[arg(long, default_value_t = false)]
    pub headful: bool,
}

#[derive(Args, Debug, Clone)]
pub struct FetchArgs {
    /// Path relative to the base URL, e.g. /search
    pub path: String,
    /// Query parameter as key=value; repeatable
    #[arg(long = "query", value_parser = parse_query_pair)]
    pub query: Vec<(String, String)>,
    /// Returns the first response as is
    #[arg(long, default_value_t = false)]
    pub no_redirects: bool,
    /// Redirect hop cap
    #[arg(long, conflicts_with = "no_redirects")]
    pub max_redirects: Option<usize>,
}

pub fn run(cli: Cli) -> Result<()> {
    let config = resolve_config(&cli)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(execute(&cli, &config))
}

async fn execute(cli: &Cli, config: &StorecheckConfig) -> Result<()> {
    match &cli.command {
        Commands::Api => {
            let reporter = build_reporter(config)?;
            let summaries = vec![run_api(config, reporter).await?];
            finish(&summaries, cli.format, cli.strict)
        }
        Commands::Ui(args) => {
            let reporter = build_reporter(config)?;
            let summaries = vec![run_ui(config, reporter, args).await?];
            finish(&summaries, cli.format, cli.strict)
        }
        Commands::All(args) => {
            let reporter = build_reporter(config)?;
            let api = run_api(config, reporter.clone()).await?;
            let (report, error) = settle(vec![api], run_ui(config, reporter, args).await);
            render(&report, cli.format)?;
            match error {
                Some(err) => Err(err),
                None => check_exit(&report.suites, cli.strict),
            }
        }
        Commands::Fetch(args) => {
            let client = ShopClient::new(&config.target, Arc::new(NoopSink))?;
            let outcome = client.execute(&fetch_request(args)).await;
            render(&FetchReport::from_outcome(&outcome), cli.format)
        }
    }
}

fn resolve_config(cli: &Cli) -> Result<StorecheckConfig> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => StorecheckConfig::default(),
    };
    if let Some(base_url) = &cli.base_url {
        config.target.base_url = base_url.clone();
    }
    if let Some(dir) = &cli.results_dir {
        config.reporting.results_dir = dir.display().to_string();
    }
    config.validate()?;
    Ok(config)
}

fn build_reporter(config: &StorecheckConfig) -> Result<Arc<Reporter>> {
    let reporter = if config.reporting.enabled {
        Reporter::with_results_dir(&config.reporting.results_dir)?
    } else {
        Reporter::in_memory()
    };
    Ok(Arc::new(reporter))
}

async fn run_api(config: &StorecheckConfig, reporter: Arc<Reporter>) -> Result<SuiteSummary> {
    let client = ShopClient::new(&config.target, reporter.clone())?;
    let mut suite = ApiSuite::new(
        StorefrontApi::new(client),
        config.target.search_query.clone(),
    );
    let runner = SuiteRunner::new(reporter, Duration::from_millis(config.runner.api_pause_ms));
    Ok(runner.run(&mut suite).await)
}

async fn run_ui(
    config: &StorecheckConfig,
    reporter: Arc<Reporter>,
    args: &UiArgs,
) -> Result<SuiteSummary> {
    let launcher = BrowserLauncher::new(config.browser.clone());
    let overrides = LaunchOverrides {
        headless: args.headful.then_some(false),
    };
    let session = launcher.launch_with_overrides(overrides).await?;
    let summary = run_ui_session(&session, config, reporter).await;
    session.shutdown().await?;
    summary
}

async fn run_ui_session(
    session: &BrowserSession,
    config: &StorecheckConfig,
    reporter: Arc<Reporter>,
) -> Result<SuiteSummary> {
    let page = StorefrontPage::new(session.new_page().await?, config, reporter.clone());
    let mut suite = UiSuite::new(page, reporter.clone());
    if let Some(token) = &config.auth.token {
        info!(domain = %config.auth.cookie_domain, "auth token configured");
        suite = suite.with_auth(token.clone(), config.auth.cookie_domain.clone());
    }
    let runner = SuiteRunner::new(reporter, Duration::from_millis(config.runner.ui_pause_ms));
    Ok(runner.run(&mut suite).await)
}

fn fetch_request(args: &FetchArgs) -> ShopRequest {
    let mut request = ShopRequest::get(args.path.clone());
    for (key, value) in &args.query {
        request = request.query(key.clone(), value.clone());
    }
    if args.no_redirects {
        request = request.follow_redirects(false);
    } else if let Some(max) = args.max_redirects {
        request = request.max_redirects(max);
    }
    request
}

fn parse_query_pair(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{raw}'")),
    }
}

fn finish(summaries: &[SuiteSummary], format: OutputFormat, strict: bool) -> Result<()> {
    let report = RunReport {
        suites: summaries.to_vec(),
    };
    render(&report, format)?;
    check_exit(summaries, strict)
}

/// Keeps the suites that already finished reportable when the next one
/// could not run at all.
fn settle(
    mut finished: Vec<SuiteSummary>,
    next: Result<SuiteSummary>,
) -> (RunReport, Option<AppError>) {
    let error = match next {
        Ok(summary) => {
            finished.push(summary);
            None
        }
        Err(err) => Some(err),
    };
    (RunReport { suites: finished }, error)
}

fn check_exit(summaries: &[SuiteSummary], strict: bool) -> Result<()> {
    if let Some(summary) = summaries.iter().find(|summary| summary.failed > 0) {
        return Err(AppError::ExecutionFailed {
            suite: summary.suite.clone(),
            failed: summary.failed,
        });
    }
    if strict {
        if let Some(summary) = summaries.iter().find(|summary| summary.has_failed_verdicts()) {
            let failed = summary
                .cases
                .iter()
                .filter(|case| case.verdict == Some(storecheck_core::Verdict::Failed))
                .count();
            return Err(AppError::FailedVerdicts {
                suite: summary.suite.clone(),
                failed,
            });
        }
    }
    Ok(())
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

#[derive(Debug, Serialize)]
struct RunReport {
    suites: Vec<SuiteSummary>,
}

impl DisplayFallback for RunReport {
    fn display(&self) -> String {
        let mut blocks = Vec::new();
        for summary in &self.suites {
            let mut lines = Vec::new();
            for case in &summary.cases {
                let line = match (&case.verdict, &case.message, &case.error) {
                    (_, _, Some(error)) => format!("  ❌ {}: {error}", case.title),
                    (Some(verdict), Some(message), None) => {
                        format!("  {} {}: {message}", verdict.symbol(), case.title)
                    }
                    _ => format!("  - {}", case.title),
                };
                lines.push(line);
            }
            lines.push(summary.render());
            blocks.push(lines.join("\n"));
        }
        blocks.join("\n\n")
    }
}

const FETCH_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Serialize)]
struct FetchReport {
    status: u16,
    url: String,
    redirected: bool,
    attempts: usize,
    size: usize,
    elapsed_ms: Option<u64>,
    failure: Option<FailureKind>,
    preview: String,
}

impl FetchReport {
    fn from_outcome(outcome: &FetchOutcome) -> Self {
        let response = outcome.response();
        Self {
            status: outcome.status(),
            url: outcome.url().to_string(),
            redirected: response.map(|r| r.was_redirected()).unwrap_or(false),
            attempts: outcome.attempts(),
            size: outcome.body_len(),
            elapsed_ms: response.map(|r| r.elapsed.as_millis() as u64),
            failure: outcome.failure().map(|failure| failure.kind.clone()),
            preview: preview(&outcome.text(), FETCH_PREVIEW_CHARS),
        }
    }
}

impl DisplayFallback for FetchReport {
    fn display(&self) -> String {
        let mut lines = vec![
            format!("Status: {}", self.status),
            format!("URL: {}", self.url),
            format!("Attempts: {}", self.attempts),
            format!("Size: {} bytes", self.size),
        ];
        if self.redirected {
            lines.push("Redirected: yes".to_string());
        }
        if let Some(elapsed) = self.elapsed_ms {
            lines.push(format!("Elapsed: {elapsed} ms"));
        }
        if let Some(kind) = &self.failure {
            lines.push(format!("Failure: {kind}"));
        }
        lines.push(format!("Body: {}", self.preview));
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use storecheck_core::suite::{CaseOutcome, Verdict};

    fn summary(verdicts: &[Option<Verdict>], failed: usize) -> SuiteSummary {
        let cases = verdicts
            .iter()
            .enumerate()
            .map(|(index, verdict)| CaseOutcome {
                id: format!("case_{index}"),
                title: format!("Case {index}"),
                verdict: *verdict,
                message: verdict.map(|_| "observed".to_string()),
                error: verdict.is_none().then(|| "boom".to_string()),
                duration_ms: 1,
            })
            .collect();
        SuiteSummary {
            suite: "api".into(),
            total: verdicts.len(),
            passed: verdicts.len() - failed,
            failed,
            success_rate: 0.0,
            finished_at: Utc::now(),
            cases,
        }
    }

    #[test]
    fn parses_fetch_arguments() {
        let cli = Cli::try_parse_from([
            "storecheckctl",
            "--format",
            "json",
            "fetch",
            "/search",
            "--query",
            "q=книга",
            "--query",
            "page=1",
            "--max-redirects",
            "3",
        ])
        .unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        let Commands::Fetch(args) = cli.command else {
            panic!("expected fetch");
        };
        assert_eq!(
            args.query,
            vec![
                ("q".to_string(), "книга".to_string()),
                ("page".to_string(), "1".to_string())
            ]
        );
        let request = fetch_request(&args);
        assert_eq!(request.redirect_cap(), 3);
        assert_eq!(request.params().len(), 2);
    }

    #[test]
    fn no_redirects_conflicts_with_a_cap() {
        let result = Cli::try_parse_from([
            "storecheckctl",
            "fetch",
            "/",
            "--no-redirects",
            "--max-redirects",
            "2",
        ]);
        assert!(result.is_err());

        let cli = Cli::try_parse_from(["storecheckctl", "fetch", "/", "--no-redirects"]).unwrap();
        let Commands::Fetch(args) = cli.command else {
            panic!("expected fetch");
        };
        assert_eq!(fetch_request(&args).redirect_cap(), 0);
    }

    #[test]
    fn query_pairs_need_a_key() {
        assert_eq!(
            parse_query_pair("q=a=b").unwrap(),
            ("q".to_string(), "a=b".to_string())
        );
        assert_eq!(parse_query_pair("q=").unwrap(), ("q".to_string(), String::new()));
        assert!(parse_query_pair("=x").is_err());
        assert!(parse_query_pair("novalue").is_err());
    }

    #[test]
    fn ui_flags_parse() {
        let cli = Cli::try_parse_from(["storecheckctl", "--strict", "ui", "--headful"]).unwrap();
        assert!(cli.strict);
        assert!(matches!(cli.command, Commands::Ui(UiArgs { headful: true })));
        let cli = Cli::try_parse_from(["storecheckctl", "all"]).unwrap();
        assert!(matches!(cli.command, Commands::All(UiArgs { headful: false })));
    }

    #[test]
    fn overrides_apply_on_top_of_the_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storecheck.toml");
        std::fs::write(&path, "[target]\nbase_url = \"http://127.0.0.1:9\"\n").unwrap();
        let cli = Cli::try_parse_from([
            "storecheckctl",
            "--config",
            path.to_str().unwrap(),
            "--results-dir",
            "out",
            "api",
        ])
        .unwrap();
        let config = resolve_config(&cli).unwrap();
        assert_eq!(config.target.base_url, "http://127.0.0.1:9");
        assert_eq!(config.reporting.results_dir, "out");

        let cli = Cli::try_parse_from(["storecheckctl", "--base-url", "ftp://shop", "api"]).unwrap();
        assert!(matches!(resolve_config(&cli), Err(AppError::Config(_))));
    }

    #[test]
    fn execution_failures_always_fail_the_run() {
        let summaries = [summary(&[Some(Verdict::Passed), None], 1)];
        assert!(matches!(
            check_exit(&summaries, false),
            Err(AppError::ExecutionFailed { failed: 1, .. })
        ));
    }

    #[test]
    fn failed_verdicts_only_matter_when_strict() {
        let summaries = [summary(&[Some(Verdict::Failed), Some(Verdict::Warning)], 0)];
        assert!(check_exit(&summaries, false).is_ok());
        assert!(matches!(
            check_exit(&summaries, true),
            Err(AppError::FailedVerdicts { failed: 1, .. })
        ));
    }

    #[test]
    fn finished_suites_survive_a_browser_that_never_starts() {
        let api = summary(&[Some(Verdict::Passed)], 0);
        let (report, error) = settle(
            vec![api],
            Err(AppError::Browser(BrowserError::Launch("no chromium".into()))),
        );
        assert_eq!(report.suites.len(), 1);
        assert!(report.display().contains("TEST RESULTS: api"));
        assert!(matches!(error, Some(AppError::Browser(_))));

        let (report, error) = settle(
            vec![summary(&[Some(Verdict::Passed)], 0)],
            Ok(summary(&[Some(Verdict::Warning)], 0)),
        );
        assert_eq!(report.suites.len(), 2);
        assert!(error.is_none());
    }

    #[test]
    fn text_report_lists_cases_then_totals() {
        let report = RunReport {
            suites: vec![summary(&[Some(Verdict::Warning), None], 1)],
        };
        let text = report.display();
        assert!(text.contains("  ⚠️ Case 0: observed"));
        assert!(text.contains("  ❌ Case 1: boom"));
        assert!(text.contains("TEST RESULTS: api"));
    }
}
