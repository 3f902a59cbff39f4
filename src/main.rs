use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use coverwatch::config::{Config, CONFIG_FILE};
use coverwatch::coverage::{CoverageRecord, Metric};
use coverwatch::dashboard::{chart_data_within_range, chart_points, result_summary};
use coverwatch::db::Database;
use coverwatch::history::{last_result, BuildOutcome, JobView};
use coverwatch::publisher::{validate_job_name, PublishRequest, Publisher};
use coverwatch::server::{self, DEFAULT_CHART_DAYS};

#[derive(Parser)]
#[command(name = "coverwatch")]
#[command(about = "Coverage health and history for CI builds")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file (default: coverwatch.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Record the coverage reports of a build
    Record {
        /// Job the build belongs to
        #[arg(long)]
        job: String,

        /// Build number
        #[arg(long)]
        build: u64,

        /// Outcome of the build so far (success, unstable, failure, aborted)
        #[arg(long, default_value = "success")]
        outcome: String,

        /// Directory searched for reports (default: the config file's directory)
        #[arg(long)]
        workspace: Option<PathBuf>,

        /// Build start time, RFC 3339 (default: now)
        #[arg(long)]
        timestamp: Option<String>,

        /// Report files; skips the workspace search when given
        files: Vec<PathBuf>,
    },

    /// Show the health of a job's last result or of one build
    Health {
        #[arg(long)]
        job: String,

        #[arg(long)]
        build: Option<u64>,
    },

    /// Per-day coverage averages across all jobs
    Chart {
        /// Number of days back from the newest build
        #[arg(long, default_value_t = DEFAULT_CHART_DAYS)]
        days: u32,
    },

    /// Current coverage of every job
    Summary,

    /// List recorded jobs
    Jobs,

    /// Delete a job's recorded builds and stored reports
    Clear {
        #[arg(long)]
        job: String,
    },

    /// Start the JSON API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coverwatch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run() {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(|| PathBuf::from(CONFIG_FILE));

    // Canonicalize config path to get absolute path, then get parent
    let config_path = std::fs::canonicalize(&config_path)
        .with_context(|| format!("Could not find config file: {}", config_path.display()))?;

    let base_dir = config_path
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let config = Config::load(&config_path)
        .with_context(|| format!("Could not load {}", config_path.display()))?;
    let db_path = config.database_path(&base_dir);

    match cli.command {
        Commands::Record {
            job,
            build,
            outcome,
            workspace,
            timestamp,
            files,
        } => {
            let request = PublishRequest {
                job,
                number: build,
                outcome: outcome.parse()?,
                started_at: parse_started_at(timestamp.as_deref())?,
                workspace: workspace.unwrap_or_else(|| base_dir.clone()),
                reports: files,
            };
            cmd_record(&config, &base_dir, &db_path, &request)
        }
        Commands::Health { job, build } => cmd_health(&db_path, &job, build),
        Commands::Chart { days } => cmd_chart(&db_path, days),
        Commands::Summary => cmd_summary(&db_path),
        Commands::Jobs => cmd_jobs(&config, &db_path),
        Commands::Clear { job } => cmd_clear(&config, &base_dir, &db_path, &job),
        Commands::Serve { port } => cmd_serve(port, db_path),
    }
}

fn parse_started_at(value: Option<&str>) -> Result<DateTime<Utc>> {
    match value {
        Some(value) => Ok(DateTime::parse_from_rfc3339(value)
            .with_context(|| format!("Invalid timestamp: {}", value))?
            .with_timezone(&Utc)),
        None => Ok(Utc::now()),
    }
}

fn cmd_record(config: &Config, base_dir: &Path, db_path: &Path, request: &PublishRequest) -> Result<()> {
    let db = Database::open(db_path)?;
    let publisher = Publisher::new(
        &db,
        &config.artifacts_path(base_dir),
        &config.coverage.includes,
        config.health_reporting(),
    );

    let published = publisher.publish(request)?;

    if let Some(trend) = &published.trend {
        println!();
        trend.print_summary();
    }

    if published.outcome == BuildOutcome::Failure {
        println!(
            "\n{} {} #{} marked as {}",
            "✗".red(),
            request.job,
            request.number,
            "failure".red().bold()
        );
        std::process::exit(1);
    }

    println!(
        "\n{} {} #{} recorded ({})",
        "✓".green(),
        request.job,
        request.number,
        published.outcome
    );
    Ok(())
}

fn print_record(record: &CoverageRecord) {
    let report = record.report();

    println!(
        "\n{} {} #{}\n",
        report.name.bold().cyan(),
        report.job.bold(),
        report.build
    );

    for metric in &report.metrics {
        match (metric.ratio, metric.percentage) {
            (Some(ratio), Some(percentage)) => println!(
                "  {:<10} {:>6.1}%  {}",
                metric.metric.label(),
                percentage,
                ratio.to_string().dimmed()
            ),
            _ => println!("  {:<10} {}", metric.metric.label(), "-".dimmed()),
        }
    }

    match &report.health {
        Some(health) => {
            let score = format!("{}", health.score);
            let score = match health.score {
                80.. => score.green(),
                40..=79 => score.yellow(),
                _ => score.red(),
            };
            println!("\n  {} {}", "Health:".bold(), score);
            println!("  {}", health.description().dimmed());
        }
        None => println!("\n  {}", "Health reporting disabled".dimmed()),
    }
}

fn cmd_health(db_path: &Path, job: &str, build: Option<u64>) -> Result<()> {
    let db = Database::open(db_path)?;

    let record = match build {
        Some(number) => db.get_coverage(job, number)?.map(std::sync::Arc::new),
        None => last_result(&db.load_job(job)?),
    };

    match record {
        Some(record) => {
            print_record(&record);
            Ok(())
        }
        None => match build {
            Some(number) => anyhow::bail!("No coverage recorded for {} #{}", job, number),
            None => anyhow::bail!("No usable coverage result for job '{}'", job),
        },
    }
}

fn print_header() {
    println!(
        "  {:<12} {:>9} {:>9} {:>9} {:>9}",
        "",
        Metric::Statement.label(),
        Metric::Branch.label(),
        Metric::Loop.label(),
        Metric::Condition.label()
    );
}

fn cmd_chart(db_path: &Path, days: u32) -> Result<()> {
    let db = Database::open(db_path)?;
    let jobs = db.load_jobs()?;

    let Some(summaries) = chart_data_within_range(&jobs, days) else {
        println!("  {}", "No builds recorded".dimmed());
        return Ok(());
    };

    println!("\n{} last {} days\n", "Coverage".bold().cyan(), days);
    print_header();
    for point in chart_points(&summaries) {
        println!(
            "  {:<12} {:>8.1}% {:>8.1}% {:>8.1}% {:>8.1}%  {}",
            point.date.to_string(),
            point.statement,
            point.branch,
            point.loops,
            point.condition,
            format!("({} jobs)", point.job_count).dimmed()
        );
    }
    Ok(())
}

fn cmd_summary(db_path: &Path) -> Result<()> {
    let db = Database::open(db_path)?;
    let jobs = db.load_jobs()?;
    let summary = result_summary(&jobs);

    if summary.count() == 0 {
        println!("  {}", "No jobs recorded".dimmed());
        return Ok(());
    }

    println!("\n{}\n", "Coverage summary".bold().cyan());
    print_header();
    for result in &summary.results {
        let values: Vec<String> = Metric::ALL
            .iter()
            .map(|&metric| format!("{:>8.1}%", result.get(metric)))
            .collect();
        println!("  {:<12} {}", result.job, values.join(" "));
    }
    println!("{}", "─".repeat(56).dimmed());
    println!(
        "  {:<12} {:>8.1}% {:>8.1}% {:>8.1}% {:>8.1}%",
        "average".bold(),
        summary.average(Metric::Statement),
        summary.average(Metric::Branch),
        summary.average(Metric::Loop),
        summary.average(Metric::Condition)
    );
    Ok(())
}

fn cmd_jobs(config: &Config, db_path: &Path) -> Result<()> {
    let db = Database::open(db_path)?;
    let jobs = db.load_jobs()?;

    println!("\n{} {}\n", "📦".cyan(), config.project.name.bold());

    if jobs.is_empty() {
        println!("  {}", "No jobs recorded".dimmed());
        return Ok(());
    }

    for job in &jobs {
        let latest = job
            .latest_build()
            .map(|b| format!("#{} {}", b.entry().number, b.entry().outcome))
            .unwrap_or_default();
        println!(
            "  {} {} {}",
            "•".green(),
            job.name().cyan(),
            format!("({} builds, latest {})", job.len(), latest).dimmed()
        );
    }
    Ok(())
}

fn cmd_clear(config: &Config, base_dir: &Path, db_path: &Path, job: &str) -> Result<()> {
    validate_job_name(job)?;
    let db = Database::open(db_path)?;
    let removed = db.clear_job(job)?;

    let folder = config.artifacts_path(base_dir).join(job);
    if folder.is_dir() {
        std::fs::remove_dir_all(&folder)
            .with_context(|| format!("Failed to remove {}", folder.display()))?;
    }

    if removed == 0 {
        println!("  {} {}", "No history for".dimmed(), job.cyan());
    } else {
        println!("{} Cleared {} ({} records)", "✓".green(), job.cyan(), removed);
    }
    Ok(())
}

#[tokio::main]
async fn cmd_serve(port: u16, db_path: PathBuf) -> Result<()> {
    // Initialize database if it doesn't exist
    let _ = Database::open(&db_path)?;

    println!("{}", "━".repeat(50).dimmed());
    println!(
        "  {} {}",
        "Coverwatch API".bold().cyan(),
        concat!("v", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("{}", "━".repeat(50).dimmed());

    server::start_server(port, db_path).await
}
