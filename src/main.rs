use std::path::PathBuf;

use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

mod aggregate;
mod config;
mod db;
mod filter;
mod ingest;
mod models;
mod report;
mod roster;
mod session;

use config::{Config, DEFAULT_CONFIG_FILE};
use filter::{Filter, FilterCriteria};
use models::{FeedbackRecord, FeedbackType, Role};
use report::ReportScope;
use roster::Roster;

#[derive(Parser)]
#[command(name = "feedback-stats")]
#[command(about = "Course and instructor feedback statistics for department dashboards", long_about = None)]
struct Cli {
    /// Config file (defaults to ./feedback-stats.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Roster dimensions shared by every listing.
#[derive(Args, Debug, Clone)]
struct FilterArgs {
    #[arg(long, default_value = "all")]
    branch: Filter<String>,
    #[arg(long, default_value = "all")]
    year: Filter<u16>,
    /// Case-insensitive match on name, email or roll number
    #[arg(long)]
    search: Option<String>,
}

impl FilterArgs {
    fn criteria(&self, term: Filter<FeedbackType>, role: Filter<Role>) -> FilterCriteria {
        FilterCriteria {
            term,
            branch: self.branch.clone(),
            year: self.year.clone(),
            role,
            search: self.search.clone(),
        }
    }
}

#[derive(Args, Debug, Clone)]
struct SessionArgs {
    /// Role to view as; overrides the config file
    #[arg(long)]
    role: Option<Role>,
    /// Branch for a HOD, email for a student
    #[arg(long)]
    scope: Option<String>,
}

#[derive(Args, Debug, Clone)]
struct SourceArgs {
    /// Read a JSON feedback export instead of Postgres
    #[arg(long)]
    input: Option<PathBuf>,
    /// Expected submission count; overrides the roster
    #[arg(long)]
    expected: Option<usize>,
    /// Database window in days; defaults to the config value
    #[arg(long)]
    since_days: Option<i64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Write a default config file
    InitConfig,
    /// Load realistic seed data
    Seed,
    /// Import feedback answers from a CSV file (one row per answer)
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Import roster students and subjects from CSV files
    ImportRoster {
        #[arg(long)]
        students: Option<PathBuf>,
        #[arg(long)]
        subjects: Option<PathBuf>,
    },
    /// List roster entries matching the filters
    Users {
        #[command(flatten)]
        filters: FilterArgs,
        #[arg(long, default_value = "all")]
        role: Filter<Role>,
    },
    /// Print the aggregate summary
    Summary {
        /// midterm, endterm or all
        #[arg(long, default_value = "all")]
        term: Filter<FeedbackType>,
        #[command(flatten)]
        filters: FilterArgs,
        #[command(flatten)]
        session: SessionArgs,
        #[command(flatten)]
        source: SourceArgs,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown report
    Report {
        /// midterm, endterm or all
        #[arg(long, default_value = "all")]
        term: Filter<FeedbackType>,
        #[command(flatten)]
        filters: FilterArgs,
        #[command(flatten)]
        session: SessionArgs,
        #[command(flatten)]
        source: SourceArgs,
        #[arg(long, default_value = "feedback-report.md")]
        out: PathBuf,
    },
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

async fn connect(config: &Config) -> anyhow::Result<PgPool> {
    let database_url = config
        .database_url()
        .context("DATABASE_URL (or [database].url) must point at a Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

struct Loaded {
    records: Vec<FeedbackRecord>,
    roster: Option<Roster>,
    since: Option<NaiveDate>,
}

async fn load(config: &Config, source: &SourceArgs) -> anyhow::Result<Loaded> {
    if let Some(path) = &source.input {
        let records = ingest::load_json(path).await?;
        info!(records = records.len(), path = %path.display(), "loaded feedback export");
        return Ok(Loaded {
            records,
            roster: None,
            since: None,
        });
    }

    let pool = connect(config).await?;
    let since_days = source.since_days.unwrap_or(config.report.since_days);
    let since = db::cutoff_date(since_days);
    let records = db::fetch_feedback(&pool, db::start_of_day(since)).await?;
    let roster = Roster::new(db::fetch_roster(&pool).await?, db::fetch_subjects(&pool).await?);
    info!(
        records = records.len(),
        students = roster.students.len(),
        subjects = roster.subjects.len(),
        "loaded feedback from Postgres"
    );
    Ok(Loaded {
        records,
        roster: Some(roster),
        since: Some(since),
    })
}

/// Session visibility first, then the user's filters.
fn select(
    records: &[FeedbackRecord],
    session: &session::Session,
    criteria: &FilterCriteria,
) -> Vec<FeedbackRecord> {
    let visible = session.visible(records);
    let selected = filter::filter_by_criteria(&visible, criteria);
    debug!(
        total = records.len(),
        visible = visible.len(),
        selected = selected.len(),
        "applied session and filters"
    );
    selected
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.command {
        Commands::InitConfig => Config::default(),
        _ => Config::load_or_default(cli.config.as_deref())?,
    };

    match cli.command {
        Commands::InitConfig => {
            let path = cli
                .config
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            if path.exists() {
                bail!("{} already exists; edit it or remove it first", path.display());
            }
            std::fs::write(&path, Config::default_toml())
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Config written to {}.", path.display());
        }
        Commands::InitDb => {
            let pool = connect(&config).await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect(&config).await?;
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let pool = connect(&config).await?;
            let inserted = db::import_feedback_csv(&pool, &csv).await?;
            println!("Inserted {inserted} answers from {}.", csv.display());
        }
        Commands::ImportRoster { students, subjects } => {
            if students.is_none() && subjects.is_none() {
                bail!("pass --students and/or --subjects");
            }
            let pool = connect(&config).await?;
            let (student_count, subject_count) =
                db::import_roster_csv(&pool, students.as_deref(), subjects.as_deref()).await?;
            println!("Upserted {student_count} roster entries and {subject_count} subjects.");
        }
        Commands::Users { filters, role } => {
            let pool = connect(&config).await?;
            let roster = db::fetch_roster(&pool).await?;
            let criteria = filters.criteria(Filter::All, role);
            let users = filter::filter_by_criteria(&roster, &criteria);
            if users.is_empty() {
                println!("No roster entries match {}.", criteria.describe());
                return Ok(());
            }
            for user in &users {
                println!(
                    "- {} <{}> {} {} year {} [{}]",
                    user.name, user.email, user.roll_number, user.branch, user.year, user.role
                );
            }
        }
        Commands::Summary {
            term,
            filters,
            session,
            source,
            json,
        } => {
            let session = config.resolve_session(session.role, session.scope);
            let criteria = filters.criteria(term, Filter::All);
            let loaded = load(&config, &source).await?;
            let records = select(&loaded.records, &session, &criteria);
            let scope = ReportScope {
                session: &session,
                criteria: &criteria,
                roster: loaded.roster.as_ref(),
                expected_override: source.expected,
                since: loaded.since,
            };
            let expected = scope.expected_overall();
            let summary = aggregate::summarize(&records, expected);

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
                return Ok(());
            }

            println!("Feedback summary for {} ({})", session.label(), criteria.describe());
            println!("Responses: {}", summary.total_responses);
            println!("Average rating: {:.1} / 5", summary.average_rating);
            println!("Response rate: {}", report::rate_label(&summary, expected));
            println!("Distribution:");
            for line in
                report::distribution_lines(&summary.distribution, config.report.distribution_order)
            {
                println!("  {line}");
            }
        }
        Commands::Report {
            term,
            filters,
            session,
            source,
            out,
        } => {
            let session = config.resolve_session(session.role, session.scope);
            let criteria = filters.criteria(term, Filter::All);
            let loaded = load(&config, &source).await?;
            let records = select(&loaded.records, &session, &criteria);
            let scope = ReportScope {
                session: &session,
                criteria: &criteria,
                roster: loaded.roster.as_ref(),
                expected_override: source.expected,
                since: loaded.since,
            };
            let report = report::build_report(&scope, &records, &config.report);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn summary_takes_role_scope_and_term() {
        let cli = Cli::try_parse_from([
            "feedback-stats", "summary", "--role", "hod", "--scope", "MCA Regular", "--term", "midterm",
        ])
        .unwrap();
        let Commands::Summary { term, session, .. } = cli.command else {
            panic!("expected summary");
        };
        assert_eq!(term, Filter::Value(FeedbackType::Midterm));
        assert_eq!(session.role, Some(Role::Hod));
        assert_eq!(session.scope.as_deref(), Some("MCA Regular"));
    }

    #[test]
    fn users_rejects_term_flag() {
        assert!(Cli::try_parse_from(["feedback-stats", "users", "--term", "midterm"]).is_err());
        let cli = Cli::try_parse_from(["feedback-stats", "users", "--role", "hod"]).unwrap();
        let Commands::Users { filters, role } = cli.command else {
            panic!("expected users");
        };
        assert!(filters.criteria(Filter::All, role).term.is_all());
    }
}
