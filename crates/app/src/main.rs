use anyhow::{Context, Result};
use billcal_core::{EntryType, Frequency, Money, PayoffStrategy};
use billcal_import::{MatchType, SourceKind};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

pub struct AppState {
    pub db: billcal_storage::DbPool,
    pub config: config::Config,
}

#[derive(Parser, Debug)]
#[command(name = "billcal", version, about = "Bill calendar and bank statement importer")]
struct Cli {
    /// Where the database and config.toml live
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Recurring bills and income
    Schedule {
        #[command(subcommand)]
        command: ScheduleCommand,
    },

    /// Occurrences due in the next few days (overdue ones are flagged missed first)
    Upcoming {
        #[arg(long, default_value_t = 30)]
        days: i64,
    },

    /// Act on a single occurrence
    Occurrence {
        #[command(subcommand)]
        command: OccurrenceCommand,
    },

    /// Preview a bank statement CSV and optionally save it
    Import {
        file: PathBuf,

        /// commbank, anz, stgeorge, zip or generic (default from config)
        #[arg(long)]
        source: Option<SourceKind>,

        /// Correct a column, e.g. --map date="Posted On"
        #[arg(long = "map", value_name = "FIELD=HEADER")]
        maps: Vec<String>,

        /// Remember the mapping for this source and header layout
        #[arg(long)]
        remember: bool,

        /// Recategorize a preview row, e.g. --set 3=groceries or --set 3=rideshare:uber
        #[arg(long = "set", value_name = "ROW=CATEGORY[:PROFILE]")]
        sets: Vec<String>,

        /// Learn a rule from each --set correction
        #[arg(long)]
        learn: bool,

        /// Save the batch instead of only previewing it
        #[arg(long)]
        commit: bool,

        #[arg(long, default_value_t = ',')]
        delimiter: char,

        /// Honour double-quoted fields
        #[arg(long)]
        quoting: bool,
    },

    /// Committed import batches
    Batches {
        /// Show the transactions of one batch
        #[arg(long)]
        show: Option<uuid::Uuid>,
    },

    /// Categorization rules
    Rules {
        #[command(subcommand)]
        command: RulesCommand,
    },

    /// Debt accounts and payoff planning
    Debts {
        #[command(subcommand)]
        command: DebtsCommand,
    },

    /// Export or restore schedules, occurrences and debts as JSON
    Backup {
        #[command(subcommand)]
        command: BackupCommand,
    },

    /// Configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ScheduleCommand {
    /// Add a schedule and generate its occurrences
    Add {
        #[arg(long)]
        name: String,
        /// debt or credit
        #[arg(long = "type", default_value = "debt")]
        entry_type: EntryType,
        #[arg(long)]
        amount: Money,
        /// YYYY-MM-DD
        #[arg(long)]
        start: NaiveDate,
        /// none, weekly, fortnightly, monthly or yearly
        #[arg(long, default_value = "monthly")]
        frequency: Frequency,
        #[arg(long, default_value_t = 1)]
        interval: u32,
        #[arg(long)]
        end: Option<NaiveDate>,
        #[arg(long, default_value = "")]
        category: String,
        #[arg(long)]
        debt: Option<i64>,
        #[arg(long, default_value = "")]
        notes: String,
    },
    List,
    /// Regenerate occurrences, from a date onwards or entirely
    Regenerate {
        id: i64,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        months: Option<u32>,
    },
    Delete {
        id: i64,
    },
}

#[derive(Subcommand, Debug)]
enum OccurrenceCommand {
    /// Record a payment (defaults to the planned amount, today)
    Pay {
        id: i64,
        #[arg(long)]
        amount: Option<Money>,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    Skip {
        id: i64,
    },
    /// Push the date back (default from config)
    Snooze {
        id: i64,
        #[arg(long)]
        days: Option<i64>,
    },
    Move {
        id: i64,
        date: NaiveDate,
    },
}

#[derive(Subcommand, Debug)]
enum RulesCommand {
    Add {
        #[arg(long)]
        pattern: String,
        #[arg(long)]
        category: String,
        /// contains, startsWith or equals
        #[arg(long = "match", default_value = "contains")]
        match_type: MatchType,
        #[arg(long)]
        profile: Option<String>,
        #[arg(long, default_value_t = 50)]
        priority: i32,
    },
    /// Remember a categorization for descriptions like this one
    Learn {
        description: String,
        #[arg(long)]
        category: String,
        #[arg(long)]
        profile: Option<String>,
    },
    List,
    /// Load [[rules]] tables from a TOML file
    Load {
        file: PathBuf,
    },
    Delete {
        id: i64,
    },
}

#[derive(Subcommand, Debug)]
enum DebtsCommand {
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        balance: Money,
        /// Annual rate in percent, e.g. 19.99
        #[arg(long)]
        apr: Option<Decimal>,
        #[arg(long)]
        min_payment: Option<Money>,
        #[arg(long)]
        due_day: Option<u8>,
    },
    List,
    /// Order debts and project the payoff
    Plan {
        #[arg(long, default_value = "avalanche")]
        strategy: PayoffStrategy,
        /// Paid on top of the minimums each month
        #[arg(long, default_value = "0")]
        extra: Money,
    },
}

#[derive(Subcommand, Debug)]
enum BackupCommand {
    Export { file: PathBuf },
    Import { file: PathBuf },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write config.toml with default values
    Init,
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let data_dir = config::resolve_data_dir(cli.data_dir)?;
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("create data directory {}", data_dir.display()))?;

    if let Command::Config { command } = &cli.command {
        return match command {
            ConfigCommand::Init => config::init_config(&data_dir),
            ConfigCommand::Show => commands::show_config(&data_dir),
        };
    }

    let config = config::load_config(&data_dir)?;
    let db_path = data_dir.join("billcal.db");
    let db = billcal_storage::create_db(&db_path)
        .await
        .with_context(|| format!("open database {}", db_path.display()))?;
    let state = AppState { db, config };

    match cli.command {
        Command::Schedule { command } => match command {
            ScheduleCommand::Add {
                name,
                entry_type,
                amount,
                start,
                frequency,
                interval,
                end,
                category,
                debt,
                notes,
            } => {
                let mut schedule = billcal_core::Schedule::new(&name, entry_type, amount, start, frequency)
                    .with_interval(interval)
                    .with_category(&category);
                schedule.end_date = end;
                schedule.linked_debt_account_id = debt.map(billcal_core::DebtAccountId);
                schedule.notes = notes;
                commands::add_schedule(&state, schedule).await?;
            }
            ScheduleCommand::List => commands::list_schedules(&state).await?,
            ScheduleCommand::Regenerate { id, from, months } => {
                commands::regenerate_schedule(&state, id, from, months).await?
            }
            ScheduleCommand::Delete { id } => commands::delete_schedule(&state, id).await?,
        },

        Command::Upcoming { days } => commands::upcoming(&state, days).await?,

        Command::Occurrence { command } => match command {
            OccurrenceCommand::Pay { id, amount, date } => {
                commands::pay_occurrence(&state, id, amount, date).await?
            }
            OccurrenceCommand::Skip { id } => commands::skip_occurrence(&state, id).await?,
            OccurrenceCommand::Snooze { id, days } => {
                let days = days.unwrap_or(state.config.snooze_days);
                commands::snooze_occurrence(&state, id, days).await?
            }
            OccurrenceCommand::Move { id, date } => commands::move_occurrence(&state, id, date).await?,
        },

        Command::Import {
            file,
            source,
            maps,
            remember,
            sets,
            learn,
            commit,
            delimiter,
            quoting,
        } => {
            let request = commands::ImportRequest {
                source: source.unwrap_or(state.config.default_source),
                maps,
                remember,
                sets,
                learn,
                commit,
                delimiter: u8::try_from(delimiter).context("delimiter must be a single ASCII character")?,
                quoting,
            };
            commands::import_statement(&state, &file, request).await?
        }

        Command::Batches { show } => match show {
            Some(id) => commands::show_batch(&state, id).await?,
            None => commands::list_batches(&state).await?,
        },

        Command::Rules { command } => match command {
            RulesCommand::Add {
                pattern,
                category,
                match_type,
                profile,
                priority,
            } => {
                let mut rule = billcal_import::CategoryRule::new(&pattern, match_type, &category, priority);
                rule.profile = profile;
                commands::add_rule(&state, rule).await?
            }
            RulesCommand::Learn {
                description,
                category,
                profile,
            } => {
                let rule = billcal_import::learn_rule(&description, &category, profile.as_deref());
                commands::add_rule(&state, rule).await?
            }
            RulesCommand::List => commands::list_rules(&state).await?,
            RulesCommand::Load { file } => commands::load_rules(&state, &file).await?,
            RulesCommand::Delete { id } => commands::delete_rule(&state, id).await?,
        },

        Command::Debts { command } => match command {
            DebtsCommand::Add {
                name,
                balance,
                apr,
                min_payment,
                due_day,
            } => {
                let mut debt = billcal_core::DebtAccount::new(&name, balance);
                debt.apr = apr;
                debt.min_payment = min_payment;
                debt.due_day = due_day;
                commands::add_debt(&state, debt).await?
            }
            DebtsCommand::List => commands::list_debts(&state).await?,
            DebtsCommand::Plan { strategy, extra } => commands::plan_debts(&state, strategy, extra).await?,
        },

        Command::Backup { command } => match command {
            BackupCommand::Export { file } => commands::export_backup(&state, &file).await?,
            BackupCommand::Import { file } => commands::import_backup(&state, &file).await?,
        },

        Command::Config { .. } => {}
    }

    Ok(())
}
