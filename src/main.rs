mod check;
mod config;
mod error;
mod model;
mod notifier;
mod source;
mod storage;
mod threshold;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use derive_more::{Display, Error};
use error_stack::{Report, ResultExt};
use tracing::{Instrument, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use check::run_check;
use config::AppConfig;
use model::{Direction, NotificationAttempt, PricePoint, ThresholdSet};
use notifier::email::{EmailChannel, EmailCredentials};
use notifier::terminal::TerminalChannel;
use notifier::whatsapp::{WhatsAppChannel, WhatsAppCredentials};
use notifier::{Channel, FallbackNotifier, Notifier};
use source::PriceSource;
use source::yahoo::YahooSource;
use storage::json_file::JsonFileStore;

#[derive(Debug, Display, Error)]
pub enum AppError {
    #[display("configuration error")]
    Config,
    #[display("price fetch error")]
    Fetch,
    #[display("alert run failed")]
    Run,
    #[display("notification error")]
    Notify,
}

#[derive(Parser)]
#[command(name = "gold-notifier", about = "Gold price threshold notifier")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// State document path; overrides `general.state_file`
    #[arg(long, env = "STATE_FILE")]
    state_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch the price, alert on newly crossed thresholds and save state (default)
    Check {
        /// Log alerts instead of sending them and leave the state file alone
        #[arg(long)]
        dry_run: bool,
    },
    /// Send a test notification with the current price
    Test,
    /// Show or edit the configured thresholds
    Thresholds {
        #[command(subcommand)]
        action: ThresholdAction,
    },
    /// Print recent daily prices against the configured thresholds
    History {
        #[arg(long, default_value_t = 30)]
        days: u32,
    },
}

#[derive(Subcommand)]
enum ThresholdAction {
    List,
    Add {
        #[arg(value_parser = parse_direction)]
        direction: Direction,
        level: f64,
    },
    Remove {
        #[arg(value_parser = parse_direction)]
        direction: Direction,
        level: f64,
    },
}

fn parse_direction(s: &str) -> Result<Direction, String> {
    Direction::from_str(s).ok_or_else(|| format!("expected \"below\" or \"above\", got \"{s}\""))
}

#[tokio::main]
async fn main() {
    if let Err(report) = run().await {
        eprintln!("{report:?}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Report<AppError>> {
    let Cli {
        config: config_path,
        state_file,
        command,
    } = Cli::parse();
    let config = config::load(&config_path).change_context(AppError::Config)?;

    init_tracing(&config);

    let command = command.unwrap_or(Command::Check { dry_run: false });
    let span = tracing::info_span!("run", run_id = %Uuid::new_v4());

    async move {
        match command {
            Command::Check { dry_run } => {
                check_price(&config, state_file.as_deref(), dry_run).await
            }
            Command::Test => send_test(&config).await,
            Command::Thresholds { action } => edit_thresholds(&config_path, &config, action),
            Command::History { days } => history(&config, days).await,
        }
    }
    .instrument(span)
    .await
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::new(&config.general.log_level);
    match config.general.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .init();
        }
        _ => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
}

async fn check_price(
    config: &AppConfig,
    state_file: Option<&Path>,
    dry_run: bool,
) -> Result<(), Report<AppError>> {
    let thresholds = config
        .require_thresholds()
        .change_context(AppError::Config)?;
    info!(below = ?thresholds.below, above = ?thresholds.above, "thresholds loaded");

    let source = YahooSource::new(&config.source).change_context(AppError::Fetch)?;
    let store = JsonFileStore::new(
        state_file
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(&config.general.state_file)),
    );
    let notifier = if dry_run {
        FallbackNotifier::new(config.source.labels(), vec![Box::new(TerminalChannel)])
    } else {
        build_notifier(config)
    };

    let summary = run_check(&source, &store, &notifier, &thresholds, !dry_run)
        .await
        .change_context(AppError::Run)?;

    info!(
        price = summary.price,
        first_run = summary.first_run,
        delivered = summary.delivered,
        failed = summary.failed,
        state_file = %store.path().display(),
        "run complete"
    );
    Ok(())
}

async fn send_test(config: &AppConfig) -> Result<(), Report<AppError>> {
    let source = YahooSource::new(&config.source).change_context(AppError::Fetch)?;
    let price = source.fetch_price().await.change_context(AppError::Fetch)?;

    let notifier = build_notifier(config);
    if !notifier.send(&NotificationAttempt::test(price)).await {
        return Err(Report::new(AppError::Notify).attach("test notification was not delivered"));
    }
    info!(price, "test notification sent");
    Ok(())
}

/// WhatsApp first, email as fallback; channels without credentials are left out.
fn build_notifier(config: &AppConfig) -> FallbackNotifier {
    let mut channels: Vec<Box<dyn Channel>> = Vec::new();

    match WhatsAppCredentials::from_env() {
        Some(credentials) => match WhatsAppChannel::new(&config.notify, credentials) {
            Ok(channel) => channels.push(Box::new(channel)),
            Err(e) => warn!(error = ?e, "whatsapp channel unavailable"),
        },
        None => warn!("CALLMEBOT_PHONE / CALLMEBOT_APIKEY not set, whatsapp disabled"),
    }

    match EmailCredentials::from_env() {
        Some(credentials) => match EmailChannel::new(&config.notify, credentials) {
            Ok(channel) => channels.push(Box::new(channel)),
            Err(e) => warn!(error = ?e, "email channel unavailable"),
        },
        None => warn!("GMAIL_ADDRESS / GMAIL_APP_PASSWORD not set, email disabled"),
    }

    FallbackNotifier::new(config.source.labels(), channels)
}

fn edit_thresholds(
    path: &Path,
    config: &AppConfig,
    action: ThresholdAction,
) -> Result<(), Report<AppError>> {
    let mut set = config.threshold_set();

    let changed = match action {
        ThresholdAction::List => {
            print_thresholds(&set, &config.source.currency);
            return Ok(());
        }
        ThresholdAction::Add { direction, level } => set.insert(direction, level),
        ThresholdAction::Remove { direction, level } => set.remove(direction, level),
    };

    if !changed {
        info!("thresholds unchanged");
        return Ok(());
    }

    config::save_thresholds(path, &set).change_context(AppError::Config)?;
    info!(path = %path.display(), "thresholds saved");
    print_thresholds(&set, &config.source.currency);
    Ok(())
}

fn print_thresholds(set: &ThresholdSet, currency: &str) {
    for level in set.below_descending() {
        println!("below  {level:>10.2} {currency}");
    }
    for level in set.above_ascending() {
        println!("above  {level:>10.2} {currency}");
    }
}

async fn history(config: &AppConfig, days: u32) -> Result<(), Report<AppError>> {
    let source = YahooSource::new(&config.source).change_context(AppError::Fetch)?;
    let points = source
        .fetch_history(days)
        .await
        .change_context(AppError::Fetch)?;

    let thresholds = config.threshold_set();
    for point in &points {
        println!("{}", history_line(point, &thresholds, &config.source.currency));
    }
    Ok(())
}

/// One row of the history table: the day's price and every level it is past.
fn history_line(point: &PricePoint, thresholds: &ThresholdSet, currency: &str) -> String {
    let mut line = format!("{}  {:>10.2} {currency}", point.date, point.price);
    for level in thresholds.below_descending() {
        if point.price < level {
            line.push_str(&format!("  <{level:.0}"));
        }
    }
    for level in thresholds.above_ascending() {
        if point.price > level {
            line.push_str(&format!("  >{level:.0}"));
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn cli_defaults_to_check() {
        let cli = Cli::try_parse_from(["gold-notifier"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.config, PathBuf::from("config.toml"));
    }

    #[test]
    fn cli_parses_threshold_edit() {
        let cli = Cli::try_parse_from(["gold-notifier", "thresholds", "add", "below", "3500"]).unwrap();
        match cli.command {
            Some(Command::Thresholds {
                action: ThresholdAction::Add { direction, level },
            }) => {
                assert_eq!(direction, Direction::Below);
                assert_eq!(level, 3500.0);
            }
            _ => panic!("unexpected command"),
        }
    }

    #[test]
    fn cli_rejects_unknown_direction() {
        assert!(Cli::try_parse_from(["gold-notifier", "thresholds", "add", "test", "1"]).is_err());
    }

    #[test]
    fn history_line_marks_crossed_levels() {
        let point = PricePoint {
            date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            price: 3850.0,
        };
        let thresholds = ThresholdSet {
            below: vec![3800.0, 3900.0, 4000.0],
            above: vec![3500.0, 4500.0],
        };
        let line = history_line(&point, &thresholds, "EUR");
        assert_eq!(line, "2026-03-02     3850.00 EUR  <4000  <3900  >3500");
    }
}
