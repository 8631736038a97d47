//! CLI definition and dispatch.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::closer::PositionCloser;
use crate::domain::config_validation::validate_config;
use crate::domain::error::TradelogError;
use crate::domain::ledger;
use crate::domain::metrics::{PortfolioStats, ProfitFactor, SymbolStats};
use crate::domain::portfolio::{NewPortfolio, Portfolio, PortfolioUpdate};
use crate::domain::trade::{
    parse_timestamp, Direction, NewTrade, PortfolioId, TradeId, TradeRecord, TradeStatus,
};
use crate::ports::config_port::ConfigPort;
use crate::ports::trade_store::TradeStore;

#[derive(Parser, Debug)]
#[command(name = "tradelog", about = "Trade journal and performance statistics")]
pub struct Cli {
    /// INI configuration file
    #[arg(short, long, global = true, default_value = "tradelog.ini")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the database schema
    Init,
    /// Manage portfolios
    #[command(subcommand)]
    Portfolio(PortfolioCommand),
    /// Record, close and inspect trades
    #[command(subcommand)]
    Trade(TradeCommand),
    /// Show performance statistics for a portfolio
    Stats {
        #[arg(long)]
        portfolio: PortfolioId,
        /// Emit JSON instead of a text summary
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum PortfolioCommand {
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, default_value_t = 0.0)]
        initial_balance: f64,
    },
    List,
    /// Change name, description or initial balance; an empty description clears it
    Update {
        #[arg(long)]
        id: PortfolioId,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        initial_balance: Option<f64>,
    },
    Delete {
        #[arg(long)]
        id: PortfolioId,
    },
}

#[derive(Subcommand, Debug)]
pub enum TradeCommand {
    /// Record a new open trade
    Open {
        #[arg(long)]
        portfolio: PortfolioId,
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        direction: Direction,
        #[arg(long)]
        quantity: f64,
        #[arg(long)]
        entry_price: f64,
        /// Entry timestamp, defaults to now
        #[arg(long)]
        entry_time: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        tags: Option<String>,
    },
    /// Close an open trade and compute its profit/loss
    Close {
        #[arg(long)]
        id: TradeId,
        #[arg(long)]
        exit_price: f64,
        /// Exit timestamp, defaults to now
        #[arg(long)]
        exit_time: Option<String>,
    },
    List {
        #[arg(long)]
        portfolio: PortfolioId,
        #[arg(long)]
        status: Option<TradeStatus>,
    },
    /// Print every field of one trade
    Show {
        #[arg(long)]
        id: TradeId,
    },
    /// Replace notes and/or tags; an empty value clears the field
    Annotate {
        #[arg(long)]
        id: TradeId,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        tags: Option<String>,
    },
    Delete {
        #[arg(long)]
        id: TradeId,
    },
    /// Import trades from a CSV journal
    Import {
        #[arg(long)]
        portfolio: PortfolioId,
        #[arg(long)]
        file: PathBuf,
    },
}

/// An opened store plus the closing policy read from config.
pub struct Session {
    pub store: Box<dyn TradeStore>,
    pub closer: PositionCloser,
}

pub fn run(cli: Cli) -> ExitCode {
    let result = open_session(&cli.config).and_then(|session| {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        execute(cli.command, &session, &mut out)
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, TradelogError> {
    let adapter =
        FileConfigAdapter::from_file(path).map_err(|e| TradelogError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        })?;
    validate_config(&adapter)?;
    Ok(adapter)
}

pub fn build_position_closer(config: &dyn ConfigPort) -> PositionCloser {
    PositionCloser {
        require_exit_after_entry: config.get_bool("journal", "require_exit_after_entry", false),
    }
}

pub fn open_session(config_path: &Path) -> Result<Session, TradelogError> {
    eprintln!("Loading config from {}", config_path.display());
    let config = load_config(config_path)?;
    Ok(Session {
        store: open_store(&config)?,
        closer: build_position_closer(&config),
    })
}

#[cfg(feature = "sqlite")]
fn open_store(config: &dyn ConfigPort) -> Result<Box<dyn TradeStore>, TradelogError> {
    use crate::adapters::sqlite_adapter::SqliteTradeStore;

    let store = SqliteTradeStore::from_config(config)?;
    store.initialize_schema()?;
    Ok(Box::new(store))
}

#[cfg(not(feature = "sqlite"))]
fn open_store(_config: &dyn ConfigPort) -> Result<Box<dyn TradeStore>, TradelogError> {
    Err(TradelogError::Database {
        reason: "sqlite feature is required for a trade store".into(),
    })
}

fn timestamp_or_now(field: &str, value: Option<&str>) -> Result<DateTime<Utc>, TradelogError> {
    match value {
        Some(v) => parse_timestamp(field, v),
        None => Ok(Utc::now()),
    }
}

pub fn execute(
    command: Command,
    session: &Session,
    out: &mut dyn Write,
) -> Result<(), TradelogError> {
    let store = session.store.as_ref();
    match command {
        Command::Init => {
            eprintln!("Schema ready");
            Ok(())
        }
        Command::Portfolio(cmd) => execute_portfolio(cmd, store, out),
        Command::Trade(cmd) => execute_trade(cmd, session, out),
        Command::Stats { portfolio, json } => {
            let report = ledger::portfolio_report(store, portfolio)?;
            if json {
                write_stats_json(&report, out)
            } else {
                write_stats_text(&report, out)
            }
        }
    }
}

fn execute_portfolio(
    command: PortfolioCommand,
    store: &dyn TradeStore,
    out: &mut dyn Write,
) -> Result<(), TradelogError> {
    match command {
        PortfolioCommand::Create {
            name,
            description,
            initial_balance,
        } => {
            let portfolio = store.create_portfolio(&NewPortfolio {
                name,
                description,
                initial_balance,
            })?;
            writeln!(out, "portfolio {} created: {}", portfolio.id, portfolio.name)?;
        }
        PortfolioCommand::List => {
            let portfolios = store.list_portfolios()?;
            if portfolios.is_empty() {
                eprintln!("No portfolios found");
            }
            for p in &portfolios {
                writeln!(
                    out,
                    "{}\t{}\t{:.2}\t{}",
                    p.id,
                    p.name,
                    p.initial_balance,
                    p.description.as_deref().unwrap_or("")
                )?;
            }
        }
        PortfolioCommand::Update {
            id,
            name,
            description,
            initial_balance,
        } => {
            let update = PortfolioUpdate {
                name,
                description,
                initial_balance,
            };
            let p = ledger::update_portfolio(store, id, &update)?;
            writeln!(
                out,
                "portfolio {} updated: {} ({:.2})",
                p.id, p.name, p.initial_balance
            )?;
        }
        PortfolioCommand::Delete { id } => {
            if !store.delete_portfolio(id)? {
                return Err(TradelogError::NotFound {
                    entity: "portfolio",
                    id,
                });
            }
            writeln!(out, "portfolio {id} deleted")?;
        }
    }
    Ok(())
}

fn execute_trade(
    command: TradeCommand,
    session: &Session,
    out: &mut dyn Write,
) -> Result<(), TradelogError> {
    let store = session.store.as_ref();
    match command {
        TradeCommand::Open {
            portfolio,
            symbol,
            direction,
            quantity,
            entry_price,
            entry_time,
            notes,
            tags,
        } => {
            let trade = ledger::open_trade(
                store,
                NewTrade {
                    portfolio_id: portfolio,
                    symbol,
                    direction,
                    quantity,
                    entry_price,
                    entry_time: timestamp_or_now("entry_time", entry_time.as_deref())?,
                    notes,
                    tags,
                },
            )?;
            writeln!(
                out,
                "trade {} opened: {} {} {} @ {:.2}",
                trade.id(),
                trade.direction(),
                trade.quantity(),
                trade.symbol(),
                trade.entry_price()
            )?;
        }
        TradeCommand::Close {
            id,
            exit_price,
            exit_time,
        } => {
            let exit_time = timestamp_or_now("exit_time", exit_time.as_deref())?;
            let trade = ledger::close_trade(store, &session.closer, id, exit_price, exit_time)?;
            writeln!(
                out,
                "trade {} closed: P&L {:.2} ({:.2}%)",
                trade.id(),
                trade.profit_loss().unwrap_or_default(),
                trade.profit_loss_percent().unwrap_or_default()
            )?;
        }
        TradeCommand::List { portfolio, status } => {
            ledger::require_portfolio(store, portfolio)?;
            let trades = store.list_trades(portfolio, status)?;
            writeln!(
                out,
                "id\tsymbol\tdirection\tstatus\tquantity\tentry\texit\tp&l\tp&l%"
            )?;
            for trade in &trades {
                write_trade_row(trade, out)?;
            }
            eprintln!("{} trades", trades.len());
        }
        TradeCommand::Show { id } => {
            let trade = ledger::require_trade(store, id)?;
            write_trade_detail(&trade, out)?;
        }
        TradeCommand::Annotate { id, notes, tags } => {
            let trade = ledger::annotate_trade(store, id, notes, tags)?;
            writeln!(
                out,
                "trade {} notes: {} tags: {}",
                trade.id(),
                trade.notes().unwrap_or("-"),
                trade.tags().unwrap_or("-")
            )?;
        }
        TradeCommand::Delete { id } => {
            ledger::delete_trade(store, id)?;
            writeln!(out, "trade {id} deleted")?;
        }
        TradeCommand::Import { portfolio, file } => {
            eprintln!("Importing trades from {}", file.display());
            let rows = csv_adapter::read_trades_from_path(&file, portfolio)?;
            let summary = ledger::import_trades(store, &session.closer, portfolio, rows)?;
            writeln!(
                out,
                "imported {} trades ({} closed)",
                summary.opened, summary.closed
            )?;
        }
    }
    Ok(())
}

fn write_trade_row(trade: &TradeRecord, out: &mut dyn Write) -> Result<(), TradelogError> {
    let optional = |v: Option<f64>| v.map(|x| format!("{x:.2}")).unwrap_or_else(|| "-".into());
    writeln!(
        out,
        "{}\t{}\t{}\t{}\t{}\t{:.2}\t{}\t{}\t{}",
        trade.id(),
        trade.symbol(),
        trade.direction(),
        trade.status(),
        trade.quantity(),
        trade.entry_price(),
        optional(trade.exit_price()),
        optional(trade.profit_loss()),
        optional(trade.profit_loss_percent())
    )?;
    Ok(())
}

fn write_trade_detail(trade: &TradeRecord, out: &mut dyn Write) -> Result<(), TradelogError> {
    let optional = |v: Option<f64>| v.map(|x| format!("{x:.2}")).unwrap_or_else(|| "-".into());
    let tags = trade.tag_list();

    writeln!(out, "id:          {}", trade.id())?;
    writeln!(out, "portfolio:   {}", trade.portfolio_id())?;
    writeln!(out, "symbol:      {}", trade.symbol())?;
    writeln!(out, "direction:   {}", trade.direction())?;
    writeln!(out, "status:      {}", trade.status())?;
    writeln!(out, "quantity:    {}", trade.quantity())?;
    writeln!(out, "entry price: {:.2}", trade.entry_price())?;
    writeln!(out, "entry time:  {}", trade.entry_time().to_rfc3339())?;
    writeln!(out, "exit price:  {}", optional(trade.exit_price()))?;
    writeln!(
        out,
        "exit time:   {}",
        trade
            .exit_time()
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".into())
    )?;
    writeln!(out, "p&l:         {}", optional(trade.profit_loss()))?;
    writeln!(out, "p&l %:       {}", optional(trade.profit_loss_percent()))?;
    writeln!(out, "notes:       {}", trade.notes().unwrap_or("-"))?;
    writeln!(
        out,
        "tags:        {}",
        if tags.is_empty() { "-".to_string() } else { tags.join(", ") }
    )?;
    Ok(())
}

fn format_profit_factor(pf: ProfitFactor) -> String {
    match pf {
        ProfitFactor::Ratio(r) => format!("{r:.2}"),
        ProfitFactor::Undefined => "n/a (no losses)".to_string(),
    }
}

fn write_stats_text(
    report: &ledger::PortfolioReport,
    out: &mut dyn Write,
) -> Result<(), TradelogError> {
    let stats = &report.stats;
    writeln!(out, "=== {} ===", report.portfolio.name)?;
    writeln!(out, "Initial Balance:  {:.2}", report.portfolio.initial_balance)?;
    writeln!(out, "Open Trades:      {}", report.open_trades.len())?;
    writeln!(out, "Closed Trades:    {}", stats.total_trades)?;
    writeln!(out, "Total P&L:        {:.2}", stats.total_profit_loss)?;
    writeln!(out, "Win Rate:         {:.2}%", stats.win_rate)?;
    writeln!(out, "Wins / Losses:    {} / {}", stats.total_wins, stats.total_losses)?;
    writeln!(out, "Average P&L:      {:.2}", stats.average_profit_loss)?;
    writeln!(out, "Average Win:      {:.2}", stats.average_win)?;
    writeln!(out, "Average Loss:     {:.2}", stats.average_loss)?;
    writeln!(
        out,
        "Profit Factor:    {}",
        format_profit_factor(stats.profit_factor)
    )?;
    if let (Some(best), Some(worst)) = (&stats.best_trade, &stats.worst_trade) {
        writeln!(
            out,
            "Best Trade:       #{} {} {:.2}",
            best.id, best.symbol, best.profit_loss
        )?;
        writeln!(
            out,
            "Worst Trade:      #{} {} {:.2}",
            worst.id, worst.symbol, worst.profit_loss
        )?;
    }

    if !report.by_symbol.is_empty() {
        writeln!(out, "\n=== Per-Symbol Summary ===")?;
        for s in &report.by_symbol {
            let pnl_sign = if s.total_profit_loss >= 0.0 { "+" } else { "" };
            writeln!(
                out,
                "  {}:  {} trades, {:.1}% win rate, {}{:.2}",
                s.symbol, s.total_trades, s.win_rate, pnl_sign, s.total_profit_loss
            )?;
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct StatsJson<'a> {
    portfolio: &'a Portfolio,
    open_trades: usize,
    stats: &'a PortfolioStats,
    symbols: &'a [SymbolStats],
}

fn write_stats_json(
    report: &ledger::PortfolioReport,
    out: &mut dyn Write,
) -> Result<(), TradelogError> {
    let view = StatsJson {
        portfolio: &report.portfolio,
        open_trades: report.open_trades.len(),
        stats: &report.stats,
        symbols: &report.by_symbol,
    };
    serde_json::to_writer_pretty(&mut *out, &view).map_err(io::Error::from)?;
    writeln!(out)?;
    Ok(())
}
