use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use kira_geo_explorer::app::{App, FetchResult};
use kira_geo_explorer::config::{ConfigLoader, Overrides, ResolvedConfig};
use kira_geo_explorer::error::KiraError;
use kira_geo_explorer::eutils::EutilsHttpClient;
use kira_geo_explorer::output::{
    CsvOutput, DEFAULT_EXPORT_FILE, JsonOutput, OutputMode, TextOutput, status_line,
};
use kira_geo_explorer::session::SessionTable;
use kira_geo_explorer::table::{ColumnFilter, ResultTable, TableFilter};
use kira_geo_explorer::tui::Tui;

#[derive(Parser)]
#[command(name = "kira-geo")]
#[command(about = "Explore NCBI GEO DataSets and export study descriptors as CSV")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Search GEO, extract descriptors and write the table")]
    Fetch(FetchArgs),
    #[command(about = "Search GEO and browse the table interactively")]
    Browse(SearchArgs),
    #[command(about = "Show the active extraction rules")]
    Rules(RulesArgs),
}

#[derive(Args, Clone, Default)]
struct SearchArgs {
    /// Free-text search term, e.g. "single-cell RNA-seq".
    term: Option<String>,

    #[arg(long)]
    retmax: Option<u32>,

    #[arg(long)]
    chunk_size: Option<usize>,

    #[arg(long)]
    delay_ms: Option<u64>,

    /// Keep rows whose summary contains TEXT (case-insensitive).
    #[arg(long)]
    filter: Option<String>,

    /// Keep rows where COLUMN equals VALUE; repeatable.
    #[arg(long = "where", value_name = "COLUMN=VALUE")]
    column_filters: Vec<String>,
}

#[derive(Args, Clone)]
struct FetchArgs {
    #[command(flatten)]
    search: SearchArgs,

    /// Destination for the CSV export; `-` for stdout.
    #[arg(long)]
    csv: Option<Utf8PathBuf>,

    #[arg(long)]
    json: bool,
}

#[derive(Args, Clone)]
struct RulesArgs {
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(kira) = report.downcast_ref::<KiraError>() {
            return ExitCode::from(map_exit_code(kira));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &KiraError) -> u8 {
    match error {
        KiraError::InvalidQuery(_)
        | KiraError::InvalidRetmax(_)
        | KiraError::InvalidRecordId(_)
        | KiraError::InvalidChunkSize(_)
        | KiraError::InvalidRule { .. }
        | KiraError::InvalidFilter(_)
        | KiraError::ConfigRead(_)
        | KiraError::ConfigParse(_) => 2,
        err if err.is_remote() => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };
    let config = cli.config.as_deref();

    match cli.command {
        Some(Commands::Fetch(args)) => run_fetch(args, config, output_mode),
        Some(Commands::Browse(args)) => match output_mode {
            OutputMode::Interactive => run_browse(args, config),
            OutputMode::NonInteractive => Err(miette::Report::msg(
                "browse needs a terminal (use `kira-geo fetch` with --non-interactive)",
            )),
        },
        Some(Commands::Rules(args)) => {
            let resolved = ConfigLoader::resolve(config, &Overrides::default())?;
            if args.json {
                JsonOutput::print_rules(&resolved.rules).into_diagnostic()?;
            } else {
                TextOutput::print_rules(&resolved.rules).into_diagnostic()?;
            }
            Ok(())
        }
        None => match output_mode {
            OutputMode::Interactive => run_browse(SearchArgs::default(), config),
            OutputMode::NonInteractive => Err(miette::Report::msg(
                "command required (try `kira-geo --help`)",
            )),
        },
    }
}

fn resolve(args: &SearchArgs, config: Option<&str>) -> miette::Result<(ResolvedConfig, TableFilter)> {
    let overrides = Overrides {
        term: args.term.clone(),
        retmax: args.retmax,
        chunk_size: args.chunk_size,
        delay_ms: args.delay_ms,
    };
    let resolved = ConfigLoader::resolve(config, &overrides)?;
    let columns = args
        .column_filters
        .iter()
        .map(|value| value.parse::<ColumnFilter>())
        .collect::<Result<Vec<_>, KiraError>>()?;
    let filter = TableFilter {
        text: args.filter.clone(),
        columns,
    };
    filter.check_columns(&ResultTable::new(resolved.rules.columns()).header())?;
    Ok((resolved, filter))
}

fn build_app(resolved: &ResolvedConfig) -> miette::Result<App<EutilsHttpClient>> {
    let client = EutilsHttpClient::new(&resolved.eutils)?;
    Ok(App::new(client, resolved.batch, resolved.rules.clone()))
}

fn run_fetch(args: FetchArgs, config: Option<&str>, output_mode: OutputMode) -> miette::Result<()> {
    let (resolved, filter) = resolve(&args.search, config)?;
    let app = build_app(&resolved)?;
    let query = resolved.query.clone();

    let result = match output_mode {
        OutputMode::NonInteractive => app.fetch(&query, &JsonOutput)?,
        OutputMode::Interactive => {
            let mut tui = Tui::new();
            let query = query.clone();
            tui.run(move |sink| app.fetch(&query, sink))?
        }
    };

    let mut session = SessionTable::new();
    session.replace(query, result.table.clone());
    let view = session.view(&filter)?;

    let destination = args
        .csv
        .clone()
        .or_else(|| (!args.json).then(|| Utf8PathBuf::from(DEFAULT_EXPORT_FILE)));
    if let Some(path) = &destination {
        CsvOutput::write(&view, path)?;
    }

    if args.json {
        JsonOutput::print_fetch(&result, view.len()).into_diagnostic()?;
    } else {
        print_fetch_summary(&result, view.len(), destination.as_ref());
    }
    Ok(())
}

fn run_browse(args: SearchArgs, config: Option<&str>) -> miette::Result<()> {
    let (resolved, filter) = resolve(&args, config)?;
    let app = build_app(&resolved)?;
    let query = resolved.query.clone();

    let mut tui = Tui::new();
    let fetch_query = query.clone();
    let result = tui.run(move |sink| app.fetch(&fetch_query, sink))?;

    let mut session = SessionTable::new();
    session.replace(query, result.table.clone());
    let filter = tui.browse(&session, Utf8PathBuf::from(DEFAULT_EXPORT_FILE), filter)?;

    let view = session.view(&filter)?;
    print_fetch_summary(&result, view.len(), None);
    Ok(())
}

fn print_fetch_summary(result: &FetchResult, filtered_rows: usize, csv: Option<&Utf8PathBuf>) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let reset = "\x1b[0m";

    eprintln!("{cyan}KIRA-GEO summary for \"{}\"{reset}", result.term);
    eprintln!("{green}{}{reset}", status_line(result, filtered_rows));
    for failure in &result.failed_chunks {
        eprintln!(
            "{yellow}  chunk {} skipped ({} ids): {}{reset}",
            failure.index + 1,
            failure.ids.len(),
            failure.reason
        );
    }
    match csv {
        Some(path) if path.as_str() == "-" => {}
        Some(path) => eprintln!("{cyan}  csv: {path}{reset}"),
        None => {}
    }
}
