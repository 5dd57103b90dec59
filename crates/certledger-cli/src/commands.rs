use anyhow::Context;
use certledger_registry::{open_registry, Dispatcher, RegistryConfig, Transaction};
use colored::Colorize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    init_tracing(&config, cli.verbose);

    let format = cli.format;
    let (tx, args) = invocation(cli.command);
    let payload = execute(&config, &tx, &args)?;
    render(format, &tx, &args, &payload)
}

/// Config from `--config` (or defaults), with `--data-dir` applied.
///
/// Without a config file the journal backend is used so state persists
/// between invocations.
fn load_config(cli: &Cli) -> anyhow::Result<RegistryConfig> {
    let config = match &cli.config {
        Some(path) => RegistryConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => {
            let defaults = RegistryConfig::default();
            let dir = defaults.storage.data_dir.clone();
            defaults.with_data_dir(dir)
        }
    };
    Ok(match &cli.data_dir {
        Some(dir) => config.with_data_dir(dir.clone()),
        None => config,
    })
}

fn init_tracing(config: &RegistryConfig, verbose: bool) {
    let level = if verbose { "debug" } else { config.logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// The transaction name and positional arguments a subcommand stands for.
fn invocation(command: Command) -> (String, Vec<String>) {
    let (tx, args) = match command {
        Command::Init => (Transaction::InitLedger, vec![]),
        Command::Issue(a) => {
            let mut args = vec![
                a.id,
                a.organization,
                a.document_type,
                a.document_name,
                a.student_name,
                a.issue_date,
                a.image_hash,
                a.owner,
            ];
            args.extend(a.grade);
            (Transaction::IssueDocument, args)
        }
        Command::Read(a) => (Transaction::ReadDocument, vec![a.id]),
        Command::Update(a) => {
            let mut args = vec![a.id, a.owner];
            args.extend(a.set);
            (Transaction::UpdateDocument, args)
        }
        Command::Delete(a) => (Transaction::DeleteDocument, vec![a.id]),
        Command::Exists(a) => (Transaction::DocumentExists, vec![a.id]),
        Command::List => (Transaction::GetAllDocuments, vec![]),
        Command::History(a) => (Transaction::GetDocumentHistory, vec![a.id]),
        Command::Invoke(a) => return (a.name, a.args),
    };
    (tx.name().to_string(), args)
}

fn execute(config: &RegistryConfig, tx: &str, args: &[String]) -> anyhow::Result<String> {
    debug!(tx, argc = args.len(), backend = ?config.storage.backend, "executing");
    let registry = open_registry(config).context("opening registry")?;
    let dispatcher = Dispatcher::new(registry);
    Ok(dispatcher.invoke(tx, args)?)
}

fn render(format: OutputFormat, tx: &str, args: &[String], payload: &str) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        println!("{payload}");
        return Ok(());
    }

    let id = args.first().map(String::as_str).unwrap_or_default();
    match tx.parse::<Transaction>() {
        Ok(Transaction::DeleteDocument) => {
            println!("{} Deleted {}", "✓".green().bold(), id.yellow());
        }
        Ok(Transaction::DocumentExists) => {
            if payload == "true" {
                println!("{} {} exists", "✓".green().bold(), id.yellow());
            } else {
                println!("{} {} does not exist", "✗".red().bold(), id.yellow());
            }
        }
        _ => {
            println!("{} {}", "✓".green().bold(), tx.bold());
            match serde_json::from_str::<serde_json::Value>(payload) {
                Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                Err(_) => println!("{payload}"),
            }
        }
    }
    Ok(())
}
