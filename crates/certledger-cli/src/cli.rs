use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "certledger",
    about = "CertLedger: certification document registry with full audit history",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// TOML config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Journal directory; implies the journal backend
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Seed the ledger with the fixture documents
    Init,
    /// Issue a new document
    Issue(IssueArgs),
    /// Show one document
    Read(IdArgs),
    /// Update fields of a document you own
    Update(UpdateArgs),
    /// Delete a document
    Delete(IdArgs),
    /// Check whether a document exists
    Exists(IdArgs),
    /// List every live document
    List,
    /// Show the audit trail of a document
    History(IdArgs),
    /// Run a named transaction with positional arguments
    Invoke(InvokeArgs),
}

#[derive(Args)]
pub struct IdArgs {
    pub id: String,
}

#[derive(Args)]
pub struct IssueArgs {
    pub id: String,
    #[arg(long)]
    pub organization: String,
    #[arg(long)]
    pub document_type: String,
    #[arg(long)]
    pub document_name: String,
    #[arg(long)]
    pub student_name: String,
    #[arg(long)]
    pub issue_date: String,
    #[arg(long)]
    pub image_hash: String,
    #[arg(long)]
    pub owner: String,
    #[arg(long)]
    pub grade: Option<String>,
}

#[derive(Args)]
pub struct UpdateArgs {
    pub id: String,
    /// Owner authorizing the change
    #[arg(long)]
    pub owner: String,
    /// Field to change, as field=value (repeatable)
    #[arg(short, long = "set", value_name = "FIELD=VALUE")]
    pub set: Vec<String>,
}

#[derive(Args)]
pub struct InvokeArgs {
    /// Transaction name, e.g. ReadDocument
    pub name: String,
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}
