use std::fmt;
use std::str::FromStr;

use certledger_history::HistoryLog;
use certledger_store::RecordStore;
use tracing::debug;

use crate::error::{RegistryError, RegistryResult};
use crate::registry::{DocumentPatch, NewDocument, Registry};

/// The named transactions a [`Dispatcher`] accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Transaction {
    InitLedger,
    IssueDocument,
    ReadDocument,
    UpdateDocument,
    DeleteDocument,
    DocumentExists,
    GetAllDocuments,
    GetDocumentHistory,
}

impl Transaction {
    pub const ALL: [Transaction; 8] = [
        Self::InitLedger,
        Self::IssueDocument,
        Self::ReadDocument,
        Self::UpdateDocument,
        Self::DeleteDocument,
        Self::DocumentExists,
        Self::GetAllDocuments,
        Self::GetDocumentHistory,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::InitLedger => "InitLedger",
            Self::IssueDocument => "IssueDocument",
            Self::ReadDocument => "ReadDocument",
            Self::UpdateDocument => "UpdateDocument",
            Self::DeleteDocument => "DeleteDocument",
            Self::DocumentExists => "DocumentExists",
            Self::GetAllDocuments => "GetAllDocuments",
            Self::GetDocumentHistory => "GetDocumentHistory",
        }
    }

    /// Argument synopsis, for usage messages.
    pub fn usage(self) -> &'static str {
        match self {
            Self::InitLedger | Self::GetAllDocuments => "",
            Self::IssueDocument => {
                "<id> <organization> <documentType> <documentName> <studentName> \
                 <issueDate> <imageHash> <owner> [grade]"
            }
            Self::UpdateDocument => "<id> <owner> [field=value ...]",
            Self::ReadDocument
            | Self::DeleteDocument
            | Self::DocumentExists
            | Self::GetDocumentHistory => "<id>",
        }
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Transaction {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tx| tx.name() == s)
            .ok_or_else(|| RegistryError::UnknownTransaction(s.to_string()))
    }
}

/// Runs named transactions with positional string arguments against a
/// registry and returns each result as a JSON string.
///
/// Payloads are canonically encoded, so the same ledger state always
/// produces the same bytes.
pub struct Dispatcher<S, H> {
    registry: Registry<S, H>,
}

impl<S: RecordStore, H: HistoryLog> Dispatcher<S, H> {
    pub fn new(registry: Registry<S, H>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Registry<S, H> {
        &self.registry
    }

    /// Run transaction `name` with `args`.
    pub fn invoke(&self, name: &str, args: &[String]) -> RegistryResult<String> {
        let tx: Transaction = name.parse()?;
        debug!(tx = %tx, argc = args.len(), "invoke");

        match tx {
            Transaction::InitLedger => {
                arity(tx, args, 0)?;
                encode(&self.registry.seed()?)
            }
            Transaction::IssueDocument => {
                if !(8..=9).contains(&args.len()) {
                    return Err(usage_error(tx, args.len()));
                }
                let doc = NewDocument {
                    id: args[0].clone(),
                    organization: args[1].clone(),
                    document_type: args[2].clone(),
                    document_name: args[3].clone(),
                    student_name: args[4].clone(),
                    issue_date: args[5].clone(),
                    image_hash: args[6].clone(),
                    owner: args[7].clone(),
                    grade: args.get(8).cloned(),
                };
                encode(&self.registry.issue(doc)?)
            }
            Transaction::ReadDocument => {
                arity(tx, args, 1)?;
                encode(&self.registry.read(&args[0])?)
            }
            Transaction::UpdateDocument => {
                if args.len() < 2 {
                    return Err(usage_error(tx, args.len()));
                }
                let mut patch = DocumentPatch::new(args[1].clone());
                for pair in &args[2..] {
                    let (field, value) = pair.split_once('=').ok_or_else(|| {
                        RegistryError::InvalidArgument(format!(
                            "expected field=value, got {pair:?}"
                        ))
                    })?;
                    patch.set(field, value)?;
                }
                encode(&self.registry.update(&args[0], patch)?)
            }
            Transaction::DeleteDocument => {
                arity(tx, args, 1)?;
                self.registry.delete(&args[0])?;
                Ok(String::new())
            }
            Transaction::DocumentExists => {
                arity(tx, args, 1)?;
                Ok(self.registry.exists(&args[0])?.to_string())
            }
            Transaction::GetAllDocuments => {
                arity(tx, args, 0)?;
                encode(&self.registry.list_all()?)
            }
            Transaction::GetDocumentHistory => {
                arity(tx, args, 1)?;
                encode(&self.registry.history(&args[0])?)
            }
        }
    }
}

fn arity(tx: Transaction, args: &[String], expected: usize) -> RegistryResult<()> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(usage_error(tx, args.len()))
    }
}

fn usage_error(tx: Transaction, got: usize) -> RegistryError {
    RegistryError::InvalidArgument(format!(
        "{tx} takes {}, got {got} argument(s)",
        match tx.usage() {
            "" => "no arguments",
            usage => usage,
        }
    ))
}

fn encode<T: serde::Serialize + ?Sized>(value: &T) -> RegistryResult<String> {
    let bytes = certledger_codec::encode(value)?;
    // serde_json only ever emits UTF-8.
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
