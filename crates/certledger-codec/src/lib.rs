//! Canonical encoding for CertLedger.
//!
//! Every record is persisted as canonical JSON: object keys sorted at every
//! depth, no insignificant whitespace, UTF-8. Two encodings of equal content
//! are byte-identical regardless of how the value was built, so stored bytes
//! can be hashed, compared, and diffed directly.
//!
//! - [`encode`] / [`decode`] -- canonical bytes to and from typed values
//! - [`canonicalize`] -- the recursive key sort on a [`serde_json::Value`]
//! - [`ContentDigest`] -- domain-separated BLAKE3 digest of canonical bytes

pub mod canonical;
pub mod digest;
pub mod error;

pub use canonical::{canonicalize, decode, encode, encode_value};
pub use digest::{ContentDigest, DigestHasher};
pub use error::{CodecError, CodecResult};
