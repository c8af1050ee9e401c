//! Resume state of a paginated search and its page-token codec.
//!
//! A page token is `base64url(version || bincode(fingerprint, descriptor))`.
//! The fingerprint binds a token to the catalog that issued it.

use crate::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use bincode::Options;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

const TOKEN_VERSION: u8 = 1;

/// Upper bound on a decoded token payload.
const TOKEN_LIMIT: u64 = 1 << 20;

/// SHA-256 digest identifying one catalog build.
pub type Fingerprint = [u8; 32];

/// Where one file's scan continues: seek to `(sequence_name, start)`, then
/// pass over `skip` records sharing exactly that coordinate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumePosition {
    pub sequence_name: String,
    pub start: u64,
    pub skip: u64,
}

impl ResumePosition {
    pub fn new(sequence_name: impl Into<String>, start: u64, skip: u64) -> Self {
        Self {
            sequence_name: sequence_name.into(),
            start,
            skip,
        }
    }
}

/// Per-file resume positions plus the bounds of the searched range.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryDescriptor {
    pub starts: BTreeMap<PathBuf, ResumePosition>,
    /// Inclusive, 1-based start of the searched range
    pub start: u64,
    /// Exclusive end, `None` for the end of the sequence
    pub end: Option<u64>,
}

#[derive(Serialize)]
struct TokenRef<'a> {
    fingerprint: &'a Fingerprint,
    descriptor: &'a QueryDescriptor,
}

#[derive(Deserialize)]
struct Token {
    fingerprint: Fingerprint,
    descriptor: QueryDescriptor,
}

fn codec() -> impl Options {
    bincode::DefaultOptions::new().with_limit(TOKEN_LIMIT)
}

impl QueryDescriptor {
    /// Nothing left to scan
    pub fn is_exhausted(&self) -> bool {
        self.starts.is_empty()
    }

    pub fn to_page_token(&self, fingerprint: &Fingerprint) -> Result<String> {
        let mut bytes = vec![TOKEN_VERSION];
        codec()
            .serialize_into(
                &mut bytes,
                &TokenRef {
                    fingerprint,
                    descriptor: self,
                },
            )
            .map_err(|e| Error::Internal(format!("failed to encode page token: {}", e)))?;
        Ok(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Decode a token issued by the catalog identified by `fingerprint`.
    pub fn from_page_token(token: &str, fingerprint: &Fingerprint) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| Error::InvalidPageToken("not a page token".to_string()))?;

        let Some((&version, payload)) = bytes.split_first() else {
            return Err(Error::InvalidPageToken("empty page token".to_string()));
        };
        if version != TOKEN_VERSION {
            return Err(Error::InvalidPageToken(format!(
                "unsupported token version {}",
                version
            )));
        }

        let decoded: Token = codec()
            .deserialize(payload)
            .map_err(|_| Error::InvalidPageToken("malformed page token".to_string()))?;

        if decoded.fingerprint != *fingerprint {
            return Err(Error::InvalidPageToken(
                "page token was issued by a different catalog".to_string(),
            ));
        }

        Ok(decoded.descriptor)
    }
}
