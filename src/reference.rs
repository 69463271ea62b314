//! Document references and the pipeline result descriptor.
//!
//! Every stage hands its output to the next stage as a [`DocumentRef`]: the
//! object store location is the authoritative artifact, never an in-memory
//! buffer. The artifact naming scheme lives here so the orchestrator, the
//! HTTP layer and the tests agree on it.

use crate::error::PolywordError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const SCHEME: &str = "gs://";

/// An immutable `(bucket, path)` location of a stored object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentRef {
    pub bucket: String,
    pub path: String,
}

impl DocumentRef {
    pub fn new(bucket: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            path: path.into(),
        }
    }

    /// `gs://<bucket>/<path>`
    pub fn uri(&self) -> String {
        format!("{SCHEME}{}/{}", self.bucket, self.path)
    }

    /// Final path segment, used as the suggested download filename.
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SCHEME}{}/{}", self.bucket, self.path)
    }
}

impl FromStr for DocumentRef {
    type Err = PolywordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PolywordError::InvalidReference {
            input: s.to_string(),
        };
        let rest = s.strip_prefix(SCHEME).ok_or_else(invalid)?;
        let (bucket, path) = rest.split_once('/').ok_or_else(invalid)?;
        if bucket.is_empty() || path.is_empty() {
            return Err(invalid());
        }
        Ok(DocumentRef::new(bucket, path))
    }
}

/// The four artifacts produced by one successful pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineResult {
    #[serde(rename = "original_text_uri", with = "as_uri")]
    pub original_text: DocumentRef,
    #[serde(rename = "translated_text_uri", with = "as_uri")]
    pub translated_text: DocumentRef,
    #[serde(rename = "refined_text_uri", with = "as_uri")]
    pub refined_text: DocumentRef,
    #[serde(rename = "refined_pdf_uri", with = "as_uri")]
    pub refined_pdf: DocumentRef,
}

impl PipelineResult {
    /// `(key, reference)` pairs in pipeline order.
    pub fn entries(&self) -> [(&'static str, &DocumentRef); 4] {
        [
            ("original_text_uri", &self.original_text),
            ("translated_text_uri", &self.translated_text),
            ("refined_text_uri", &self.refined_text),
            ("refined_pdf_uri", &self.refined_pdf),
        ]
    }
}

mod as_uri {
    use super::DocumentRef;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(r: &DocumentRef, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&r.uri())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DocumentRef, D::Error> {
        let raw = String::deserialize(d)?;
        raw.parse().map_err(D::Error::custom)
    }
}

// ── Artifact naming ──────────────────────────────────────────────────────────

/// Join a prefix and a file name with exactly one `/`.
pub fn join_path(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

pub fn original_text_path(prefix: &str) -> String {
    join_path(prefix, "original_text.txt")
}

pub fn translated_text_path(prefix: &str, lang: &str) -> String {
    join_path(prefix, &format!("translated_text_{lang}.txt"))
}

pub fn refined_text_path(prefix: &str, lang: &str) -> String {
    join_path(prefix, &format!("refined_text_{lang}.txt"))
}

pub fn refined_pdf_path(prefix: &str, lang: &str) -> String {
    join_path(prefix, &format!("refined_text_{lang}.pdf"))
}
