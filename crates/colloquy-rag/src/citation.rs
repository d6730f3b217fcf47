//! # Citation extraction
//!
//! Agent answers cite retrieved sources with inline tokens of the form
//!
//! ```text
//! SOURCE_CITATION: \cite{<document_name>, <page|chunk> <N|N-M>}
//! ```
//!
//! [`extract_references`] turns those tokens into a deduplicated list of
//! [`SourceReference`]s, optionally attaching the retrieved passage each one
//! points at. Parsing never fails: malformed tokens are skipped.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::Range;
use std::sync::OnceLock;

/// Upper bound on the numbers a single `N-M` range may expand to
pub const MAX_RANGE_SPAN: u32 = 1000;

/// File types whose retrieval results cite page numbers
const PAGED_FILE_TYPES: &[&str] = &["pdf", "doc", "docx", "ppt", "pptx"];

/// Kind of location a citation points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceType {
    /// A page of a paged document
    Page,
    /// A retrieval chunk of an unpaged document
    Chunk,
}

impl ReferenceType {
    /// Reference type the retrieval service uses for a file extension
    pub fn from_file_type(file_type: &str) -> Self {
        let normalized = file_type.trim().trim_start_matches('.').to_ascii_lowercase();
        if PAGED_FILE_TYPES.contains(&normalized.as_str()) {
            ReferenceType::Page
        } else {
            ReferenceType::Chunk
        }
    }

    /// Token form (`page` / `chunk`)
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceType::Page => "page",
            ReferenceType::Chunk => "chunk",
        }
    }

    /// Display form (`Page` / `Chunk`)
    pub fn label(&self) -> &'static str {
        match self {
            ReferenceType::Page => "Page",
            ReferenceType::Chunk => "Chunk",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("page") {
            Some(ReferenceType::Page)
        } else if value.eq_ignore_ascii_case("chunk") {
            Some(ReferenceType::Chunk)
        } else {
            None
        }
    }
}

impl fmt::Display for ReferenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A source cited by an agent answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceReference {
    /// Cited document
    pub document_name: String,

    /// Page or chunk
    pub reference_type: ReferenceType,

    /// Page or chunk number
    pub number: u32,

    /// Human-readable label, e.g. `report.pdf, Page 3`
    pub source_reference: String,

    /// Retrieved passage the citation points at, when retrieval text was given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_content: Option<String>,
}

impl SourceReference {
    /// Create a reference without supporting text
    pub fn new(
        document_name: impl Into<String>,
        reference_type: ReferenceType,
        number: u32,
    ) -> Self {
        let document_name = document_name.into();
        let source_reference = format!("{}, {} {}", document_name, reference_type.label(), number);
        Self {
            document_name,
            reference_type,
            number,
            source_reference,
            text_content: None,
        }
    }

    fn key(&self) -> CitationKey {
        (self.document_name.clone(), self.reference_type, self.number)
    }
}

type CitationKey = (String, ReferenceType, u32);

/// Render a citation token the way the retrieval service emits it
pub fn format_citation(document_name: &str, reference_type: ReferenceType, number: u32) -> String {
    format!(
        "SOURCE_CITATION: \\cite{{{}, {} {}}}",
        document_name, reference_type, number
    )
}

/// One well-formed token found in a text
#[derive(Debug, Clone)]
struct CitationMatch {
    document_name: String,
    reference_type: ReferenceType,
    first: u32,
    last: u32,
    span: Range<usize>,
}

impl CitationMatch {
    fn keys(&self) -> impl Iterator<Item = CitationKey> + '_ {
        (self.first..=self.last)
            .map(move |n| (self.document_name.clone(), self.reference_type, n))
    }
}

fn citation_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                r"SOURCE_CITATION:\s*\\cite\{([^{}\n]+?),\s*(?i:(page|chunk))\s+(\d+)(?:\s*-\s*(\d+))?\s*\}",
            )
            .ok()
        })
        .as_ref()
}

/// Citation markers whether or not the token after them is well formed
fn marker_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"SOURCE_CITATION:\s*(?:\\cite\{[^{}\n]*\}?)?").ok())
        .as_ref()
}

/// Find every well-formed citation token, left to right
fn scan(text: &str) -> Vec<CitationMatch> {
    let Some(pattern) = citation_pattern() else {
        return Vec::new();
    };

    pattern
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let document_name = caps.get(1)?.as_str().trim();
            if document_name.is_empty() {
                return None;
            }
            let reference_type = ReferenceType::parse(caps.get(2)?.as_str())?;
            let first: u32 = caps.get(3)?.as_str().parse().ok()?;
            let last: u32 = match caps.get(4) {
                Some(m) => m.as_str().parse().ok()?,
                None => first,
            };
            // Reversed or oversized ranges are treated as malformed.
            if last < first || last - first >= MAX_RANGE_SPAN {
                return None;
            }

            Some(CitationMatch {
                document_name: document_name.to_string(),
                reference_type,
                first,
                last,
                span: whole.range(),
            })
        })
        .collect()
}

fn collapse_whitespace(text: &str) -> Option<String> {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

/// Text following the last malformed token in a passage
fn after_last_marker(passage: &str) -> &str {
    marker_pattern()
        .and_then(|pattern| pattern.find_iter(passage).last())
        .map_or(passage, |marker| &passage[marker.end()..])
}

/// Map each cited location in `retrieval` to the passage preceding its token
fn index_snippets(retrieval: &str) -> HashMap<CitationKey, String> {
    let mut snippets = HashMap::new();
    let mut previous_end = 0;

    for citation in scan(retrieval) {
        let passage = retrieval
            .get(previous_end..citation.span.start)
            .map(after_last_marker)
            .and_then(collapse_whitespace);
        previous_end = citation.span.end;

        if let Some(passage) = passage {
            for key in citation.keys() {
                snippets.entry(key).or_insert_with(|| passage.clone());
            }
        }
    }

    snippets
}

/// Extract the sources an agent answer cites.
///
/// References are unique by `(document_name, reference_type, number)` and
/// ordered by first occurrence. When `retrieval` is the text the answer was
/// grounded on, each reference carries the passage that preceded the matching
/// citation token there.
pub fn extract_references(response: &str, retrieval: Option<&str>) -> Vec<SourceReference> {
    let mut seen: HashSet<CitationKey> = HashSet::new();
    let mut references = Vec::new();

    for citation in scan(response) {
        for number in citation.first..=citation.last {
            let reference =
                SourceReference::new(citation.document_name.clone(), citation.reference_type, number);
            if seen.insert(reference.key()) {
                references.push(reference);
            }
        }
    }

    if let Some(retrieval) = retrieval {
        let snippets = index_snippets(retrieval);
        for reference in &mut references {
            reference.text_content = snippets.get(&reference.key()).cloned();
        }
    }

    tracing::debug!(
        references = references.len(),
        with_retrieval = retrieval.is_some(),
        "Extracted source references"
    );

    references
}
