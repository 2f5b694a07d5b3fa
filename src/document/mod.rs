//! Line-oriented markdown document model.
//!
//! A document is a preamble followed by an ordered list of sections, each
//! introduced by a `## ` heading line. Parsing only partitions the line list, so
//! `Document::parse(text).render() == text` for any input; every mutation is a
//! total function over that structure rather than string surgery on the file.
//!
//! # Canonical spacing
//!
//! A canonical section is its heading, exactly one blank line, the content with
//! no leading or trailing blank runs, and one blank line before whatever comes
//! next. An empty canonical section is the heading plus one blank line.
//!
//! ```text
//! ## Due in the next two weeks - Anticipation
//!
//! - [ ] Buy milk
//!
//! ## Notes
//! ```

mod atomic;

pub use atomic::{AlternatePathWriter, save_atomic};

use regex::Regex;
use std::fmt;

/// Prefix that starts a section heading line.
pub const HEADING_PREFIX: &str = "## ";

/// A `## ` heading and the lines up to the next one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    heading: String,
    body: Vec<String>,
}

impl Section {
    fn new(title: &str) -> Self {
        Self {
            heading: format!("{HEADING_PREFIX}{title}"),
            body: Vec::new(),
        }
    }

    /// The raw heading line.
    #[must_use]
    pub fn heading(&self) -> &str {
        &self.heading
    }

    /// Heading text without the `##` marker.
    #[must_use]
    pub fn title(&self) -> &str {
        self.heading.trim_start_matches('#').trim()
    }

    /// Raw body lines, blank lines included.
    #[must_use]
    pub fn body(&self) -> &[String] {
        &self.body
    }

    /// Body lines with leading and trailing blank lines removed.
    #[must_use]
    pub fn content(&self) -> &[String] {
        trim_blank(&self.body)
    }
}

/// Where a missing section is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement<'a> {
    /// After the last section.
    End,
    /// Directly after the named section, or at the end if it is missing.
    After(&'a str),
}

/// Parsed markdown document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    preamble: Vec<String>,
    sections: Vec<Section>,
}

impl Document {
    /// Parses text into a preamble and `## ` sections.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut doc = Self::default();
        for line in text.split('\n') {
            if is_heading(line) {
                doc.sections.push(Section {
                    heading: line.to_string(),
                    body: Vec::new(),
                });
            } else if let Some(section) = doc.sections.last_mut() {
                section.body.push(line.to_string());
            } else {
                doc.preamble.push(line.to_string());
            }
        }
        doc
    }

    /// Serializes back to text.
    #[must_use]
    pub fn render(&self) -> String {
        let lines: Vec<&str> = self
            .preamble
            .iter()
            .map(String::as_str)
            .chain(self.sections.iter().flat_map(|section| {
                std::iter::once(section.heading.as_str())
                    .chain(section.body.iter().map(String::as_str))
            }))
            .collect();
        lines.join("\n")
    }

    /// All sections in order.
    #[must_use]
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Looks up a section by title.
    ///
    /// An exact title match wins; otherwise the first title containing `title`.
    #[must_use]
    pub fn section(&self, title: &str) -> Option<&Section> {
        self.position(title).map(|index| &self.sections[index])
    }

    /// Whether any line equals `line` once surrounding whitespace is ignored.
    #[must_use]
    pub fn contains_line(&self, line: &str) -> bool {
        let needle = line.trim();
        self.lines().any(|candidate| candidate.trim() == needle)
    }

    /// Whether `needle` occurs anywhere in the rendered text.
    #[must_use]
    pub fn contains_text(&self, needle: &str) -> bool {
        self.lines().any(|line| line.contains(needle))
    }

    /// Creates the section if it does not exist. Returns whether it was created.
    pub fn ensure_section(&mut self, title: &str, placement: Placement<'_>) -> bool {
        if self.position(title).is_some() {
            return false;
        }

        let anchor = match placement {
            Placement::After(anchor) => self.position(anchor),
            Placement::End => None,
        };

        match anchor {
            Some(index) if index + 1 < self.sections.len() => {
                seal_tail(&mut self.sections[index].body, true);
                self.sections.insert(index + 1, Section::new(title));
                self.canonicalize_at(index + 1);
            },
            _ => {
                match self.sections.last_mut() {
                    Some(last) => seal_tail(&mut last.body, true),
                    None => seal_tail(&mut self.preamble, false),
                }
                self.sections.push(Section::new(title));
                let last = self.sections.len() - 1;
                self.canonicalize_at(last);
            },
        }
        true
    }

    /// Normalizes spacing of one section. Returns false if it does not exist.
    pub fn canonicalize(&mut self, title: &str) -> bool {
        match self.position(title) {
            Some(index) => {
                self.canonicalize_at(index);
                true
            },
            None => false,
        }
    }

    /// Swaps the whole body of a section. Returns false if it does not exist.
    pub fn replace_body<S: AsRef<str>>(&mut self, title: &str, lines: &[S]) -> bool {
        let Some(index) = self.position(title) else {
            return false;
        };
        let content: Vec<String> = lines.iter().map(|l| l.as_ref().to_string()).collect();
        self.sections[index].body = trim_blank(&content).to_vec();
        self.canonicalize_at(index);
        true
    }

    /// Creates the section if needed, then replaces its body.
    pub fn upsert_body<S: AsRef<str>>(
        &mut self,
        title: &str,
        lines: &[S],
        placement: Placement<'_>,
    ) {
        self.ensure_section(title, placement);
        self.replace_body(title, lines);
    }

    /// Appends the lines not already present anywhere in the document.
    ///
    /// When at least one line is appended and `provenance` is given and not yet
    /// present, it is written immediately before the new lines. Returns the
    /// appended lines; an empty result means the document is unchanged.
    pub fn append_unique<S: AsRef<str>>(
        &mut self,
        title: &str,
        candidates: &[S],
        provenance: Option<&str>,
    ) -> Vec<String> {
        let Some(index) = self.position(title) else {
            return Vec::new();
        };

        let mut fresh: Vec<String> = Vec::new();
        for candidate in candidates {
            let candidate = candidate.as_ref();
            if candidate.trim().is_empty()
                || self.contains_line(candidate)
                || fresh.iter().any(|seen| seen.trim() == candidate.trim())
            {
                continue;
            }
            fresh.push(candidate.to_string());
        }
        if fresh.is_empty() {
            return fresh;
        }

        let mut content = self.sections[index].content().to_vec();
        if let Some(note) = provenance {
            if !self.contains_line(note) {
                content.push(note.to_string());
            }
        }
        content.extend(fresh.iter().cloned());
        self.sections[index].body = content;
        self.canonicalize_at(index);
        fresh
    }

    /// Puts `line` as the first content line of a section.
    ///
    /// Returns false if the section does not exist.
    pub fn insert_after_heading(&mut self, title: &str, line: &str) -> bool {
        let Some(index) = self.position(title) else {
            return false;
        };
        let existing = self.sections[index].content().to_vec();
        let mut content = vec![line.to_string()];
        if !existing.is_empty() {
            content.push(String::new());
            content.extend(existing);
        }
        self.sections[index].body = content;
        self.canonicalize_at(index);
        true
    }

    /// Appends a paragraph after a blank line at the very end of the document.
    pub fn append_paragraph<S: AsRef<str>>(&mut self, lines: &[S]) {
        let tail = match self.sections.last_mut() {
            Some(last) => {
                seal_tail(&mut last.body, true);
                &mut last.body
            },
            None => {
                seal_tail(&mut self.preamble, false);
                &mut self.preamble
            },
        };
        tail.extend(lines.iter().map(|l| l.as_ref().to_string()));
        tail.push(String::new());
    }

    /// Removes every match of `pattern`, dropping lines that become blank.
    ///
    /// Returns the number of matches removed.
    pub fn strip_matching(&mut self, pattern: &Regex) -> usize {
        let mut removed = 0;
        let blocks = std::iter::once(&mut self.preamble)
            .chain(self.sections.iter_mut().map(|section| &mut section.body));
        for block in blocks {
            let mut kept = Vec::with_capacity(block.len());
            for line in block.drain(..) {
                let hits = pattern.find_iter(&line).count();
                if hits == 0 {
                    kept.push(line);
                    continue;
                }
                removed += hits;
                let stripped = pattern.replace_all(&line, "");
                if !stripped.trim().is_empty() {
                    kept.push(stripped.into_owned());
                }
            }
            *block = kept;
        }
        removed
    }

    fn lines(&self) -> impl Iterator<Item = &str> {
        self.preamble.iter().map(String::as_str).chain(
            self.sections.iter().flat_map(|section| {
                std::iter::once(section.heading.as_str())
                    .chain(section.body.iter().map(String::as_str))
            }),
        )
    }

    fn position(&self, title: &str) -> Option<usize> {
        let wanted = title.trim();
        self.sections
            .iter()
            .position(|section| section.title() == wanted)
            .or_else(|| {
                self.sections
                    .iter()
                    .position(|section| section.title().contains(wanted))
            })
    }

    fn canonicalize_at(&mut self, index: usize) {
        let is_last = index + 1 == self.sections.len();
        let section = &mut self.sections[index];
        let content = trim_blank(&section.body).to_vec();

        let mut body = Vec::with_capacity(content.len() + 2);
        body.push(String::new());
        let empty = content.is_empty();
        body.extend(content);
        if !empty || is_last {
            body.push(String::new());
        }
        section.body = body;
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

fn is_heading(line: &str) -> bool {
    line.starts_with(HEADING_PREFIX)
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

fn trim_blank(lines: &[String]) -> &[String] {
    let start = lines.iter().position(|l| !is_blank(l)).unwrap_or(lines.len());
    let end = lines.iter().rposition(|l| !is_blank(l)).map_or(start, |i| i + 1);
    &lines[start..end]
}

/// Leaves a block ending in exactly one blank line (none for an empty preamble).
fn seal_tail(block: &mut Vec<String>, is_section: bool) {
    while block.last().is_some_and(|line| is_blank(line)) {
        block.pop();
    }
    if is_section || !block.is_empty() {
        block.push(String::new());
    }
}
