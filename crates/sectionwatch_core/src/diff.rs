//! Section-level comparison of two wikitext revisions.
//!
//! Content is split at `== heading ==` lines (levels 2 to 6). Text before the
//! first heading forms the leading section, whose path is empty. Sections are
//! paired by heading path; leftovers are paired positionally as renames when
//! their bodies are similar enough, the rest are reported as added or removed.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::ops::Range;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use similar::{DiffTag, TextDiff};

const RENAME_SIMILARITY: f32 = 0.5;
const CHAR_DIFF_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionDiffStatus {
    Identical,
    Added,
    Removed,
    Modified,
    WhitespaceModified,
}

/// Chain of heading titles enclosing a section. Empty for the leading section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SectionPath(Vec<String>);

impl SectionPath {
    pub fn leading() -> Self {
        Self(Vec::new())
    }

    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn is_leading(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// True when any heading along the path mentions `marker`.
    pub fn contains(&self, marker: &str) -> bool {
        self.0.iter().any(|segment| segment.contains(marker))
    }
}

impl fmt::Display for SectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionDiff {
    pub status: SectionDiffStatus,
    pub path1: Option<SectionPath>,
    pub path2: Option<SectionPath>,
    pub added_chars: usize,
    pub removed_chars: usize,
}

pub trait SectionDiffEngine {
    /// Compare `old` against `new`, one entry per section of either side.
    fn compare(&mut self, old: &str, new: &str) -> Result<Vec<SectionDiff>>;
}

#[derive(Debug, Clone)]
struct Section {
    path: SectionPath,
    body: Range<usize>,
}

/// Wikitext comparer. Holds scratch buffers that are reused between calls.
#[derive(Debug, Default)]
pub struct WikitextSectionComparer {
    old_sections: Vec<Section>,
    new_sections: Vec<Section>,
    old_scratch: String,
    new_scratch: String,
}

impl WikitextSectionComparer {
    pub fn new() -> Self {
        Self::default()
    }

    fn diff_pair(
        &mut self,
        old_text: &str,
        new_text: &str,
        old: &Section,
        new: &Section,
    ) -> SectionDiff {
        let old_body = &old_text[old.body.clone()];
        let new_body = &new_text[new.body.clone()];
        let renamed = old.path != new.path;

        let (status, added_chars, removed_chars) = if old_body == new_body {
            let status = if renamed {
                SectionDiffStatus::Modified
            } else {
                SectionDiffStatus::Identical
            };
            (status, 0, 0)
        } else {
            let (added, removed) = count_char_changes(old_body, new_body);
            collapse_whitespace(old_body, &mut self.old_scratch);
            collapse_whitespace(new_body, &mut self.new_scratch);
            let status = if self.old_scratch == self.new_scratch {
                SectionDiffStatus::WhitespaceModified
            } else {
                SectionDiffStatus::Modified
            };
            (status, added, removed)
        };

        SectionDiff {
            status,
            path1: Some(old.path.clone()),
            path2: Some(new.path.clone()),
            added_chars,
            removed_chars,
        }
    }
}

impl SectionDiffEngine for WikitextSectionComparer {
    fn compare(&mut self, old: &str, new: &str) -> Result<Vec<SectionDiff>> {
        split_sections(old, &mut self.old_sections);
        split_sections(new, &mut self.new_sections);
        let old_sections = std::mem::take(&mut self.old_sections);
        let new_sections = std::mem::take(&mut self.new_sections);

        let mut by_path: HashMap<&SectionPath, VecDeque<usize>> = HashMap::new();
        for (index, section) in old_sections.iter().enumerate() {
            by_path.entry(&section.path).or_default().push_back(index);
        }

        let mut old_match: Vec<Option<usize>> = vec![None; old_sections.len()];
        let mut new_match: Vec<Option<usize>> = vec![None; new_sections.len()];
        for (new_index, section) in new_sections.iter().enumerate() {
            if let Some(old_index) = by_path
                .get_mut(&section.path)
                .and_then(VecDeque::pop_front)
            {
                old_match[old_index] = Some(new_index);
                new_match[new_index] = Some(old_index);
            }
        }

        let unmatched_old = (0..old_sections.len()).filter(|index| old_match[*index].is_none());
        let unmatched_new = (0..new_sections.len()).filter(|index| new_match[*index].is_none());
        let candidates: Vec<(usize, usize)> = unmatched_old.zip(unmatched_new).collect();
        for (old_index, new_index) in candidates {
            let old_body = &old[old_sections[old_index].body.clone()];
            let new_body = &new[new_sections[new_index].body.clone()];
            if TextDiff::from_lines(old_body, new_body).ratio() >= RENAME_SIMILARITY {
                old_match[old_index] = Some(new_index);
                new_match[new_index] = Some(old_index);
            }
        }

        let mut diffs = Vec::with_capacity(new_sections.len() + old_sections.len());
        for (new_index, section) in new_sections.iter().enumerate() {
            match new_match[new_index] {
                Some(old_index) => {
                    diffs.push(self.diff_pair(old, new, &old_sections[old_index], section));
                }
                None => diffs.push(SectionDiff {
                    status: SectionDiffStatus::Added,
                    path1: None,
                    path2: Some(section.path.clone()),
                    added_chars: new[section.body.clone()].chars().count(),
                    removed_chars: 0,
                }),
            }
        }
        for (old_index, section) in old_sections.iter().enumerate() {
            if old_match[old_index].is_none() {
                diffs.push(SectionDiff {
                    status: SectionDiffStatus::Removed,
                    path1: Some(section.path.clone()),
                    path2: None,
                    added_chars: 0,
                    removed_chars: old[section.body.clone()].chars().count(),
                });
            }
        }

        self.old_sections = old_sections;
        self.new_sections = new_sections;
        Ok(diffs)
    }
}

fn split_sections(content: &str, out: &mut Vec<Section>) {
    out.clear();
    let mut stack: Vec<(usize, String)> = Vec::new();
    let mut current_path = SectionPath::leading();
    let mut body_start = 0usize;
    let mut offset = 0usize;

    for line in content.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        let Some((level, heading)) = parse_heading(line) else {
            continue;
        };

        out.push(Section {
            path: current_path,
            body: body_start..line_start,
        });
        while stack.last().is_some_and(|(open, _)| *open >= level) {
            stack.pop();
        }
        stack.push((level, heading));
        current_path = SectionPath(stack.iter().map(|(_, title)| title.clone()).collect());
        body_start = offset;
    }

    out.push(Section {
        path: current_path,
        body: body_start..content.len(),
    });
}

fn parse_heading(line: &str) -> Option<(usize, String)> {
    let trimmed = line.trim();
    if trimmed.len() < 4 || !trimmed.starts_with('=') || !trimmed.ends_with('=') {
        return None;
    }
    let leading = trimmed.chars().take_while(|ch| *ch == '=').count();
    let trailing = trimmed.chars().rev().take_while(|ch| *ch == '=').count();
    let level = leading.min(trailing);
    if !(2..=6).contains(&level) || level * 2 >= trimmed.len() {
        return None;
    }
    let heading = trimmed[level..trimmed.len() - level].trim();
    if heading.is_empty() {
        return None;
    }
    Some((level, heading.to_string()))
}

fn count_char_changes(old: &str, new: &str) -> (usize, usize) {
    let diff = TextDiff::configure()
        .timeout(CHAR_DIFF_TIMEOUT)
        .diff_chars(old, new);
    let mut added = 0usize;
    let mut removed = 0usize;
    for op in diff.ops() {
        match op.tag() {
            DiffTag::Equal => {}
            DiffTag::Insert => added += op.new_range().len(),
            DiffTag::Delete => removed += op.old_range().len(),
            DiffTag::Replace => {
                added += op.new_range().len();
                removed += op.old_range().len();
            }
        }
    }
    (added, removed)
}

fn collapse_whitespace(text: &str, out: &mut String) {
    out.clear();
    for word in text.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
}
