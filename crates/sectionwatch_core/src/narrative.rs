use std::fmt::Write as _;

use crate::diff::{SectionDiff, SectionDiffStatus, SectionPath};

const LEADING_LABEL: &str = "[Leading]";
const LEADING_FACTOR: i64 = 1;
const MARKED_FACTOR: i64 = 2;
const UNTRACKED_FACTOR: i64 = -1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Narrative {
    pub text: String,
    pub priority: i64,
}

/// Decides which sections are worth reporting and how much each one weighs.
#[derive(Debug, Clone)]
pub struct PriorityPolicy {
    markers: Vec<String>,
}

impl PriorityPolicy {
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            markers: markers
                .into_iter()
                .map(Into::into)
                .filter(|marker: &String| !marker.trim().is_empty())
                .collect(),
        }
    }

    /// 1 for the leading section, 2 for marked sections, negative for the rest.
    pub fn factor(&self, path: &SectionPath) -> i64 {
        if path.is_leading() {
            LEADING_FACTOR
        } else if self.markers.iter().any(|marker| path.contains(marker)) {
            MARKED_FACTOR
        } else {
            UNTRACKED_FACTOR
        }
    }

    fn entry_factor(&self, diff: &SectionDiff) -> i64 {
        [diff.path1.as_ref(), diff.path2.as_ref()]
            .into_iter()
            .flatten()
            .map(|path| self.factor(path))
            .max()
            .unwrap_or(UNTRACKED_FACTOR)
    }

    /// Render tracked, non-identical entries. `None` when nothing qualifies.
    pub fn summarize(&self, diffs: &[SectionDiff]) -> Option<Narrative> {
        let mut text = String::new();
        let mut priority = 0i64;

        for diff in diffs {
            if diff.status == SectionDiffStatus::Identical {
                continue;
            }
            let factor = self.entry_factor(diff);
            if factor < 0 {
                continue;
            }
            priority += diff.added_chars as i64 * factor;
            render_entry(&mut text, diff);
        }

        if text.is_empty() {
            None
        } else {
            Some(Narrative { text, priority })
        }
    }
}

fn render_entry(out: &mut String, diff: &SectionDiff) {
    let shown = match diff.status {
        SectionDiffStatus::Removed => diff.path1.as_ref(),
        _ => diff.path1.as_ref().or(diff.path2.as_ref()),
    };
    let _ = writeln!(out, ";{}", shown.map(path_label).unwrap_or_default());

    let phrase = match (diff.status, diff.path1.as_ref(), diff.path2.as_ref()) {
        (SectionDiffStatus::Added, _, _) => "new section".to_string(),
        (SectionDiffStatus::Removed, _, _) => "removed section".to_string(),
        (status, Some(before), Some(after)) if before != after => {
            let mut phrase = format!("renamed to {}", path_label(after));
            if status == SectionDiffStatus::WhitespaceModified {
                phrase.push_str(", whitespace changed");
            }
            phrase
        }
        (SectionDiffStatus::WhitespaceModified, _, _) => "whitespace changed".to_string(),
        _ => "modified".to_string(),
    };
    let _ = writeln!(
        out,
        ":{phrase}{}",
        char_counts(diff.added_chars, diff.removed_chars)
    );
}

fn path_label(path: &SectionPath) -> String {
    if path.is_leading() {
        LEADING_LABEL.to_string()
    } else {
        path.to_string()
    }
}

fn char_counts(added: usize, removed: usize) -> String {
    match (added, removed) {
        (0, 0) => String::new(),
        (added, 0) => format!(" (+{added})"),
        (0, removed) => format!(" (-{removed})"),
        (added, removed) => format!(" (+{added} -{removed})"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diff(
        status: SectionDiffStatus,
        path1: Option<SectionPath>,
        path2: Option<SectionPath>,
        added: usize,
        removed: usize,
    ) -> SectionDiff {
        SectionDiff {
            status,
            path1,
            path2,
            added_chars: added,
            removed_chars: removed,
        }
    }

    fn policy() -> PriorityPolicy {
        PriorityPolicy::new(["Trivia"])
    }

    #[test]
    fn factors_follow_section_kind() {
        let policy = policy();
        assert_eq!(policy.factor(&SectionPath::leading()), 1);
        assert_eq!(policy.factor(&SectionPath::new(["Trivia"])), 2);
        assert_eq!(policy.factor(&SectionPath::new(["History", "Trivia"])), 2);
        assert!(policy.factor(&SectionPath::new(["History"])) < 0);
    }

    #[test]
    fn score_weights_leading_and_marked_sections() {
        let diffs = vec![
            diff(
                SectionDiffStatus::Modified,
                Some(SectionPath::leading()),
                Some(SectionPath::leading()),
                100,
                0,
            ),
            diff(
                SectionDiffStatus::Added,
                None,
                Some(SectionPath::new(["Trivia"])),
                50,
                0,
            ),
            diff(
                SectionDiffStatus::Modified,
                Some(SectionPath::new(["History"])),
                Some(SectionPath::new(["History"])),
                1000,
                0,
            ),
        ];
        let narrative = policy().summarize(&diffs).expect("narrative");
        assert_eq!(narrative.priority, 200);
        assert_eq!(
            narrative.text,
            ";[Leading]\n:modified (+100)\n;Trivia\n:new section (+50)\n"
        );
        assert!(!narrative.text.contains("History"));
    }

    #[test]
    fn identical_or_untracked_changes_yield_nothing() {
        let identical = vec![diff(
            SectionDiffStatus::Identical,
            Some(SectionPath::leading()),
            Some(SectionPath::leading()),
            0,
            0,
        )];
        assert!(policy().summarize(&identical).is_none());

        let untracked = vec![diff(
            SectionDiffStatus::Modified,
            Some(SectionPath::new(["Gallery"])),
            Some(SectionPath::new(["Gallery"])),
            300,
            20,
        )];
        assert!(policy().summarize(&untracked).is_none());
        assert!(policy().summarize(&[]).is_none());
    }

    #[test]
    fn phrases_cover_removal_rename_and_whitespace() {
        let diffs = vec![
            diff(
                SectionDiffStatus::Removed,
                Some(SectionPath::new(["Trivia"])),
                None,
                0,
                42,
            ),
            diff(
                SectionDiffStatus::Modified,
                Some(SectionPath::new(["Notes"])),
                Some(SectionPath::new(["Trivia facts"])),
                3,
                1,
            ),
            diff(
                SectionDiffStatus::WhitespaceModified,
                Some(SectionPath::leading()),
                Some(SectionPath::leading()),
                0,
                0,
            ),
        ];
        let narrative = policy().summarize(&diffs).expect("narrative");
        assert_eq!(
            narrative.text,
            ";Trivia\n:removed section (-42)\n;Notes\n:renamed to Trivia facts (+3 -1)\n;[Leading]\n:whitespace changed\n"
        );
        assert_eq!(narrative.priority, 6);
    }

    #[test]
    fn rename_with_whitespace_edit_mentions_both() {
        let diffs = vec![diff(
            SectionDiffStatus::WhitespaceModified,
            Some(SectionPath::new(["Trivia"])),
            Some(SectionPath::new(["Trivia notes"])),
            2,
            0,
        )];
        let narrative = policy().summarize(&diffs).expect("narrative");
        assert_eq!(
            narrative.text,
            ";Trivia\n:renamed to Trivia notes, whitespace changed (+2)\n"
        );
        assert_eq!(narrative.priority, 4);
    }

    #[test]
    fn blank_markers_are_ignored() {
        let policy = PriorityPolicy::new(["", "  "]);
        assert!(policy.factor(&SectionPath::new(["Trivia"])) < 0);
        assert_eq!(policy.factor(&SectionPath::leading()), 1);
    }
}
