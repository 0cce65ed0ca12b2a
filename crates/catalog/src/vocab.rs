//! Controlled vocabularies: grade levels, audiences, categories.
//!
//! Every write of a controlled field goes through these parsers. A list
//! containing a single unknown token is rejected as a whole.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

/// Split a comma list into trimmed, non-empty tokens.
pub fn split_list(s: &str) -> impl Iterator<Item = &str> {
    s.split(',').map(str::trim).filter(|t| !t.is_empty())
}

// ---------------------------------------------------------------------------
// Grades
// ---------------------------------------------------------------------------

/// One grade of the fixed, ordered vocabulary Pre-K, Kindergarten, Grade 1..Grade 12.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Grade(u8);

impl Grade {
    pub const PRE_K: Grade = Grade(0);
    pub const KINDERGARTEN: Grade = Grade(1);
    const MAX_ORDINAL: u8 = 13;

    /// `Grade::numbered(3)` is "Grade 3". `None` outside 1..=12.
    pub fn numbered(n: u8) -> Option<Grade> {
        (1..=12).contains(&n).then(|| Grade(n + 1))
    }

    /// Inclusive range in vocabulary order.
    pub fn span(from: Grade, to: Grade) -> Vec<Grade> {
        (from.0..=to.0).map(Grade).collect()
    }

    pub fn all() -> Vec<Grade> {
        Self::span(Self::PRE_K, Grade(Self::MAX_ORDINAL))
    }

    pub fn label(&self) -> String {
        match self.0 {
            0 => "Pre-K".to_string(),
            1 => "Kindergarten".to_string(),
            n => format!("Grade {}", n - 1),
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl Serialize for Grade {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradeError {
    pub token: String,
}

impl fmt::Display for GradeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' is not a recognized grade level", self.token)
    }
}

fn numbered_grade_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:grade|gr\.?)?\s*(\d{1,2})(?:st|nd|rd|th)?(?:\s+grade)?$")
            .expect("static regex")
    })
}

/// A range endpoint. `legacy_k` marks the bare "K" shorthand, which as a
/// range start historically covered early learning as well.
fn parse_endpoint(token: &str) -> Option<(Grade, bool)> {
    let t = token.trim().to_lowercase();
    match t.as_str() {
        "pre-k" | "prek" | "pk" | "pre-kindergarten" | "prekindergarten" | "tk" => {
            return Some((Grade::PRE_K, false))
        }
        "kindergarten" | "kg" => return Some((Grade::KINDERGARTEN, false)),
        "k" => return Some((Grade::KINDERGARTEN, true)),
        _ => {}
    }
    let caps = numbered_grade_re().captures(&t)?;
    let n: u8 = caps.get(1)?.as_str().parse().ok()?;
    Grade::numbered(n).map(|g| (g, false))
}

/// Expand `"K-5"`, `"6-8"`, `"Grade 9 to Grade 12"`, `"Pre-K-2"` into grades.
/// Every separator position is tried since "Pre-K" itself contains a hyphen.
fn parse_range(token: &str) -> Option<Vec<Grade>> {
    let mut splits: Vec<(usize, usize)> = Vec::new();
    for (i, ch) in token.char_indices() {
        if ch == '-' || ch == '–' || ch == '—' {
            splits.push((i, i + ch.len_utf8()));
        }
    }
    for sep in [" to ", " TO ", " To "] {
        splits.extend(token.match_indices(sep).map(|(i, _)| (i, i + sep.len())));
    }

    for (start, end) in splits {
        let (Some((lo, legacy_k)), Some((hi, _))) =
            (parse_endpoint(&token[..start]), parse_endpoint(&token[end..]))
        else {
            continue;
        };
        if lo > hi {
            continue;
        }
        let lo = if legacy_k { Grade::PRE_K } else { lo };
        return Some(Grade::span(lo, hi));
    }
    None
}

/// Parse a grade-level cell: expand ranges, split on commas, validate every
/// token. Returns grades in vocabulary order without duplicates.
pub fn parse_grade_list(s: &str) -> Result<Vec<Grade>, GradeError> {
    let mut grades = BTreeSet::new();
    for token in split_list(s) {
        if let Some((g, _)) = parse_endpoint(token) {
            grades.insert(g);
        } else if let Some(range) = parse_range(token) {
            grades.extend(range);
        } else {
            return Err(GradeError {
                token: token.to_string(),
            });
        }
    }
    Ok(grades.into_iter().collect())
}

/// Canonical storage form: `"Pre-K, Kindergarten, Grade 1"`.
pub fn render_grade_list(grades: &[Grade]) -> String {
    grades.iter().map(Grade::label).collect::<Vec<_>>().join(", ")
}

/// Compact human form: `"Pre-K to Grade 5"` for contiguous sets.
pub fn grade_span_label(grades: &[Grade]) -> String {
    match grades {
        [] => "Unknown".to_string(),
        [only] => only.label(),
        [first, .., last] if (last.0 - first.0) as usize + 1 == grades.len() => {
            format!("{} to {}", first.label(), last.label())
        }
        _ => render_grade_list(grades),
    }
}

pub fn elementary_grades() -> Vec<Grade> {
    Grade::span(Grade::PRE_K, Grade(6))
}

pub fn middle_grades() -> Vec<Grade> {
    Grade::span(Grade(7), Grade(9))
}

pub fn high_grades() -> Vec<Grade> {
    Grade::span(Grade(10), Grade(13))
}

// ---------------------------------------------------------------------------
// Audience
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Audience {
    Teacher,
    Student,
    Staff,
    Parent,
}

impl Audience {
    pub fn parse(token: &str) -> Option<Audience> {
        match token.trim().to_lowercase().as_str() {
            "teacher" | "teachers" | "faculty" => Some(Self::Teacher),
            "student" | "students" => Some(Self::Student),
            "staff" => Some(Self::Staff),
            "parent" | "parents" | "families" => Some(Self::Parent),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Teacher => "Teacher",
            Self::Student => "Student",
            Self::Staff => "Staff",
            Self::Parent => "Parent",
        }
    }
}

/// Validate an audience list; any stray token rejects the whole list.
pub fn parse_audience_list(s: &str) -> Result<Vec<Audience>, String> {
    let mut set = BTreeSet::new();
    for token in split_list(s) {
        let a = Audience::parse(token)
            .ok_or_else(|| format!("'{token}' is not a recognized audience"))?;
        set.insert(a);
    }
    Ok(set.into_iter().collect())
}

pub fn render_audience_list(audience: &[Audience]) -> String {
    audience.iter().map(Audience::as_str).collect::<Vec<_>>().join(", ")
}

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

pub const CATEGORIES: &[&str] = &[
    "Assessment",
    "Classroom Management",
    "Coding & STEM",
    "Collaboration",
    "Communication",
    "Content & Curriculum",
    "Creativity & Design",
    "Learning Management",
    "Library & Research",
    "Math",
    "Operations",
    "Productivity",
    "Professional Development",
    "Reading & Literacy",
    "Science",
    "Social Studies",
    "Special Education",
    "Student Information",
    "Video & Media",
    "World Languages",
    "Other",
];

/// Placeholder category assigned to brand-new rows without one.
pub const DEFAULT_CATEGORY: &str = "Other";

const CATEGORY_ALIASES: &[(&str, &str)] = &[
    ("lms", "Learning Management"),
    ("sis", "Student Information"),
    ("stem", "Coding & STEM"),
    ("coding", "Coding & STEM"),
    ("literacy", "Reading & Literacy"),
    ("ela", "Reading & Literacy"),
    ("curriculum", "Content & Curriculum"),
    ("media", "Video & Media"),
    ("research", "Library & Research"),
    ("sped", "Special Education"),
    ("uncategorized", "Other"),
];

/// Case-insensitive lookup into the category vocabulary.
pub fn canonical_category(s: &str) -> Option<&'static str> {
    let t = s.trim().to_lowercase();
    if t.is_empty() {
        return None;
    }
    CATEGORIES
        .iter()
        .copied()
        .find(|c| c.to_lowercase() == t)
        .or_else(|| {
            CATEGORY_ALIASES
                .iter()
                .find(|(alias, _)| *alias == t)
                .map(|(_, c)| *c)
        })
}
