//! Overlap detection: tools with the same job serving the same population.
//!
//! Read-only analytics over the active catalog. Each entry is claimed by
//! the first (highest-priority) taxonomy category whose keywords it
//! mentions; candidates inside a category are then clustered greedily by
//! grade and audience overlap.

use serde::Serialize;

use crate::classify::{classify_entry, DivisionFlags};
use crate::model::{format_dollars, name_sort_key, AnnualCost, CatalogEntry};
use crate::vocab::{self, Audience, Grade};

/// Tool-type taxonomy in priority order. Keywords are matched as lowercase
/// substrings of name, description, category and subjects.
pub const TAXONOMY: &[(&str, &[&str])] = &[
    ("Learning Management", &["learning management", "lms", "course management", "canvas", "schoology", "google classroom"]),
    ("Student Information", &["student information", "gradebook", "attendance", "powerschool", "infinite campus"]),
    ("Formative Assessment", &["formative", "exit ticket", "quiz", "kahoot", "socrative", "quick check"]),
    ("Summative Assessment", &["summative", "benchmark", "standardized test", "test prep", "exams"]),
    ("Adaptive Math Practice", &["adaptive math", "math practice", "math fluency", "fact fluency", "ixl"]),
    ("Math Tools", &["graphing", "calculator", "geometry", "algebra", "desmos", "manipulative"]),
    ("Reading Practice", &["reading practice", "leveled reading", "reading comprehension", "decodable", "phonics"]),
    ("Writing Support", &["writing", "grammar", "essay", "spelling"]),
    ("E-books & Libraries", &["ebook", "e-book", "digital library", "audiobook", "library catalog"]),
    ("Research Databases", &["research database", "encyclopedia", "citation", "bibliography", "primary source"]),
    ("Plagiarism Detection", &["plagiarism", "originality", "turnitin", "ai detection"]),
    ("Presentation Tools", &["presentation", "slides", "slideshow", "pitch deck"]),
    ("Video Creation", &["video editing", "screen recording", "screencast", "video creation"]),
    ("Interactive Video", &["interactive video", "video lesson", "edpuzzle"]),
    ("Graphic Design", &["graphic design", "infographic", "poster", "canva"]),
    ("Digital Portfolios", &["portfolio", "seesaw", "student journal"]),
    ("Discussion & Collaboration", &["discussion board", "padlet", "whiteboard", "brainstorm", "collaboration"]),
    ("Video Conferencing", &["video conferencing", "video call", "zoom", "google meet", "webinar"]),
    ("Parent Communication", &["parent communication", "family engagement", "newsletter", "remind", "class messaging"]),
    ("Classroom Management", &["classroom management", "behavior", "class dojo", "classdojo", "seating chart"]),
    ("Device Management", &["screen monitoring", "device management", "mdm", "goguardian", "content filter"]),
    ("Coding & Computer Science", &["coding", "programming", "computer science", "scratch", "python"]),
    ("Robotics & Engineering", &["robotics", "engineering", "3d design", "circuit"]),
    ("Science Simulations", &["simulation", "virtual lab", "phet", "science lab"]),
    ("Language Learning", &["language learning", "spanish", "french", "duolingo", "world language"]),
    ("Typing", &["typing", "keyboarding"]),
    ("Music Creation", &["music", "composition", "notation", "audio editing"]),
    ("Social Studies Content", &["social studies", "history", "geography", "civics", "current events"]),
    ("Flashcards & Study", &["flashcard", "study set", "quizlet", "spaced repetition"]),
    ("Test Prep & Tutoring", &["tutoring", "homework help", "sat prep", "act prep"]),
    ("Special Education Supports", &["special education", "iep", "text-to-speech", "text to speech", "accessibility", "dyslexia"]),
    ("Social-Emotional Learning", &["social-emotional", "social emotional", "wellness", "mindfulness"]),
    ("College & Career", &["college", "career", "naviance", "scholarship"]),
    ("Survey & Forms", &["survey", "form builder", "forms", "polling"]),
    ("Note Taking", &["note taking", "note-taking", "notebook", "onenote"]),
    ("File Storage", &["file storage", "cloud storage", "google drive", "dropbox"]),
    ("Scheduling", &["scheduling", "calendar", "appointment", "booking"]),
    ("Professional Learning", &["professional development", "professional learning", "teacher training"]),
    ("Lesson Planning", &["lesson plan", "curriculum map", "unit planner"]),
    ("Curriculum Content", &["curriculum", "courseware", "lesson library", "digital textbook"]),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlapMember {
    pub product_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stable_id: Option<String>,
    pub annual_cost: AnnualCost,
    pub cost_label: String,
    pub division: String,
    pub grade_range: String,
    pub audience: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlapGroup {
    pub category: String,
    pub members: Vec<OverlapMember>,
    /// Cents: every member's cost except the cheapest one.
    pub potential_savings: i64,
    pub recommendation: String,
}

// ---------------------------------------------------------------------------
// Predicates
// ---------------------------------------------------------------------------

fn haystack(entry: &CatalogEntry) -> String {
    format!(
        "{} {} {} {}",
        entry.product_name, entry.description, entry.category, entry.subjects
    )
    .to_lowercase()
}

/// Index of the first taxonomy category the entry mentions.
pub fn taxonomy_match(entry: &CatalogEntry) -> Option<usize> {
    let text = haystack(entry);
    TAXONOMY
        .iter()
        .position(|(_, keywords)| keywords.iter().any(|k| text.contains(k)))
}

/// Unknown (empty) grade sets overlap with everything.
pub fn grades_overlap(a: &[Grade], b: &[Grade]) -> bool {
    a.is_empty() || b.is_empty() || a.iter().any(|g| b.contains(g))
}

pub fn audiences_overlap(a: &[Audience], b: &[Audience]) -> bool {
    if a.is_empty() || b.is_empty() {
        return true;
    }
    let both = |x: Audience| a.contains(&x) && b.contains(&x);
    both(Audience::Student) || both(Audience::Teacher)
}

struct Candidate<'a> {
    entry: &'a CatalogEntry,
    grades: Vec<Grade>,
    audience: Vec<Audience>,
}

impl Candidate<'_> {
    fn overlaps(&self, other: &Candidate<'_>) -> bool {
        grades_overlap(&self.grades, &other.grades) && audiences_overlap(&self.audience, &other.audience)
    }
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

pub fn detect_overlaps(entries: &[CatalogEntry]) -> Vec<OverlapGroup> {
    let mut buckets: Vec<Vec<Candidate<'_>>> = (0..TAXONOMY.len()).map(|_| Vec::new()).collect();
    for entry in entries.iter().filter(|e| e.active && !e.product_name.trim().is_empty()) {
        if let Some(i) = taxonomy_match(entry) {
            buckets[i].push(Candidate {
                entry,
                grades: entry.grade_set(),
                audience: entry.audience_set(),
            });
        }
    }

    let mut groups: Vec<(usize, OverlapGroup)> = Vec::new();
    for (i, mut candidates) in buckets.into_iter().enumerate() {
        candidates.sort_by(|a, b| {
            name_sort_key(&a.entry.product_name)
                .cmp(&name_sort_key(&b.entry.product_name))
                .then_with(|| a.entry.product_name.cmp(&b.entry.product_name))
        });

        let mut clusters: Vec<Vec<Candidate<'_>>> = Vec::new();
        for candidate in candidates {
            match clusters
                .iter_mut()
                .find(|cluster| cluster.iter().all(|m| m.overlaps(&candidate)))
            {
                Some(cluster) => cluster.push(candidate),
                None => clusters.push(vec![candidate]),
            }
        }

        for cluster in clusters.into_iter().filter(|c| c.len() >= 2) {
            let members: Vec<&CatalogEntry> = cluster.iter().map(|c| c.entry).collect();
            groups.push((i, build_group(TAXONOMY[i].0, &members)));
        }
    }

    groups.sort_by(|(ia, a), (ib, b)| {
        b.potential_savings
            .cmp(&a.potential_savings)
            .then_with(|| ia.cmp(ib))
    });
    groups.into_iter().map(|(_, g)| g).collect()
}

/// Total potential savings in cents.
pub fn estimate_savings(groups: &[OverlapGroup]) -> i64 {
    groups
        .iter()
        .fold(0i64, |acc, g| acc.saturating_add(g.potential_savings))
}

/// Sum of all costs but the cheapest. Unknown costs count as zero.
pub fn potential_savings(costs: &[i64]) -> i64 {
    if costs.len() < 2 {
        return 0;
    }
    let min = costs.iter().copied().min().unwrap_or(0);
    let total = costs.iter().fold(0i64, |acc, c| acc.saturating_add(*c));
    total.saturating_sub(min)
}

fn build_group(category: &str, entries: &[&CatalogEntry]) -> OverlapGroup {
    let costs: Vec<i64> = entries.iter().map(|e| e.annual_cost.cents_or_zero()).collect();
    let savings = potential_savings(&costs);

    let members: Vec<OverlapMember> = entries
        .iter()
        .map(|e| OverlapMember {
            product_name: e.product_name.clone(),
            stable_id: e.stable_id.clone(),
            annual_cost: e.annual_cost.clone(),
            cost_label: e.annual_cost.label(),
            division: classify_entry(e).context_label(),
            grade_range: vocab::grade_span_label(&e.grade_set()),
            audience: vocab::render_audience_list(&e.audience_set()),
        })
        .collect();

    let context = division_context(entries);
    let recommendation = if savings > 0 {
        let keep = entries
            .iter()
            .zip(&costs)
            .min_by_key(|(_, c)| **c)
            .map(|(e, _)| e.product_name.as_str())
            .unwrap_or_default();
        format!(
            "{n} {category} tools serve {context}. Consolidating on {keep} could save {amount} per year.",
            n = entries.len(),
            amount = format_dollars(savings),
        )
    } else {
        format!(
            "{n} free {category} tools serve {context}. Standardizing on one would simplify training and support.",
            n = entries.len(),
        )
    };

    OverlapGroup {
        category: category.to_string(),
        members,
        potential_savings: savings,
        recommendation,
    }
}

fn division_context(entries: &[&CatalogEntry]) -> String {
    let mut flags = DivisionFlags::default();
    for e in entries {
        let c = classify_entry(e);
        if c.org_wide {
            return "the whole organization".to_string();
        }
        flags.elementary |= c.divisions.elementary;
        flags.middle |= c.divisions.middle;
        flags.high |= c.divisions.high;
    }
    match flags.labels().as_slice() {
        [] => "unassigned divisions".to_string(),
        [one] => format!("the {one} division"),
        many => format!("the {} divisions", many.join(" and ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, description: &str, cents: i64, grades: &str, audience: &str) -> CatalogEntry {
        CatalogEntry {
            description: description.to_string(),
            annual_cost: AnnualCost::Amount(cents),
            grade_levels: grades.to_string(),
            audience: audience.to_string(),
            division: "Middle".to_string(),
            ..CatalogEntry::named(name)
        }
    }

    #[test]
    fn free_and_paid_quiz_tools_form_one_group() {
        let entries = vec![
            entry("QuizFree", "formative quiz game", 0, "Grade 6, Grade 7", "Student"),
            entry("QuizPaid", "quiz builder", 50_000, "Grade 7, Grade 8", "Student"),
        ];
        let groups = detect_overlaps(&entries);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].category, "Formative Assessment");
        assert_eq!(groups[0].potential_savings, 50_000);
        assert_eq!(groups[0].members.len(), 2);
        assert!(groups[0].recommendation.contains("QuizFree"));
        assert!(groups[0].recommendation.contains("$500.00"));
    }

    #[test]
    fn savings_exclude_only_the_cheapest() {
        assert_eq!(potential_savings(&[300, 100, 200]), 500);
        assert_eq!(potential_savings(&[100, 100]), 100);
        assert_eq!(potential_savings(&[700]), 0);
        assert_eq!(potential_savings(&[]), 0);
    }

    #[test]
    fn huge_costs_do_not_overflow_savings() {
        assert_eq!(potential_savings(&[i64::MAX, i64::MAX, 0]), i64::MAX);
        let groups = vec![
            OverlapGroup {
                category: "A".into(),
                members: vec![],
                potential_savings: i64::MAX,
                recommendation: String::new(),
            },
            OverlapGroup {
                category: "B".into(),
                members: vec![],
                potential_savings: 1,
                recommendation: String::new(),
            },
        ];
        assert_eq!(estimate_savings(&groups), i64::MAX);
    }

    #[test]
    fn unparseable_huge_cost_cells_count_as_unknown() {
        let table = crate::table::Table::from_csv_str(
            "product_name,active,division,annual_cost,description\n\
             Slides A,TRUE,Middle,99999999999999999,presentation\n\
             Slides B,TRUE,Middle,99999999999999999,presentation\n\
             Slides C,TRUE,Middle,300,presentation\n",
        )
        .unwrap();
        let entries = crate::normalize::entries_from_table(&table);
        let groups = detect_overlaps(&entries);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].members.len(), 3);
        assert_eq!(groups[0].potential_savings, 30_000);
        assert_eq!(groups[0].members[0].cost_label, "Unknown");
    }

    #[test]
    fn disjoint_grades_do_not_group() {
        let entries = vec![
            entry("Slides A", "presentation", 100, "Grade 1", "Student"),
            entry("Slides B", "presentation", 100, "Grade 9", "Student"),
        ];
        assert!(detect_overlaps(&entries).is_empty());
    }

    #[test]
    fn unknown_grades_and_audience_overlap_everything() {
        let entries = vec![
            entry("Slides A", "presentation", 100, "Grade 1", "Student"),
            entry("Slides B", "presentation", 100, "", ""),
        ];
        assert_eq!(detect_overlaps(&entries).len(), 1);
    }

    #[test]
    fn student_and_teacher_tools_do_not_group() {
        let entries = vec![
            entry("Slides A", "presentation", 100, "", "Student"),
            entry("Slides B", "presentation", 100, "", "Teacher, Staff"),
        ];
        assert!(detect_overlaps(&entries).is_empty());
    }

    #[test]
    fn entries_are_claimed_by_first_category_only() {
        let e = entry("Canvas Quiz", "lms with quiz", 0, "", "");
        assert_eq!(taxonomy_match(&e), Some(0));
        let entries = vec![
            e,
            entry("Quizzy", "quiz", 0, "", ""),
        ];
        assert!(detect_overlaps(&entries).is_empty());
    }

    #[test]
    fn all_free_group_recommends_standardizing() {
        let entries = vec![
            entry("Type A", "typing practice", 0, "", "Student"),
            entry("Type B", "keyboarding", 0, "", "Student"),
        ];
        let groups = detect_overlaps(&entries);
        assert_eq!(groups[0].potential_savings, 0);
        assert!(groups[0].recommendation.contains("Standardizing"));
        assert!(groups[0].recommendation.contains("Middle division"));
    }

    #[test]
    fn inactive_entries_are_ignored_and_groups_sorted_by_savings() {
        let mut retired = entry("Type C", "typing", 90_000, "", "");
        retired.active = false;
        let entries = vec![
            entry("Type A", "typing", 100, "", ""),
            entry("Type B", "typing", 200, "", ""),
            retired,
            entry("Slides A", "presentation", 1_000, "", ""),
            entry("Slides B", "presentation", 5_000, "", ""),
        ];
        let groups = detect_overlaps(&entries);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].category, "Presentation Tools");
        assert_eq!(groups[1].members.len(), 2);
        assert_eq!(estimate_savings(&groups), 5_000 + 200);
    }
}
