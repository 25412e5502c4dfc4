//! Outline merging and rendering.
//!
//! Each chunk of a document is outlined independently, so the same topic can show up in several
//! fragments. [`OutlineMerger`] folds fragments into one [`DocumentStructure`] keyed by heading
//! text: the first time a heading appears fixes its position, and repeated points under the
//! same heading or subheading are dropped by exact text match. The parse cursor (active heading
//! and subheading) carries across fragment boundaries, so a fragment that opens with bare points
//! continues the section the previous fragment ended in.
//!
//! [`DocumentStructure::render`] produces the numbered display form:
//!
//! ```text
//! Intro
//!
//! 1. Intro
//! \t- direct point
//!
//! \ta. Background
//! \t\t- sub point
//! ```

use indexmap::{IndexMap, IndexSet};

/// Message rendered when no fragment contributed anything.
pub const NO_CONTENT_MESSAGE: &str = "No content was extracted from the document.";

/// Title rendered when fragments contained no top-level heading.
pub const UNTITLED_MARKER: &str = "#";

const TOPIC_MARKER: &str = "## ";
const SUBTOPIC_MARKER: &str = "### ";
const POINT_MARKERS: [&str; 2] = ["- ", "* "];
const EMPHASIS_MARKER: &str = "**";
const SUBSECTION_LETTERS: &[u8; 26] = b"abcdefghijklmnopqrstuvwxyz";

/// Classification of one trimmed outline line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutlineLine<'a> {
    /// Level-1 heading, marker stripped.
    Topic(&'a str),
    /// Level-2 heading, marker stripped.
    Subtopic(&'a str),
    /// Bullet point, kept verbatim including its marker.
    Point(&'a str),
    /// Anything else; ignored by the merger.
    Other,
}

impl<'a> OutlineLine<'a> {
    /// Classify an already trimmed line.
    pub fn classify(line: &'a str) -> Self {
        if let Some(rest) = line.strip_prefix(TOPIC_MARKER) {
            Self::Topic(rest.trim())
        } else if let Some(rest) = line.strip_prefix(SUBTOPIC_MARKER) {
            Self::Subtopic(rest.trim())
        } else if POINT_MARKERS.iter().any(|marker| line.starts_with(marker)) {
            Self::Point(line)
        } else {
            Self::Other
        }
    }
}

/// Content gathered under one top-level heading.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Section {
    /// Points placed directly under the heading.
    pub content: Vec<String>,
    /// Subheadings in first-seen order with their points.
    pub subsections: IndexMap<String, Vec<String>>,
}

/// Merged, deduplicated outline of a whole document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentStructure {
    sections: IndexMap<String, Section>,
    fragment_count: usize,
}

impl DocumentStructure {
    /// Merge `fragments` in order.
    pub fn from_fragments<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut merger = OutlineMerger::default();
        for fragment in fragments {
            merger.push_fragment(fragment.as_ref());
        }
        merger.finish()
    }

    /// Top-level headings with their sections, in first-seen order.
    pub fn sections(&self) -> &IndexMap<String, Section> {
        &self.sections
    }

    /// Section for `heading`, if one was seen.
    pub fn section(&self, heading: &str) -> Option<&Section> {
        self.sections.get(heading)
    }

    /// Whether no top-level heading was ever seen.
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Render the structure as numbered, indented plain text.
    pub fn render(&self) -> String {
        if self.fragment_count == 0 {
            return NO_CONTENT_MESSAGE.to_string();
        }

        let title = self
            .sections
            .keys()
            .next()
            .map(String::as_str)
            .unwrap_or(UNTITLED_MARKER);
        let mut lines = vec![title.to_string()];

        for (number, (heading, section)) in self.sections.iter().enumerate() {
            lines.push(format!("\n{}. {heading}", number + 1));
            for point in &section.content {
                lines.push(format!("\t{point}"));
            }

            let populated = section
                .subsections
                .iter()
                .filter(|(_, points)| !points.is_empty());
            for (position, (subheading, points)) in populated.enumerate() {
                lines.push(format!("\n\t{}. {subheading}", subsection_label(position)));
                for point in points {
                    lines.push(format!("{}{point}", point_indent(point)));
                }
            }
        }

        lines.join("\n")
    }
}

/// Label for the subsection at zero-based `position`: `a` through `z`, then the bare index.
pub fn subsection_label(position: usize) -> String {
    SUBSECTION_LETTERS
        .get(position)
        .map(|letter| char::from(*letter).to_string())
        .unwrap_or_else(|| position.to_string())
}

/// Indentation for a point under a subheading; emphasized points sit one level deeper.
pub fn point_indent(point: &str) -> &'static str {
    if point.contains(EMPHASIS_MARKER) {
        "\t\t\t"
    } else {
        "\t\t"
    }
}

/// Incremental fold of outline fragments into a [`DocumentStructure`].
#[derive(Debug, Default)]
pub struct OutlineMerger {
    structure: DocumentStructure,
    current_topic: Option<String>,
    current_subtopic: Option<String>,
}

impl OutlineMerger {
    /// Fold one fragment into the structure.
    pub fn push_fragment(&mut self, fragment: &str) {
        self.structure.fragment_count += 1;
        for raw in fragment.lines() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            match OutlineLine::classify(line) {
                OutlineLine::Topic(heading) => self.open_topic(heading),
                OutlineLine::Subtopic(heading) => self.open_subtopic(heading),
                OutlineLine::Point(point) => self.add_point(point),
                OutlineLine::Other => {}
            }
        }
    }

    /// Finish merging and hand back the structure.
    pub fn finish(self) -> DocumentStructure {
        self.structure
    }

    fn open_topic(&mut self, heading: &str) {
        self.structure
            .sections
            .entry(heading.to_string())
            .or_default();
        self.current_topic = Some(heading.to_string());
        self.current_subtopic = None;
    }

    fn open_subtopic(&mut self, heading: &str) {
        let Some(topic) = self.current_topic.as_deref() else {
            return;
        };
        if let Some(section) = self.structure.sections.get_mut(topic) {
            section
                .subsections
                .entry(heading.to_string())
                .or_default();
            self.current_subtopic = Some(heading.to_string());
        }
    }

    fn add_point(&mut self, point: &str) {
        let Some(topic) = self.current_topic.as_deref() else {
            tracing::trace!(point, "Dropping point outside any heading");
            return;
        };
        let Some(section) = self.structure.sections.get_mut(topic) else {
            return;
        };
        let target = match self.current_subtopic.as_deref() {
            Some(subtopic) => section.subsections.entry(subtopic.to_string()).or_default(),
            None => &mut section.content,
        };
        if !target.iter().any(|existing| existing == point) {
            target.push(point.to_string());
        }
    }
}

/// Top-level heading lines (marker included) of one outline fragment, in order.
pub fn main_headings(outline: &str) -> Vec<String> {
    outline
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with(TOPIC_MARKER))
        .map(str::to_string)
        .collect()
}

/// Headings carried from one extraction call to the next.
#[derive(Debug, Default)]
pub struct HeadingTrail {
    cumulative: bool,
    headings: IndexSet<String>,
}

impl HeadingTrail {
    /// Trail keeping only the latest fragment's headings, or every heading when `cumulative`.
    pub fn new(cumulative: bool) -> Self {
        Self {
            cumulative,
            headings: IndexSet::new(),
        }
    }

    /// Record the headings of a successfully extracted fragment.
    pub fn record(&mut self, outline: &str) {
        if !self.cumulative {
            self.headings.clear();
        }
        self.headings.extend(main_headings(outline));
    }

    /// Headings to pass to the next extraction prompt, if any.
    pub fn context(&self) -> Option<Vec<String>> {
        if self.headings.is_empty() {
            None
        } else {
            Some(self.headings.iter().cloned().collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_recognizes_each_marker() {
        assert_eq!(OutlineLine::classify("## Intro"), OutlineLine::Topic("Intro"));
        assert_eq!(
            OutlineLine::classify("### Background "),
            OutlineLine::Subtopic("Background")
        );
        assert_eq!(OutlineLine::classify("- point"), OutlineLine::Point("- point"));
        assert_eq!(OutlineLine::classify("* point"), OutlineLine::Point("* point"));
        assert_eq!(OutlineLine::classify("#### deep"), OutlineLine::Other);
        assert_eq!(OutlineLine::classify("plain prose"), OutlineLine::Other);
    }

    #[test]
    fn duplicate_heading_and_point_appear_once() {
        let structure =
            DocumentStructure::from_fragments(["## Intro\n- point A", "## Intro\n- point A"]);
        assert_eq!(structure.sections().len(), 1);
        assert_eq!(
            structure.section("Intro").expect("intro").content,
            vec!["- point A"]
        );
    }

    #[test]
    fn heading_order_is_first_seen() {
        let structure = DocumentStructure::from_fragments([
            "## Alpha\n- a",
            "## Beta\n- b",
            "## Alpha\n- a2",
        ]);
        let headings: Vec<&str> = structure.sections().keys().map(String::as_str).collect();
        assert_eq!(headings, vec!["Alpha", "Beta"]);
        assert_eq!(
            structure.section("Alpha").expect("alpha").content,
            vec!["- a", "- a2"]
        );
    }

    #[test]
    fn subheading_needs_an_active_heading() {
        let structure = DocumentStructure::from_fragments(["### Orphan\n- lost\n## Real\n- kept"]);
        assert_eq!(structure.sections().len(), 1);
        let section = structure.section("Real").expect("real");
        assert!(section.subsections.is_empty());
        assert_eq!(section.content, vec!["- kept"]);
    }

    #[test]
    fn cursor_carries_into_next_fragment() {
        let structure =
            DocumentStructure::from_fragments(["## Intro\n### Scope\n- one", "- two\n## Next"]);
        let scope = &structure.section("Intro").expect("intro").subsections["Scope"];
        assert_eq!(scope, &vec!["- one".to_string(), "- two".to_string()]);
    }

    #[test]
    fn empty_subsections_are_not_rendered() {
        let structure =
            DocumentStructure::from_fragments(["## Intro\n### Empty\n### Full\n- point"]);
        let rendered = structure.render();
        assert!(!rendered.contains("Empty"));
        assert!(rendered.contains("\n\ta. Full\n\t\t- point"));
    }

    #[test]
    fn render_numbers_sections_and_letters_subsections() {
        let structure = DocumentStructure::from_fragments([
            "## Intro\n- direct\n### Background\n- history",
            "## Methods\n### Design\n- **Key** idea\n- detail",
        ]);
        let expected = "Intro\n\
            \n1. Intro\n\
            \t- direct\n\
            \n\ta. Background\n\
            \t\t- history\n\
            \n2. Methods\n\
            \n\ta. Design\n\
            \t\t\t- **Key** idea\n\
            \t\t- detail";
        assert_eq!(structure.render(), expected);
    }

    #[test]
    fn render_without_headings_uses_marker() {
        let structure = DocumentStructure::from_fragments(["- stray point", "prose"]);
        assert!(structure.is_empty());
        assert_eq!(structure.render(), UNTITLED_MARKER);
    }

    #[test]
    fn render_without_fragments_reports_no_content() {
        let structure = DocumentStructure::from_fragments(Vec::<String>::new());
        assert_eq!(structure.render(), NO_CONTENT_MESSAGE);
    }

    #[test]
    fn labels_switch_to_numbers_after_z() {
        assert_eq!(subsection_label(0), "a");
        assert_eq!(subsection_label(25), "z");
        assert_eq!(subsection_label(26), "26");
    }

    #[test]
    fn emphasis_points_get_extra_indent() {
        assert_eq!(point_indent("- **bold** claim"), "\t\t\t");
        assert_eq!(point_indent("- plain claim"), "\t\t");
    }

    #[test]
    fn heading_trail_modes() {
        let mut previous = HeadingTrail::new(false);
        assert_eq!(previous.context(), None);
        previous.record("## A\n- x\n## B");
        previous.record("## C");
        assert_eq!(previous.context(), Some(vec!["## C".to_string()]));

        let mut cumulative = HeadingTrail::new(true);
        cumulative.record("## A\n## B");
        cumulative.record("## B\n## C");
        assert_eq!(
            cumulative.context(),
            Some(vec!["## A".into(), "## B".into(), "## C".into()])
        );
    }

    #[test]
    fn main_headings_ignore_subheadings() {
        assert_eq!(
            main_headings("  ## Intro\n### Sub\n- p\n## Outro"),
            vec!["## Intro", "## Outro"]
        );
    }
}
