//! Answer extraction from parsed-document HTML.
//!
//! The document parser returns exam pages as HTML where the student's answers
//! live in the first paragraph, one line per `<br>`. Two layouts are in use:
//! alternating question/answer lines, and label-prefixed lines such as `1) red`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const MAX_LABEL_LEN: usize = 4;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerLayout {
    /// Question line followed by answer line; answers sit on odd lines.
    Alternating,
    /// Every line carries a label up to `)` followed by the answer.
    Labeled,
    #[default]
    Auto,
}

impl AnswerLayout {
    pub fn as_str(self) -> &'static str {
        match self {
            AnswerLayout::Alternating => "alternating",
            AnswerLayout::Labeled => "labeled",
            AnswerLayout::Auto => "auto",
        }
    }
}

impl fmt::Display for AnswerLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown answer layout: {0}")]
pub struct UnknownLayout(String);

impl FromStr for AnswerLayout {
    type Err = UnknownLayout;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "alternating" | "tabular" => Ok(AnswerLayout::Alternating),
            "labeled" | "labelled" => Ok(AnswerLayout::Labeled),
            "auto" => Ok(AnswerLayout::Auto),
            other => Err(UnknownLayout(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AnswerSet {
    Sequence(Vec<String>),
    Indexed(BTreeMap<usize, String>),
}

impl AnswerSet {
    pub fn len(&self) -> usize {
        match self {
            AnswerSet::Sequence(items) => items.len(),
            AnswerSet::Indexed(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("malformed input: {0}")]
    MalformedInput(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudentHeader {
    pub name: String,
    pub id: String,
}

/// Extracts answers from the first paragraph of `html`.
///
/// Returns the layout that was actually applied; `Auto` never comes back.
pub fn extract_answers(
    html: &str,
    layout: AnswerLayout,
) -> Result<(AnswerLayout, AnswerSet), ExtractError> {
    let document = Html::parse_fragment(html);
    let paragraph = first_element(&document, "p")
        .ok_or(ExtractError::MalformedInput("no paragraph element found"))?;
    let lines = paragraph_lines(paragraph);

    let resolved = match layout {
        AnswerLayout::Auto => detect_layout(&lines),
        explicit => explicit,
    };

    let answers = match resolved {
        AnswerLayout::Labeled => AnswerSet::Indexed(labeled_answers(&lines)),
        _ => AnswerSet::Sequence(alternating_answers(&lines)),
    };

    metrics::counter!("answer_extractions_total", "layout" => resolved.as_str()).increment(1);
    tracing::debug!(
        layout = %resolved,
        lines = lines.len(),
        answers = answers.len(),
        "Extracted answers"
    );

    Ok((resolved, answers))
}

/// Reads the student name and id from the first two body cells of the paper header table.
pub fn extract_student_header(html: &str) -> Option<StudentHeader> {
    let document = Html::parse_fragment(html);
    let mut cells = document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|element| element.value().name() == "td" && inside(element, "tbody"))
        .map(|cell| cell.text().collect::<String>().trim().to_string());

    let name = cells.next()?;
    let id = cells.next()?;
    Some(StudentHeader { name, id })
}

/// Picks `Labeled` when every non-blank line starts with a short label closed by `)`.
pub(crate) fn detect_layout(lines: &[String]) -> AnswerLayout {
    let mut non_blank = lines.iter().filter(|line| !line.trim().is_empty()).peekable();
    if non_blank.peek().is_none() {
        return AnswerLayout::Alternating;
    }

    if non_blank.all(|line| starts_with_label(line)) {
        AnswerLayout::Labeled
    } else {
        AnswerLayout::Alternating
    }
}

pub(crate) fn alternating_answers(lines: &[String]) -> Vec<String> {
    lines.iter().skip(1).step_by(2).map(|line| line.trim().to_string()).collect()
}

pub(crate) fn labeled_answers(lines: &[String]) -> BTreeMap<usize, String> {
    lines.iter().enumerate().map(|(index, line)| (index, strip_label(line))).collect()
}

fn strip_label(line: &str) -> String {
    line.split_once(')').map(|(_, rest)| rest.trim().to_string()).unwrap_or_default()
}

fn starts_with_label(line: &str) -> bool {
    let Some((label, _)) = line.trim_start().split_once(')') else {
        return false;
    };
    let count = label.chars().count();
    (1..=MAX_LABEL_LEN).contains(&count) && label.chars().all(char::is_alphanumeric)
}

pub(crate) fn first_element<'a>(document: &'a Html, name: &str) -> Option<ElementRef<'a>> {
    document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .find(|element| element.value().name() == name)
}

fn inside(element: &ElementRef<'_>, ancestor: &str) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|parent| parent.value().name() == ancestor)
}

/// Splits the paragraph's text on `<br>` elements, at any nesting depth.
pub(crate) fn paragraph_lines(paragraph: ElementRef<'_>) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    collect_lines(paragraph, &mut lines, &mut current);
    lines.push(current);
    lines
}

fn collect_lines(element: ElementRef<'_>, lines: &mut Vec<String>, current: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            current.push_str(text);
        } else if let Some(nested) = ElementRef::wrap(child) {
            if nested.value().name() == "br" {
                lines.push(std::mem::take(current));
            } else {
                collect_lines(nested, lines, current);
            }
        }
    }
}
