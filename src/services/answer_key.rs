use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum AnswerKind {
    Mcq,
    TrueFalse,
    Numerical,
    Short,
}

impl AnswerKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            AnswerKind::Mcq => "mcq",
            AnswerKind::TrueFalse => "true_false",
            AnswerKind::Numerical => "numerical",
            AnswerKind::Short => "short",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct AnswerKeyEntry {
    pub(crate) question: u32,
    pub(crate) answer: String,
    pub(crate) kind: AnswerKind,
}

/// Expected answers for one exam, numbered from 1 in table order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub(crate) struct AnswerKey {
    pub(crate) entries: Vec<AnswerKeyEntry>,
}

impl AnswerKey {
    pub(crate) fn from_html(html: &str) -> Self {
        Self { entries: parse_answer_key(html) }
    }

    pub(crate) fn lookup(&self, question: u32) -> Option<&AnswerKeyEntry> {
        self.entries.iter().find(|entry| entry.question == question)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Reads one answer per table row: the second cell of every row with two or more cells.
pub(crate) fn parse_answer_key(html: &str) -> Vec<AnswerKeyEntry> {
    let document = Html::parse_fragment(html);
    let mut entries = Vec::new();

    for row in elements_named(document.root_element(), "tr") {
        let Some(answer_cell) = elements_named(row, "td").nth(1) else {
            continue;
        };
        let answer = answer_cell.text().collect::<String>().trim().to_string();
        let kind = detect_kind(&answer);
        entries.push(AnswerKeyEntry { question: entries.len() as u32 + 1, answer, kind });
    }

    entries
}

pub(crate) fn detect_kind(answer: &str) -> AnswerKind {
    let trimmed = answer.trim();
    let lowered = trimmed.to_ascii_lowercase();

    let mut chars = trimmed.chars();
    if let (Some(letter), None) = (chars.next(), chars.next()) {
        if matches!(letter.to_ascii_lowercase(), 'a'..='f') {
            return AnswerKind::Mcq;
        }
    }

    if lowered == "true" || lowered == "false" {
        return AnswerKind::TrueFalse;
    }

    let numeric_shape = trimmed.chars().all(|c| {
        c.is_ascii_digit() || c.is_whitespace() || matches!(c, '.' | ',' | '%' | '$' | '+' | '-')
    });
    if !trimmed.is_empty() && numeric_shape {
        return AnswerKind::Numerical;
    }

    AnswerKind::Short
}

fn elements_named<'a>(
    scope: ElementRef<'a>,
    name: &'a str,
) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    scope
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(move |element| element.value().name() == name)
}
