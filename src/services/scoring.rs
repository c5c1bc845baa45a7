use anyhow::Result;
use serde::Serialize;

use crate::services::ai_grading::{AnswerGrader, StudentAnswer};
use crate::services::answer_key::{AnswerKey, AnswerKind};

const NUMERIC_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct QuestionResult {
    pub(crate) question_number: u32,
    pub(crate) question: String,
    pub(crate) student_answer: String,
    pub(crate) expected_answer: Option<String>,
    pub(crate) kind: AnswerKind,
    pub(crate) score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) feedback: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct GradeReport {
    pub(crate) results: Vec<QuestionResult>,
    pub(crate) total_score: f64,
    pub(crate) max_score: f64,
}

/// Scores one answer in `[0, 1]` and describes how the score was reached.
pub(crate) async fn grade_question(
    student: &str,
    expected: Option<&str>,
    kind: AnswerKind,
    grader: &dyn AnswerGrader,
) -> Result<(f64, String)> {
    let expected = expected.map(str::trim).filter(|value| !value.is_empty());
    let student = student.trim();
    let Some(expected) = expected.filter(|_| !student.is_empty()) else {
        return Ok((0.0, "No answer provided".to_string()));
    };

    let outcome = match kind {
        AnswerKind::Mcq => (
            exact(student.to_uppercase() == expected.to_uppercase()),
            "Multiple choice".to_string(),
        ),
        AnswerKind::TrueFalse => {
            (exact(student.to_lowercase() == expected.to_lowercase()), "True/False".to_string())
        }
        AnswerKind::Numerical => match (student.parse::<f64>(), expected.parse::<f64>()) {
            (Ok(got), Ok(want)) => {
                (exact((got - want).abs() <= NUMERIC_TOLERANCE), "Numerical".to_string())
            }
            _ => (0.0, "Invalid number format".to_string()),
        },
        AnswerKind::Short => {
            let score = grader.score_short_answer(student, expected).await?.clamp(0.0, 1.0);
            // Whole percent, truncated.
            (score, format!("{}% similarity (AI)", (score * 100.0) as i64))
        }
    };

    Ok(outcome)
}

/// Grades every extracted answer against the key, in extraction order.
pub(crate) async fn grade_exam(
    student_answers: &[StudentAnswer],
    key: &AnswerKey,
    grader: &dyn AnswerGrader,
) -> Result<GradeReport> {
    let mut results = Vec::with_capacity(student_answers.len());

    for answer in student_answers {
        let entry = key.lookup(answer.question_number);
        let kind = entry.map(|entry| entry.kind).unwrap_or(AnswerKind::Short);
        let expected = entry.map(|entry| entry.answer.clone());

        let (score, feedback) =
            grade_question(&answer.answer, expected.as_deref(), kind, grader).await?;
        metrics::counter!("grading_questions_total", "kind" => kind.as_str()).increment(1);

        results.push(QuestionResult {
            question_number: answer.question_number,
            question: answer.question.clone(),
            student_answer: answer.answer.clone(),
            expected_answer: expected,
            kind,
            score,
            feedback: (kind == AnswerKind::Short).then_some(feedback),
        });
    }

    let total_score = results.iter().map(|result| result.score).sum();
    let max_score = results.len() as f64;

    Ok(GradeReport { results, total_score, max_score })
}

/// Reads a 0-100 score out of a free-text model reply and scales it to `[0, 1]`.
///
/// Uses the first run of digits; runs longer than three digits keep their last three.
pub(crate) fn parse_score_reply(reply: &str) -> f64 {
    let digits: String = reply
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        return 0.0;
    }

    let tail = &digits[digits.len().saturating_sub(3)..];
    let value = tail.parse::<u32>().unwrap_or(0).min(100);
    f64::from(value) / 100.0
}

fn exact(matched: bool) -> f64 {
    if matched {
        1.0
    } else {
        0.0
    }
}
