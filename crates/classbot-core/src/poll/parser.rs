//! Parser for generated poll text.
//!
//! Grammar, one item per non-blank line (surrounding whitespace ignored):
//!
//! ```text
//! poll     := block+
//! block    := question option{2,4} correct
//! question := "Question" N ":" prompt
//! option   := LETTER delim text        LETTER runs A, B, C, D in order
//! delim    := ")" | "." | ":"
//! correct  := "Correct:" LETTER        LETTER names one of the block's options
//! ```
//!
//! Anything else is rejected with [`EngineError::MalformedPollText`]
//! pointing at the offending 1-based line.

use std::sync::LazyLock;

use regex::Regex;

use super::Question;
use crate::error::{EngineError, EngineResult};
use crate::symbols::{OPTION_LABELS, option_index};

static QUESTION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Question\s+\d+\s*:\s*(\S.*)$").expect("question pattern is valid")
});
static OPTION_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-D])[).:]\s*(\S.*)$").expect("option pattern is valid"));
static CORRECT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Correct\s*:\s*([A-D])\s*$").expect("correct pattern is valid")
});

const MIN_OPTIONS: usize = 2;

struct Pending {
    prompt: String,
    options: Vec<String>,
    opened_at: usize,
}

pub fn parse_questions(text: &str) -> EngineResult<Vec<Question>> {
    let mut questions = Vec::new();
    let mut pending: Option<Pending> = None;
    let mut last_line = 0;

    for (offset, raw) in text.lines().enumerate() {
        let line_no = offset + 1;
        last_line = line_no;
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(caps) = QUESTION_LINE.captures(line) {
            if let Some(open) = &pending {
                return Err(EngineError::malformed(
                    line_no,
                    format!(
                        "question started on line {} has no Correct line",
                        open.opened_at
                    ),
                ));
            }
            pending = Some(Pending {
                prompt: caps[1].trim().to_string(),
                options: Vec::new(),
                opened_at: line_no,
            });
            continue;
        }

        let Some(open) = pending.as_mut() else {
            return Err(EngineError::malformed(line_no, "expected a Question line"));
        };

        if let Some(caps) = OPTION_LINE.captures(line) {
            let label = caps[1].chars().next().unwrap_or('?');
            let expected = OPTION_LABELS.get(open.options.len()).copied();
            if expected != Some(label) {
                return Err(EngineError::malformed(
                    line_no,
                    match expected {
                        Some(expected) => format!("expected option {expected}, found {label}"),
                        None => "more than four options".to_string(),
                    },
                ));
            }
            open.options.push(caps[2].trim().to_string());
            continue;
        }

        if let Some(caps) = CORRECT_LINE.captures(line) {
            let label = caps[1].chars().next().unwrap_or('?');
            if open.options.len() < MIN_OPTIONS {
                return Err(EngineError::malformed(
                    line_no,
                    format!("question needs at least {MIN_OPTIONS} options"),
                ));
            }
            if option_index(label).is_none_or(|index| index >= open.options.len()) {
                return Err(EngineError::malformed(
                    line_no,
                    format!("correct answer {label} is not one of the options"),
                ));
            }
            if let Some(done) = pending.take() {
                questions.push(Question {
                    prompt: done.prompt,
                    options: done.options,
                    correct: label,
                });
            }
            continue;
        }

        return Err(EngineError::malformed(line_no, "unexpected line"));
    }

    if let Some(open) = pending {
        return Err(EngineError::malformed(
            last_line,
            format!(
                "question started on line {} has no Correct line",
                open.opened_at
            ),
        ));
    }
    if questions.is_empty() {
        return Err(EngineError::malformed(last_line, "no questions found"));
    }
    Ok(questions)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    const TWO_QUESTIONS: &str = "\
Question 1: What organelle produces ATP?
A) Nucleus
B) Mitochondrion
C) Ribosome
D) Golgi body
Correct: B

Question 2: Which molecule carries genetic code?
A. DNA
B. Glucose
C. Lipid
Correct: A
";

    fn line_of(err: EngineError) -> usize {
        match err {
            EngineError::MalformedPollText { line, .. } => line,
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn parses_well_formed_blocks() {
        let questions = parse_questions(TWO_QUESTIONS).unwrap();
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].prompt, "What organelle produces ATP?");
        assert_eq!(questions[0].options.len(), 4);
        assert_eq!(questions[0].options[1], "Mitochondrion");
        assert_eq!(questions[0].correct, 'B');
        assert_eq!(questions[0].correct_index(), Some(1));
        assert_eq!(questions[1].options, vec!["DNA", "Glucose", "Lipid"]);
        assert_eq!(questions[1].correct, 'A');
    }

    #[test]
    fn tolerates_indentation_and_blank_lines() {
        let text = "\n  Question 1: Pick one\n\n   A: yes\n   B: no\n  Correct: A\n\n";
        let questions = parse_questions(text).unwrap();
        assert_eq!(questions[0].options, vec!["yes", "no"]);
    }

    #[test]
    fn rejects_missing_correct_line() {
        let text = "Question 1: Q\nA) x\nB) y\nQuestion 2: R\nA) x\nB) y\nCorrect: A";
        assert_eq!(line_of(parse_questions(text).unwrap_err()), 4);

        let truncated = "Question 1: Q\nA) x\nB) y";
        assert_eq!(line_of(parse_questions(truncated).unwrap_err()), 3);
    }

    #[test]
    fn rejects_out_of_order_options() {
        let text = "Question 1: Q\nA) x\nC) y\nCorrect: A";
        assert_eq!(line_of(parse_questions(text).unwrap_err()), 3);
    }

    #[test]
    fn rejects_correct_label_outside_options() {
        let text = "Question 1: Q\nA) x\nB) y\nCorrect: D";
        assert_eq!(line_of(parse_questions(text).unwrap_err()), 4);
    }

    #[test]
    fn rejects_single_option_question() {
        let text = "Question 1: Q\nA) only\nCorrect: A";
        assert_eq!(line_of(parse_questions(text).unwrap_err()), 3);
    }

    #[test]
    fn rejects_preamble_and_stray_lines() {
        let chatty = "Here is your quiz!\nQuestion 1: Q\nA) x\nB) y\nCorrect: A";
        assert_eq!(line_of(parse_questions(chatty).unwrap_err()), 1);

        let stray = "Question 1: Q\nA) x\nsome note\nB) y\nCorrect: A";
        assert_eq!(line_of(parse_questions(stray).unwrap_err()), 3);
    }

    #[test]
    fn rejects_empty_text() {
        assert!(matches!(
            parse_questions("  \n"),
            Err(EngineError::MalformedPollText { .. })
        ));
    }

    proptest! {
        #[test]
        fn never_panics_on_arbitrary_text(text in "\\PC*") {
            let _ = parse_questions(&text);
        }

        #[test]
        fn never_panics_on_near_miss_lines(
            lines in proptest::collection::vec(
                prop_oneof![
                    Just("Question 1: Q".to_string()),
                    "[A-F][).:] ?[a-z]{0,5}",
                    "Correct: ?[A-F]",
                    "[ \t]*",
                    "\\PC{0,12}",
                ],
                0..24,
            )
        ) {
            if let Ok(questions) = parse_questions(&lines.join("\n")) {
                for question in questions {
                    prop_assert!((2..=4).contains(&question.options.len()));
                    prop_assert!(question.correct_index().unwrap() < question.options.len());
                }
            }
        }
    }
}
