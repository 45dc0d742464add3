//! Task grading.
//!
//! Grading is a pure function of the task definition and the answer. It
//! never fails: unknown tasks and unsupported task types score zero with a
//! diagnostic detail.

use crate::matcher::{PredicateError, build_regex};
use parley_types::{Task, TaskAnswer};
use regex::Regex;
use serde_json::Value;
use tracing::warn;

/// Result of grading one answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Grade {
    pub score: f64,
    pub detail: String,
}

impl Grade {
    fn zero(detail: impl Into<String>) -> Self {
        Self {
            score: 0.0,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    /// `None` when the pattern was malformed and skipped.
    regex: Option<Regex>,
    score: f64,
    why: Option<String>,
}

/// A task with its rubric patterns compiled.
#[derive(Debug, Clone)]
pub struct CompiledTask {
    pub task: Task,
    rubric: Vec<CompiledRule>,
}

impl CompiledTask {
    /// Compile rubric patterns, reporting the first malformed one.
    pub fn compile(task: Task) -> Result<Self, PredicateError> {
        let rubric = rules_of(&task)
            .iter()
            .map(|rule| -> Result<CompiledRule, PredicateError> {
                let flags = rule.pattern.flags.as_deref().unwrap_or("");
                Ok(CompiledRule {
                    regex: Some(build_regex(&rule.pattern.regex, flags)?),
                    score: rule.score,
                    why: rule.why.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { task, rubric })
    }

    /// Compile rubric patterns, skipping malformed ones.
    pub fn compile_lenient(task: Task) -> Self {
        let rubric = rules_of(&task)
            .iter()
            .map(|rule| {
                let flags = rule.pattern.flags.as_deref().unwrap_or("");
                let regex = match build_regex(&rule.pattern.regex, flags) {
                    Ok(re) => Some(re),
                    Err(e) => {
                        warn!(target: "parley::scenario", "Task {}: skipping rubric rule: {}", task.id, e);
                        None
                    }
                };
                CompiledRule {
                    regex,
                    score: rule.score,
                    why: rule.why.clone(),
                }
            })
            .collect();
        Self { task, rubric }
    }
}

fn rules_of(task: &Task) -> &[parley_types::RubricRule] {
    task.answer
        .as_ref()
        .map(|a| a.rubric.as_slice())
        .unwrap_or(&[])
}

/// Grade an answer. `task` is `None` when the submitted id did not resolve.
pub fn grade(task: Option<&CompiledTask>, answer: &TaskAnswer) -> Grade {
    let Some(compiled) = task else {
        return Grade::zero("Unknown task");
    };
    let task = &compiled.task;

    if task.is_mcq() {
        return grade_choice(task, answer);
    }
    if task.is_freeform() {
        return grade_rubric(compiled, answer);
    }
    Grade::zero("Unsupported task type")
}

fn grade_choice(task: &Task, answer: &TaskAnswer) -> Grade {
    let Some(correct) = &task.correct else {
        return Grade::zero("No correct choice configured");
    };
    let score = if answer.choice.as_ref() == Some(correct) {
        task.score.unwrap_or(0.0)
    } else {
        0.0
    };
    Grade {
        score,
        detail: format!("Correct: {}", display_value(correct)),
    }
}

fn grade_rubric(compiled: &CompiledTask, answer: &TaskAnswer) -> Grade {
    let text = answer.text.as_deref().unwrap_or("").trim();
    let mut score = 0.0;
    let mut notes = Vec::new();

    for rule in &compiled.rubric {
        let Some(re) = &rule.regex else { continue };
        if re.is_match(text) {
            score += rule.score;
            if let Some(why) = rule.why.as_deref().filter(|w| !w.is_empty()) {
                notes.push(why);
            }
        }
    }

    let max = compiled
        .task
        .answer
        .as_ref()
        .and_then(|a| a.max_score)
        .unwrap_or(score);

    Grade {
        score: score.min(max),
        detail: notes.join("; "),
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
