//! Multi-section survey forms.
//!
//! A [`Survey`] is loaded from JSON. [`Survey::assemble`] checks a set of
//! answers against it and flattens them into a single [`Response`] row,
//! which is then handed to a [`ResponseStore`](store::ResponseStore).

pub mod s3;
pub mod store;

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SurveyError;

pub const TIMESTAMP_COLUMN: &str = "timestamp";
const MULTI_SEPARATOR: &str = "; ";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestionKind {
    Text,
    Choice { options: Vec<String> },
    MultiChoice { options: Vec<String> },
    Scale { min: i64, max: i64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub prompt: String,
    #[serde(flatten)]
    pub kind: QuestionKind,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Survey {
    pub title: String,
    pub sections: Vec<Section>,
}

/// A single answer as submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Answer {
    Number(i64),
    Text(String),
    Many(Vec<String>),
}

pub type Answers = BTreeMap<String, Answer>;

/// One submission flattened to `(column, value)` pairs in schema order,
/// preceded by the submission timestamp.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub submitted_at: DateTime<Utc>,
    pub columns: Vec<(String, String)>,
}

impl Response {
    pub fn header(&self) -> Vec<&str> {
        std::iter::once(TIMESTAMP_COLUMN)
            .chain(self.columns.iter().map(|(k, _)| k.as_str()))
            .collect()
    }

    pub fn values(&self) -> Vec<String> {
        std::iter::once(self.submitted_at.to_rfc3339())
            .chain(self.columns.iter().map(|(_, v)| v.clone()))
            .collect()
    }

    /// Renders the response as CSV text, optionally led by a header line.
    pub fn to_csv_row(&self, include_header: bool) -> Result<String, csv::Error> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        if include_header {
            writer.write_record(self.header())?;
        }
        writer.write_record(self.values())?;
        let bytes = writer
            .into_inner()
            .map_err(|e| csv::Error::from(e.into_error()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

fn is_blank(answer: &Answer) -> bool {
    match answer {
        Answer::Number(_) => false,
        Answer::Text(s) => s.trim().is_empty(),
        Answer::Many(v) => v.is_empty(),
    }
}

impl Question {
    fn render(&self, answer: &Answer) -> Result<String, SurveyError> {
        let invalid = |value: String| SurveyError::InvalidChoice {
            id: self.id.clone(),
            value,
        };

        match (&self.kind, answer) {
            (QuestionKind::Text, Answer::Text(s)) => Ok(s.trim().to_string()),
            (QuestionKind::Text, Answer::Number(n)) => Ok(n.to_string()),
            (QuestionKind::Choice { options }, Answer::Text(s)) => {
                if options.contains(s) {
                    Ok(s.clone())
                } else {
                    Err(invalid(s.clone()))
                }
            }
            (QuestionKind::MultiChoice { options }, Answer::Text(s)) => {
                if options.contains(s) {
                    Ok(s.clone())
                } else {
                    Err(invalid(s.clone()))
                }
            }
            (QuestionKind::MultiChoice { options }, Answer::Many(values)) => {
                if let Some(bad) = values.iter().find(|v| !options.contains(*v)) {
                    return Err(invalid(bad.clone()));
                }
                Ok(values.join(MULTI_SEPARATOR))
            }
            (QuestionKind::Scale { min, max }, answer) => {
                let raw = match answer {
                    Answer::Number(n) => n.to_string(),
                    Answer::Text(s) => s.trim().to_string(),
                    Answer::Many(v) => v.join(MULTI_SEPARATOR),
                };
                match raw.parse::<i64>() {
                    Ok(n) if (*min..=*max).contains(&n) => Ok(n.to_string()),
                    _ => Err(SurveyError::OutOfScale {
                        id: self.id.clone(),
                        min: *min,
                        max: *max,
                        value: raw,
                    }),
                }
            }
            (_, Answer::Number(n)) => Err(invalid(n.to_string())),
            (_, Answer::Many(v)) => Err(invalid(v.join(MULTI_SEPARATOR))),
        }
    }
}

impl Survey {
    /// Loads a survey definition from a JSON file at `path`.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read survey '{path}'"))?;
        let survey = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse survey '{path}'"))?;
        Ok(survey)
    }

    pub fn questions(&self) -> impl Iterator<Item = &Question> {
        self.sections.iter().flat_map(|s| s.questions.iter())
    }

    /// Validates `answers` and flattens them into one response row.
    ///
    /// Every question gets a column; unanswered optional questions are
    /// left empty.
    pub fn assemble(&self, answers: &Answers) -> Result<Response, SurveyError> {
        self.assemble_at(answers, Utc::now())
    }

    pub fn assemble_at(
        &self,
        answers: &Answers,
        submitted_at: DateTime<Utc>,
    ) -> Result<Response, SurveyError> {
        if let Some(unknown) = answers
            .keys()
            .find(|id| !self.questions().any(|q| &q.id == *id))
        {
            return Err(SurveyError::UnknownQuestion(unknown.clone()));
        }

        let mut columns = Vec::new();
        for question in self.questions() {
            let value = match answers.get(&question.id).filter(|a| !is_blank(a)) {
                Some(answer) => question.render(answer)?,
                None if question.required => {
                    return Err(SurveyError::MissingAnswer(question.id.clone()));
                }
                None => String::new(),
            };
            columns.push((question.id.clone(), value));
        }

        Ok(Response {
            submitted_at,
            columns,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SURVEY: &str = r#"{
        "title": "VSL operator feedback",
        "sections": [
            {
                "title": "About you",
                "questions": [
                    { "id": "role", "prompt": "Role", "type": "choice",
                      "options": ["operator", "engineer"], "required": true },
                    { "id": "years", "prompt": "Years of experience", "type": "text" }
                ]
            },
            {
                "title": "Thresholds",
                "questions": [
                    { "id": "clarity", "prompt": "Clarity", "type": "scale",
                      "min": 1, "max": 5, "required": true },
                    { "id": "corridors", "prompt": "Corridors", "type": "multi_choice",
                      "options": ["M1", "M4", "M6"] }
                ]
            }
        ]
    }"#;

    fn survey() -> Survey {
        serde_json::from_str(SURVEY).unwrap()
    }

    fn answers(pairs: &[(&str, Answer)]) -> Answers {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 11, 22, 11, 24, 33).unwrap()
    }

    #[test]
    fn test_parse_schema() {
        let s = survey();
        assert_eq!(s.sections.len(), 2);
        assert_eq!(s.questions().count(), 4);
        assert_eq!(
            s.sections[1].questions[0].kind,
            QuestionKind::Scale { min: 1, max: 5 }
        );
        assert!(!s.sections[0].questions[1].required);
    }

    #[test]
    fn test_assemble_in_schema_order() {
        let a = answers(&[
            ("clarity", Answer::Number(4)),
            ("role", Answer::Text("engineer".into())),
            ("corridors", Answer::Many(vec!["M1".into(), "M6".into()])),
        ]);
        let response = survey().assemble_at(&a, at()).unwrap();
        assert_eq!(
            response.header(),
            vec!["timestamp", "role", "years", "clarity", "corridors"]
        );
        assert_eq!(
            response.values(),
            vec!["2024-11-22T11:24:33+00:00", "engineer", "", "4", "M1; M6"]
        );
    }

    #[test]
    fn test_missing_required() {
        let a = answers(&[("role", Answer::Text("operator".into()))]);
        assert_eq!(
            survey().assemble_at(&a, at()),
            Err(SurveyError::MissingAnswer("clarity".into()))
        );

        let a = answers(&[
            ("role", Answer::Text("  ".into())),
            ("clarity", Answer::Number(3)),
        ]);
        assert_eq!(
            survey().assemble_at(&a, at()),
            Err(SurveyError::MissingAnswer("role".into()))
        );
    }

    #[test]
    fn test_rejects_bad_values() {
        let a = answers(&[
            ("role", Answer::Text("manager".into())),
            ("clarity", Answer::Number(3)),
        ]);
        assert!(matches!(
            survey().assemble_at(&a, at()),
            Err(SurveyError::InvalidChoice { .. })
        ));

        let a = answers(&[
            ("role", Answer::Text("operator".into())),
            ("clarity", Answer::Number(9)),
        ]);
        assert!(matches!(
            survey().assemble_at(&a, at()),
            Err(SurveyError::OutOfScale { max: 5, .. })
        ));

        let a = answers(&[
            ("role", Answer::Text("operator".into())),
            ("clarity", Answer::Text("2".into())),
            ("mood", Answer::Text("fine".into())),
        ]);
        assert_eq!(
            survey().assemble_at(&a, at()),
            Err(SurveyError::UnknownQuestion("mood".into()))
        );
    }

    #[test]
    fn test_csv_row_quotes_values() {
        let a = answers(&[
            ("role", Answer::Text("operator".into())),
            ("years", Answer::Text("5, roughly".into())),
            ("clarity", Answer::Text("2".into())),
        ]);
        let response = survey().assemble_at(&a, at()).unwrap();
        let csv = response.to_csv_row(true).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "timestamp,role,years,clarity,corridors");
        assert_eq!(
            lines[1],
            "2024-11-22T11:24:33+00:00,operator,\"5, roughly\",2,"
        );
        assert_eq!(response.to_csv_row(false).unwrap().lines().count(), 1);
    }

    #[test]
    fn test_untagged_answers_from_json() {
        let a: Answers =
            serde_json::from_str(r#"{ "role": "operator", "clarity": 5, "corridors": ["M4"] }"#)
                .unwrap();
        assert_eq!(a["clarity"], Answer::Number(5));
        assert_eq!(a["corridors"], Answer::Many(vec!["M4".into()]));
        assert!(survey().assemble_at(&a, at()).is_ok());
    }
}
