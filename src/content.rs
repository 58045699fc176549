/// Module item content payloads
///
/// Content is stored as a JSON envelope `{"version": 2, "kind": ..., ...}`.
/// Version 1 rows carry no `version` field and hold `hints`, `defaultCode`
/// and `testCases` as stringified JSON; `ItemContent::parse` upgrades them.
use crate::{
    db::models::ItemKind,
    error::{LmsError, LmsResult},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use validator::{Validate, ValidationErrors};

pub const CURRENT_CONTENT_VERSION: u32 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub input: String,
    pub expected_output: String,
    #[serde(default)]
    pub hidden: bool,
}

/// A coding problem attached to an assignment or practice item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProblemSpec {
    #[validate(length(min = 1))]
    pub description: String,
    #[serde(default)]
    pub hints: Vec<String>,
    /// Starter code keyed by language
    #[serde(default)]
    pub default_code: BTreeMap<String, String>,
    #[validate(length(min = 1), nested)]
    pub test_cases: Vec<TestCase>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    #[validate(length(min = 1))]
    pub prompt: String,
    #[validate(length(min = 2))]
    pub options: Vec<String>,
    pub answer_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemContent {
    #[serde(rename_all = "camelCase")]
    Video {
        url: String,
        #[serde(default)]
        duration_seconds: u32,
    },
    #[serde(rename_all = "camelCase")]
    Leetcode { problem_slug: String, url: String },
    #[serde(rename_all = "camelCase")]
    Assignment { problem: ProblemSpec },
    #[serde(rename_all = "camelCase")]
    AiInterview {
        topic: String,
        #[serde(default)]
        question_count: u32,
    },
    #[serde(rename_all = "camelCase")]
    WebDev {
        instructions: String,
        #[serde(default)]
        starter_files: BTreeMap<String, String>,
    },
    #[serde(rename_all = "camelCase")]
    Test {
        questions: Vec<QuizQuestion>,
        pass_percent: u8,
    },
}

#[derive(Serialize)]
struct Envelope<'a> {
    version: u32,
    #[serde(flatten)]
    content: &'a ItemContent,
}

impl ItemContent {
    pub fn kind(&self) -> ItemKind {
        match self {
            ItemContent::Video { .. } => ItemKind::Video,
            ItemContent::Leetcode { .. } => ItemKind::Leetcode,
            ItemContent::Assignment { .. } => ItemKind::Assignment,
            ItemContent::AiInterview { .. } => ItemKind::AiInterview,
            ItemContent::WebDev { .. } => ItemKind::WebDev,
            ItemContent::Test { .. } => ItemKind::Test,
        }
    }

    /// Parse stored content of any known version
    pub fn parse(raw: &str) -> LmsResult<Self> {
        let mut value: Value = serde_json::from_str(raw)?;
        let object = value
            .as_object_mut()
            .ok_or_else(|| LmsError::Validation("Item content must be a JSON object".into()))?;

        let version = match object.remove("version") {
            None => 1,
            Some(v) => v
                .as_u64()
                .ok_or_else(|| LmsError::Validation("Content version must be a number".into()))?,
        };

        match version {
            1 => upgrade_v1(object)?,
            2 => {}
            other => {
                return Err(LmsError::Validation(format!(
                    "Unsupported content version {}",
                    other
                )))
            }
        }

        Ok(serde_json::from_value(value)?)
    }

    /// Serialize in the current envelope
    pub fn to_stored(&self) -> LmsResult<String> {
        Ok(serde_json::to_string(&Envelope {
            version: CURRENT_CONTENT_VERSION,
            content: self,
        })?)
    }
}

impl Validate for ItemContent {
    fn validate(&self) -> Result<(), ValidationErrors> {
        match self {
            ItemContent::Assignment { problem } => problem.validate(),
            ItemContent::Test { questions, .. } => {
                for question in questions {
                    question.validate()?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

impl ItemContent {
    /// Schema validation plus the cross-field rules the derive can't express
    pub fn check(&self) -> LmsResult<()> {
        self.validate()
            .map_err(|e| LmsError::Validation(e.to_string()))?;

        match self {
            ItemContent::Video { url, .. } | ItemContent::Leetcode { url, .. } if url.is_empty() => {
                Err(LmsError::Validation("Content url is required".into()))
            }
            ItemContent::Test {
                questions,
                pass_percent,
            } => {
                if *pass_percent > 100 {
                    return Err(LmsError::Validation(
                        "pass_percent must be between 0 and 100".into(),
                    ));
                }
                if questions.is_empty() {
                    return Err(LmsError::Validation("A test needs questions".into()));
                }
                if let Some(q) = questions.iter().find(|q| q.answer_index >= q.options.len()) {
                    return Err(LmsError::Validation(format!(
                        "Answer index out of range for question '{}'",
                        q.prompt
                    )));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// v1 stored list/map fields as JSON strings inside the object
fn upgrade_v1(object: &mut serde_json::Map<String, Value>) -> LmsResult<()> {
    let nested = object.get("problem").map(Value::is_object).unwrap_or(false);
    let target = if nested {
        object
            .get_mut("problem")
            .and_then(Value::as_object_mut)
            .ok_or_else(|| LmsError::Internal("problem object vanished".into()))?
    } else {
        object
    };

    for field in ["hints", "defaultCode", "testCases", "questions", "starterFiles"] {
        if let Some(Value::String(encoded)) = target.get(field) {
            let decoded: Value = serde_json::from_str(encoded).map_err(|e| {
                LmsError::Validation(format!("Legacy field {} is not valid JSON: {}", field, e))
            })?;
            target.insert(field.to_string(), decoded);
        }
    }

    Ok(())
}
