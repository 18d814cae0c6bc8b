//! Dataset rows → normalized evaluation documents.

use crate::errors::DatasetError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Which row fields hold the query, the choices and the gold answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gold: Option<String>,
    /// Row field used as sample id; the line index is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self {
            query: "query".to_string(),
            choices: None,
            gold: None,
            id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Target {
    MultipleChoice {
        choices: Vec<String>,
        gold_index: usize,
    },
    FreeText {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        gold: Option<Vec<String>>,
    },
}

/// One dataset row normalized for evaluation. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub sample_id: String,
    pub query: String,
    pub target: Target,
}

impl Document {
    pub fn choices(&self) -> Option<&[String]> {
        match &self.target {
            Target::MultipleChoice { choices, .. } => Some(choices),
            Target::FreeText { .. } => None,
        }
    }

    pub fn gold_index(&self) -> Option<usize> {
        match &self.target {
            Target::MultipleChoice { gold_index, .. } => Some(*gold_index),
            Target::FreeText { .. } => None,
        }
    }

    /// Text sent to the completion model.
    pub fn completion_prompt(&self) -> String {
        match &self.target {
            Target::FreeText { .. } => self.query.clone(),
            Target::MultipleChoice { choices, .. } => {
                let mut out = self.query.clone();
                out.push_str("\n\n");
                for (i, c) in choices.iter().enumerate() {
                    out.push_str(&format!("{}. {}\n", choice_label(i), c));
                }
                out.truncate(out.trim_end().len());
                out
            }
        }
    }
}

fn choice_label(i: usize) -> String {
    if i < 26 {
        ((b'A' + i as u8) as char).to_string()
    } else {
        (i + 1).to_string()
    }
}

fn field<'a>(row: &'a Map<String, Value>, name: &str) -> Result<&'a Value, DatasetError> {
    row.get(name).ok_or_else(|| DatasetError::Field {
        field: name.to_string(),
        available: row.keys().cloned().collect(),
    })
}

fn scalar_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Build a document from one row. `index` is the row's position in the
/// dataset and becomes the sample id unless the mapping names an id field.
pub fn build_document(
    row: &Map<String, Value>,
    mapping: &FieldMapping,
    index: usize,
) -> Result<Document, DatasetError> {
    let sample_id = match &mapping.id {
        Some(id_field) => scalar_to_string(field(row, id_field)?).ok_or_else(|| {
            DatasetError::value(format!("id field '{}' must be a string or number", id_field))
        })?,
        None => index.to_string(),
    };

    let query = match field(row, &mapping.query)? {
        Value::String(s) => s.clone(),
        other => {
            return Err(DatasetError::value(format!(
                "query field '{}' must be a string, got {}",
                mapping.query, other
            )))
        }
    };

    let target = match &mapping.choices {
        Some(choices_field) => {
            let choices = parse_choices(field(row, choices_field)?, choices_field)?;
            let gold_field = mapping.gold.as_deref().ok_or_else(|| {
                DatasetError::value("multiple-choice mapping requires a gold field")
            })?;
            let gold_index = resolve_gold_index(field(row, gold_field)?, &choices)?;
            Target::MultipleChoice {
                choices,
                gold_index,
            }
        }
        None => {
            let gold = match mapping.gold.as_deref().and_then(|g| row.get(g)) {
                None | Some(Value::Null) => None,
                Some(v) => Some(normalize_gold_list(v)?),
            };
            Target::FreeText { gold }
        }
    };

    Ok(Document {
        sample_id,
        query,
        target,
    })
}

fn parse_choices(value: &Value, name: &str) -> Result<Vec<String>, DatasetError> {
    // Some datasets store the list JSON-encoded inside a string column.
    let decoded;
    let value = match value {
        Value::String(s) => {
            decoded = serde_json::from_str::<Value>(s).map_err(|_| {
                DatasetError::value(format!("choices field '{}' is not a list", name))
            })?;
            &decoded
        }
        v => v,
    };
    let items = value
        .as_array()
        .ok_or_else(|| DatasetError::value(format!("choices field '{}' is not a list", name)))?;
    if items.is_empty() {
        return Err(DatasetError::value(format!(
            "choices field '{}' is an empty list",
            name
        )));
    }
    items
        .iter()
        .map(|v| {
            scalar_to_string(v).ok_or_else(|| {
                DatasetError::value(format!("choices field '{}' holds a non-scalar item", name))
            })
        })
        .collect()
}

fn resolve_gold_index(gold: &Value, choices: &[String]) -> Result<usize, DatasetError> {
    match gold {
        Value::String(s) => choices.iter().position(|c| c == s).ok_or_else(|| {
            DatasetError::value(format!("gold answer {:?} is not among the choices", s))
        }),
        Value::Number(n) => {
            let idx = n.as_i64().ok_or_else(|| {
                DatasetError::value(format!("gold index {} is not an integer", n))
            })?;
            if idx < 0 || idx as usize >= choices.len() {
                return Err(DatasetError::value(format!(
                    "gold index {} out of range [0, {})",
                    idx,
                    choices.len()
                )));
            }
            Ok(idx as usize)
        }
        other => Err(DatasetError::value(format!(
            "gold must be a choice string or an integer index, got {}",
            other
        ))),
    }
}

fn normalize_gold_list(v: &Value) -> Result<Vec<String>, DatasetError> {
    match v {
        Value::Array(items) => items
            .iter()
            .map(|i| {
                scalar_to_string(i)
                    .ok_or_else(|| DatasetError::value("gold list holds a non-scalar item"))
            })
            .collect(),
        other => scalar_to_string(other)
            .map(|s| vec![s])
            .ok_or_else(|| DatasetError::value(format!("unsupported gold value {}", other))),
    }
}

/// Parse newline-delimited JSON rows into documents. Blank lines are skipped
/// and do not consume an index.
pub fn parse_jsonl(
    content: &str,
    mapping: &FieldMapping,
    limit: Option<usize>,
) -> Result<Vec<Document>, DatasetError> {
    let mut docs = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        if limit.is_some_and(|l| docs.len() >= l) {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }
        let row: Map<String, Value> =
            serde_json::from_str(line).map_err(|e| DatasetError::Parse {
                line: lineno + 1,
                message: e.to_string(),
            })?;
        let doc = build_document(&row, mapping, docs.len()).map_err(|e| match e {
            DatasetError::Value(msg) => DatasetError::Value(format!("line {}: {}", lineno + 1, msg)),
            other => other,
        })?;
        docs.push(doc);
    }
    Ok(docs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    fn mc_mapping() -> FieldMapping {
        FieldMapping {
            query: "question".into(),
            choices: Some("options".into()),
            gold: Some("answer".into()),
            id: None,
        }
    }

    #[test]
    fn gold_string_resolves_to_its_index() {
        let choices = ["red", "green", "blue"];
        for (i, c) in choices.iter().enumerate() {
            let r = row(json!({"question": "q", "options": choices, "answer": c}));
            let doc = build_document(&r, &mc_mapping(), 0).unwrap();
            assert_eq!(doc.gold_index(), Some(i));
        }
    }

    #[test]
    fn gold_index_out_of_range_is_value_error() {
        for bad in [json!(3), json!(-1), json!(1.5), json!(true)] {
            let r = row(json!({"question": "q", "options": ["a", "b", "c"], "answer": bad}));
            let err = build_document(&r, &mc_mapping(), 0).unwrap_err();
            assert!(matches!(err, DatasetError::Value(_)), "{:?}", err);
        }
    }

    #[test]
    fn gold_string_match_is_case_sensitive() {
        let r = row(json!({"question": "q", "options": ["Yes", "No"], "answer": "yes"}));
        assert!(matches!(
            build_document(&r, &mc_mapping(), 0),
            Err(DatasetError::Value(_))
        ));
    }

    #[test]
    fn missing_field_names_available_fields() {
        let r = row(json!({"prompt": "q", "options": ["a"]}));
        let err = build_document(&r, &mc_mapping(), 0).unwrap_err();
        match err {
            DatasetError::Field { field, available } => {
                assert_eq!(field, "question");
                assert!(available.contains(&"prompt".to_string()));
                assert!(available.contains(&"options".to_string()));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn empty_or_non_list_choices_rejected() {
        for bad in [json!([]), json!("not json"), json!({"a": 1})] {
            let r = row(json!({"question": "q", "options": bad, "answer": 0}));
            assert!(matches!(
                build_document(&r, &mc_mapping(), 0),
                Err(DatasetError::Value(_))
            ));
        }
    }

    #[test]
    fn choices_encoded_as_string_are_decoded() {
        let r = row(json!({"question": "q", "options": "[\"x\", \"y\"]", "answer": "y"}));
        let doc = build_document(&r, &mc_mapping(), 0).unwrap();
        assert_eq!(doc.choices().unwrap(), ["x", "y"]);
        assert_eq!(doc.gold_index(), Some(1));
    }

    #[test]
    fn free_text_gold_normalized_to_list() {
        let mapping = FieldMapping {
            query: "q".into(),
            choices: None,
            gold: Some("ref".into()),
            id: Some("uid".into()),
        };
        let doc = build_document(&row(json!({"q": "hi", "ref": "hello", "uid": 7})), &mapping, 0)
            .unwrap();
        assert_eq!(doc.sample_id, "7");
        assert_eq!(
            doc.target,
            Target::FreeText {
                gold: Some(vec!["hello".into()])
            }
        );

        let doc = build_document(&row(json!({"q": "hi", "uid": "a"})), &mapping, 0).unwrap();
        assert_eq!(doc.target, Target::FreeText { gold: None });
    }

    #[test]
    fn completion_prompt_letters_choices() {
        let r = row(json!({"question": "Pick one", "options": ["a", "b"], "answer": 0}));
        let doc = build_document(&r, &mc_mapping(), 0).unwrap();
        assert_eq!(doc.completion_prompt(), "Pick one\n\nA. a\nB. b");
    }

    #[test]
    fn jsonl_skips_blank_lines_and_honours_limit() {
        let content = "{\"query\": \"a\"}\n\n{\"query\": \"b\"}\n{\"query\": \"c\"}\n";
        let docs = parse_jsonl(content, &FieldMapping::default(), Some(2)).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1].sample_id, "1");
        assert_eq!(docs[1].query, "b");

        let err = parse_jsonl("{\"query\": \"a\"}\nnope\n", &FieldMapping::default(), None)
            .unwrap_err();
        assert!(matches!(err, DatasetError::Parse { line: 2, .. }));
    }
}
