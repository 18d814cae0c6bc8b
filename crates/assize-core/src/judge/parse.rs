use crate::scale::{AnswerContract, Score};
use serde_json::Value;

/// Pull the answer out of raw judge output and check it against `contract`.
///
/// Structured-output endpoints return `{"answer": ...}`; free-form models
/// tend to wrap that object in prose, so the first JSON object in the text
/// is used. Output with no object at all is taken as a bare answer.
pub fn parse_answer(raw: &str, contract: &AnswerContract) -> Result<Score, String> {
    let value = extract_answer_value(raw)?;
    contract.check(&value)
}

fn extract_answer_value(raw: &str) -> Result<Value, String> {
    let text = raw.trim();
    if text.is_empty() {
        return Err("empty judge output".to_string());
    }

    let Some(start) = text.find('{') else {
        return Ok(serde_json::from_str::<Value>(text)
            .unwrap_or_else(|_| Value::String(text.to_string())));
    };

    let obj: Value = serde_json::Deserializer::from_str(&text[start..])
        .into_iter::<Value>()
        .next()
        .ok_or_else(|| "no JSON object found in judge output".to_string())?
        .map_err(|e| format!("invalid JSON in judge output: {}", e))?;

    match obj {
        Value::Object(mut map) => map
            .remove("answer")
            .ok_or_else(|| "judge JSON missing 'answer' field".to_string()),
        other => Err(format!("judge output is not a JSON object: {}", other)),
    }
}
