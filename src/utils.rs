use serde::{Deserialize, Deserializer};

/// Accepts an id sent either as a JSON number or as a numeric string.
pub fn i64_from_string<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(i64),
        String(String),
    }

    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(int) => Ok(int),
        NumberOrString::String(s) => match s.trim().parse::<i64>() {
            Ok(int) => Ok(int),
            Err(e) => Err(serde::de::Error::custom(e.to_string())),
        },
    }
}

/// Treats a missing or blank form field as `None`.
pub fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = Option::<String>::deserialize(deserializer)?;
    Ok(s.filter(|s| !s.trim().is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct MarkRead {
        #[serde(rename = "chatId", deserialize_with = "i64_from_string")]
        chat_id: i64,
    }

    #[derive(Deserialize)]
    struct Note {
        #[serde(default, deserialize_with = "empty_string_as_none")]
        note: Option<String>,
    }

    #[test]
    fn chat_id_as_number_or_string() {
        let a: MarkRead = serde_json::from_str(r#"{"chatId": 7}"#).unwrap();
        let b: MarkRead = serde_json::from_str(r#"{"chatId": "7"}"#).unwrap();
        assert_eq!((a.chat_id, b.chat_id), (7, 7));
        assert!(serde_json::from_str::<MarkRead>(r#"{"chatId": "seven"}"#).is_err());
    }

    #[test]
    fn blank_note_is_none() {
        let blank: Note = serde_json::from_str(r#"{"note": "  "}"#).unwrap();
        let missing: Note = serde_json::from_str("{}").unwrap();
        let given: Note = serde_json::from_str(r#"{"note": "hi"}"#).unwrap();
        assert!(blank.note.is_none());
        assert!(missing.note.is_none());
        assert_eq!(given.note.as_deref(), Some("hi"));
    }
}
