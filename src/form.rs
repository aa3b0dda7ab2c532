//! Multipart form bodies.

use crate::endpoint::value_text;
use serde_json::Value;
use std::fmt;

/// A file to be sent as one part of a multipart body.
///
/// `Debug` reports the content length rather than the bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct FilePart {
    /// The file name reported in the part's `Content-Disposition`.
    pub file_name: String,
    /// The file contents.
    pub content: Vec<u8>,
    /// The part's MIME type, if known.
    pub mime: Option<String>,
}

impl FilePart {
    pub fn new(file_name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            content: content.into(),
            mime: None,
        }
    }

    /// Sets the MIME type of the part.
    pub fn mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }
}

impl fmt::Debug for FilePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilePart")
            .field("file_name", &self.file_name)
            .field("mime", &self.mime)
            .field("bytes", &self.content.len())
            .finish()
    }
}

/// The value of one multipart field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormValue {
    Text(String),
    File(FilePart),
}

/// An ordered multipart form container.
///
/// Unlike `reqwest::multipart::Form` this is `Clone`, so a retried request
/// can rebuild its body for every attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormData {
    parts: Vec<(String, FormValue)>,
}

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a text field.
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.append_text(name, value);
        self
    }

    /// Appends a file field.
    pub fn file(mut self, name: impl Into<String>, file: FilePart) -> Self {
        self.append_file(name, file);
        self
    }

    pub fn append_text(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.parts.push((name.into(), FormValue::Text(value.into())));
    }

    pub fn append_file(&mut self, name: impl Into<String>, file: FilePart) {
        self.parts.push((name.into(), FormValue::File(file)));
    }

    /// Returns the first value appended under `name`.
    pub fn get(&self, name: &str) -> Option<&FormValue> {
        self.parts
            .iter()
            .find(|(part_name, _)| part_name == name)
            .map(|(_, value)| value)
    }

    pub fn parts(&self) -> &[(String, FormValue)] {
        &self.parts
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Appends every part of `other`, keeping its order.
    pub fn merge(&mut self, other: FormData) {
        self.parts.extend(other.parts);
    }

    /// Builds a form from a JSON object body.
    ///
    /// Array entries are appended once per element under `name[]`; every
    /// other entry becomes a single text field. A non-object body yields an
    /// empty form.
    pub fn from_value(value: &Value) -> Self {
        let mut form = Self::new();
        if let Value::Object(entries) = value {
            for (name, entry) in entries {
                match entry {
                    Value::Array(items) => {
                        for item in items {
                            form.append_text(format!("{}[]", name), value_text(item));
                        }
                    }
                    other => form.append_text(name.clone(), value_text(other)),
                }
            }
        }
        form
    }

    /// Converts into a transport-level multipart form.
    pub(crate) fn to_multipart(&self) -> reqwest::Result<reqwest::multipart::Form> {
        let mut form = reqwest::multipart::Form::new();
        for (name, value) in &self.parts {
            form = match value {
                FormValue::Text(text) => form.text(name.clone(), text.clone()),
                FormValue::File(file) => {
                    let mut part = reqwest::multipart::Part::bytes(file.content.clone())
                        .file_name(file.file_name.clone());
                    if let Some(mime) = &file.mime {
                        part = part.mime_str(mime)?;
                    }
                    form.part(name.clone(), part)
                }
            };
        }
        Ok(form)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_value_expands_arrays() {
        let form = FormData::from_value(&json!({
            "name": "x",
            "tags": ["a", "b"],
            "age": 3,
        }));

        let mut names: Vec<&str> = form.parts().iter().map(|(n, _)| n.as_str()).collect();
        names.sort_unstable();
        assert_eq!(names, vec!["age", "name", "tags[]", "tags[]"]);
        assert_eq!(form.get("age"), Some(&FormValue::Text("3".into())));
        assert_eq!(form.get("name"), Some(&FormValue::Text("x".into())));
    }

    #[test]
    fn test_builder_keeps_order() {
        let form = FormData::new()
            .file("avatar", FilePart::new("me.png", vec![1, 2, 3]).mime("image/png"))
            .text("name", "x");

        assert_eq!(form.len(), 2);
        match form.get("avatar") {
            Some(FormValue::File(file)) => {
                assert_eq!(file.file_name, "me.png");
                assert_eq!(file.mime.as_deref(), Some("image/png"));
            }
            other => panic!("Expected file part, got {:?}", other),
        }
        assert!(form.to_multipart().is_ok());
    }
}
