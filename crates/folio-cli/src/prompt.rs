//! Terminal prompts and the documents built from the answers.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use folio_document::{as_path, as_url, Document, FileRef, Value};
use std::io::{self, BufRead, Write};

const YES: [&str; 4] = ["y", "yes", "s", "sim"];

// =============================================================================
// Prompter
// =============================================================================

/// Line-oriented question/answer over any reader and writer.
pub struct Prompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Ask a question and return the trimmed answer; empty at end of input.
    pub fn ask(&mut self, question: &str) -> io::Result<String> {
        write!(self.output, "{}: ", question)?;
        self.output.flush()?;

        let mut line = String::new();
        self.input.read_line(&mut line)?;
        Ok(line.trim().to_string())
    }

    pub fn confirm(&mut self, question: &str) -> io::Result<bool> {
        let answer = self.ask(question)?.to_lowercase();
        Ok(YES.contains(&answer.as_str()))
    }
}

// =============================================================================
// Document Builders
// =============================================================================

/// `{name, age?, courses?}`; `None` without a name.
///
/// The age is kept only when it is a whole number; empty course entries are
/// dropped.
pub fn student_from_answers(name: &str, age: &str, courses: &str) -> Option<Document> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let mut doc = Document::new().with("name", name);

    let age = age.trim();
    if !age.is_empty() && age.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(age) = age.parse::<i64>() {
            doc.set("age", age);
        }
    }

    let courses: Vec<Value> = courses
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(Value::from)
        .collect();
    if !courses.is_empty() {
        doc.set("courses", courses);
    }

    Some(doc)
}

/// `{name, url}` when both are given.
pub fn link_document(name: &str, url: &str) -> Option<Document> {
    let (name, url) = (name.trim(), url.trim());
    if name.is_empty() || url.is_empty() {
        return None;
    }
    Some(Document::new().with("name", name).with("url", as_url(url)))
}

/// `{name, file}` when both are given; the file may be a name, path, link or data URI.
pub fn image_document(name: &str, file: &str) -> Option<Document> {
    let (name, file) = (name.trim(), file.trim());
    if name.is_empty() || file.is_empty() {
        return None;
    }
    let file_ref = FileRef::from_plain(&Value::from(file)).unwrap_or_else(|| as_path(file));
    Some(Document::new().with("name", name).with("file", file_ref))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_ask_and_confirm() {
        let mut output = Vec::new();
        let mut prompter = Prompter::new(Cursor::new("  Alice \nS\nn\n"), &mut output);

        assert_eq!(prompter.ask("Name").unwrap(), "Alice");
        assert!(prompter.confirm("Continue?").unwrap());
        assert!(!prompter.confirm("Again?").unwrap());
        assert_eq!(prompter.ask("At end").unwrap(), "");

        let shown = String::from_utf8(output).unwrap();
        assert!(shown.starts_with("Name: "));
    }

    #[test]
    fn test_student_from_answers() {
        let doc = student_from_answers("Dana", "22", "Math, , Physics ").unwrap();
        assert_eq!(doc.get("name").and_then(Value::as_str), Some("Dana"));
        assert_eq!(doc.get("age"), Some(&Value::Int(22)));
        assert_eq!(
            doc.get("courses"),
            Some(&Value::Array(vec![Value::from("Math"), Value::from("Physics")]))
        );

        let doc = student_from_answers("Eve", "twenty", "").unwrap();
        assert!(!doc.contains("age"));
        assert!(!doc.contains("courses"));

        assert!(student_from_answers("  ", "22", "Math").is_none());
    }

    #[test]
    fn test_link_and_image_documents() {
        let link = link_document("Docs", "https://docs.rs").unwrap();
        assert_eq!(
            link.get("url").and_then(Value::as_file_ref),
            Some(&as_url("https://docs.rs"))
        );
        assert!(link_document("Docs", "").is_none());

        let image = image_document("Avatar", "avatar.png").unwrap();
        assert_eq!(
            image.get("file").and_then(Value::as_file_ref).map(FileRef::kind),
            Some("path")
        );

        let remote = image_document("Logo", "https://example.org/logo.png").unwrap();
        assert_eq!(
            remote.get("file").and_then(Value::as_file_ref).map(FileRef::kind),
            Some("url")
        );
    }
}
