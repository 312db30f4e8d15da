use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;

use crate::model::{FaqEntry, LabeledQuery};

/// Loads `question,answer` rows. Row order is kept; it decides ties.
pub fn load_corpus(path: &Path) -> Result<Vec<FaqEntry>> {
    load_rows(path)
}

/// Loads `query,relevant_question` rows.
pub fn load_labeled_queries(path: &Path) -> Result<Vec<LabeledQuery>> {
    load_rows(path)
}

fn load_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("csv") => read_csv(path),
        Some("jsonl") => read_jsonl(path),
        other => bail!(
            "unsupported file type '.{}' for {} (expected .csv or .jsonl)",
            other.unwrap_or(""),
            path.display()
        ),
    }
}

fn read_csv<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut reader =
        csv::Reader::from_path(path).with_context(|| format!("open {}", path.display()))?;
    let mut rows = Vec::new();

    for (i, record) in reader.deserialize().enumerate() {
        let row: T = record.with_context(|| format!("parse {} row {}", path.display(), i + 1))?;
        rows.push(row);
    }

    Ok(rows)
}

fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let reader = BufReader::new(file);
    let mut rows = Vec::new();

    for (i, line) in reader.lines().enumerate() {
        let line = line.context("read jsonl line")?;
        if line.trim().is_empty() {
            continue;
        }
        let row: T = serde_json::from_str(&line)
            .with_context(|| format!("parse {} line {}", path.display(), i + 1))?;
        rows.push(row);
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write(dir: &tempfile::TempDir, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn loads_csv_corpus_with_quoted_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "faq.csv",
            "question,answer\n\
             How do I track my order?,\"Go to 'Order History,' then click.\"\n\
             Where’s my package?,Check your account.\n",
        );

        let entries = load_corpus(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].answer, "Go to 'Order History,' then click.");
        assert_eq!(entries[1].question, "Where’s my package?");
    }

    #[test]
    fn loads_jsonl_labels_skipping_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "labels.jsonl",
            "{\"query\":\"q1\",\"relevant_question\":\"r1\"}\n\n\
             {\"query\":\"q2\",\"relevant_question\":\"r2\"}\n",
        );

        let labels = load_labeled_queries(&path).unwrap();
        assert_eq!(labels, vec![LabeledQuery::new("q1", "r1"), LabeledQuery::new("q2", "r2")]);
    }

    #[test]
    fn missing_column_reports_the_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "bad.csv", "query,other\nq,x\n");
        let err = load_labeled_queries(&path).unwrap_err();
        assert!(format!("{err:#}").contains("row 1"));
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let err = load_corpus(Path::new("faq.parquet")).unwrap_err();
        assert!(err.to_string().contains("unsupported file type"));
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = load_corpus(Path::new("/nonexistent/faq.csv")).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/faq.csv"));
    }
}
