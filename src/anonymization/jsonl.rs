use super::uuid_mapper::UuidMapper;
use crate::error_handling::types::AnonymizeError;
use log::{debug, warn};
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Characters of an unparsable line echoed into the warning.
const PREVIEW_CHARS: usize = 100;

/// Line counts of one anonymization pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineSummary {
    pub lines: usize,
    pub empty: usize,
    pub invalid: usize,
}

/// Anonymizes every string in `value`. Object keys are kept as they are.
pub fn anonymize_value(value: Value, mapper: &mut UuidMapper) -> Value {
    match value {
        Value::String(s) => Value::String(mapper.anonymize_str(&s)),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| anonymize_value(item, mapper))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, anonymize_value(v, mapper)))
                .collect(),
        ),
        other => other,
    }
}

/// Rewrites a JSONL stream line by line.
///
/// Lines are trimmed. Blank lines stay blank, JSON lines are re-emitted in
/// compact form and anything else is copied through with a warning.
pub fn anonymize_lines<R, W>(
    reader: R,
    mut writer: W,
    mapper: &mut UuidMapper,
) -> Result<LineSummary, AnonymizeError>
where
    R: BufRead,
    W: Write,
{
    let mut summary = LineSummary::default();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        summary.lines += 1;
        if line.is_empty() {
            summary.empty += 1;
            writer.write_all(b"\n")?;
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(value) => {
                let value = anonymize_value(value, mapper);
                serde_json::to_writer(&mut writer, &value).map_err(std::io::Error::from)?;
                writer.write_all(b"\n")?;
            }
            Err(e) => {
                summary.invalid += 1;
                let preview: String = line.chars().take(PREVIEW_CHARS).collect();
                warn!("Line {} is not valid JSON: {}", index + 1, e);
                warn!("  Keeping line unchanged: {}...", preview);
                writer.write_all(line.as_bytes())?;
                writer.write_all(b"\n")?;
            }
        }
    }
    writer.flush()?;
    Ok(summary)
}

/// `<stem>.anonymized.jsonl` next to `input`.
pub fn default_output_path(input: &Path) -> PathBuf {
    input.with_extension("anonymized.jsonl")
}

pub fn anonymize_file(
    input: &Path,
    output: &Path,
    mapper: &mut UuidMapper,
) -> Result<LineSummary, AnonymizeError> {
    let reader = open_input(input)?;
    let writer = BufWriter::new(File::create(output)?);
    debug!("Anonymizing {} into {}", input.display(), output.display());
    anonymize_lines(reader, writer, mapper)
}

/// Anonymizes `input` through a temporary file in the same directory that
/// then replaces it, so the input is never left half written.
pub fn anonymize_in_place(
    input: &Path,
    mapper: &mut UuidMapper,
) -> Result<LineSummary, AnonymizeError> {
    let reader = open_input(input)?;
    let dir = match input.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp = NamedTempFile::new_in(dir)?;
    debug!(
        "Anonymizing {} through {}",
        input.display(),
        temp.path().display()
    );
    let summary = anonymize_lines(reader, BufWriter::new(temp.as_file_mut()), mapper)?;
    temp.persist(input)
        .map_err(|e| AnonymizeError::PersistFailed(e.to_string()))?;
    Ok(summary)
}

fn open_input(input: &Path) -> Result<BufReader<File>, AnonymizeError> {
    if !input.exists() {
        return Err(AnonymizeError::InputNotFound(input.to_path_buf()));
    }
    Ok(BufReader::new(File::open(input)?))
}
