// ABOUTME: Bidirectional mapping between Post and a YAML frontmatter block
// ABOUTME: Configurable physical key names, omission of empty fields, strict shape checks

use crate::{Error, Post, Result};
use chrono::{DateTime, FixedOffset, NaiveDate, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

const MARKER: &str = "---";

/// Physical frontmatter key for each logical post field.
///
/// Deserializing a partial mapping fills the gaps from [`Default`]; an explicit
/// empty string switches that field off entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FrontmatterMapping {
    pub title: String,
    pub date: String,
    pub date_updated: String,
    pub description: String,
    pub categories: String,
    pub tags: String,
    pub canonical_url: String,
    pub managed: String,
}

impl Default for FrontmatterMapping {
    /// Hugo-compatible keys.
    fn default() -> Self {
        FrontmatterMapping {
            title: "title".into(),
            date: "date".into(),
            date_updated: "lastmod".into(),
            description: "description".into(),
            categories: "categories".into(),
            tags: "tags".into(),
            canonical_url: "canonicalURL".into(),
            managed: "managed".into(),
        }
    }
}

fn insert(block: &mut Mapping, key: &str, value: Value) {
    if !key.is_empty() {
        block.insert(Value::String(key.to_string()), value);
    }
}

fn format_timestamp(ts: &DateTime<FixedOffset>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn string_list(values: &[String]) -> Value {
    Value::Sequence(values.iter().cloned().map(Value::String).collect())
}

/// Build the metadata block for `post`. Empty fields and unmapped fields are left out.
pub fn to_metadata_block(post: &Post, mapping: &FrontmatterMapping) -> Mapping {
    let mut block = Mapping::new();

    if !post.title.is_empty() {
        insert(&mut block, &mapping.title, Value::String(post.title.clone()));
    }
    if let Some(ts) = &post.published_at {
        insert(&mut block, &mapping.date, Value::String(format_timestamp(ts)));
    }
    if let Some(ts) = &post.updated_at {
        insert(
            &mut block,
            &mapping.date_updated,
            Value::String(format_timestamp(ts)),
        );
    }
    if !post.description.is_empty() {
        insert(
            &mut block,
            &mapping.description,
            Value::String(post.description.clone()),
        );
    }
    if !post.categories.is_empty() {
        insert(&mut block, &mapping.categories, string_list(&post.categories));
    }
    if !post.tags.is_empty() {
        insert(&mut block, &mapping.tags, string_list(&post.tags));
    }
    if !post.canonical_url.is_empty() {
        insert(
            &mut block,
            &mapping.canonical_url,
            Value::String(post.canonical_url.clone()),
        );
    }
    if post.managed {
        insert(&mut block, &mapping.managed, Value::Bool(true));
    }

    block
}

fn lookup<'a>(block: &'a Mapping, key: &str) -> Option<&'a Value> {
    if key.is_empty() {
        return None;
    }
    match block.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::Tagged(tagged)) => Some(&tagged.value),
        Some(value) => Some(value),
    }
}

fn read_string(block: &Mapping, key: &str) -> Result<String> {
    match lookup(block, key) {
        None => Ok(String::new()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(Error::InvalidField {
            field: key.to_string(),
            expected: "a string",
        }),
    }
}

fn read_string_list(block: &Mapping, key: &str) -> Result<Vec<String>> {
    let invalid = || Error::InvalidField {
        field: key.to_string(),
        expected: "a list of strings",
    };
    match lookup(block, key) {
        None => Ok(Vec::new()),
        Some(Value::Sequence(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                _ => Err(invalid()),
            })
            .collect(),
        Some(_) => Err(invalid()),
    }
}

fn read_bool(block: &Mapping, key: &str) -> Result<bool> {
    match lookup(block, key) {
        None => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(Error::InvalidField {
            field: key.to_string(),
            expected: "a boolean",
        }),
    }
}

/// Parse a timestamp written either as RFC 3339, as a bare `YYYY-MM-DD` date
/// (midnight UTC) or as Unix seconds.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts);
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    let midnight = date.and_hms_opt(0, 0, 0)?;
    Some(Utc.from_utc_datetime(&midnight).fixed_offset())
}

fn read_timestamp(block: &Mapping, key: &str) -> Result<Option<DateTime<FixedOffset>>> {
    let invalid = || Error::InvalidField {
        field: key.to_string(),
        expected: "a timestamp",
    };
    match lookup(block, key) {
        None => Ok(None),
        Some(Value::String(s)) => parse_timestamp(s).map(Some).ok_or_else(invalid),
        Some(Value::Number(n)) => n
            .as_i64()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .map(|ts| Some(ts.fixed_offset()))
            .ok_or_else(invalid),
        Some(_) => Err(invalid()),
    }
}

/// Read a metadata block back into a post. Absent fields stay empty; present
/// fields of the wrong shape are an error.
///
/// Only metadata fields are filled; the caller supplies the body.
pub fn from_metadata_block(block: &Mapping, mapping: &FrontmatterMapping) -> Result<Post> {
    Ok(Post {
        title: read_string(block, &mapping.title)?,
        published_at: read_timestamp(block, &mapping.date)?,
        updated_at: read_timestamp(block, &mapping.date_updated)?,
        description: read_string(block, &mapping.description)?,
        categories: read_string_list(block, &mapping.categories)?,
        tags: read_string_list(block, &mapping.tags)?,
        canonical_url: read_string(block, &mapping.canonical_url)?,
        managed: read_bool(block, &mapping.managed)?,
        ..Default::default()
    })
}

/// Serialize `post` as a complete file: frontmatter block, blank line, Markdown body.
pub fn render_document(post: &Post, mapping: &FrontmatterMapping) -> Result<String> {
    let block = to_metadata_block(post, mapping);
    let yaml = serde_yaml::to_string(&Value::Mapping(block))?;
    Ok(format!("{MARKER}\n{yaml}{MARKER}\n\n{}", post.markdown))
}

/// Split a file into its frontmatter block and body. A file without a leading
/// `---` line has an empty block and is all body.
pub fn split_document(text: &str) -> Result<(Mapping, &str)> {
    let Some(rest) = text
        .strip_prefix("---\n")
        .or_else(|| text.strip_prefix("---\r\n"))
    else {
        return Ok((Mapping::new(), text));
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end_matches(['\r', '\n']) == MARKER {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            let body = body
                .strip_prefix("\r\n")
                .or_else(|| body.strip_prefix('\n'))
                .unwrap_or(body);
            return Ok((parse_block(yaml)?, body));
        }
        offset += line.len();
    }

    Err(Error::InvalidField {
        field: "frontmatter".into(),
        expected: "closed by a `---` line",
    })
}

fn parse_block(yaml: &str) -> Result<Mapping> {
    if yaml.trim().is_empty() {
        return Ok(Mapping::new());
    }
    match serde_yaml::from_str::<Value>(yaml)? {
        Value::Mapping(block) => Ok(block),
        Value::Null => Ok(Mapping::new()),
        _ => Err(Error::InvalidField {
            field: "frontmatter".into(),
            expected: "a key/value mapping",
        }),
    }
}
