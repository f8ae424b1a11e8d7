use crate::extract::{ConversationEntry, Extraction};
use crate::locator::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Markdown,
    Text,
    Json,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Markdown => "md",
            OutputFormat::Text => "txt",
            OutputFormat::Json => "json",
        }
    }
}

/// Headings used for each role in markdown and text output.
#[derive(Clone, Debug)]
pub struct RoleLabels {
    pub user: String,
    pub assistant: String,
}

impl Default for RoleLabels {
    fn default() -> Self {
        Self {
            user: Role::Submitted.label().to_string(),
            assistant: Role::Produced.label().to_string(),
        }
    }
}

impl RoleLabels {
    pub fn get(&self, role: Role) -> &str {
        match role {
            Role::Submitted => &self.user,
            Role::Produced => &self.assistant,
        }
    }
}

/// Where an export came from; written into markdown frontmatter.
#[derive(Clone, Debug, Default)]
pub struct SourceInfo {
    pub path: Option<PathBuf>,
    pub hash: Option<String>,
}

#[derive(Serialize)]
struct Frontmatter<'a> {
    title: String,
    exported_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_hash: Option<&'a str>,
    messages: usize,
}

pub fn write_transcript<W: Write>(
    writer: &mut W,
    extraction: &Extraction,
    format: OutputFormat,
    labels: &RoleLabels,
    source: &SourceInfo,
    exported_at: DateTime<Utc>,
) -> std::io::Result<()> {
    match format {
        OutputFormat::Markdown => {
            write_markdown(writer, extraction, labels, source, exported_at)
        }
        OutputFormat::Text => write_text(writer, &extraction.entries, labels),
        OutputFormat::Json => write_json(writer, &extraction.entries),
    }
}

pub fn write_markdown<W: Write>(
    writer: &mut W,
    extraction: &Extraction,
    labels: &RoleLabels,
    source: &SourceInfo,
    exported_at: DateTime<Utc>,
) -> std::io::Result<()> {
    let fm = Frontmatter {
        title: extraction.title(),
        exported_at,
        source: source
            .path
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned()),
        source_hash: source.hash.as_deref(),
        messages: extraction.entries.len(),
    };

    writeln!(writer, "---")?;
    let yaml = serde_yaml::to_string(&fm).map_err(std::io::Error::other)?;
    write!(writer, "{}", yaml)?;
    writeln!(writer, "---")?;
    writeln!(writer)?;

    for entry in &extraction.entries {
        writeln!(writer, "## {}", labels.get(entry.role()))?;
        writeln!(writer)?;
        writeln!(writer, "{}", entry.text())?;
        writeln!(writer)?;
    }

    Ok(())
}

pub fn write_text<W: Write>(
    writer: &mut W,
    entries: &[ConversationEntry],
    labels: &RoleLabels,
) -> std::io::Result<()> {
    for (i, entry) in entries.iter().enumerate() {
        if i > 0 {
            writeln!(writer)?;
        }
        writeln!(writer, "{}:", labels.get(entry.role()))?;
        writeln!(writer, "{}", entry.text())?;
    }
    Ok(())
}

pub fn write_json<W: Write>(writer: &mut W, entries: &[ConversationEntry]) -> std::io::Result<()> {
    serde_json::to_writer_pretty(&mut *writer, entries)?;
    writeln!(writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Extraction {
        Extraction {
            entries: vec![
                ConversationEntry::new(Role::Submitted, "Hello?", 0),
                ConversationEntry::new(Role::Produced, "Hi!\n\n- a\n- b", 1),
            ],
            strategy: Some("message-tags"),
            skipped: 0,
        }
    }

    fn render(format: OutputFormat, source: &SourceInfo) -> String {
        let mut buf = Vec::new();
        let at = Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap();
        write_transcript(&mut buf, &sample(), format, &RoleLabels::default(), source, at)
            .unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_markdown_has_frontmatter_and_sections() {
        let source = SourceInfo {
            path: Some(PathBuf::from("chat.html")),
            hash: Some("abc123".into()),
        };
        let out = render(OutputFormat::Markdown, &source);
        let rest = out.strip_prefix("---\n").unwrap();
        let (yaml, body) = rest.split_once("---\n").unwrap();

        let fm: serde_yaml::Value = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(fm["title"].as_str(), Some("Hello?"));
        assert_eq!(fm["exported_at"].as_str(), Some("2026-10-18T12:00:00Z"));
        assert_eq!(fm["source"].as_str(), Some("chat.html"));
        assert_eq!(fm["source_hash"].as_str(), Some("abc123"));
        assert_eq!(fm["messages"].as_u64(), Some(2));

        assert_eq!(body, "\n## User\n\nHello?\n\n## Assistant\n\nHi!\n\n- a\n- b\n\n");
    }

    #[test]
    fn test_markdown_omits_unknown_source() {
        let out = render(OutputFormat::Markdown, &SourceInfo::default());
        assert!(!out.contains("source:"));
        assert!(!out.contains("source_hash:"));
    }

    #[test]
    fn test_text_uses_role_labels() {
        let out = render(OutputFormat::Text, &SourceInfo::default());
        assert_eq!(out, "User:\nHello?\n\nAssistant:\nHi!\n\n- a\n- b\n");
    }

    #[test]
    fn test_custom_labels() {
        let labels = RoleLabels {
            user: "Me".into(),
            assistant: "Gemini".into(),
        };
        let mut buf = Vec::new();
        write_text(&mut buf, &sample().entries, &labels).unwrap();
        let out = String::from_utf8(buf).unwrap();
        assert!(out.starts_with("Me:\n"));
        assert!(out.contains("\nGemini:\n"));
    }

    #[test]
    fn test_json_entries() {
        let out = render(OutputFormat::Json, &SourceInfo::default());
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value[0]["role"], "user");
        assert_eq!(value[1]["role"], "assistant");
        assert_eq!(value[1]["sequence_index"], 1);
        assert_eq!(value[1]["text"], "Hi!\n\n- a\n- b");
    }
}
