use crate::exporter::{self, OutputFormat, RoleLabels, SourceInfo};
use crate::extract;
use chrono::Utc;
use eyre::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Configuration required to run the export process.
/// This decouples the logic from how the arguments were parsed (CLI/Config file).
#[derive(Clone)]
pub struct ExportConfig {
    pub target_dir: PathBuf,
    pub inputs: Vec<PathBuf>,
    pub format: OutputFormat,
    pub labels: RoleLabels,
    pub force: bool,
    pub quiet: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessResult {
    Created,
    Updated,
    Skipped,
}

#[derive(Clone, Debug)]
pub struct FileFrontmatter {
    pub source: Option<String>,
    pub source_hash: Option<String>,
}

/// Hex SHA-256 of a page, used to tell whether a re-export is needed.
pub fn hash_source(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Read the YAML frontmatter from an existing .md file and extract relevant fields.
pub fn parse_existing_frontmatter(path: &Path) -> Option<FileFrontmatter> {
    let file = File::open(path).ok()?;
    let reader = BufReader::new(file);
    let mut lines = reader.lines();
    let first = lines.next()?.ok()?;
    if first.trim() != "---" {
        return None;
    }

    let mut source: Option<String> = None;
    let mut source_hash: Option<String> = None;
    let mut bytes_read = 0usize;

    for line in lines {
        let line = line.ok()?;
        bytes_read += line.len() + 1;
        if bytes_read > 4096 || line.trim() == "---" {
            break;
        }
        if let Some(rest) = line.strip_prefix("source:") {
            source = Some(unquote(rest));
        } else if let Some(rest) = line.strip_prefix("source_hash:") {
            source_hash = Some(unquote(rest));
        }
    }
    Some(FileFrontmatter {
        source,
        source_hash,
    })
}

fn unquote(value: &str) -> String {
    value
        .trim()
        .trim_matches('\'')
        .trim_matches('"')
        .to_string()
}

/// Filename stem for a page: `<source-stem>_<title-slug>`.
pub fn file_stem(source: &Path, title: &str) -> String {
    let prefix = source_prefix(source);
    let raw_slug = slug::slugify(title);
    // slug output is ASCII-only, so byte == char
    let slug = raw_slug[..raw_slug.len().min(60)]
        .trim_end_matches('-')
        .to_string();
    if slug.is_empty() {
        prefix
    } else {
        format!("{}_{}", prefix, slug)
    }
}

fn source_prefix(source: &Path) -> String {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let prefix = slug::slugify(stem);
    if prefix.is_empty() {
        "chat".to_string()
    } else {
        prefix
    }
}

fn path_tag(source: &Path) -> String {
    hash_source(source.to_string_lossy().as_bytes())
}

// Whether `path` may be written for `source`: it is free, or it is a markdown
// export whose frontmatter names the same source. Text and JSON carry no
// owner, so an existing file is taken over.
fn can_claim(path: &Path, source: &Path, format: OutputFormat) -> bool {
    match path.try_exists() {
        Ok(false) | Err(_) => true,
        Ok(true) => match format {
            OutputFormat::Markdown => parse_existing_frontmatter(path)
                .and_then(|fm| fm.source)
                .is_some_and(|owner| owner == source.to_string_lossy()),
            OutputFormat::Text | OutputFormat::Json => true,
        },
    }
}

// Pick the output path for `source`. Sources that share a file stem with
// another input of the batch, or whose plain name is owned by a different
// source, get a suffix from a hash of their path.
fn allocate_path(source: &Path, title: &str, config: &ExportConfig) -> PathBuf {
    let stem = file_stem(source, title);
    let tag = path_tag(source);
    let prefix = source_prefix(source);
    let shares_stem = config
        .inputs
        .iter()
        .any(|other| other.as_path() != source && source_prefix(other) == prefix);

    let mut candidates = Vec::with_capacity(2);
    if !shares_stem {
        candidates.push(stem.clone());
    }
    candidates.push(format!("{}_{}", stem, &tag[..8]));

    let ext = config.format.extension();
    for candidate in &candidates {
        let path = config.target_dir.join(format!("{}.{}", candidate, ext));
        if can_claim(&path, source, config.format) {
            return path;
        }
    }
    // A full path hash is unique per source.
    config
        .target_dir
        .join(format!("{}_{}.{}", stem, tag, ext))
}

// Find a markdown file exported from the same source: the name must start with
// the source prefix, and the frontmatter `source:` must name the same path.
fn find_existing_file(target_dir: &Path, source: &Path) -> Option<(PathBuf, FileFrontmatter)> {
    let prefix = format!("{}_", source_prefix(source));
    let exact = format!("{}.md", source_prefix(source));
    let source_str = source.to_string_lossy();
    fs::read_dir(target_dir)
        .ok()?
        .flatten()
        .filter(|e| {
            let n = e.file_name();
            let s = n.to_string_lossy();
            s.ends_with(".md") && (s.starts_with(&prefix) || *s == exact)
        })
        .find_map(|e| {
            let path = e.path();
            let fm = parse_existing_frontmatter(&path)?;
            if fm.source.as_deref() == Some(&*source_str) {
                Some((path, fm))
            } else {
                None
            }
        })
}

/// Export one saved page into the target directory.
pub fn export_source(source: &Path, config: &ExportConfig) -> Result<ProcessResult> {
    let bytes =
        fs::read(source).wrap_err_with(|| format!("Failed to read: {}", source.display()))?;
    let hash = hash_source(&bytes);

    let existing = match config.format {
        OutputFormat::Markdown => find_existing_file(&config.target_dir, source),
        _ => None,
    };
    if !config.force
        && let Some((ref path, ref fm)) = existing
        && fm.source_hash.as_deref() == Some(hash.as_str())
    {
        tracing::info!(file = %path.display(), "skipped, source unchanged");
        return Ok(ProcessResult::Skipped);
    }

    let html = String::from_utf8_lossy(&bytes);
    let extraction = extract::extract_html(&html)
        .wrap_err_with(|| format!("Failed to extract conversation: {}", source.display()))?;
    if extraction.is_empty() {
        tracing::warn!(source = %source.display(), "no messages found");
    }

    let desired_path = allocate_path(source, &extraction.title(), config);

    let result_variant = if existing.is_none() {
        ProcessResult::Created
    } else {
        ProcessResult::Updated
    };

    if let Some((ref old_path, _)) = existing
        && old_path != &desired_path
        && let Err(e) = fs::rename(old_path, &desired_path)
    {
        tracing::warn!(
            from = %old_path.display(),
            to = %desired_path.display(),
            error = %e,
            "rename failed"
        );
    }

    let file = File::create(&desired_path)
        .wrap_err_with(|| format!("Failed to create: {}", desired_path.display()))?;
    let mut writer = BufWriter::new(file);
    let info = SourceInfo {
        path: Some(source.to_path_buf()),
        hash: Some(hash),
    };
    exporter::write_transcript(
        &mut writer,
        &extraction,
        config.format,
        &config.labels,
        &info,
        Utc::now(),
    )
    .wrap_err_with(|| format!("Failed to write: {}", desired_path.display()))?;
    writer.flush()?;

    match result_variant {
        ProcessResult::Created => tracing::info!(file = %desired_path.display(), "created"),
        ProcessResult::Updated => tracing::info!(file = %desired_path.display(), "updated"),
        ProcessResult::Skipped => {}
    }

    Ok(result_variant)
}
