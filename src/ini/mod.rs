//! Game INI access for the save path key.
//!
//! Reads go through `rust-ini`. Its writer drops comments and blank lines,
//! and game INIs are hand-edited by users and mod tools alike, so writes use
//! [`IniDocument`] instead: it keeps every original line as raw bytes and
//! only rewrites the line holding the key that changes. Game INIs are
//! Windows-1252, so nothing here assumes UTF-8 outside the key being set.

use std::io;
use std::path::{Path, PathBuf};

use ::ini::{Ini, ParseOption};
use thiserror::Error;

/// Section holding the save path key.
pub const SAVE_PATH_SECTION: &str = "General";
/// Save directory relative to the game's "My Games" folder.
pub const SAVE_PATH_KEY: &str = "SLocalSavePath";

#[derive(Error, Debug)]
pub enum IniError {
    #[error("Cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cannot parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// An INI file kept as its original lines, byte for byte.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IniDocument {
    lines: Vec<Vec<u8>>,
    crlf: bool,
    trailing_newline: bool,
}

impl IniDocument {
    pub fn parse(bytes: &[u8]) -> Self {
        let crlf = bytes.windows(2).any(|pair| pair == b"\r\n");
        let trailing_newline = bytes.ends_with(b"\n");
        let body = bytes.strip_suffix(b"\n").unwrap_or(bytes);
        let lines = if bytes.is_empty() {
            Vec::new()
        } else {
            body.split(|&b| b == b'\n')
                .map(|line| line.strip_suffix(b"\r").unwrap_or(line).to_vec())
                .collect()
        };

        Self {
            lines,
            crlf,
            trailing_newline,
        }
    }

    /// Load `path`; a missing file is an empty document.
    pub async fn load(path: &Path) -> Result<Self, IniError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Self::parse(&bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self {
                crlf: cfg!(windows),
                trailing_newline: true,
                ..Self::default()
            }),
            Err(source) => Err(IniError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub async fn save(&self, path: &Path) -> Result<(), IniError> {
        let write_err = |source| IniError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
        tokio::fs::write(path, self.to_bytes()).await.map_err(write_err)
    }

    /// The document as it would be written to disk.
    pub fn to_bytes(&self) -> Vec<u8> {
        let newline: &[u8] = if self.crlf { b"\r\n" } else { b"\n" };
        let mut out = self.lines.join(newline);
        if self.trailing_newline && !self.lines.is_empty() {
            out.extend_from_slice(newline);
        }
        out
    }

    /// Raw value of `key` in `section`. Names compare case-insensitively.
    pub fn get(&self, section: &str, key: &str) -> Option<&[u8]> {
        let (start, end) = self.section_bounds(section)?;
        self.lines[start..end]
            .iter()
            .filter_map(|line| split_key_value(line))
            .find(|(k, _)| k.eq_ignore_ascii_case(key.as_bytes()))
            .map(|(_, v)| v)
    }

    /// Set `key` in `section`, creating either when missing.
    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        let Some((start, end)) = self.section_bounds(section) else {
            if self.lines.last().is_some_and(|line| !line.trim_ascii().is_empty()) {
                self.lines.push(Vec::new());
            }
            self.lines.push(format!("[{section}]").into_bytes());
            self.lines.push(format!("{key}={value}").into_bytes());
            return;
        };

        for line in &mut self.lines[start..end] {
            if let Some((existing, _)) = split_key_value(line) {
                if existing.eq_ignore_ascii_case(key.as_bytes()) {
                    let mut updated = existing.to_vec();
                    updated.push(b'=');
                    updated.extend_from_slice(value.as_bytes());
                    *line = updated;
                    return;
                }
            }
        }

        // Append after the last non-blank line of the section.
        let insert_at = (start..end)
            .rev()
            .find(|&i| !self.lines[i].trim_ascii().is_empty())
            .map(|i| i + 1)
            .unwrap_or(start);
        self.lines.insert(insert_at, format!("{key}={value}").into_bytes());
    }

    /// Line range `(first key line, end)` of `section`, header excluded.
    fn section_bounds(&self, section: &str) -> Option<(usize, usize)> {
        let header = self.lines.iter().position(|line| {
            section_name(line).is_some_and(|s| s.eq_ignore_ascii_case(section.as_bytes()))
        })?;
        let start = header + 1;
        let end = self.lines[start..]
            .iter()
            .position(|line| section_name(line).is_some())
            .map(|offset| start + offset)
            .unwrap_or(self.lines.len());
        Some((start, end))
    }
}

fn section_name(line: &[u8]) -> Option<&[u8]> {
    let inner = line.trim_ascii().strip_prefix(b"[")?;
    let end = inner.iter().position(|&b| b == b']')?;
    Some(inner[..end].trim_ascii())
}

fn split_key_value(line: &[u8]) -> Option<(&[u8], &[u8])> {
    let trimmed = line.trim_ascii_start();
    if matches!(trimmed.first(), Some(b';' | b'#' | b'[')) {
        return None;
    }
    let eq = trimmed.iter().position(|&b| b == b'=')?;
    Some((trimmed[..eq].trim_ascii(), trimmed[eq + 1..].trim_ascii()))
}

/// Game INIs use backslash paths and no quoting.
fn parse_option() -> ParseOption {
    ParseOption {
        enabled_quote: false,
        enabled_escape: false,
        ..ParseOption::default()
    }
}

/// Read `[General] SLocalSavePath` from the INI at `path`.
///
/// A missing file or key reads as `None`.
pub async fn read_local_save_path(path: &Path) -> Result<Option<String>, IniError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(IniError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    // Only the ASCII save path matters here; other bytes may be lossy.
    let text = String::from_utf8_lossy(&bytes);
    let ini = Ini::load_from_str_opt(&text, parse_option()).map_err(|e| IniError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    Ok(ini
        .section(Some(SAVE_PATH_SECTION))
        .and_then(|section| section.get(SAVE_PATH_KEY))
        .map(str::to_string))
}

/// Write `[General] SLocalSavePath`, leaving every other byte untouched.
pub async fn write_local_save_path(path: &Path, value: &str) -> Result<(), IniError> {
    let mut doc = IniDocument::load(path).await?;
    if doc.get(SAVE_PATH_SECTION, SAVE_PATH_KEY) == Some(value.as_bytes()) {
        crate::debug_event!("ini", "unchanged", "{}", path.display());
        return Ok(());
    }
    doc.set(SAVE_PATH_SECTION, SAVE_PATH_KEY, value);
    doc.save(path).await?;
    crate::debug_event!("ini", "updated", "{}={value} in {}", SAVE_PATH_KEY, path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &[u8] = b"[General]\nsLanguage=ENGLISH\n; keep me\nSLocalSavePath=Saves\\\n\n[Display]\niSize W=1920\n";

    fn text(doc: &IniDocument) -> String {
        String::from_utf8(doc.to_bytes()).unwrap()
    }

    #[test]
    fn test_get_is_case_insensitive() {
        let doc = IniDocument::parse(SAMPLE);
        assert_eq!(doc.get("general", "slocalsavepath"), Some(&b"Saves\\"[..]));
        assert_eq!(doc.get("Display", "iSize W"), Some(&b"1920"[..]));
        assert_eq!(doc.get("Display", "missing"), None);
    }

    #[test]
    fn test_set_existing_key_preserves_rest() {
        let mut doc = IniDocument::parse(SAMPLE);
        doc.set("General", "SLocalSavePath", "Saves\\profile\\");
        assert_eq!(
            text(&doc),
            "[General]\nsLanguage=ENGLISH\n; keep me\nSLocalSavePath=Saves\\profile\\\n\n[Display]\niSize W=1920\n"
        );
    }

    #[test]
    fn test_set_missing_key_in_section() {
        let mut doc = IniDocument::parse(b"[General]\nsLanguage=ENGLISH\n\n[Display]\n");
        doc.set("General", "SLocalSavePath", "Saves\\");
        assert_eq!(
            text(&doc),
            "[General]\nsLanguage=ENGLISH\nSLocalSavePath=Saves\\\n\n[Display]\n"
        );
    }

    #[test]
    fn test_set_missing_section() {
        let mut doc = IniDocument::parse(b"[Display]\niSize W=1920\n");
        doc.set("General", "SLocalSavePath", "Saves\\");
        assert_eq!(
            text(&doc),
            "[Display]\niSize W=1920\n\n[General]\nSLocalSavePath=Saves\\\n"
        );
    }

    #[test]
    fn test_crlf_round_trip() {
        let original = b"[General]\r\nSLocalSavePath=Saves\\\r\n";
        let mut doc = IniDocument::parse(original);
        assert_eq!(doc.to_bytes(), original);
        doc.set("General", "SLocalSavePath", "Saves\\p\\");
        assert_eq!(text(&doc), "[General]\r\nSLocalSavePath=Saves\\p\\\r\n");
    }

    #[tokio::test]
    async fn test_write_keeps_windows_1252_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Skyrim.ini");
        // "Général" in Windows-1252
        std::fs::write(&path, b"[General]\n; G\xE9n\xE9ral\nsLanguage=FRENCH\n").unwrap();

        write_local_save_path(&path, "Saves\\p\\").await.unwrap();

        assert_eq!(
            std::fs::read(&path).unwrap(),
            b"[General]\n; G\xE9n\xE9ral\nsLanguage=FRENCH\nSLocalSavePath=Saves\\p\\\n"
        );
        assert_eq!(
            read_local_save_path(&path).await.unwrap().as_deref(),
            Some("Saves\\p\\")
        );
    }

    #[tokio::test]
    async fn test_write_creates_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Skyrim").join("Skyrim.ini");

        write_local_save_path(&path, "Saves\\abc\\").await.unwrap();

        assert_eq!(
            read_local_save_path(&path).await.unwrap().as_deref(),
            Some("Saves\\abc\\")
        );
    }

    #[tokio::test]
    async fn test_read_trailing_backslash_and_case() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Fallout4.ini");
        std::fs::write(&path, b"[general]\r\nsLocalSavePath=Saves\\\r\n[Display]\r\n").unwrap();

        assert_eq!(
            read_local_save_path(&path).await.unwrap().as_deref(),
            Some("Saves\\")
        );
        assert_eq!(
            read_local_save_path(&dir.path().join("missing.ini"))
                .await
                .unwrap(),
            None
        );
    }
}
