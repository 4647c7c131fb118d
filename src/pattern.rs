use std::collections::HashSet;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use regex::Regex;
use serde::Serialize;
use walkdir::WalkDir;

use crate::acquisition;
use crate::error::TomoError;

const WILDCARDS: &[char] = &['*', '?', '[', '#'];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchedFile {
    pub path: Utf8PathBuf,
    pub id: u64,
}

#[derive(Debug, Clone)]
pub struct FilePattern {
    raw: String,
    base: Utf8PathBuf,
    depth: usize,
    regex: Regex,
    has_id: bool,
}

impl FilePattern {
    pub fn new(pattern: &str) -> Result<Self, TomoError> {
        Self::with_dir(None, pattern)
    }

    pub fn with_dir(files_path: Option<&str>, pattern: &str) -> Result<Self, TomoError> {
        let (raw, absolute) = expand(files_path, pattern)?;

        let components: Vec<&str> = absolute
            .as_str()
            .split('/')
            .filter(|part| !part.is_empty())
            .collect();
        let first_wild = components
            .iter()
            .position(|part| part.contains(WILDCARDS))
            .unwrap_or(components.len().saturating_sub(1));
        if first_wild >= components.len() {
            return Err(TomoError::InvalidPattern(raw));
        }

        let mut base = Utf8PathBuf::from("/");
        for part in &components[..first_wild] {
            base.push(part);
        }
        let relative = &components[first_wild..];
        let (regex_src, has_id) = translate(&relative.join("/"), &raw, &[])?;
        let regex = Regex::new(&regex_src).map_err(|err| TomoError::InvalidPattern(err.to_string()))?;

        Ok(Self {
            raw,
            base,
            depth: relative.len(),
            regex,
            has_id,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn base_dir(&self) -> &Utf8Path {
        &self.base
    }

    pub fn has_id_marker(&self) -> bool {
        self.has_id
    }

    pub fn matches(&self, path: &Utf8Path) -> bool {
        path.strip_prefix(&self.base)
            .map(|rel| self.regex.is_match(rel.as_str()))
            .unwrap_or(false)
    }

    pub fn resolve(&self) -> Result<ResolvedFiles, TomoError> {
        if !self.base.as_std_path().is_dir() {
            tracing::debug!("pattern base {} is not a directory", self.base);
            return Ok(ResolvedFiles::default());
        }

        let mut hits: Vec<(Utf8PathBuf, Option<u64>)> = Vec::new();
        let walker = WalkDir::new(self.base.as_std_path())
            .follow_links(true)
            .min_depth(self.depth)
            .max_depth(self.depth);
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!("error accessing entry: {err}");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(path) = Utf8PathBuf::from_path_buf(entry.into_path()) else {
                tracing::warn!("skipping non-utf8 path under {}", self.base);
                continue;
            };
            if acquisition::is_sidecar(&path) {
                continue;
            }
            let Ok(rel) = path.strip_prefix(&self.base) else {
                continue;
            };
            let Some(captures) = self.regex.captures(rel.as_str()) else {
                continue;
            };
            let id = match captures.name("id") {
                Some(digits) => Some(digits.as_str().parse::<u64>().map_err(|_| {
                    TomoError::InvalidPattern(format!(
                        "file '{path}' doesn't match the pattern '{}'",
                        self.raw
                    ))
                })?),
                None => None,
            };
            hits.push((path, id));
        }

        hits.sort_by(|a, b| a.0.cmp(&b.0));
        let files = hits
            .into_iter()
            .enumerate()
            .map(|(index, (path, id))| MatchedFile {
                path,
                id: id.unwrap_or(index as u64 + 1),
            })
            .collect::<Vec<_>>();
        tracing::debug!("pattern {} matched {} files", self.raw, files.len());
        Ok(ResolvedFiles {
            inner: files.into_iter(),
        })
    }
}

#[derive(Debug, Default)]
pub struct ResolvedFiles {
    inner: std::vec::IntoIter<MatchedFile>,
}

impl ResolvedFiles {
    pub fn excluding(self, seen: &HashSet<Utf8PathBuf>) -> Self {
        if seen.is_empty() {
            return self;
        }
        let kept = self
            .inner
            .filter(|file| !seen.contains(&canonical_or_self(&file.path)))
            .collect::<Vec<_>>();
        Self {
            inner: kept.into_iter(),
        }
    }
}

impl Iterator for ResolvedFiles {
    type Item = MatchedFile;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for ResolvedFiles {}

pub fn canonical_or_self(path: &Utf8Path) -> Utf8PathBuf {
    path.canonicalize_utf8().unwrap_or_else(|_| path.to_owned())
}

pub(crate) fn expand(
    files_path: Option<&str>,
    pattern: &str,
) -> Result<(String, Utf8PathBuf), TomoError> {
    let pattern = pattern.trim();
    let joined = match files_path.map(str::trim).filter(|dir| !dir.is_empty()) {
        Some(dir) => Utf8PathBuf::from(dir).join(pattern),
        None => Utf8PathBuf::from(pattern),
    };
    if joined.as_str().is_empty() {
        return Err(TomoError::InvalidPattern(
            "the path and pattern can not be both empty".to_string(),
        ));
    }
    let absolute = absolutize(&expand_home(&joined)?)?;
    Ok((joined.to_string(), absolute))
}

fn expand_home(path: &Utf8Path) -> Result<Utf8PathBuf, TomoError> {
    let Ok(rest) = path.strip_prefix("~") else {
        return Ok(path.to_owned());
    };
    let home = BaseDirs::new()
        .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.home_dir().to_path_buf()).ok())
        .ok_or_else(|| TomoError::Filesystem("unable to resolve home directory".to_string()))?;
    Ok(home.join(rest))
}

fn absolutize(path: &Utf8Path) -> Result<Utf8PathBuf, TomoError> {
    if path.is_absolute() {
        return Ok(path.to_owned());
    }
    let cwd = std::env::current_dir().map_err(|err| TomoError::Filesystem(err.to_string()))?;
    let cwd = Utf8PathBuf::from_path_buf(cwd)
        .map_err(|_| TomoError::Filesystem("non-utf8 working directory".to_string()))?;
    Ok(cwd.join(path))
}

pub(crate) fn translate(
    pattern: &str,
    raw: &str,
    tokens: &[(&str, &str)],
) -> Result<(String, bool), TomoError> {
    let mut out = String::from("^");
    let mut has_id = false;
    let mut chars = pattern.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '{' {
            let rest = format!("{{{}", chars.clone().collect::<String>());
            if let Some((token, group)) = tokens.iter().find(|(token, _)| rest.starts_with(token)) {
                out.push_str(group);
                for _ in 1..token.chars().count() {
                    chars.next();
                }
                continue;
            }
        }
        match ch {
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            '#' => {
                let mut width = 1;
                while chars.next_if_eq(&'#').is_some() {
                    width += 1;
                }
                if has_id {
                    out.push_str(&format!("[0-9]{{{width}}}"));
                } else {
                    out.push_str(&format!("(?P<id>[0-9]{{{width}}})"));
                    has_id = true;
                }
            }
            '[' => {
                let mut class = String::from("[");
                if chars.next_if_eq(&'!').is_some() {
                    class.push('^');
                }
                let mut closed = false;
                for inner in chars.by_ref() {
                    if inner == ']' {
                        closed = true;
                        break;
                    }
                    if inner == '\\' || inner == '[' {
                        class.push('\\');
                    }
                    class.push(inner);
                }
                let empty = class == "[" || class == "[^";
                if !closed || empty {
                    return Err(TomoError::InvalidPattern(format!(
                        "unterminated character class in {raw}"
                    )));
                }
                class.push(']');
                out.push_str(&class);
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    Ok((out, has_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translate_wildcards() {
        let (re, has_id) = translate("tomo_*.mrc", "p", &[]).unwrap();
        assert_eq!(re, r"^tomo_[^/]*\.mrc$");
        assert!(!has_id);
    }

    #[test]
    fn translate_id_marker() {
        let (re, has_id) = translate("ts_###.st", "p", &[]).unwrap();
        assert!(has_id);
        let regex = Regex::new(&re).unwrap();
        let caps = regex.captures("ts_042.st").unwrap();
        assert_eq!(&caps["id"], "042");
        assert!(!regex.is_match("ts_42.st"));
    }

    #[test]
    fn translate_negated_class() {
        let (re, _) = translate("a[!0-9].mrc", "p", &[]).unwrap();
        let regex = Regex::new(&re).unwrap();
        assert!(regex.is_match("ab.mrc"));
        assert!(!regex.is_match("a1.mrc"));
    }

    #[test]
    fn translate_named_tokens() {
        let (re, _) = translate("{TS}_{TO}.mrc", "p", &[("{TS}", "(?P<ts>[^/]+)"), ("{TO}", "(?P<to>[0-9]+)")]).unwrap();
        let regex = Regex::new(&re).unwrap();
        let caps = regex.captures("ts_a_12.mrc").unwrap();
        assert_eq!(&caps["ts"], "ts_a");
        assert_eq!(&caps["to"], "12");

        let (re, _) = translate("{x}.mrc", "p", &[]).unwrap();
        assert!(Regex::new(&re).unwrap().is_match("{x}.mrc"));
    }

    #[test]
    fn resolve_skips_acquisition_sidecars() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        std::fs::write(dir.join("tomo_01.mrc"), b"x").unwrap();
        std::fs::write(dir.join("tomo_01.acquisition.json"), b"{}").unwrap();
        std::fs::write(dir.join("tomo_02.mrc"), b"x").unwrap();

        let pattern = FilePattern::new(dir.join("tomo_*").as_str()).unwrap();
        let files: Vec<MatchedFile> = pattern.resolve().unwrap().collect();
        let names: Vec<&str> = files.iter().filter_map(|file| file.path.file_name()).collect();
        assert_eq!(names, vec!["tomo_01.mrc", "tomo_02.mrc"]);
        assert_eq!(files[1].id, 2);
    }

    #[test]
    fn unterminated_class_is_invalid() {
        assert!(translate("a[bc", "p", &[]).is_err());
    }

    #[test]
    fn empty_pattern_is_invalid() {
        assert!(FilePattern::with_dir(Some("  "), " ").is_err());
    }

    #[test]
    fn base_dir_stops_at_first_wildcard() {
        let pattern = FilePattern::new("/data/day*/tomo_#.mrc").unwrap();
        assert_eq!(pattern.base_dir(), Utf8Path::new("/data"));
        assert!(pattern.matches(Utf8Path::new("/data/day1/tomo_3.mrc")));
        assert!(!pattern.matches(Utf8Path::new("/data/day1/sub/tomo_3.mrc")));
    }

    #[test]
    fn literal_path_uses_parent_as_base() {
        let pattern = FilePattern::new("/data/one.mrc").unwrap();
        assert_eq!(pattern.base_dir(), Utf8Path::new("/data"));
        assert!(pattern.matches(Utf8Path::new("/data/one.mrc")));
    }
}
