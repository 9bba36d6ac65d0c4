//! Input expansion and output naming for batch runs.
//!
//! File arguments may contain `*` in any path component. Each component is
//! matched against the directory entries one level at a time, so
//! `songs/*/*.mid` walks every subdirectory of `songs`.

use crate::midi::is_midi_file;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Returns true if `name` matches `pattern`, where `*` matches any run of
/// characters, including none.
pub fn matches_wildcard(pattern: &str, name: &str) -> bool {
    let mut fragments = pattern.split('*');
    let first = fragments.next().unwrap_or("");
    let Some(mut rest) = name.strip_prefix(first) else {
        return false;
    };

    let fragments: Vec<&str> = fragments.collect();
    let Some((last, middle)) = fragments.split_last() else {
        // No wildcard at all.
        return rest.is_empty();
    };

    for fragment in middle {
        match rest.find(fragment) {
            Some(i) => rest = &rest[i + fragment.len()..],
            None => return false,
        }
    }
    rest.ends_with(last)
}

/// Expands a path that may contain wildcards into the existing paths it
/// names, in sorted order within each directory.
///
/// Wildcards in a non-final component only match directories; in the final
/// component they match files and directories alike.
pub fn resolve_wildcard_path(pattern: &str) -> Vec<PathBuf> {
    let mut base = PathBuf::new();
    let mut parts = Vec::new();
    for component in Path::new(pattern).components() {
        match component {
            Component::Prefix(_) | Component::RootDir => base.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir | Component::Normal(_) => {
                parts.push(component.as_os_str().to_string_lossy().into_owned())
            }
        }
    }

    let mut found = Vec::new();
    if !parts.is_empty() {
        enumerate(&base, &parts, &mut found);
    }
    found
}

fn enumerate(base: &Path, parts: &[String], found: &mut Vec<PathBuf>) {
    let Some((name, rest)) = parts.split_first() else {
        found.push(base.to_path_buf());
        return;
    };
    let is_final = rest.is_empty();

    if !name.contains('*') {
        let next = base.join(name);
        if is_final {
            if next.exists() {
                found.push(next);
            }
        } else if next.is_dir() {
            enumerate(&next, rest, found);
        }
        return;
    }

    let dir = if base.as_os_str().is_empty() {
        Path::new(".")
    } else {
        base
    };
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };

    let mut matches: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|entry| match entry.file_type() {
            Ok(kind) if kind.is_file() => is_final,
            Ok(kind) => kind.is_dir(),
            Err(_) => false,
        })
        .filter(|entry| matches_wildcard(name, &entry.file_name().to_string_lossy()))
        .map(|entry| base.join(entry.file_name()))
        .collect();
    matches.sort();

    for path in matches {
        if is_final {
            found.push(path);
        } else {
            enumerate(&path, rest, found);
        }
    }
}

/// Expands every argument and keeps the MIDI files, in argument order and
/// without duplicates.
///
/// Arguments that match nothing, and matches that are not MIDI files, are
/// reported and skipped.
pub fn collect_inputs<S: AsRef<str>>(patterns: &[S]) -> Vec<PathBuf> {
    let mut inputs: Vec<PathBuf> = Vec::new();
    for pattern in patterns {
        let pattern = pattern.as_ref();
        let matched = resolve_wildcard_path(pattern);
        if matched.is_empty() {
            tracing::warn!("No files match {}", pattern);
            continue;
        }

        for path in matched {
            if !is_midi_file(&path) {
                tracing::warn!("Skipping {}: not a MIDI file", path.display());
            } else if !inputs.contains(&path) {
                inputs.push(path);
            }
        }
    }
    inputs
}

/// Where the rendered stream for `input` is written: the same name with an
/// `.ogg` extension, in `destination` if one is given.
pub fn output_path_for(input: &Path, destination: Option<&Path>) -> PathBuf {
    let renamed = input.with_extension("ogg");
    match destination {
        Some(dir) => dir.join(renamed.file_name().unwrap_or_default()),
        None => renamed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIDI: &[u8] = b"MThd\x00\x00\x00\x06\x00\x00\x00\x01\x01\xe0";

    fn tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for sub in ["town", "battle", "notes"] {
            fs::create_dir(dir.path().join(sub)).unwrap();
        }
        fs::write(dir.path().join("town/day.mid"), MIDI).unwrap();
        fs::write(dir.path().join("town/night.mid"), MIDI).unwrap();
        fs::write(dir.path().join("battle/boss.mid"), MIDI).unwrap();
        fs::write(dir.path().join("battle/boss.txt"), b"not midi").unwrap();
        fs::write(dir.path().join("notes/readme.mid"), b"not midi either").unwrap();
        dir
    }

    fn pattern(dir: &tempfile::TempDir, rest: &str) -> String {
        dir.path().join(rest).to_string_lossy().into_owned()
    }

    #[test]
    fn test_matches_wildcard() {
        assert!(matches_wildcard("*.mid", "song.mid"));
        assert!(matches_wildcard("*", "anything"));
        assert!(matches_wildcard("s*g*", "song.mid"));
        assert!(matches_wildcard("song.mid", "song.mid"));
        assert!(matches_wildcard("a*a", "aba"));
        assert!(!matches_wildcard("a*a", "a"));
        assert!(!matches_wildcard("*.mid", "song.midi"));
        assert!(!matches_wildcard("x*", "song.mid"));
        assert!(!matches_wildcard("song", "song.mid"));
    }

    #[test]
    fn test_wildcard_in_file_name() {
        let dir = tree();
        let found = resolve_wildcard_path(&pattern(&dir, "town/*.mid"));
        assert_eq!(
            found,
            vec![dir.path().join("town/day.mid"), dir.path().join("town/night.mid")]
        );
    }

    #[test]
    fn test_wildcard_in_directory() {
        let dir = tree();
        let found = resolve_wildcard_path(&pattern(&dir, "*/*.mid"));
        assert_eq!(found.len(), 4);
        assert!(found.contains(&dir.path().join("battle/boss.mid")));
        assert!(found.contains(&dir.path().join("notes/readme.mid")));
    }

    #[test]
    fn test_plain_path() {
        let dir = tree();
        let existing = pattern(&dir, "battle/boss.mid");
        assert_eq!(resolve_wildcard_path(&existing), vec![PathBuf::from(&existing)]);
        assert!(resolve_wildcard_path(&pattern(&dir, "battle/missing.mid")).is_empty());
    }

    #[test]
    fn test_collect_inputs_filters_and_dedupes() {
        let dir = tree();
        let inputs = collect_inputs(&[
            pattern(&dir, "*/*"),
            pattern(&dir, "town/day.mid"),
            pattern(&dir, "nowhere/*.mid"),
        ]);
        assert_eq!(
            inputs,
            vec![
                dir.path().join("battle/boss.mid"),
                dir.path().join("town/day.mid"),
                dir.path().join("town/night.mid"),
            ]
        );
    }

    #[test]
    fn test_output_path_for() {
        assert_eq!(
            output_path_for(Path::new("music/song.mid"), None),
            PathBuf::from("music/song.ogg")
        );
        assert_eq!(
            output_path_for(Path::new("music/song.midi"), Some(Path::new("out"))),
            PathBuf::from("out/song.ogg")
        );
        assert_eq!(
            output_path_for(Path::new("song"), None),
            PathBuf::from("song.ogg")
        );
    }
}
