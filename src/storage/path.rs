//! Where a test's recording lives on disk

use std::path::{Component, Path, PathBuf};

use crate::{PlaybackError, Result};

/// Extension of recording files
pub const RECORDING_EXTENSION: &str = "playback";

/// Directory created next to the spec file when no fixtures dir is set
pub const SIBLING_DIR: &str = "playback";

/// Maximum test title length
const TITLE_LEN_MAX: usize = 255;

/// Path of the recording for `title` in `spec_file`.
///
/// Relative paths are resolved against `base_dir`. With a fixtures dir the
/// spec file's directory is mirrored below it; otherwise recordings sit in a
/// `playback/` directory beside the spec file.
///
/// # Errors
///
/// Returns error if the title is not usable as a file name or the spec file
/// has no name
pub fn recording_path(
    base_dir: &Path,
    fixtures_dir: Option<&Path>,
    spec_file: &Path,
    title: &str,
) -> Result<PathBuf> {
    validate_test_name(title)?;

    let spec_file = normalize(&base_dir.join(spec_file));
    let stem = spec_file
        .file_stem()
        .map(|s| kebab_case(&s.to_string_lossy()))
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            PlaybackError::InvalidArgument(format!("Spec file has no name: {}", spec_file.display()))
        })?;
    let spec_dir = spec_file.parent().unwrap_or_else(|| Path::new("/"));

    let dir = match fixtures_dir {
        Some(fixtures) => {
            let fixtures = normalize(&base_dir.join(fixtures));
            let subdir: PathBuf = relative_to(&fixtures, spec_dir)
                .components()
                .filter(|c| matches!(c, Component::Normal(_)))
                .collect();
            fixtures.join(subdir)
        }
        None => spec_dir.join(SIBLING_DIR),
    };

    Ok(dir
        .join(stem)
        .join(format!("{}.{RECORDING_EXTENSION}", kebab_case(title))))
}

/// Lower-case words joined by `-`.
///
/// Words break on anything that is not alphanumeric, on lower-to-upper case
/// changes, before the last capital of an acronym (`HTTPServer`) and between
/// letters and digits.
#[must_use]
pub fn kebab_case(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }

        if let Some(&prev) = i.checked_sub(1).and_then(|p| chars.get(p)) {
            let next = chars.get(i + 1).copied();
            let boundary = (prev.is_lowercase() && c.is_uppercase())
                || (prev.is_uppercase()
                    && c.is_uppercase()
                    && next.is_some_and(char::is_lowercase))
                || (prev.is_alphabetic() && c.is_numeric())
                || (prev.is_numeric() && c.is_alphabetic());
            if boundary && !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
        }
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }

    words.join("-")
}

/// Check that a test title can name a recording file
///
/// # Errors
///
/// Returns error if the title is empty, too long, contains NUL, or has no
/// alphanumeric characters
pub fn validate_test_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(PlaybackError::InvalidTestName(
            "Test name cannot be empty".to_string(),
        ));
    }

    if name.len() > TITLE_LEN_MAX {
        return Err(PlaybackError::InvalidTestName(format!(
            "Test name too long: {} > {TITLE_LEN_MAX}",
            name.len()
        )));
    }

    if name.contains('\0') {
        return Err(PlaybackError::InvalidTestName(
            "Test name cannot contain null bytes".to_string(),
        ));
    }

    if kebab_case(name).is_empty() {
        return Err(PlaybackError::InvalidTestName(format!(
            "Test name has no usable characters: {name:?}"
        )));
    }

    Ok(())
}

/// Resolve `.` and `..` without touching the filesystem
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// `to` expressed relative to `from`; both must be normalized
fn relative_to(from: &Path, to: &Path) -> PathBuf {
    let from: Vec<Component<'_>> = from.components().collect();
    let to: Vec<Component<'_>> = to.components().collect();
    let shared = from.iter().zip(&to).take_while(|(a, b)| a == b).count();

    let mut out = PathBuf::new();
    for _ in shared..from.len() {
        out.push("..");
    }
    for component in &to[shared..] {
        out.push(component);
    }
    out
}
