use crate::error::{ErrorKind, Result};
use crate::{ARCHIVE_EXTENSION, DEFLATE_LEVEL, PackageRules};
use exn::ResultExt;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::instrument;
use tsm_storage::validate_path;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

const CONTENTS_DIR: &str = "contents";
const ENTRY_PERMISSIONS: u32 = 0o644;

/// What happened to one extracted file while cleaning.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileAction {
    /// Script with full-line comments removed.
    Stripped { removed_lines: usize },
    /// Left as extracted (not a script, or a script without comment lines).
    Unchanged,
    /// Documentation file, deleted before repacking.
    Removed,
    /// Cleaning this file failed; it is repacked exactly as extracted.
    Failed(String),
}

/// Per-file record of a [`clean`] run, in repack order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CleanReport {
    pub files: Vec<(PathBuf, FileAction)>,
}

impl CleanReport {
    fn push(&mut self, path: impl Into<PathBuf>, action: FileAction) {
        self.files.push((path.into(), action));
    }

    pub fn action(&self, path: impl AsRef<Path>) -> Option<&FileAction> {
        self.files.iter().find(|(p, _)| p == path.as_ref()).map(|(_, a)| a)
    }

    /// Files that could not be cleaned and were kept as-is.
    pub fn failures(&self) -> impl Iterator<Item = (&Path, &str)> {
        self.files.iter().filter_map(|(path, action)| match action {
            FileAction::Failed(reason) => Some((path.as_path(), reason.as_str())),
            _ => None,
        })
    }

    pub fn removed_lines(&self) -> usize {
        self.files
            .iter()
            .map(|(_, action)| match action {
                FileAction::Stripped { removed_lines } => *removed_lines,
                _ => 0,
            })
            .sum()
    }
}

/// A cleaned archive living in its own temporary workspace.
///
/// The artifact owns the workspace: dropping it (or calling
/// [`close`](Self::close)) deletes the archive together with every extracted
/// file, whichever way the caller exits.
#[derive(Debug)]
pub struct CleanedArtifact {
    path: PathBuf,
    package_id: String,
    report: CleanReport,
    workspace: TempDir,
}

impl CleanedArtifact {
    /// The repacked archive.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn package_id(&self) -> &str {
        &self.package_id
    }

    pub fn report(&self) -> &CleanReport {
        &self.report
    }

    pub fn workspace(&self) -> &Path {
        self.workspace.path()
    }

    /// Delete the workspace now, reporting failure instead of ignoring it
    /// like `Drop` does.
    pub fn close(self) -> Result<()> {
        let workspace = self.workspace.path().to_path_buf();
        self.workspace.close().map_err(|e| ErrorKind::Io(workspace, e))?;
        Ok(())
    }
}

/// The package identifier of an archive: its file name without extension.
pub fn package_id(archive: impl AsRef<Path>) -> String {
    archive.as_ref().file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default()
}

/// Remove every line whose first non-whitespace bytes are `marker`.
///
/// Works on raw bytes: kept lines, their order and their line endings are
/// reproduced exactly, whatever the encoding. Leading whitespace is Unicode
/// whitespace on lines that are valid UTF-8 and ASCII whitespace on any other
/// line. Returns the remaining bytes and the number of lines removed. An
/// empty marker removes nothing.
///
/// ```
/// let script = b"-- comment\nprint(1)\n  -- indented comment\nprint(2)\n";
/// let (cleaned, removed) = tsm_package::strip_comments(script, "--");
/// assert_eq!(cleaned, b"print(1)\nprint(2)\n");
/// assert_eq!(removed, 2);
/// ```
pub fn strip_comments(source: &[u8], marker: &str) -> (Vec<u8>, usize) {
    let marker = marker.as_bytes();
    if marker.is_empty() {
        return (source.to_vec(), 0);
    }
    let mut kept = Vec::with_capacity(source.len());
    let mut removed = 0;
    for line in source.split_inclusive(|&b| b == b'\n') {
        if trim_start(line).starts_with(marker) {
            removed += 1;
        } else {
            kept.extend_from_slice(line);
        }
    }
    (kept, removed)
}

fn trim_start(line: &[u8]) -> &[u8] {
    match std::str::from_utf8(line) {
        Ok(text) => text.trim_start().as_bytes(),
        Err(_) => line.trim_ascii_start(),
    }
}

/// Signature of the per-script cleaning step: rewrite the file at the given
/// path, returning how many lines were removed.
pub(crate) type StripFn = fn(&Path, &str) -> io::Result<usize>;

/// Clean the manifest package at `archive`.
///
/// 1. The archive is extracted into a fresh, uniquely named workspace.
/// 2. Documentation files are deleted; script files lose their full-line
///    comments. A file that can't be cleaned is kept as extracted and noted
///    in the [`CleanReport`]; it never fails the whole run.
/// 3. Everything left is repacked (deflate, fixed level) into
///    `<workspace>/<package_id>.zip`, sorted by path and with fixed
///    timestamps and permissions so that equal input gives equal output.
///
/// The caller must already have validated the archive; cleaning does not
/// re-check for script and manifest entries.
///
/// # Errors
///
/// Extraction or repacking failures, including entries whose names would
/// land outside the workspace. The workspace is removed before returning.
#[instrument(level = "debug", skip_all, fields(archive = %archive.as_ref().display()))]
pub fn clean(archive: impl AsRef<Path>, rules: &PackageRules) -> Result<CleanedArtifact> {
    clean_with(archive.as_ref(), rules, strip_file)
}

pub(crate) fn clean_with(archive: &Path, rules: &PackageRules, strip: StripFn) -> Result<CleanedArtifact> {
    let package_id = package_id(archive);
    let workspace = tempfile::Builder::new()
        .prefix(&format!("tsm_{package_id}_"))
        .tempdir()
        .map_err(|e| ErrorKind::Io(std::env::temp_dir(), e))?;
    let contents = workspace.path().join(CONTENTS_DIR);
    fs::create_dir(&contents).map_err(|e| ErrorKind::Io(contents.clone(), e))?;

    let entries = extract(archive, &contents)?;
    let report = clean_tree(&contents, rules, strip);
    // The output sits next to, not inside, the extracted tree so it can never
    // end up packed into itself.
    let path = workspace.path().join(format!("{package_id}.{ARCHIVE_EXTENSION}"));
    let packed = repack(&contents, &path)?;
    tracing::debug!(
        package = %package_id,
        extracted = entries,
        packed,
        removed_lines = report.removed_lines(),
        "Package cleaned"
    );
    Ok(CleanedArtifact { path, package_id, report, workspace })
}

/// Extract every entry of `archive` below `into`, returning the number of
/// files written.
fn extract(archive: &Path, into: &Path) -> Result<usize> {
    let file = File::open(archive).map_err(|e| ErrorKind::Io(archive.to_path_buf(), e))?;
    let mut zip = ZipArchive::new(BufReader::new(file)).map_err(ErrorKind::Archive)?;
    let mut written = 0;
    for index in 0..zip.len() {
        let mut entry = zip.by_index(index).map_err(ErrorKind::Archive)?;
        let name = entry.name().to_owned();
        let relative = validate_path(&name).or_raise(|| ErrorKind::UnsafeEntry(name.clone()))?;
        let target = into.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(|e| ErrorKind::Io(target.clone(), e))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| ErrorKind::Io(parent.to_path_buf(), e))?;
        }
        let mut output = File::create(&target).map_err(|e| ErrorKind::Io(target.clone(), e))?;
        io::copy(&mut entry, &mut output).map_err(|e| ErrorKind::Io(target.clone(), e))?;
        written += 1;
    }
    Ok(written)
}

/// Apply the per-file rules to every extracted file. Never fails: problems
/// are recorded against the file they happened to.
fn clean_tree(root: &Path, rules: &PackageRules, strip: StripFn) -> CleanReport {
    let mut report = CleanReport::default();
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().map(|p| relative_to(root, p)).unwrap_or_default();
                tracing::warn!(path = %path.display(), error = %e, "Could not inspect extracted file");
                report.push(path, FileAction::Failed(e.to_string()));
                continue;
            },
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = relative_to(root, entry.path());
        let file_name = entry.file_name().to_string_lossy();
        let action = if rules.is_documentation(&file_name) {
            match fs::remove_file(entry.path()) {
                Ok(()) => FileAction::Removed,
                Err(e) => FileAction::Failed(e.to_string()),
            }
        } else if rules.is_script(&file_name) {
            match strip(entry.path(), &rules.comment_marker) {
                Ok(0) => FileAction::Unchanged,
                Ok(removed_lines) => FileAction::Stripped { removed_lines },
                Err(e) => FileAction::Failed(e.to_string()),
            }
        } else {
            FileAction::Unchanged
        };
        if let FileAction::Failed(reason) = &action {
            tracing::warn!(path = %relative.display(), %reason, "File left uncleaned");
        }
        report.push(relative, action);
    }
    report
}

fn strip_file(path: &Path, marker: &str) -> io::Result<usize> {
    let source = fs::read(path)?;
    let (cleaned, removed) = strip_comments(&source, marker);
    if removed > 0 {
        fs::write(path, cleaned)?;
    }
    Ok(removed)
}

/// Zip up every file below `root` into `output`, returning the entry count.
fn repack(root: &Path, output: &Path) -> Result<usize> {
    let file = File::create(output).map_err(|e| ErrorKind::Io(output.to_path_buf(), e))?;
    let mut writer = ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(DEFLATE_LEVEL))
        .last_modified_time(DateTime::default())
        .unix_permissions(ENTRY_PERMISSIONS);
    let mut packed = 0;
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| ErrorKind::Io(root.to_path_buf(), e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry_name(&relative_to(root, entry.path()));
        writer.start_file(name, options).map_err(ErrorKind::Archive)?;
        let mut input = File::open(entry.path()).map_err(|e| ErrorKind::Io(entry.path().to_path_buf(), e))?;
        io::copy(&mut input, &mut writer).map_err(|e| ErrorKind::Io(output.to_path_buf(), e))?;
        packed += 1;
    }
    let mut file = writer.finish().map_err(ErrorKind::Archive)?;
    file.flush().map_err(|e| ErrorKind::Io(output.to_path_buf(), e))?;
    Ok(packed)
}

fn relative_to(root: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(root).unwrap_or(path).to_path_buf()
}

/// Archive entry names always use `/`, whatever the platform separator.
fn entry_name(relative: &Path) -> String {
    relative.components().map(|c| c.as_os_str().to_string_lossy()).collect::<Vec<_>>().join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{SCRIPT_FAILURE, clean_failing_scripts, read_zip, write_zip};
    use rstest::rstest;

    #[rstest]
    #[case(b"-- comment\nprint(1)\n  -- indented comment\nprint(2)\n", b"print(1)\nprint(2)\n", 2)]
    #[case(b"print(1)\n", b"print(1)\n", 0)]
    #[case(b"x = 1 -- trailing comment\n", b"x = 1 -- trailing comment\n", 0)]
    #[case(b"\t--[[ block opener ]]\r\nlocal a\r\n", b"local a\r\n", 1)]
    #[case(b"print(1)\n-- no newline at end", b"print(1)\n", 1)]
    #[case(b"", b"", 0)]
    #[case(b"-\nprint('-')\n", b"-\nprint('-')\n", 0)]
    #[case(b"\xff\xfe-- bad bytes\n-- x\nok \xc3\x28\n", b"\xff\xfe-- bad bytes\nok \xc3\x28\n", 1)]
    #[case(b"\x0b-- vertical tab\nx\n", b"x\n", 1)]
    #[case("\u{a0}\u{3000}-- wide spaces\nx\n".as_bytes(), b"x\n", 1)]
    #[case(b"\xff \t-- invalid utf-8\nx\n", b"\xff \t-- invalid utf-8\nx\n", 0)]
    #[case(b"\x0c\t-- form feed, invalid \xff\nx\n", b"x\n", 1)]
    fn strips_full_line_comments(#[case] input: &[u8], #[case] expected: &[u8], #[case] removed: usize) {
        let (cleaned, count) = strip_comments(input, "--");
        assert_eq!(cleaned, expected);
        assert_eq!(count, removed);
    }

    #[test]
    fn empty_marker_strips_nothing() {
        assert_eq!(strip_comments(b"-- a\n", ""), (b"-- a\n".to_vec(), 0));
    }

    #[rstest]
    #[case("/downloads/game123.zip", "game123")]
    #[case("archive.tar.zip", "archive.tar")]
    #[case("noext", "noext")]
    fn derives_package_id(#[case] path: &str, #[case] expected: &str) {
        assert_eq!(package_id(path), expected);
    }

    #[test]
    fn cleans_scripts_and_drops_documentation() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("game123.zip");
        write_zip(
            &input,
            &[
                ("main.lua", b"-- header\nprint(1)\n"),
                ("meta.manifest", b"-- not a script\n"),
                ("README.md", b"docs"),
                ("docs/ReadMe.TXT", b"more docs"),
                ("lib/util.LUA", b"  -- helper\nreturn {}\n"),
                ("empty/", b""),
            ],
        );

        let artifact = clean(&input, &PackageRules::default()).unwrap();
        assert_eq!(artifact.package_id(), "game123");
        assert_eq!(artifact.path().file_name().unwrap(), "game123.zip");
        assert!(artifact.path().starts_with(artifact.workspace()));

        let files = read_zip(artifact.path());
        let names: Vec<_> = files.keys().map(String::as_str).collect();
        assert_eq!(names, ["lib/util.LUA", "main.lua", "meta.manifest"]);
        assert_eq!(files["main.lua"], b"print(1)\n");
        assert_eq!(files["lib/util.LUA"], b"return {}\n");
        assert_eq!(files["meta.manifest"], b"-- not a script\n");

        let report = artifact.report();
        assert_eq!(report.action("main.lua"), Some(&FileAction::Stripped { removed_lines: 1 }));
        assert_eq!(report.action("README.md"), Some(&FileAction::Removed));
        assert_eq!(report.action(Path::new("docs").join("ReadMe.TXT")), Some(&FileAction::Removed));
        assert_eq!(report.action("meta.manifest"), Some(&FileAction::Unchanged));
        assert_eq!(report.removed_lines(), 2);
        assert_eq!(report.failures().count(), 0);
    }

    #[test]
    fn per_file_failures_keep_the_file_as_extracted() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("game123.zip");
        let script: &[u8] = b"-- comment\nprint(1)\n";
        write_zip(&input, &[("main.lua", script), ("meta.manifest", b"m"), ("README.md", b"docs")]);

        let artifact = clean_failing_scripts(&input, &PackageRules::default()).unwrap();
        let files = read_zip(artifact.path());
        assert_eq!(files.keys().collect::<Vec<_>>(), ["main.lua", "meta.manifest"]);
        assert_eq!(files["main.lua"], script);

        let report = artifact.report();
        assert_eq!(report.action("main.lua"), Some(&FileAction::Failed(SCRIPT_FAILURE.to_string())));
        assert_eq!(report.action("README.md"), Some(&FileAction::Removed));
        assert_eq!(report.failures().collect::<Vec<_>>(), [(Path::new("main.lua"), SCRIPT_FAILURE)]);
    }

    #[test]
    fn repack_is_reproducible() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("pkg.zip");
        write_zip(&input, &[("b.lua", b"-- x\nb()\n"), ("a.manifest", b"m"), ("z/y.txt", b"y")]);

        let first = clean(&input, &PackageRules::default()).unwrap();
        let second = clean(&input, &PackageRules::default()).unwrap();
        assert_ne!(first.workspace(), second.workspace());
        assert_eq!(fs::read(first.path()).unwrap(), fs::read(second.path()).unwrap());
    }

    #[test]
    fn package_without_scripts_still_repacks() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("only.zip");
        write_zip(&input, &[("readme.lua", b"-- x\n"), ("a.manifest", b"m")]);

        let artifact = clean(&input, &PackageRules::default()).unwrap();
        let files = read_zip(artifact.path());
        assert_eq!(files.keys().collect::<Vec<_>>(), ["a.manifest"]);
    }

    #[test]
    fn workspace_is_removed_on_drop_and_close() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("pkg.zip");
        write_zip(&input, &[("a.lua", b"a()\n"), ("a.manifest", b"m")]);

        let dropped = clean(&input, &PackageRules::default()).unwrap();
        let workspace = dropped.workspace().to_path_buf();
        assert!(workspace.is_dir());
        drop(dropped);
        assert!(!workspace.exists());

        let closed = clean(&input, &PackageRules::default()).unwrap();
        let workspace = closed.workspace().to_path_buf();
        closed.close().unwrap();
        assert!(!workspace.exists());
    }

    #[test]
    fn traversal_entries_fail_the_clean() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("evil.zip");
        write_zip(&input, &[("../escape.lua", b"x"), ("a.manifest", b"m")]);

        let err = clean(&input, &PackageRules::default()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnsafeEntry(name) if name == "../escape.lua"));
        assert!(!dir.path().parent().unwrap().join("escape.lua").exists());
    }

    #[test]
    fn corrupt_archive_fails_the_clean() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("corrupt.zip");
        fs::write(&input, b"not a zip").unwrap();
        let err = clean(&input, &PackageRules::default()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Archive(_)));
    }

    #[test]
    fn custom_rules_are_honoured() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("py.zip");
        write_zip(&input, &[("main.py", b"# comment\nprint(1)\n"), ("CHANGES.md", b"c"), ("x.toml", b"t")]);
        let rules = PackageRules {
            script_suffix: ".py".to_string(),
            manifest_suffix: ".toml".to_string(),
            comment_marker: "#".to_string(),
            documentation_prefix: "changes".to_string(),
        };

        let artifact = clean(&input, &rules).unwrap();
        let files = read_zip(artifact.path());
        assert_eq!(files.keys().collect::<Vec<_>>(), ["main.py", "x.toml"]);
        assert_eq!(files["main.py"], b"print(1)\n");
    }
}
