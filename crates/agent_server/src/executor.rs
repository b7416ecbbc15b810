use std::fs;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use chunk_codec::{ChunkPolicy, InsertionPlan};
use regex::{Regex, RegexBuilder};
use tempfile::NamedTempFile;
use wait_timeout::ChildExt;

use crate::allowlist::AllowList;
use crate::tools::{GrepFlags, ToolCall};

const DEFAULT_GIT_TIMEOUT_SEC: u64 = 10;
const DEFAULT_GIT_NETWORK_TIMEOUT_SEC: u64 = 30;
const DEFAULT_MAX_OUTPUT_BYTES: usize = 100 * 1024;
const DEFAULT_READ_MAX_LINES: usize = 1000;
const DEFAULT_GIT_LOG_LIMIT: usize = 10;
const RECURSIVE_LIST_CAP: usize = 100;
const GREP_MATCH_CAP: usize = 200;

/// Result of one tool run. A failed output is reported back to the model, it
/// does not end the turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub ok: bool,
    pub content: String,
}

impl ToolOutput {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            ok: true,
            content: content.into(),
        }
    }

    pub fn fail(content: impl Into<String>) -> Self {
        Self {
            ok: false,
            content: content.into(),
        }
    }
}

/// Runs file and git tools against paths the [`AllowList`] grants.
///
/// Everything here blocks; async callers go through `spawn_blocking`.
#[derive(Debug, Clone)]
pub struct BuiltinToolExecutor {
    allowlist: AllowList,
    policy: ChunkPolicy,
    git_timeout: Duration,
    git_network_timeout: Duration,
    max_output_bytes: usize,
}

impl BuiltinToolExecutor {
    pub fn new(allowlist: AllowList, policy: ChunkPolicy) -> Self {
        Self {
            allowlist,
            policy,
            git_timeout: Duration::from_secs(DEFAULT_GIT_TIMEOUT_SEC),
            git_network_timeout: Duration::from_secs(DEFAULT_GIT_NETWORK_TIMEOUT_SEC),
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }

    #[must_use]
    pub fn with_git_timeout(mut self, git_timeout: Duration) -> Self {
        self.git_timeout = git_timeout;
        self
    }

    /// Timeout for `git push` and `git pull`, which talk to a remote.
    #[must_use]
    pub fn with_git_network_timeout(mut self, git_network_timeout: Duration) -> Self {
        self.git_network_timeout = git_network_timeout;
        self
    }

    pub fn allowlist(&self) -> &AllowList {
        &self.allowlist
    }

    pub fn policy(&self) -> &ChunkPolicy {
        &self.policy
    }

    pub fn execute(&self, call: ToolCall) -> ToolOutput {
        let output = match call {
            ToolCall::ListFiles { path, recursive } => self.execute_list_files(&path, recursive),
            ToolCall::Read {
                path,
                start_line,
                max_lines,
            } => self.execute_read(&path, start_line, max_lines),
            ToolCall::Grep {
                pattern,
                path,
                flags,
            } => self.execute_grep(&pattern, &path, flags),
            ToolCall::Touch { path } => self.execute_touch(&path),
            ToolCall::Insert { path, line, text } => self.execute_insert(&path, line, &text),
            ToolCall::Delete {
                path,
                start_line,
                end_line,
            } => self.execute_delete(&path, start_line, end_line),
            ToolCall::Rm { path, recursive } => self.execute_rm(&path, recursive),
            ToolCall::GitStatus { path } => self.execute_git(&path, &["status"]),
            ToolCall::GitDiff { path } => self.execute_git(&path, &["diff"]),
            ToolCall::GitLog { path, limit } => {
                let limit = limit.unwrap_or(DEFAULT_GIT_LOG_LIMIT).max(1).to_string();
                self.execute_git(&path, &["log", "--oneline", "-n", &limit])
            }
            ToolCall::GitAdd { path, files } => {
                let mut args = vec!["add", "--"];
                args.extend(files.iter().map(String::as_str));
                let output = self.execute_git(&path, &args);
                if output.ok {
                    ToolOutput::ok(format!("staged {} path(s) in {path}", files.len()))
                } else {
                    output
                }
            }
            ToolCall::GitCommit { path, message } => {
                self.execute_git(&path, &["commit", "-m", &message])
            }
            ToolCall::GitPush {
                path,
                remote,
                branch,
            } => {
                let mut args = vec!["push"];
                match (&remote, &branch) {
                    (Some(remote), Some(branch)) => args.extend([remote.as_str(), branch.as_str()]),
                    (Some(remote), None) => args.push(remote.as_str()),
                    (None, Some(branch)) => args.extend(["origin", branch.as_str()]),
                    (None, None) => {}
                }
                self.run_git(&path, &args, self.git_network_timeout)
            }
            ToolCall::GitPull { path } => self.run_git(&path, &["pull"], self.git_network_timeout),
            ToolCall::GitBranch { path, name } => match name {
                Some(name) => {
                    let output = self.execute_git(&path, &["branch", &name]);
                    if output.ok {
                        ToolOutput::ok(format!("created branch {name}"))
                    } else {
                        output
                    }
                }
                None => self.execute_git(&path, &["branch", "-a"]),
            },
            ToolCall::GitCheckout { path, branch } => {
                self.execute_git(&path, &["checkout", &branch])
            }
        };

        ToolOutput {
            ok: output.ok,
            content: truncate_to_byte_limit(output.content, self.max_output_bytes),
        }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, ToolOutput> {
        self.allowlist.resolve(path).ok_or_else(|| {
            ToolOutput::fail(format!(
                "access denied: {path} is outside the allowed directories"
            ))
        })
    }

    fn execute_list_files(&self, path: &str, recursive: bool) -> ToolOutput {
        let resolved = match self.resolve(path) {
            Ok(resolved) => resolved,
            Err(denied) => return denied,
        };
        if !resolved.is_dir() {
            return ToolOutput::fail(format!("not a directory: {path}"));
        }

        let mut entries = Vec::new();
        let listed = if recursive {
            walk_sorted(&resolved, &resolved, &mut entries, RECURSIVE_LIST_CAP)
        } else {
            list_sorted(&resolved).map(|children| {
                entries.extend(children.into_iter().map(|(name, is_dir)| entry_label(name, is_dir)));
                false
            })
        };

        match listed {
            Ok(_) if entries.is_empty() => ToolOutput::ok("(empty directory)"),
            Ok(truncated) => {
                let mut content = entries.join("\n");
                if truncated {
                    content.push_str(&format!(
                        "\n[listing stopped after {RECURSIVE_LIST_CAP} entries; list a subdirectory instead]"
                    ));
                }
                ToolOutput::ok(content)
            }
            Err(error) => ToolOutput::fail(format!("failed to list {path}: {error}")),
        }
    }

    fn execute_read(
        &self,
        path: &str,
        start_line: Option<usize>,
        max_lines: Option<usize>,
    ) -> ToolOutput {
        let resolved = match self.resolve(path) {
            Ok(resolved) => resolved,
            Err(denied) => return denied,
        };
        let content = match read_text(&resolved) {
            Ok(content) => content,
            Err(error) => return ToolOutput::fail(format!("failed to read {path}: {error}")),
        };

        let lines: Vec<&str> = content.lines().collect();
        let start = start_line.unwrap_or(1).max(1);
        let max_lines = max_lines.unwrap_or(DEFAULT_READ_MAX_LINES).max(1);
        if lines.is_empty() {
            return ToolOutput::ok("");
        }
        if start > lines.len() {
            return ToolOutput::fail(format!(
                "start_line {start} is past the end of {path} ({} lines)",
                lines.len()
            ));
        }

        let end = (start - 1 + max_lines).min(lines.len());
        let mut output = lines[start - 1..end].join("\n");
        if end < lines.len() {
            output.push_str(&format!(
                "\n[{} more lines; continue with start_line={}]",
                lines.len() - end,
                end + 1
            ));
        }
        ToolOutput::ok(output)
    }

    fn execute_grep(&self, pattern: &str, path: &str, flags: GrepFlags) -> ToolOutput {
        let regex = match grep_regex(pattern, flags) {
            Ok(regex) => regex,
            Err(error) => return ToolOutput::fail(format!("invalid pattern: {error}")),
        };
        let resolved = match self.resolve(path) {
            Ok(resolved) => resolved,
            Err(denied) => return denied,
        };

        let mut files = Vec::new();
        if resolved.is_dir() {
            if let Err(error) = collect_files(&resolved, &mut files) {
                return ToolOutput::fail(format!("failed to search {path}: {error}"));
            }
        } else if resolved.is_file() {
            files.push(resolved.clone());
        } else {
            return ToolOutput::fail(format!("path does not exist: {path}"));
        }

        let mut matches = Vec::new();
        let mut truncated = false;
        'files: for file in &files {
            // Binary and non-UTF-8 files are skipped.
            let Ok(content) = read_text(file) else {
                continue;
            };
            for (index, line) in content.lines().enumerate() {
                if regex.is_match(line) == flags.invert {
                    continue;
                }
                if matches.len() == GREP_MATCH_CAP {
                    truncated = true;
                    break 'files;
                }
                matches.push(format!("{}:{}:{line}", file.display(), index + 1));
            }
        }

        if matches.is_empty() {
            return ToolOutput::ok("no matches found");
        }
        let mut content = matches.join("\n");
        if truncated {
            content.push_str(&format!(
                "\n[stopped after {GREP_MATCH_CAP} matches; narrow the pattern or path]"
            ));
        }
        ToolOutput::ok(content)
    }

    fn execute_touch(&self, path: &str) -> ToolOutput {
        let resolved = match self.resolve(path) {
            Ok(resolved) => resolved,
            Err(denied) => return denied,
        };

        let created = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&resolved);
        match created {
            Ok(_) => ToolOutput::ok(format!("created or updated {path}")),
            Err(error) => ToolOutput::fail(format!("failed to touch {path}: {error}")),
        }
    }

    fn execute_insert(&self, path: &str, line: usize, text: &str) -> ToolOutput {
        let plan = match self.policy.plan(text) {
            Ok(plan) => plan,
            Err(error) => {
                return ToolOutput::fail(format!(
                    "insert rejected: {error}. {}",
                    self.policy.recovery_hint(&error)
                ));
            }
        };
        let resolved = match self.resolve(path) {
            Ok(resolved) => resolved,
            Err(denied) => return denied,
        };
        let existing = match read_text(&resolved) {
            Ok(existing) => existing,
            Err(error) => return ToolOutput::fail(format!("failed to read {path}: {error}")),
        };

        let lines: Vec<&str> = existing.split_inclusive('\n').collect();
        let at = if line == 0 || line > lines.len() {
            lines.len()
        } else {
            line - 1
        };

        let written = replace_file(&resolved, |writer| {
            write_insertion(writer, &lines, at, text, &plan)
        });
        match written {
            Ok(()) => {
                let position = if at == lines.len() {
                    "at end of file".to_string()
                } else {
                    format!("before line {line}")
                };
                ToolOutput::ok(match plan {
                    InsertionPlan::Single => format!("inserted text {position} in {path}"),
                    InsertionPlan::Chunked(ref chunks) => format!(
                        "inserted text {position} in {path} in {} chunks",
                        chunks.len()
                    ),
                })
            }
            Err(error) => ToolOutput::fail(format!("failed to write {path}: {error}")),
        }
    }

    fn execute_delete(&self, path: &str, start_line: usize, end_line: usize) -> ToolOutput {
        if start_line < 1 || end_line < start_line {
            return ToolOutput::fail(
                "invalid line numbers: start_line must be >= 1 and <= end_line",
            );
        }
        let resolved = match self.resolve(path) {
            Ok(resolved) => resolved,
            Err(denied) => return denied,
        };
        let existing = match read_text(&resolved) {
            Ok(existing) => existing,
            Err(error) => return ToolOutput::fail(format!("failed to read {path}: {error}")),
        };

        let lines: Vec<&str> = existing.split_inclusive('\n').collect();
        if start_line > lines.len() {
            return ToolOutput::fail(format!(
                "start_line {start_line} is past the end of {path} ({} lines)",
                lines.len()
            ));
        }
        let end = end_line.min(lines.len());

        let written = replace_file(&resolved, |writer| {
            for line in lines[..start_line - 1].iter().chain(&lines[end..]) {
                writer.write_all(line.as_bytes())?;
            }
            Ok(())
        });
        match written {
            Ok(()) => ToolOutput::ok(format!("deleted lines {start_line}-{end} from {path}")),
            Err(error) => ToolOutput::fail(format!("failed to write {path}: {error}")),
        }
    }

    fn execute_rm(&self, path: &str, recursive: bool) -> ToolOutput {
        let resolved = match self.resolve(path) {
            Ok(resolved) => resolved,
            Err(denied) => return denied,
        };
        let metadata = match fs::symlink_metadata(&resolved) {
            Ok(metadata) => metadata,
            Err(_) => return ToolOutput::fail(format!("path does not exist: {path}")),
        };

        let removed = if metadata.is_dir() {
            if !recursive {
                return ToolOutput::fail(format!(
                    "{path} is a directory; pass recursive=true to remove it"
                ));
            }
            fs::remove_dir_all(&resolved).map(|()| format!("removed directory {path}"))
        } else {
            fs::remove_file(&resolved).map(|()| format!("removed file {path}"))
        };

        match removed {
            Ok(message) => ToolOutput::ok(message),
            Err(error) => ToolOutput::fail(format!("failed to remove {path}: {error}")),
        }
    }

    fn execute_git(&self, path: &str, args: &[&str]) -> ToolOutput {
        self.run_git(path, args, self.git_timeout)
    }

    fn run_git(&self, path: &str, args: &[&str], timeout: Duration) -> ToolOutput {
        let resolved = match self.resolve(path) {
            Ok(resolved) => resolved,
            Err(denied) => return denied,
        };
        if !resolved.is_dir() {
            return ToolOutput::fail(format!("not a directory: {path}"));
        }

        let mut child = match Command::new("git")
            .args(args)
            .current_dir(&resolved)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(error) => return ToolOutput::fail(format!("failed to launch git: {error}")),
        };

        // Drain pipes while waiting so large diffs cannot fill the pipe buffer.
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stdout_reader = thread::spawn(move || read_pipe_bytes(stdout));
        let stderr_reader = thread::spawn(move || read_pipe_bytes(stderr));

        let status = match child.wait_timeout(timeout) {
            Ok(Some(status)) => Ok(status),
            Ok(None) => {
                kill_and_reap(&mut child);
                Err(format!("git {} timed out after {}s", args[0], timeout.as_secs()))
            }
            Err(error) => {
                kill_and_reap(&mut child);
                Err(format!("failed waiting for git: {error}"))
            }
        };

        let stdout = stdout_reader.join().unwrap_or_default();
        let stderr = stderr_reader.join().unwrap_or_default();
        let status = match status {
            Ok(status) => status,
            Err(message) => return ToolOutput::fail(message),
        };

        if status.success() {
            // checkout, push and pull report on stderr.
            let stdout = String::from_utf8_lossy(&stdout);
            let stderr = String::from_utf8_lossy(&stderr);
            if !stdout.trim().is_empty() {
                ToolOutput::ok(stdout.into_owned())
            } else if !stderr.trim().is_empty() {
                ToolOutput::ok(stderr.trim().to_string())
            } else {
                ToolOutput::ok("(no output)")
            }
        } else {
            ToolOutput::fail(format!(
                "git {} failed ({}): {}",
                args[0],
                format_exit_status(status),
                String::from_utf8_lossy(&stderr).trim()
            ))
        }
    }
}

/// Kills `child` and waits on it so no zombie is left behind.
fn kill_and_reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn grep_regex(pattern: &str, flags: GrepFlags) -> Result<Regex, regex::Error> {
    let mut pattern = if flags.fixed_string {
        regex::escape(pattern)
    } else {
        pattern.to_string()
    };
    if flags.whole_word {
        pattern = format!(r"\b(?:{pattern})\b");
    }
    RegexBuilder::new(&pattern)
        .case_insensitive(flags.ignore_case)
        .build()
}

/// Rewrites `path` through a sibling temp file that is renamed over it once
/// `fill` succeeds. On any error the original file is left as it was.
fn replace_file<F>(path: &Path, fill: F) -> io::Result<()>
where
    F: FnOnce(&mut BufWriter<&mut fs::File>) -> io::Result<()>,
{
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp = NamedTempFile::new_in(parent)?;
    {
        let mut writer = BufWriter::new(temp.as_file_mut());
        fill(&mut writer)?;
        writer.flush()?;
    }
    if let Ok(metadata) = fs::metadata(path) {
        temp.as_file().set_permissions(metadata.permissions())?;
    }
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(io::Error::from)?;
    Ok(())
}

/// Writes the file with `text` spliced in before `lines[at]`. Each chunk of a
/// chunked plan is flushed on its own.
fn write_insertion<W: Write>(
    writer: &mut W,
    lines: &[&str],
    at: usize,
    text: &str,
    plan: &InsertionPlan,
) -> io::Result<()> {
    for line in &lines[..at] {
        writer.write_all(line.as_bytes())?;
    }
    if at > 0 && !lines[at - 1].ends_with('\n') {
        writer.write_all(b"\n")?;
    }

    match plan {
        InsertionPlan::Single => writer.write_all(text.as_bytes())?,
        InsertionPlan::Chunked(chunks) => {
            writer.flush()?;
            for chunk in chunks {
                writer.write_all(chunk.text.as_bytes())?;
                writer.flush()?;
            }
        }
    }
    if !text.ends_with('\n') {
        writer.write_all(b"\n")?;
    }

    for line in &lines[at..] {
        writer.write_all(line.as_bytes())?;
    }
    Ok(())
}

fn read_text(path: &Path) -> io::Result<String> {
    let bytes = fs::read(path)?;
    String::from_utf8(bytes)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "file is not valid UTF-8 text"))
}

fn list_sorted(dir: &Path) -> io::Result<Vec<(String, bool)>> {
    let mut children = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let is_dir = entry.file_type()?.is_dir();
        children.push((entry.file_name().to_string_lossy().into_owned(), is_dir));
    }
    children.sort();
    Ok(children)
}

fn entry_label(name: String, is_dir: bool) -> String {
    if is_dir {
        format!("{name}/")
    } else {
        name
    }
}

/// Depth-first, name-ordered walk. Returns true when `cap` cut it short.
fn walk_sorted(root: &Path, dir: &Path, entries: &mut Vec<String>, cap: usize) -> io::Result<bool> {
    for (name, is_dir) in list_sorted(dir)? {
        if entries.len() == cap {
            return Ok(true);
        }
        let child = dir.join(&name);
        let relative = child
            .strip_prefix(root)
            .unwrap_or(&child)
            .to_string_lossy()
            .into_owned();
        entries.push(entry_label(relative, is_dir));

        if is_dir && walk_sorted(root, &child, entries, cap)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Regular files under `dir`, skipping hidden entries such as `.git`.
fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> io::Result<()> {
    for (name, is_dir) in list_sorted(dir)? {
        if name.starts_with('.') {
            continue;
        }
        let child = dir.join(name);
        if is_dir {
            collect_files(&child, files)?;
        } else if child.is_file() {
            files.push(child);
        }
    }
    Ok(())
}

fn read_pipe_bytes(pipe: Option<impl Read>) -> Vec<u8> {
    let Some(mut pipe) = pipe else {
        return Vec::new();
    };

    let mut bytes = Vec::new();
    let _ = pipe.read_to_end(&mut bytes);
    bytes
}

fn truncate_to_byte_limit(content: String, max_bytes: usize) -> String {
    if content.len() <= max_bytes {
        return content;
    }

    let mut cutoff = max_bytes;
    while cutoff > 0 && !content.is_char_boundary(cutoff) {
        cutoff -= 1;
    }

    let mut truncated = content[..cutoff].to_string();
    truncated.push_str("\n[truncated]");
    truncated
}

fn format_exit_status(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit_code={code}"),
        None => "exit_code=terminated_by_signal".to_string(),
    }
}
