use agent_provider::ToolDefinition;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};

/// Every tool the server knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinTool {
    ListFiles,
    Read,
    Grep,
    Touch,
    Insert,
    Delete,
    Rm,
    GitStatus,
    GitDiff,
    GitLog,
    GitAdd,
    GitCommit,
    GitPush,
    GitPull,
    GitBranch,
    GitCheckout,
    SpawnSubagent,
}

impl BuiltinTool {
    pub const ALL: [Self; 17] = [
        Self::ListFiles,
        Self::Read,
        Self::Grep,
        Self::Touch,
        Self::Insert,
        Self::Delete,
        Self::Rm,
        Self::GitStatus,
        Self::GitDiff,
        Self::GitLog,
        Self::GitAdd,
        Self::GitCommit,
        Self::GitPush,
        Self::GitPull,
        Self::GitBranch,
        Self::GitCheckout,
        Self::SpawnSubagent,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::ListFiles => "list_files",
            Self::Read => "read",
            Self::Grep => "grep",
            Self::Touch => "touch",
            Self::Insert => "insert",
            Self::Delete => "delete",
            Self::Rm => "rm",
            Self::GitStatus => "git_status",
            Self::GitDiff => "git_diff",
            Self::GitLog => "git_log",
            Self::GitAdd => "git_add",
            Self::GitCommit => "git_commit",
            Self::GitPush => "git_push",
            Self::GitPull => "git_pull",
            Self::GitBranch => "git_branch",
            Self::GitCheckout => "git_checkout",
            Self::SpawnSubagent => "spawn_subagent",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.name() == name)
    }

    fn description(self) -> &'static str {
        match self {
            Self::ListFiles => {
                "List a directory. Directories end with '/'. Recursive listings stop after 100 entries."
            }
            Self::Read => "Read UTF-8 text lines from a file, optionally starting at a 1-based line.",
            Self::Grep => {
                "Search a file or directory tree for a regular expression. Matches are reported as file:line:text. \
                 Flags: -i ignores case, -w matches whole words, -F treats the pattern as a literal, -v inverts."
            }
            Self::Touch => "Create an empty file, or leave an existing file unchanged.",
            Self::Insert => {
                "Insert text before a 1-based line. Line 0 or a line past the end appends. Keep each insert under 100 KB."
            }
            Self::Delete => "Delete an inclusive, 1-based range of lines from a file.",
            Self::Rm => "Remove a file, or a directory when recursive is true.",
            Self::GitStatus => "Show `git status` for a repository path.",
            Self::GitDiff => "Show unstaged `git diff` output for a repository path.",
            Self::GitLog => "Show recent commits for a repository path.",
            Self::GitAdd => "Stage files in a repository. Use [\".\"] to stage every change.",
            Self::GitCommit => "Commit the staged changes with a message.",
            Self::GitPush => "Push commits to a remote, optionally naming the remote and branch.",
            Self::GitPull => "Pull from the configured upstream of the current branch.",
            Self::GitBranch => "List all branches, or create a branch when a name is given.",
            Self::GitCheckout => "Switch to an existing branch.",
            Self::SpawnSubagent => {
                "Run a sub-agent on a focused prompt with a subset of the available tools and return its final answer."
            }
        }
    }

    fn input_schema(self) -> Value {
        let path = json!({ "type": "string", "description": "Absolute or relative path" });
        match self {
            Self::ListFiles => json!({
                "type": "object",
                "properties": { "path": path, "recursive": { "type": "boolean" } },
                "required": ["path"],
                "additionalProperties": false
            }),
            Self::Read => json!({
                "type": "object",
                "properties": {
                    "path": path,
                    "start_line": { "type": "integer", "minimum": 1 },
                    "max_lines": { "type": "integer", "minimum": 1 }
                },
                "required": ["path"],
                "additionalProperties": false
            }),
            Self::Grep => json!({
                "type": "object",
                "properties": {
                    "pattern": { "type": "string" },
                    "path": path,
                    "flags": {
                        "type": "array",
                        "items": { "type": "string", "enum": ["-i", "-w", "-F", "-v", "-n"] }
                    }
                },
                "required": ["pattern", "path"],
                "additionalProperties": false
            }),
            Self::Touch | Self::GitStatus | Self::GitDiff | Self::GitPull => json!({
                "type": "object",
                "properties": { "path": path },
                "required": ["path"],
                "additionalProperties": false
            }),
            Self::Insert => json!({
                "type": "object",
                "properties": {
                    "path": path,
                    "line": { "type": "integer", "minimum": 0 },
                    "text": { "type": "string" }
                },
                "required": ["path", "line", "text"],
                "additionalProperties": false
            }),
            Self::Delete => json!({
                "type": "object",
                "properties": {
                    "path": path,
                    "start_line": { "type": "integer", "minimum": 1 },
                    "end_line": { "type": "integer", "minimum": 1 }
                },
                "required": ["path", "start_line", "end_line"],
                "additionalProperties": false
            }),
            Self::Rm => json!({
                "type": "object",
                "properties": { "path": path, "recursive": { "type": "boolean" } },
                "required": ["path"],
                "additionalProperties": false
            }),
            Self::GitLog => json!({
                "type": "object",
                "properties": { "path": path, "limit": { "type": "integer", "minimum": 1 } },
                "required": ["path"],
                "additionalProperties": false
            }),
            Self::GitAdd => json!({
                "type": "object",
                "properties": {
                    "path": path,
                    "files": { "type": "array", "items": { "type": "string" }, "minItems": 1 }
                },
                "required": ["path", "files"],
                "additionalProperties": false
            }),
            Self::GitCommit => json!({
                "type": "object",
                "properties": { "path": path, "message": { "type": "string" } },
                "required": ["path", "message"],
                "additionalProperties": false
            }),
            Self::GitPush => json!({
                "type": "object",
                "properties": {
                    "path": path,
                    "remote": { "type": "string" },
                    "branch": { "type": "string" }
                },
                "required": ["path"],
                "additionalProperties": false
            }),
            Self::GitBranch => json!({
                "type": "object",
                "properties": { "path": path, "name": { "type": "string" } },
                "required": ["path"],
                "additionalProperties": false
            }),
            Self::GitCheckout => json!({
                "type": "object",
                "properties": { "path": path, "branch": { "type": "string" } },
                "required": ["path", "branch"],
                "additionalProperties": false
            }),
            Self::SpawnSubagent => json!({
                "type": "object",
                "properties": {
                    "prompt": { "type": "string" },
                    "tool_names": { "type": "array", "items": { "type": "string" } },
                    "context": { "type": "string" }
                },
                "required": ["prompt", "tool_names"],
                "additionalProperties": false
            }),
        }
    }

    pub fn definition(self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: Some(self.description().to_string()),
            input_schema: self.input_schema(),
        }
    }
}

/// A parsed call to one of the file or git tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCall {
    ListFiles {
        path: String,
        recursive: bool,
    },
    Read {
        path: String,
        start_line: Option<usize>,
        max_lines: Option<usize>,
    },
    Grep {
        pattern: String,
        path: String,
        flags: GrepFlags,
    },
    Touch {
        path: String,
    },
    Insert {
        path: String,
        line: usize,
        text: String,
    },
    Delete {
        path: String,
        start_line: usize,
        end_line: usize,
    },
    Rm {
        path: String,
        recursive: bool,
    },
    GitStatus {
        path: String,
    },
    GitDiff {
        path: String,
    },
    GitLog {
        path: String,
        limit: Option<usize>,
    },
    GitAdd {
        path: String,
        files: Vec<String>,
    },
    GitCommit {
        path: String,
        message: String,
    },
    GitPush {
        path: String,
        remote: Option<String>,
        branch: Option<String>,
    },
    GitPull {
        path: String,
    },
    GitBranch {
        path: String,
        name: Option<String>,
    },
    GitCheckout {
        path: String,
        branch: String,
    },
}

/// Matching options for `grep`, spelled the way grep spells them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GrepFlags {
    pub ignore_case: bool,
    pub whole_word: bool,
    pub fixed_string: bool,
    pub invert: bool,
}

impl GrepFlags {
    /// `-n` is accepted and ignored since line numbers are always reported.
    pub fn parse<S: AsRef<str>>(flags: &[S]) -> Result<Self, String> {
        let mut parsed = Self::default();
        for flag in flags {
            match flag.as_ref() {
                "-i" => parsed.ignore_case = true,
                "-w" => parsed.whole_word = true,
                "-F" => parsed.fixed_string = true,
                "-v" => parsed.invert = true,
                "-n" => {}
                other => return Err(format!("unsupported grep flag: {other}")),
            }
        }
        Ok(parsed)
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct PathArgs {
    path: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RecursivePathArgs {
    path: String,
    #[serde(default)]
    recursive: bool,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ReadArgs {
    path: String,
    start_line: Option<usize>,
    max_lines: Option<usize>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct GrepArgs {
    pattern: String,
    path: String,
    #[serde(default)]
    flags: Vec<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct InsertArgs {
    path: String,
    line: usize,
    text: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct DeleteArgs {
    path: String,
    start_line: usize,
    end_line: usize,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct GitLogArgs {
    path: String,
    limit: Option<usize>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct GitAddArgs {
    path: String,
    files: Vec<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct GitCommitArgs {
    path: String,
    message: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct GitPushArgs {
    path: String,
    remote: Option<String>,
    branch: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct GitBranchArgs {
    path: String,
    name: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct GitCheckoutArgs {
    path: String,
    branch: String,
}

/// Arguments of `spawn_subagent`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpawnSubagentArgs {
    pub prompt: String,
    pub tool_names: Vec<String>,
    #[serde(default)]
    pub context: Option<String>,
}

impl SpawnSubagentArgs {
    pub fn parse(arguments: &Map<String, Value>) -> Result<Self, String> {
        parse_args(BuiltinTool::SpawnSubagent, arguments)
    }
}

impl ToolCall {
    /// Parses raw arguments for `tool`. `spawn_subagent` is not a file or
    /// git tool and is rejected here.
    pub fn parse(tool: BuiltinTool, arguments: &Map<String, Value>) -> Result<Self, String> {
        Ok(match tool {
            BuiltinTool::ListFiles => {
                let args: RecursivePathArgs = parse_args(tool, arguments)?;
                Self::ListFiles {
                    path: args.path,
                    recursive: args.recursive,
                }
            }
            BuiltinTool::Read => {
                let args: ReadArgs = parse_args(tool, arguments)?;
                Self::Read {
                    path: args.path,
                    start_line: args.start_line,
                    max_lines: args.max_lines,
                }
            }
            BuiltinTool::Grep => {
                let args: GrepArgs = parse_args(tool, arguments)?;
                Self::Grep {
                    pattern: args.pattern,
                    path: args.path,
                    flags: GrepFlags::parse(&args.flags)?,
                }
            }
            BuiltinTool::Touch => Self::Touch {
                path: parse_args::<PathArgs>(tool, arguments)?.path,
            },
            BuiltinTool::Insert => {
                let args: InsertArgs = parse_args(tool, arguments)?;
                Self::Insert {
                    path: args.path,
                    line: args.line,
                    text: args.text,
                }
            }
            BuiltinTool::Delete => {
                let args: DeleteArgs = parse_args(tool, arguments)?;
                Self::Delete {
                    path: args.path,
                    start_line: args.start_line,
                    end_line: args.end_line,
                }
            }
            BuiltinTool::Rm => {
                let args: RecursivePathArgs = parse_args(tool, arguments)?;
                Self::Rm {
                    path: args.path,
                    recursive: args.recursive,
                }
            }
            BuiltinTool::GitStatus => Self::GitStatus {
                path: parse_args::<PathArgs>(tool, arguments)?.path,
            },
            BuiltinTool::GitDiff => Self::GitDiff {
                path: parse_args::<PathArgs>(tool, arguments)?.path,
            },
            BuiltinTool::GitLog => {
                let args: GitLogArgs = parse_args(tool, arguments)?;
                Self::GitLog {
                    path: args.path,
                    limit: args.limit,
                }
            }
            BuiltinTool::GitAdd => {
                let args: GitAddArgs = parse_args(tool, arguments)?;
                if args.files.is_empty() {
                    return Err("git_add needs at least one file".to_string());
                }
                Self::GitAdd {
                    path: args.path,
                    files: args.files,
                }
            }
            BuiltinTool::GitCommit => {
                let args: GitCommitArgs = parse_args(tool, arguments)?;
                if args.message.trim().is_empty() {
                    return Err("git_commit needs a non-empty message".to_string());
                }
                Self::GitCommit {
                    path: args.path,
                    message: args.message,
                }
            }
            BuiltinTool::GitPush => {
                let args: GitPushArgs = parse_args(tool, arguments)?;
                let remote = non_empty(args.remote);
                let branch = non_empty(args.branch);
                for name in remote.iter().chain(&branch) {
                    check_ref_name(name)?;
                }
                Self::GitPush {
                    path: args.path,
                    remote,
                    branch,
                }
            }
            BuiltinTool::GitPull => Self::GitPull {
                path: parse_args::<PathArgs>(tool, arguments)?.path,
            },
            BuiltinTool::GitBranch => {
                let args: GitBranchArgs = parse_args(tool, arguments)?;
                let name = non_empty(args.name);
                if let Some(name) = &name {
                    check_ref_name(name)?;
                }
                Self::GitBranch {
                    path: args.path,
                    name,
                }
            }
            BuiltinTool::GitCheckout => {
                let args: GitCheckoutArgs = parse_args(tool, arguments)?;
                if args.branch.is_empty() {
                    return Err("git_checkout needs a branch name".to_string());
                }
                check_ref_name(&args.branch)?;
                Self::GitCheckout {
                    path: args.path,
                    branch: args.branch,
                }
            }
            BuiltinTool::SpawnSubagent => {
                return Err("spawn_subagent is handled by the dispatcher".to_string());
            }
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.is_empty())
}

/// Remote and branch names are passed as positional git arguments and must
/// not read as options.
fn check_ref_name(name: &str) -> Result<(), String> {
    if name.starts_with('-') {
        return Err(format!("invalid ref name: {name}"));
    }
    Ok(())
}

fn parse_args<T: DeserializeOwned>(
    tool: BuiltinTool,
    arguments: &Map<String, Value>,
) -> Result<T, String> {
    serde_json::from_value(Value::Object(arguments.clone()))
        .map_err(|error| format!("invalid arguments for {}: {error}", tool.name()))
}

/// The enabled subset of [`BuiltinTool`] for one agent instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolRegistry {
    tools: Vec<BuiltinTool>,
}

impl ToolRegistry {
    /// All tools, including `spawn_subagent`.
    pub fn full() -> Self {
        Self {
            tools: BuiltinTool::ALL.to_vec(),
        }
    }

    pub fn without_spawn(&self) -> Self {
        Self {
            tools: self
                .tools
                .iter()
                .copied()
                .filter(|tool| *tool != BuiltinTool::SpawnSubagent)
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<BuiltinTool> {
        self.tools.iter().copied().find(|tool| tool.name() == name)
    }

    pub fn contains(&self, tool: BuiltinTool) -> bool {
        self.tools.contains(&tool)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|tool| tool.name()).collect()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|tool| tool.definition()).collect()
    }

    /// Subset for a sub-agent. The ceiling is this registry minus
    /// `spawn_subagent`; any name outside it is returned as the error.
    pub fn restrict<S: AsRef<str>>(&self, names: &[S]) -> Result<Self, Vec<String>> {
        let ceiling = self.without_spawn();
        let mut tools = Vec::new();
        let mut invalid = Vec::new();

        for name in names {
            let name = name.as_ref();
            match ceiling.get(name) {
                Some(tool) if !tools.contains(&tool) => tools.push(tool),
                Some(_) => {}
                None => invalid.push(name.to_string()),
            }
        }

        if invalid.is_empty() {
            Ok(Self { tools })
        } else {
            Err(invalid)
        }
    }
}
