use async_trait::async_trait;
use indoc::indoc;
use regex::Regex;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::errors::{AgentError, AgentResult};
use crate::models::content::Content;
use crate::models::tool::{Tool, ToolCall};
use crate::systems::System;

/// A sandboxed filesystem backed by memory. Nothing the agent does here
/// touches the host disk; the CLI seeds it with whatever files the run
/// should start from.
pub struct FilesystemSystem {
    tools: Vec<Tool>,
    files: Mutex<BTreeMap<String, String>>,
}

impl FilesystemSystem {
    pub fn new() -> Self {
        let read_file_tool = Tool::new(
            "read_file",
            "Read the contents of a file in the workspace.",
            json!({
                "type": "object",
                "required": ["path"],
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Path of the file to read."
                    }
                }
            }),
        );

        let write_file_tool = Tool::new(
            "write_file",
            "Create or overwrite a file in the workspace.",
            json!({
                "type": "object",
                "required": ["path", "file_text"],
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Path of the file to write."
                    },
                    "file_text": {
                        "type": "string",
                        "description": "Full content of the file."
                    }
                }
            }),
        );

        let list_files_tool = Tool::new(
            "list_files",
            "List the paths of all files in the workspace.",
            json!({
                "type": "object",
                "required": [],
                "properties": {}
            }),
        );

        let grep_tool = Tool::new(
            "grep",
            "Search file contents with a regular expression. Returns matching lines as path:line:text.",
            json!({
                "type": "object",
                "required": ["pattern"],
                "properties": {
                    "pattern": {
                        "type": "string",
                        "description": "The regular expression to search for."
                    },
                    "path": {
                        "type": "string",
                        "default": null,
                        "description": "Restrict the search to a single file. Searches every file when omitted."
                    }
                }
            }),
        );

        Self {
            tools: vec![read_file_tool, write_file_tool, list_files_tool, grep_tool],
            files: Mutex::new(BTreeMap::new()),
        }
    }

    /// Preload a file into the sandbox before the agent runs
    pub fn seed<P: Into<String>, C: Into<String>>(&self, path: P, content: C) {
        self.files.lock().unwrap().insert(path.into(), content.into());
    }

    fn required_str<'a>(params: &'a Value, key: &str) -> AgentResult<&'a str> {
        params
            .get(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| AgentError::InvalidParameters(format!("'{}' must be provided", key)))
    }

    fn read_file(&self, params: Value) -> AgentResult<Vec<Content>> {
        let path = Self::required_str(&params, "path")?;
        let files = self.files.lock().unwrap();
        let content = files
            .get(path)
            .ok_or_else(|| AgentError::ExecutionError(format!("No such file: {}", path)))?;
        Ok(vec![Content::text(content.as_str())])
    }

    // A successful write reports nothing; the conversation carries on with
    // an empty tool result.
    fn write_file(&self, params: Value) -> AgentResult<Vec<Content>> {
        let path = Self::required_str(&params, "path")?;
        let file_text = Self::required_str(&params, "file_text")?;
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), file_text.to_string());
        Ok(vec![])
    }

    fn list_files(&self) -> AgentResult<Vec<Content>> {
        let files = self.files.lock().unwrap();
        if files.is_empty() {
            return Ok(vec![]);
        }
        let listing = files.keys().cloned().collect::<Vec<_>>().join("\n");
        Ok(vec![Content::text(listing)])
    }

    fn grep(&self, params: Value) -> AgentResult<Vec<Content>> {
        let pattern = Self::required_str(&params, "pattern")?;
        let re = Regex::new(pattern)
            .map_err(|e| AgentError::InvalidParameters(format!("Invalid pattern: {}", e)))?;
        let scope = params.get("path").and_then(|v| v.as_str());

        let files = self.files.lock().unwrap();
        if let Some(path) = scope {
            if !files.contains_key(path) {
                return Err(AgentError::ExecutionError(format!("No such file: {}", path)));
            }
        }

        let mut matches = Vec::new();
        for (path, content) in files.iter() {
            if let Some(scope) = scope {
                if path != scope {
                    continue;
                }
            }
            for (index, line) in content.lines().enumerate() {
                if re.is_match(line) {
                    matches.push(format!("{}:{}:{}", path, index + 1, line));
                }
            }
        }

        if matches.is_empty() {
            // No matches is a valid, empty result rather than an error
            return Ok(vec![]);
        }
        Ok(vec![Content::text(matches.join("\n"))])
    }
}

impl Default for FilesystemSystem {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl System for FilesystemSystem {
    fn name(&self) -> &str {
        "fs"
    }

    fn description(&self) -> &str {
        "An in-memory workspace for reading, writing and searching files"
    }

    fn instructions(&self) -> &str {
        indoc! {"
            The workspace starts with whatever files were loaded into it and
            lives only for this session. Use read_file and grep to inspect
            files, write_file to create or replace them, and list_files to
            see what exists. Paths are plain strings with no directory
            traversal semantics.
        "}
    }

    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call(&self, tool_call: ToolCall) -> AgentResult<Vec<Content>> {
        match tool_call.name.as_str() {
            "read_file" => self.read_file(tool_call.arguments),
            "write_file" => self.write_file(tool_call.arguments),
            "list_files" => self.list_files(),
            "grep" => self.grep(tool_call.arguments),
            _ => Err(AgentError::ToolNotFound(tool_call.name)),
        }
    }
}
