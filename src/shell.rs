//! Line-oriented command dispatcher over a [`FatFilesystem`].
//!
//! Commands: `format`, `ls`, `mkdir <name>`, `touch <name>`, `cd <path>`,
//! `info`, `exit`. A failed command prints its error and the session goes on.

use std::io::{BufRead, Write};

use anyhow::{bail, Context, Result};
use log::debug;

use crate::fs::bpb::{FormatOptions, ROOT_CLUSTER};
use crate::fs::{BlockStore, FatFilesystem};

/// What a command produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Output(String),
    Exit,
}

/// Current directory: its cluster and the names walked to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
struct WorkingDirectory {
    cluster: u32,
    components: Vec<String>,
}

impl WorkingDirectory {
    fn root(cluster: u32) -> Self {
        Self {
            cluster,
            components: Vec::new(),
        }
    }

    fn display(&self) -> String {
        format!("/{}", self.components.join("/"))
    }
}

pub struct Shell<S> {
    fs: FatFilesystem<S>,
    cwd: WorkingDirectory,
    format_options: FormatOptions,
}

impl<S: BlockStore> Shell<S> {
    pub fn new(fs: FatFilesystem<S>) -> Self {
        let root = fs.root_cluster().unwrap_or(ROOT_CLUSTER);
        Self {
            fs,
            cwd: WorkingDirectory::root(root),
            format_options: FormatOptions::default(),
        }
    }

    pub fn with_format_options(mut self, options: FormatOptions) -> Self {
        self.format_options = options;
        self
    }

    pub fn filesystem(&self) -> &FatFilesystem<S> {
        &self.fs
    }

    pub fn into_filesystem(self) -> FatFilesystem<S> {
        self.fs
    }

    pub fn current_cluster(&self) -> u32 {
        self.cwd.cluster
    }

    pub fn current_path(&self) -> String {
        self.cwd.display()
    }

    pub fn prompt(&self) -> String {
        format!("{}> ", self.cwd.display())
    }

    /// Run one command line.
    pub fn execute(&mut self, line: &str) -> Result<Reply> {
        let line = line.trim();
        let (command, arg) = match line.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };
        debug!("command {command:?} arg {arg:?}");

        match command {
            "" => Ok(Reply::Output(String::new())),
            "exit" => Ok(Reply::Exit),
            "format" => self.format(),
            "ls" => self.list(),
            "mkdir" => {
                let name = required(arg, "mkdir <name>")?;
                let cluster = self.fs.create_directory(self.cwd.cluster, name)?;
                Ok(Reply::Output(format!(
                    "Created folder: {name} (cluster {cluster})"
                )))
            }
            "touch" => {
                let name = required(arg, "touch <name>")?;
                let first = self.fs.create_file(self.cwd.cluster, name)?;
                Ok(Reply::Output(format!(
                    "Created file \"{name}\" starting at cluster {first}"
                )))
            }
            "cd" => {
                let path = required(arg, "cd <path>")?;
                self.change_directory(path)?;
                Ok(Reply::Output(String::new()))
            }
            "info" => {
                let info = self.fs.info()?;
                let json = serde_json::to_string_pretty(&info)
                    .context("failed to render volume info")?;
                Ok(Reply::Output(json))
            }
            other => bail!("Unknown command: {other}"),
        }
    }

    /// Prompt, read and execute until `exit` or end of input.
    pub fn run<R: BufRead, W: Write>(&mut self, mut input: R, mut output: W) -> Result<()> {
        let mut line = String::new();
        loop {
            write!(output, "{}", self.prompt())?;
            output.flush()?;

            line.clear();
            if input.read_line(&mut line)? == 0 {
                writeln!(output)?;
                return Ok(());
            }
            match self.execute(&line) {
                Ok(Reply::Exit) => return Ok(()),
                Ok(Reply::Output(text)) if text.is_empty() => {}
                Ok(Reply::Output(text)) => writeln!(output, "{text}")?,
                Err(e) => writeln!(output, "{e:#}")?,
            }
        }
    }

    fn format(&mut self) -> Result<Reply> {
        self.fs.format(&self.format_options)?;
        let info = self.fs.info()?;
        self.cwd = WorkingDirectory::root(info.root_cluster);
        Ok(Reply::Output(format!(
            "Formatted {}: {} clusters of {} bytes",
            info.volume_label, info.cluster_count, info.cluster_size
        )))
    }

    fn list(&mut self) -> Result<Reply> {
        let names: Vec<String> = self
            .fs
            .list(self.cwd.cluster)?
            .into_iter()
            .map(|entry| entry.name)
            .collect();
        Ok(Reply::Output(names.join(" ")))
    }

    /// Walk `path` one component at a time; the working directory only moves
    /// when every component resolves.
    fn change_directory(&mut self, path: &str) -> Result<()> {
        let mut next = self.cwd.clone();
        if path.starts_with('/') {
            next = WorkingDirectory::root(self.fs.change_directory(next.cluster, "/")?);
        }

        for component in path.split('/').filter(|c| !c.is_empty()) {
            next.cluster = self.fs.change_directory(next.cluster, component)?;
            match component {
                "." => {}
                ".." => {
                    next.components.pop();
                }
                name => next.components.push(name.to_string()),
            }
        }

        self.cwd = next;
        Ok(())
    }
}

fn required<'a>(arg: &'a str, usage: &str) -> Result<&'a str> {
    if arg.is_empty() {
        bail!("Use: {usage}");
    }
    Ok(arg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FatError;
    use crate::fs::ImageStore;
    use std::io::Cursor;

    type MemoryShell = Shell<ImageStore<Cursor<Vec<u8>>>>;

    fn shell() -> MemoryShell {
        let store = ImageStore::new(Cursor::new(vec![0u8; 2 * 1024 * 1024]));
        Shell::new(FatFilesystem::mount(store).unwrap())
    }

    fn output(shell: &mut MemoryShell, line: &str) -> String {
        match shell.execute(line).unwrap() {
            Reply::Output(text) => text,
            Reply::Exit => panic!("unexpected exit for {line:?}"),
        }
    }

    #[test]
    fn test_commands_before_format_report_not_fat32() {
        let mut shell = shell();
        let err = shell.execute("ls").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FatError>(),
            Some(FatError::NotFat32)
        ));
        assert_eq!(shell.prompt(), "/> ");
    }

    #[test]
    fn test_format_then_ls() {
        let mut shell = shell();
        assert!(output(&mut shell, "format").starts_with("Formatted FAT32IMG"));
        assert_eq!(output(&mut shell, "ls"), ". ..");
    }

    #[test]
    fn test_cd_updates_prompt() {
        let mut shell = shell();
        output(&mut shell, "format");
        output(&mut shell, "mkdir music");
        output(&mut shell, "cd music");
        output(&mut shell, "mkdir live sets");
        output(&mut shell, "cd live sets");
        assert_eq!(shell.prompt(), "/music/live sets> ");

        output(&mut shell, "cd ..");
        assert_eq!(shell.current_path(), "/music");
        output(&mut shell, "cd /");
        assert_eq!(shell.current_path(), "/");
        assert_eq!(shell.current_cluster(), 2);

        output(&mut shell, "cd /music/live sets/../live sets");
        assert_eq!(shell.current_path(), "/music/live sets");
    }

    #[test]
    fn test_failed_cd_keeps_position() {
        let mut shell = shell();
        output(&mut shell, "format");
        output(&mut shell, "mkdir a");
        output(&mut shell, "cd a");
        let cluster = shell.current_cluster();

        let err = shell.execute("cd ../missing").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FatError>(),
            Some(FatError::DirectoryNotFound(_))
        ));
        assert_eq!(shell.current_cluster(), cluster);
        assert_eq!(shell.current_path(), "/a");
    }

    #[test]
    fn test_format_resets_position() {
        let mut shell = shell();
        output(&mut shell, "format");
        output(&mut shell, "mkdir a");
        output(&mut shell, "cd a");
        output(&mut shell, "format");
        assert_eq!(shell.current_path(), "/");
        assert_eq!(output(&mut shell, "ls"), ". ..");
    }

    #[test]
    fn test_usage_and_unknown_commands() {
        let mut shell = shell();
        output(&mut shell, "format");
        assert!(shell.execute("mkdir").is_err());
        assert!(shell.execute("touch   ").is_err());
        assert!(shell.execute("rm x").is_err());
        assert_eq!(shell.execute("exit").unwrap(), Reply::Exit);
    }

    #[test]
    fn test_format_uses_configured_options() {
        let mut shell = shell().with_format_options(FormatOptions {
            volume_label: "SCRATCH".into(),
            ..FormatOptions::default()
        });
        assert!(output(&mut shell, "format").starts_with("Formatted SCRATCH"));
        let bpb = shell.filesystem().boot_sector().unwrap();
        assert_eq!(bpb.label(), "SCRATCH");
    }

    #[test]
    fn test_info_is_json() {
        let mut shell = shell();
        output(&mut shell, "format");
        let json: serde_json::Value = serde_json::from_str(&output(&mut shell, "info")).unwrap();
        assert_eq!(json["root_cluster"], 2);
        assert_eq!(json["cluster_size"], 4096);
    }

    #[test]
    fn test_run_session() {
        let mut shell = shell();
        let input = Cursor::new("format\nmkdir docs\ntouch notes.txt\nbogus\nls\nexit\nls\n");
        let mut out = Vec::new();
        shell.run(input, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("Created folder: docs (cluster 3)"));
        assert!(text.contains("Created file \"notes.txt\" starting at cluster 4"));
        assert!(text.contains("Unknown command: bogus"));
        assert!(text.contains(". .. docs notes.txt"));
        // Nothing after exit runs.
        assert_eq!(text.matches(". ..").count(), 1);
    }
}
