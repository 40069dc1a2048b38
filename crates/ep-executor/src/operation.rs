//! Executor operations

use std::fmt;
use std::str::FromStr;

use crate::error::ExecutorError;

/// Helper names, as used in workflow definitions and on the command line
pub const SHELL: &str = "shell";
pub const INTERACTIVE_SHELL: &str = "interactive-shell";
pub const COPY_FROM_DAY0: &str = "copy-from-day0";
pub const COPY_TO_DAY0: &str = "copy-to-day0";
pub const PUSH_IMAGE: &str = "push-image";
pub const PUSH_FILE: &str = "push-file";
pub const PULL_FILE: &str = "pull-file";
pub const CREATE_REGISTRY_PROJECTS: &str = "create-registry-projects";

/// Kind of operation, without arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Shell,
    InteractiveShell,
    CopyFromDay0,
    CopyToDay0,
    PushImage,
    PushFile,
    PullFile,
    CreateRegistryProjects,
}

impl OperationKind {
    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::Shell => SHELL,
            OperationKind::InteractiveShell => INTERACTIVE_SHELL,
            OperationKind::CopyFromDay0 => COPY_FROM_DAY0,
            OperationKind::CopyToDay0 => COPY_TO_DAY0,
            OperationKind::PushImage => PUSH_IMAGE,
            OperationKind::PushFile => PUSH_FILE,
            OperationKind::PullFile => PULL_FILE,
            OperationKind::CreateRegistryProjects => CREATE_REGISTRY_PROJECTS,
        }
    }
}

impl FromStr for OperationKind {
    type Err = ExecutorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            SHELL => Ok(OperationKind::Shell),
            INTERACTIVE_SHELL => Ok(OperationKind::InteractiveShell),
            COPY_FROM_DAY0 => Ok(OperationKind::CopyFromDay0),
            COPY_TO_DAY0 => Ok(OperationKind::CopyToDay0),
            PUSH_IMAGE => Ok(OperationKind::PushImage),
            PUSH_FILE => Ok(OperationKind::PushFile),
            PULL_FILE => Ok(OperationKind::PullFile),
            CREATE_REGISTRY_PROJECTS => Ok(OperationKind::CreateRegistryProjects),
            other => Err(ExecutorError::Validation(format!("unknown helper: {}", other))),
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One executor operation with its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Run a command on every target
    Shell { command: Vec<String>, interactive: bool },
    /// `[source, destination/]`
    CopyFromDay0(Vec<String>),
    /// `[source, destination/]`
    CopyToDay0(Vec<String>),
    /// Image references
    PushImage(Vec<String>),
    /// `[file, content_ref, revision]`
    PushFile(Vec<String>),
    /// `[dest, content_ref, revision]`
    PullFile(Vec<String>),
    /// Image references
    CreateRegistryProjects(Vec<String>),
}

impl Operation {
    /// Build an operation from a helper name and its arguments
    pub fn parse(helper: &str, args: Vec<String>) -> Result<Self, ExecutorError> {
        let operation = match helper.parse::<OperationKind>()? {
            OperationKind::Shell | OperationKind::InteractiveShell if args.is_empty() => {
                return Err(ExecutorError::Validation(format!(
                    "{}: no command given",
                    helper
                )))
            }
            OperationKind::Shell => Operation::Shell {
                command: args,
                interactive: false,
            },
            OperationKind::InteractiveShell => Operation::Shell {
                command: args,
                interactive: true,
            },
            OperationKind::CopyFromDay0 => Operation::CopyFromDay0(args),
            OperationKind::CopyToDay0 => Operation::CopyToDay0(args),
            OperationKind::PushImage => Operation::PushImage(args),
            OperationKind::PushFile => Operation::PushFile(args),
            OperationKind::PullFile => Operation::PullFile(args),
            OperationKind::CreateRegistryProjects => Operation::CreateRegistryProjects(args),
        };
        Ok(operation)
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Shell {
                interactive: false, ..
            } => OperationKind::Shell,
            Operation::Shell {
                interactive: true, ..
            } => OperationKind::InteractiveShell,
            Operation::CopyFromDay0(_) => OperationKind::CopyFromDay0,
            Operation::CopyToDay0(_) => OperationKind::CopyToDay0,
            Operation::PushImage(_) => OperationKind::PushImage,
            Operation::PushFile(_) => OperationKind::PushFile,
            Operation::PullFile(_) => OperationKind::PullFile,
            Operation::CreateRegistryProjects(_) => OperationKind::CreateRegistryProjects,
        }
    }

    /// Whether the operation runs against target nodes
    pub fn needs_targets(&self) -> bool {
        !matches!(self, Operation::CreateRegistryProjects(_))
    }
}
