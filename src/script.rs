use serde::{Deserialize, Serialize};

use crate::command::{BranchLogic, ScriptCommand};
use crate::parser::classify;
use crate::syntax::ParameterType;
use crate::version::GameVersion;

const INDENT: &str = "    ";

/// A named variable slot. `id` is the index commands refer to it by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptVariable {
    pub name: String,
    pub id: usize,
}

impl ScriptVariable {
    pub fn new(name: impl Into<String>, id: usize) -> Self {
        Self {
            name: name.into(),
            id,
        }
    }
}

/// A declared script argument. Arguments occupy the first variable slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptArgument {
    pub name: String,
    pub param_type: ParameterType,
    pub description: String,
}

/// A decompiled script.
#[derive(Debug, Clone, Default)]
pub struct ScriptFile {
    pub name: String,
    pub description: String,
    /// Engine version the script was compiled for.
    pub engine_version: i32,
    pub format_version: i32,
    pub live: bool,
    pub variables: Vec<ScriptVariable>,
    pub arguments: Vec<ScriptArgument>,
    pub commands: Vec<ScriptCommand>,
}

impl ScriptFile {
    /// The game release the engine version belongs to, if it is a known one.
    pub fn target_version(&self) -> Option<GameVersion> {
        GameVersion::from_engine_version(self.engine_version)
    }

    /// The commands' rendered text as indented script source.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let mut depth = 0usize;
        let mut skip_pending = false;

        for command in &self.commands {
            let line = command.rendered_text.as_str();
            let logic = classify(line);

            if logic == BranchLogic::End || logic.is_else() {
                depth = depth.saturating_sub(1);
            }
            let indent = depth + usize::from(skip_pending);
            out.push_str(&INDENT.repeat(indent));
            out.push_str(line);
            out.push('\n');

            if logic.is_skip() {
                skip_pending = true;
            } else if logic != BranchLogic::Nop {
                skip_pending = false;
                if logic.opens_branch() {
                    depth += 1;
                }
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{CommandKind, CommandSyntax};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn rendered(lines: &[&str]) -> Vec<ScriptCommand> {
        lines
            .iter()
            .map(|line| {
                let syntax = CommandSyntax {
                    id: 900,
                    kind: CommandKind::Standard,
                    text_template: line.to_string(),
                    parameters: Vec::new(),
                    versions: GameVersion::ALL,
                };
                let mut command = ScriptCommand::new(Arc::new(syntax), Vec::new());
                command.translate(&[]);
                command
            })
            .collect()
    }

    #[test]
    fn test_to_text_indents_branches() {
        let script = ScriptFile {
            commands: rendered(&[
                "while $count",
                "if $ready",
                "skip if $done",
                "* note",
                "$count = $count - 1",
                "else",
                "break",
                "end",
                "end",
                "return null",
            ]),
            ..Default::default()
        };
        let expected = "\
while $count
    if $ready
        skip if $done
            * note
            $count = $count - 1
    else
        break
    end
end
return null
";
        assert_eq!(script.to_text(), expected);
    }

    #[test]
    fn test_target_version_from_engine() {
        let script = ScriptFile {
            engine_version: 44,
            ..Default::default()
        };
        assert_eq!(script.target_version(), Some(GameVersion::TERRAN_CONFLICT));
    }
}
