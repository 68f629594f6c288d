//! Readers for syntax definition sources.
//!
//! The legacy flat-text format holds one signature per line:
//!
//! ```text
//! # id  versions   kind      parameters                         template
//! 200   all        standard  ReturnValue,RefObj                 $0 $1 -> get name
//! 102   x3tc|x3ap  call      ScriptName@0:2!n,ReturnValue@1:0,RefObj@2:1   $0 $1 -> call script $2 :
//! ```
//!
//! Fields are tab separated. Parameters are `Type[@physical][:display][!flags]`
//! with flags `p` (page id), `s` (string id), `n` (script name), `o` (optional),
//! or `-` when the command takes none.

use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use super::{CommandKind, CommandSyntax, ParameterSyntax, ParameterType};
use crate::version::GameVersion;

static PARAMETER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<type>\w+)(?:@(?P<physical>\d+))?(?::(?P<display>\d+))?(?:!(?P<flags>[psno]+))?$",
    )
    .expect("parameter pattern is valid")
});

/// Signatures read from a legacy source, and how many lines were rejected.
#[derive(Debug, Default)]
pub struct SourceRecords {
    pub syntaxes: Vec<CommandSyntax>,
    pub rejected: usize,
}

pub fn parse_legacy(text: &str) -> SourceRecords {
    let mut records = SourceRecords::default();

    for (index, line) in text.lines().enumerate() {
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.trim().is_empty() || trimmed.trim_start().starts_with('#') {
            continue;
        }
        match parse_record(trimmed) {
            Ok(syntax) => records.syntaxes.push(syntax),
            Err(message) => {
                warn!(line = index + 1, %message, "rejected syntax record");
                records.rejected += 1;
            }
        }
    }

    records
}

fn parse_record(line: &str) -> Result<CommandSyntax, String> {
    let fields: Vec<&str> = line.splitn(5, '\t').collect();
    let [id, versions, kind, parameters, template] = fields[..] else {
        return Err(format!("expected 5 tab separated fields, found {}", fields.len()));
    };

    let id = id
        .trim()
        .parse::<u32>()
        .map_err(|e| format!("invalid command id '{}': {}", id.trim(), e))?;
    let versions = versions.parse::<GameVersion>()?;
    let kind = kind.parse::<CommandKind>()?;
    let parameters = parse_parameters(parameters.trim())?;

    Ok(CommandSyntax {
        id,
        kind,
        text_template: template.trim().to_string(),
        parameters,
        versions,
    })
}

fn parse_parameters(list: &str) -> Result<Vec<ParameterSyntax>, String> {
    if list.is_empty() || list == "-" {
        return Ok(Vec::new());
    }

    list.split(',')
        .enumerate()
        .map(|(position, declaration)| {
            let declaration = declaration.trim();
            let captures = PARAMETER
                .captures(declaration)
                .ok_or_else(|| format!("malformed parameter '{}'", declaration))?;

            let param_type = captures["type"].parse::<ParameterType>()?;
            let index = |name: &str, default: usize| -> Result<u8, String> {
                captures
                    .name(name)
                    .map_or(Ok(default), |m| m.as_str().parse::<usize>().map_err(|e| e.to_string()))
                    .and_then(|n| u8::try_from(n).map_err(|e| e.to_string()))
            };
            let physical_index = index("physical", position)?;
            let display_index = index("display", physical_index as usize)?;
            let flags = captures.name("flags").map_or("", |m| m.as_str());

            Ok(ParameterSyntax {
                param_type,
                physical_index,
                display_index,
                is_page_id: flags.contains('p'),
                is_string_id: flags.contains('s'),
                is_script_name: flags.contains('n'),
                is_optional: flags.contains('o'),
            })
        })
        .collect()
}

/// A JSON array of signatures.
pub fn parse_json(text: &str) -> Result<Vec<CommandSyntax>, serde_json::Error> {
    serde_json::from_str(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_legacy_records() {
        let text = "# comment line\n\
                    \n\
                    200\tall\tstandard\tReturnValue,RefObj\t$0 $1 -> get name\n\
                    102\tx3tc|x3ap\tcall\tScriptName@0:2!n,ReturnValue@1:0,RefObj@2:1\t$0 $1 -> call script $2 :\n\
                    401\t3\tstandard\t-\tend\n";
        let records = parse_legacy(text);
        assert_eq!(records.rejected, 0);
        assert_eq!(records.syntaxes.len(), 3);

        let call = &records.syntaxes[1];
        assert_eq!(call.kind, CommandKind::ScriptCall);
        assert_eq!(call.versions, GameVersion::TERRAN_CONFLICT | GameVersion::ALBION_PRELUDE);
        assert_eq!(call.parameters[0].param_type, ParameterType::ScriptName);
        assert_eq!(call.parameters[0].display_index, 2);
        assert!(call.parameters[0].is_script_name);
        assert_eq!(call.parameters[2].physical_index, 2);

        let end = &records.syntaxes[2];
        assert!(end.parameters.is_empty());
        assert_eq!(end.versions, GameVersion::THREAT | GameVersion::REUNION);
    }

    #[test]
    fn test_bad_records_are_rejected_individually() {
        let text = "abc\tall\tstandard\t-\tbroken id\n\
                    201\tall\tstandard\tNoSuchType\tbad parameter\n\
                    202\tall\tweird\t-\tbad kind\n\
                    203\tall\tstandard\n\
                    204\tall\tstandard\tVarNumber!o\tfine $0\n";
        let records = parse_legacy(text);
        assert_eq!(records.rejected, 4);
        assert_eq!(records.syntaxes.len(), 1);
        assert!(records.syntaxes[0].parameters[0].is_optional);
    }

    #[test]
    fn test_parse_json_source() {
        let text = r#"[{
            "id": 300,
            "kind": "standard",
            "template": "$0 wait $1 ms",
            "parameters": [
                {"type": "ReturnValue", "physical_index": 0, "display_index": 0},
                {"type": "VarNumber", "physical_index": 1, "display_index": 1, "is_optional": true}
            ],
            "versions": "x3r|x3tc"
        }]"#;
        let syntaxes = parse_json(text).unwrap();
        assert_eq!(syntaxes[0].parameters.len(), 2);
        assert!(syntaxes[0].parameters[1].is_optional);
        assert_eq!(syntaxes[0].versions, GameVersion::REUNION | GameVersion::TERRAN_CONFLICT);
    }
}
