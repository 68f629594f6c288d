//! Command signatures: the grammar the text parser and serialized reader resolve against.

pub mod library;
pub mod source;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::hasher::TrieKey;
use crate::lexer::tokenize;
use crate::token::{Token, TokenKind};
use crate::version::GameVersion;

pub use library::{MergeReport, SyntaxLibrary};

pub const CMD_NOP: u32 = 0;
pub const CMD_COMMENT: u32 = 1;
pub const CMD_CALL_SCRIPT_VAR_ARGS: u32 = 102;
pub const CMD_EXPRESSION: u32 = 104;

const UNKNOWN_ID: u32 = u32::MAX;

// Footnote marks decorating templates. The second set doubles as letters in prose.
const FOOTNOTE_GLYPHS: [char; 3] = ['¹', '²', '³'];
const AMBIGUOUS_GLYPHS: [char; 2] = ['ª', 'º'];

macro_rules! parameter_types {
    ($($variant:ident),+ $(,)?) => {
        /// The role of one formal parameter of a command.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[repr(u8)]
        pub enum ParameterType {
            $($variant),+
        }

        impl ParameterType {
            /// Every role, in code order.
            pub const ALL: &'static [ParameterType] = &[$(ParameterType::$variant),+];

            pub fn name(self) -> &'static str {
                match self {
                    $(ParameterType::$variant => stringify!($variant)),+
                }
            }
        }
    };
}

parameter_types! {
    ReturnValue,
    ReturnValueIf,
    ReturnValueIfStart,
    RefObj,
    Variable,
    Label,
    LabelName,
    LabelNumber,
    Comment,
    ScriptName,
    Condition,
    Value,
    Number,
    String,
    Boolean,
    Expression,
    Argument,
    VarNumber,
    VarString,
    VarBoolean,
    VarShip,
    VarStation,
    VarShipStation,
    VarSector,
    VarWare,
    VarRace,
    VarObject,
    VarConstant,
    VarArray,
    VarClass,
    VarRelation,
    VarQuest,
    VarFlightReturn,
    VarSound,
    VarDataType,
    VarStationSerial,
    VarTransmitter,
    VarAsteroid,
    VarWarpGate,
    VarWing,
    VarTable,
    VarPlanet,
    VarStationProduct,
    VarFleetCommand,
    VarWingCommand,
    VarSectorPosition,
    VarObjectCommand,
    VarEnvironment,
    VarPassenger,
    VarStationType,
    VarShipType,
    VarStationTypeClass,
    VarShipTypeClass,
    VarWareOrClass,
    VarHomebase,
    VarTimestamp,
}

impl ParameterType {
    pub fn from_code(code: u8) -> Option<ParameterType> {
        Self::ALL.get(code as usize).copied()
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// Slots that hold the command's result: an assignment target or a branch conditional.
    pub fn is_return_value(self) -> bool {
        matches!(
            self,
            ParameterType::ReturnValue
                | ParameterType::ReturnValueIf
                | ParameterType::ReturnValueIfStart
        )
    }

    /// Slots stored as a bare variable index in compiled form.
    pub fn is_bare_variable(self) -> bool {
        self.is_return_value() || self == ParameterType::Variable
    }

    /// Slots stored as a bare string in compiled form.
    pub fn is_bare_string(self) -> bool {
        matches!(
            self,
            ParameterType::LabelName | ParameterType::Comment | ParameterType::ScriptName
        )
    }

    /// Slots written as a bare word in script text, such as a label or script name.
    pub fn is_name(self) -> bool {
        self.is_bare_string() || self == ParameterType::Label
    }
}

impl FromStr for ParameterType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(code) = s.parse::<u8>() {
            return Self::from_code(code).ok_or_else(|| format!("unknown parameter code {}", code));
        }
        Self::ALL
            .iter()
            .find(|t| t.name().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| format!("unknown parameter type '{}'", s))
    }
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One formal parameter slot of a command signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSyntax {
    #[serde(rename = "type")]
    pub param_type: ParameterType,
    /// Position in the compiled parameter list.
    pub physical_index: u8,
    /// Marker number (`$n`) in the template.
    pub display_index: u8,
    #[serde(default)]
    pub is_page_id: bool,
    #[serde(default)]
    pub is_string_id: bool,
    #[serde(default)]
    pub is_script_name: bool,
    #[serde(default)]
    pub is_optional: bool,
}

impl ParameterSyntax {
    pub fn new(param_type: ParameterType, physical_index: u8, display_index: u8) -> Self {
        Self {
            param_type,
            physical_index,
            display_index,
            is_page_id: false,
            is_string_id: false,
            is_script_name: false,
            is_optional: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Standard,
    Auxiliary,
    ScriptCall,
    Expression,
    Comment,
}

impl FromStr for CommandKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(CommandKind::Standard),
            "auxiliary" | "aux" => Ok(CommandKind::Auxiliary),
            "call" | "scriptcall" => Ok(CommandKind::ScriptCall),
            "expression" => Ok(CommandKind::Expression),
            "comment" => Ok(CommandKind::Comment),
            other => Err(format!("unknown command kind '{}'", other)),
        }
    }
}

/// The declared shape of one command: wording, parameters and supported releases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSyntax {
    pub id: u32,
    pub kind: CommandKind,
    #[serde(rename = "template")]
    pub text_template: String,
    #[serde(default)]
    pub parameters: Vec<ParameterSyntax>,
    pub versions: GameVersion,
}

impl CommandSyntax {
    /// Returned by identification when no signature matches.
    pub fn unknown() -> Self {
        Self {
            id: UNKNOWN_ID,
            kind: CommandKind::Standard,
            text_template: String::new(),
            parameters: Vec::new(),
            versions: GameVersion::NONE,
        }
    }

    pub fn nop() -> Self {
        Self {
            id: CMD_NOP,
            kind: CommandKind::Auxiliary,
            text_template: String::new(),
            parameters: Vec::new(),
            versions: GameVersion::ALL,
        }
    }

    pub fn comment() -> Self {
        Self {
            id: CMD_COMMENT,
            kind: CommandKind::Comment,
            text_template: "* $0".to_string(),
            parameters: vec![ParameterSyntax::new(ParameterType::Comment, 0, 0)],
            versions: GameVersion::ALL,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.id == UNKNOWN_ID
    }

    pub fn parameter_by_display(&self, display_index: usize) -> Option<&ParameterSyntax> {
        self.parameters
            .iter()
            .find(|p| p.display_index as usize == display_index)
    }

    pub fn return_parameter(&self) -> Option<&ParameterSyntax> {
        self.parameters.iter().find(|p| p.param_type.is_return_value())
    }

    /// Parameters in compiled order.
    pub fn physical_parameters(&self) -> Vec<&ParameterSyntax> {
        let mut params: Vec<&ParameterSyntax> = self.parameters.iter().collect();
        params.sort_by_key(|p| p.physical_index);
        params
    }

    /// The template with footnote marks removed and markers kept.
    pub fn plain_template(&self) -> String {
        render_template(&self.text_template, |_| None)
    }

    /// Template tokens a source line has to match.
    ///
    /// A leading return-value marker is left out: the parser consumes the
    /// assignment or branch keywords it stands for before identification.
    pub fn match_tokens(&self) -> Vec<Token> {
        let mut tokens = tokenize(&self.plain_template());
        let leads_with_return = tokens
            .first()
            .and_then(marker_index)
            .and_then(|n| self.parameter_by_display(n))
            .is_some_and(|p| p.param_type.is_return_value());
        if leads_with_return {
            tokens.remove(0);
        }
        tokens
    }

    /// The marker number of each `$n` in `match_tokens`, in order.
    pub fn slot_markers(&self) -> Vec<usize> {
        self.match_tokens().iter().filter_map(marker_index).collect()
    }

    /// Trie edges for this signature. Only `$n` markers become `Any`; a value
    /// written into the wording, like the `3` in `add 3 to $0`, must be matched as is.
    pub fn trie_path(&self) -> Vec<TrieKey> {
        self.match_tokens()
            .iter()
            .filter_map(|token| {
                if marker_index(token).is_some() {
                    Some(TrieKey::Any)
                } else if token.is_slot() {
                    Some(TrieKey::Word(token.text.to_lowercase()))
                } else {
                    TrieKey::of(token)
                }
            })
            .collect()
    }
}

/// The marker number of a `$n` token.
pub fn marker_index(token: &Token) -> Option<usize> {
    if token.kind != TokenKind::Variable {
        return None;
    }
    let mut digits = token.text.strip_prefix('$')?.chars();
    let n = digits.next()?.to_digit(10)?;
    digits.next().is_none().then_some(n as usize)
}

/// Render a template, asking `substitute` for the text of each `$n` marker.
///
/// A `None` substitution writes the marker back unchanged. Footnote marks are
/// dropped; the ambiguous ones only when they directly follow a marker.
pub fn render_template<'a>(
    template: &str,
    mut substitute: impl FnMut(usize) -> Option<&'a str>,
) -> String {
    let mut out = String::with_capacity(template.len());
    let mut in_marker = false;
    let mut after_marker = false;

    for c in template.chars() {
        if FOOTNOTE_GLYPHS.contains(&c) {
            continue;
        }
        if AMBIGUOUS_GLYPHS.contains(&c) && after_marker {
            continue;
        }

        if in_marker {
            in_marker = false;
            if let Some(n) = c.to_digit(10) {
                match substitute(n as usize) {
                    Some(text) => out.push_str(text),
                    None => {
                        out.push('$');
                        out.push(c);
                    }
                }
                after_marker = true;
                continue;
            }
            out.push('$');
        }

        after_marker = false;
        if c == '$' {
            in_marker = true;
        } else {
            out.push(c);
        }
    }

    if in_marker {
        out.push('$');
    }
    out
}
