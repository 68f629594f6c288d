//! The command model shared by the text parser and the serialized reader,
//! and the translation of commands back into script text.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::script::ScriptVariable;
use crate::syntax::{render_template, CommandSyntax, ParameterSyntax, ParameterType};

const MODIFIER_LIVE: i32 = 0x1_0000;
const MODIFIER_ENCODED: i32 = 0x2_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DataTypeKind {
    Null = 0,
    Unknown = 1,
    Variable = 2,
    Constant = 3,
    Integer = 4,
    String = 5,
    Ship = 6,
    Station = 7,
    Sector = 8,
    Ware = 9,
    Race = 10,
    Relation = 11,
    StationSerial = 12,
    ObjectClass = 13,
    Object = 14,
    Operator = 15,
    Expression = 16,
    DataType = 17,
    Array = 18,
    Quest = 19,
    ObjectCommand = 20,
    WingCommand = 21,
    Passenger = 22,
}

impl DataTypeKind {
    const ALL: [DataTypeKind; 23] = [
        DataTypeKind::Null,
        DataTypeKind::Unknown,
        DataTypeKind::Variable,
        DataTypeKind::Constant,
        DataTypeKind::Integer,
        DataTypeKind::String,
        DataTypeKind::Ship,
        DataTypeKind::Station,
        DataTypeKind::Sector,
        DataTypeKind::Ware,
        DataTypeKind::Race,
        DataTypeKind::Relation,
        DataTypeKind::StationSerial,
        DataTypeKind::ObjectClass,
        DataTypeKind::Object,
        DataTypeKind::Operator,
        DataTypeKind::Expression,
        DataTypeKind::DataType,
        DataTypeKind::Array,
        DataTypeKind::Quest,
        DataTypeKind::ObjectCommand,
        DataTypeKind::WingCommand,
        DataTypeKind::Passenger,
    ];

    /// Game object references written as `{...}` in script text.
    pub fn is_game_object(self) -> bool {
        matches!(
            self,
            DataTypeKind::Ship
                | DataTypeKind::Station
                | DataTypeKind::Sector
                | DataTypeKind::Ware
                | DataTypeKind::Race
                | DataTypeKind::Relation
                | DataTypeKind::StationSerial
                | DataTypeKind::ObjectClass
                | DataTypeKind::Object
                | DataTypeKind::Quest
                | DataTypeKind::ObjectCommand
                | DataTypeKind::WingCommand
                | DataTypeKind::Passenger
        )
    }
}

/// The runtime type of a parameter value, with its modifier bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataType {
    pub kind: DataTypeKind,
    pub encoded: bool,
    pub live: bool,
}

impl DataType {
    pub fn from_raw(raw: i32) -> Option<DataType> {
        let base = raw & !(MODIFIER_LIVE | MODIFIER_ENCODED);
        let kind = *DataTypeKind::ALL.get(usize::try_from(base).ok()?)?;
        Some(DataType {
            kind,
            encoded: raw & MODIFIER_ENCODED != 0,
            live: raw & MODIFIER_LIVE != 0,
        })
    }

    pub fn to_raw(self) -> i32 {
        let mut raw = self.kind as i32;
        if self.encoded {
            raw |= MODIFIER_ENCODED;
        }
        if self.live {
            raw |= MODIFIER_LIVE;
        }
        raw
    }
}

impl From<DataTypeKind> for DataType {
    fn from(kind: DataTypeKind) -> Self {
        DataType {
            kind,
            encoded: false,
            live: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterValue {
    Int(i32),
    Str(String),
}

impl ParameterValue {
    pub fn as_int(&self) -> Option<i32> {
        match self {
            ParameterValue::Int(n) => Some(*n),
            ParameterValue::Str(_) => None,
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParameterValue::Int(n) => write!(f, "{}", n),
            ParameterValue::Str(s) => write!(f, "{}", s),
        }
    }
}

/// The control-flow role of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum BranchLogic {
    None = 0,
    If = 1,
    IfNot = 2,
    While = 3,
    WhileNot = 4,
    SkipIf = 5,
    SkipIfNot = 6,
    Else = 7,
    ElseIf = 8,
    ElseIfNot = 9,
    End = 10,
    Break = 11,
    Continue = 12,
    Nop = 13,
}

impl BranchLogic {
    const ALL: [BranchLogic; 14] = [
        BranchLogic::None,
        BranchLogic::If,
        BranchLogic::IfNot,
        BranchLogic::While,
        BranchLogic::WhileNot,
        BranchLogic::SkipIf,
        BranchLogic::SkipIfNot,
        BranchLogic::Else,
        BranchLogic::ElseIf,
        BranchLogic::ElseIfNot,
        BranchLogic::End,
        BranchLogic::Break,
        BranchLogic::Continue,
        BranchLogic::Nop,
    ];

    pub fn from_code(code: u8) -> Option<BranchLogic> {
        Self::ALL.get(code as usize).copied()
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// The keywords that introduce this logic in script text.
    pub fn keywords(self) -> &'static str {
        match self {
            BranchLogic::If => "if",
            BranchLogic::IfNot => "if not",
            BranchLogic::While => "while",
            BranchLogic::WhileNot => "while not",
            BranchLogic::SkipIf => "skip if",
            BranchLogic::SkipIfNot => "skip if not",
            BranchLogic::Else => "else",
            BranchLogic::ElseIf => "else if",
            BranchLogic::ElseIfNot => "else if not",
            BranchLogic::End => "end",
            BranchLogic::Break => "break",
            BranchLogic::Continue => "continue",
            BranchLogic::None | BranchLogic::Nop => "",
        }
    }

    /// Logic whose line is followed by an indented block.
    pub fn opens_branch(self) -> bool {
        matches!(
            self,
            BranchLogic::If
                | BranchLogic::IfNot
                | BranchLogic::While
                | BranchLogic::WhileNot
                | BranchLogic::SkipIf
                | BranchLogic::SkipIfNot
                | BranchLogic::Else
                | BranchLogic::ElseIf
                | BranchLogic::ElseIfNot
        )
    }

    /// Logic carried by the command's return value rather than a command of its own.
    pub fn is_conditional(self) -> bool {
        self.opens_branch() && self != BranchLogic::Else
    }

    pub fn is_loop(self) -> bool {
        matches!(self, BranchLogic::While | BranchLogic::WhileNot)
    }

    pub fn is_if(self) -> bool {
        matches!(self, BranchLogic::If | BranchLogic::IfNot)
    }

    pub fn is_else(self) -> bool {
        matches!(
            self,
            BranchLogic::Else | BranchLogic::ElseIf | BranchLogic::ElseIfNot
        )
    }

    pub fn is_skip(self) -> bool {
        matches!(self, BranchLogic::SkipIf | BranchLogic::SkipIfNot)
    }
}

/// What a command does with its result.
///
/// Stored as one integer: non-negative values name a variable, negative values
/// pack a conditional as `-((jump << 8) | logic) - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnObject {
    Discard,
    Variable(usize),
    Conditional { logic: BranchLogic, jump: u16 },
}

impl ReturnObject {
    pub fn decode(raw: i32) -> Option<ReturnObject> {
        if raw >= 0 {
            return Some(ReturnObject::Variable(raw as usize));
        }
        let packed = -(raw as i64) - 1;
        let logic = BranchLogic::from_code((packed & 0xFF) as u8)?;
        let jump = u16::try_from(packed >> 8).ok()?;
        Some(match logic {
            BranchLogic::None => ReturnObject::Discard,
            logic => ReturnObject::Conditional { logic, jump },
        })
    }

    pub fn encode(self) -> i32 {
        let pack =
            |logic: BranchLogic, jump: u16| -(((jump as i32) << 8) | logic.code() as i32) - 1;
        match self {
            ReturnObject::Variable(index) => index as i32,
            ReturnObject::Discard => pack(BranchLogic::None, 0),
            ReturnObject::Conditional { logic, jump } => pack(logic, jump),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Operator {
    Or = 0,
    And = 1,
    BitOr = 2,
    BitXor = 3,
    BitAnd = 4,
    Equal = 5,
    NotEqual = 6,
    Less = 7,
    LessEqual = 8,
    Greater = 9,
    GreaterEqual = 10,
    Add = 11,
    Subtract = 12,
    Multiply = 13,
    Divide = 14,
    Modulus = 15,
    BitNot = 16,
    Not = 17,
    Minus = 18,
    OpenBracket = 19,
    CloseBracket = 20,
}

const OPERATORS: [(Operator, &str); 21] = [
    (Operator::Or, "OR"),
    (Operator::And, "AND"),
    (Operator::BitOr, "|"),
    (Operator::BitXor, "^"),
    (Operator::BitAnd, "&"),
    (Operator::Equal, "=="),
    (Operator::NotEqual, "!="),
    (Operator::Less, "<"),
    (Operator::LessEqual, "<="),
    (Operator::Greater, ">"),
    (Operator::GreaterEqual, ">="),
    (Operator::Add, "+"),
    (Operator::Subtract, "-"),
    (Operator::Multiply, "*"),
    (Operator::Divide, "/"),
    (Operator::Modulus, "mod"),
    (Operator::BitNot, "~"),
    (Operator::Not, "!"),
    (Operator::Minus, "-"),
    (Operator::OpenBracket, "("),
    (Operator::CloseBracket, ")"),
];

impl Operator {
    pub fn from_code(code: i32) -> Option<Operator> {
        let index = usize::try_from(code).ok()?;
        OPERATORS.get(index).map(|(op, _)| *op)
    }

    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn text(self) -> &'static str {
        OPERATORS[self as usize].1
    }

    /// Binary operator spelled `text`. `-` reads as subtraction here.
    pub fn binary(text: &str) -> Option<Operator> {
        match text.to_ascii_lowercase().as_str() {
            "or" | "||" => Some(Operator::Or),
            "and" | "&&" => Some(Operator::And),
            "%" => Some(Operator::Modulus),
            lower => OPERATORS[..=Operator::Modulus as usize]
                .iter()
                .find(|(_, t)| t.eq_ignore_ascii_case(lower))
                .map(|(op, _)| *op),
        }
    }

    /// Prefix operator spelled `text`.
    pub fn unary(text: &str) -> Option<Operator> {
        match text.to_ascii_lowercase().as_str() {
            "-" => Some(Operator::Minus),
            "!" | "not" => Some(Operator::Not),
            "~" => Some(Operator::BitNot),
            _ => None,
        }
    }
}

/// One actual parameter of a command.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptParameter {
    pub syntax: ParameterSyntax,
    pub data_type: DataType,
    pub value: ParameterValue,
    pub rendered_text: String,
}

impl ScriptParameter {
    pub fn new(
        syntax: ParameterSyntax,
        data_type: impl Into<DataType>,
        value: ParameterValue,
    ) -> Self {
        Self {
            syntax,
            data_type: data_type.into(),
            value,
            rendered_text: String::new(),
        }
    }

    pub fn return_object(&self) -> Option<ReturnObject> {
        if !self.syntax.param_type.is_return_value() {
            return None;
        }
        self.value.as_int().and_then(ReturnObject::decode)
    }

    fn variable_name(index: i32, variables: &[ScriptVariable]) -> String {
        usize::try_from(index)
            .ok()
            .and_then(|i| variables.get(i))
            .map_or_else(|| format!("$unknown{}", index), |v| format!("${}", v.name))
    }

    /// Script text for this parameter, naming variables from `variables`.
    pub fn render(&self, variables: &[ScriptVariable]) -> String {
        if let Some(object) = self.return_object() {
            return match object {
                ReturnObject::Discard => String::new(),
                ReturnObject::Variable(index) => {
                    format!("{} =", Self::variable_name(index as i32, variables))
                }
                ReturnObject::Conditional { logic, .. } => logic.keywords().to_string(),
            };
        }

        match (&self.data_type.kind, &self.value) {
            (DataTypeKind::Null, _) => "null".to_string(),
            (DataTypeKind::Variable, ParameterValue::Int(index)) => {
                Self::variable_name(*index, variables)
            }
            (DataTypeKind::Variable, ParameterValue::Str(name)) => format!("${}", name),
            (DataTypeKind::Operator, ParameterValue::Int(code)) => Operator::from_code(*code)
                .map_or_else(|| code.to_string(), |op| op.text().to_string()),
            (DataTypeKind::String, ParameterValue::Str(s)) if !self.syntax.param_type.is_name() => {
                format!("'{}'", s.replace('\'', "\\'"))
            }
            (DataTypeKind::Constant, ParameterValue::Str(s)) => format!("[{}]", s),
            (kind, ParameterValue::Str(s)) if kind.is_game_object() => format!("{{{}}}", s),
            (_, value) => value.to_string(),
        }
    }
}

/// One command of a script.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptCommand {
    pub syntax: Arc<CommandSyntax>,
    pub parameters: Vec<ScriptParameter>,
    pub rendered_text: String,
    /// For auxiliary commands, the position in the standard command list they precede.
    pub ref_index: Option<usize>,
}

impl ScriptCommand {
    pub fn new(syntax: Arc<CommandSyntax>, parameters: Vec<ScriptParameter>) -> Self {
        Self {
            syntax,
            parameters,
            rendered_text: String::new(),
            ref_index: None,
        }
    }

    pub fn id(&self) -> u32 {
        self.syntax.id
    }

    pub fn return_object(&self) -> Option<ReturnObject> {
        self.parameters.iter().find_map(|p| p.return_object())
    }

    /// Render every parameter, then the command's template, into `rendered_text`.
    pub fn translate(&mut self, variables: &[ScriptVariable]) {
        for parameter in &mut self.parameters {
            parameter.rendered_text = parameter.render(variables);
        }

        let parameters = &self.parameters;
        let mut text = render_template(&self.syntax.text_template, |n| {
            parameters
                .iter()
                .find(|p| p.syntax.display_index as usize == n && !is_variadic(p))
                .map(|p| p.rendered_text.as_str())
        });

        let mut argument = 0;
        for parameter in parameters.iter().filter(|p| is_variadic(p)) {
            if parameter.syntax.param_type == ParameterType::Argument {
                argument += 1;
                text.push_str(&format!(" argument{}={}", argument, parameter.rendered_text));
            } else {
                text.push(' ');
                text.push_str(&parameter.rendered_text);
            }
        }

        self.rendered_text = text.trim().to_string();
    }
}

/// Parameters appended after the template: expression terms and script call arguments.
fn is_variadic(parameter: &ScriptParameter) -> bool {
    matches!(
        parameter.syntax.param_type,
        ParameterType::Expression | ParameterType::Argument
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::CommandKind;
    use crate::version::GameVersion;
    use pretty_assertions::assert_eq;

    fn variables(names: &[&str]) -> Vec<ScriptVariable> {
        names
            .iter()
            .enumerate()
            .map(|(id, name)| ScriptVariable::new(*name, id))
            .collect()
    }

    fn command(template: &str, params: Vec<ScriptParameter>) -> ScriptCommand {
        let syntax = CommandSyntax {
            id: 500,
            kind: CommandKind::Standard,
            text_template: template.to_string(),
            parameters: params.iter().map(|p| p.syntax.clone()).collect(),
            versions: GameVersion::ALL,
        };
        ScriptCommand::new(Arc::new(syntax), params)
    }

    #[test]
    fn test_translate_substitutes_markers() {
        let label = ScriptParameter::new(
            ParameterSyntax::new(ParameterType::LabelName, 0, 0),
            DataTypeKind::String,
            ParameterValue::Str("Start".into()),
        );
        let mut goto = command("goto label $0", vec![label]);
        goto.translate(&[]);
        assert_eq!(goto.rendered_text, "goto label Start");
        assert_eq!(goto.parameters[0].rendered_text, "Start");
    }

    #[test]
    fn test_translate_keeps_literal_digits() {
        let target = ScriptParameter::new(
            ParameterSyntax::new(ParameterType::Variable, 0, 0),
            DataTypeKind::Variable,
            ParameterValue::Int(1),
        );
        let mut add = command("add 3 to $0", vec![target]);
        add.translate(&variables(&["a", "total"]));
        assert_eq!(add.rendered_text, "add 3 to $total");
    }

    #[test]
    fn test_translate_return_values() {
        let params = |raw: i32| {
            vec![
                ScriptParameter::new(
                    ParameterSyntax::new(ParameterType::ReturnValue, 0, 0),
                    DataTypeKind::Variable,
                    ParameterValue::Int(raw),
                ),
                ScriptParameter::new(
                    ParameterSyntax::new(ParameterType::RefObj, 1, 1),
                    DataTypeKind::Constant,
                    ParameterValue::Str("THIS".into()),
                ),
            ]
        };
        let vars = variables(&["name"]);

        let mut assign = command("$0 $1 -> get name", params(0));
        assign.translate(&vars);
        assert_eq!(assign.rendered_text, "$name = [THIS] -> get name");

        let mut discard = command("$0 $1 -> get name", params(ReturnObject::Discard.encode()));
        discard.translate(&vars);
        assert_eq!(discard.rendered_text, "[THIS] -> get name");

        let conditional = ReturnObject::Conditional {
            logic: BranchLogic::WhileNot,
            jump: 12,
        };
        let mut cond = command("$0 $1 -> get name", params(conditional.encode()));
        cond.translate(&vars);
        assert_eq!(cond.rendered_text, "while not [THIS] -> get name");
    }

    #[test]
    fn test_return_object_encoding() {
        for object in [
            ReturnObject::Discard,
            ReturnObject::Variable(0),
            ReturnObject::Variable(17),
            ReturnObject::Conditional {
                logic: BranchLogic::If,
                jump: 0,
            },
            ReturnObject::Conditional {
                logic: BranchLogic::SkipIfNot,
                jump: 300,
            },
        ] {
            assert_eq!(ReturnObject::decode(object.encode()), Some(object));
        }
        assert_eq!(ReturnObject::decode(-1), Some(ReturnObject::Discard));
    }

    #[test]
    fn test_parameter_rendering_by_type() {
        let vars = variables(&["x"]);
        let render = |t: ParameterType, kind: DataTypeKind, value: ParameterValue| {
            ScriptParameter::new(ParameterSyntax::new(t, 0, 0), kind, value).render(&vars)
        };
        let int = ParameterValue::Int;
        let text = |s: &str| ParameterValue::Str(s.to_string());

        assert_eq!(render(ParameterType::Value, DataTypeKind::Integer, int(-4)), "-4");
        assert_eq!(
            render(ParameterType::VarString, DataTypeKind::String, text("it's")),
            "'it\\'s'"
        );
        assert_eq!(render(ParameterType::Comment, DataTypeKind::String, text("plain")), "plain");
        assert_eq!(render(ParameterType::Label, DataTypeKind::String, text("Start")), "Start");
        assert_eq!(
            render(ParameterType::VarSector, DataTypeKind::Sector, text("Argon Prime")),
            "{Argon Prime}"
        );
        assert_eq!(render(ParameterType::VarWare, DataTypeKind::Ware, int(42)), "42");
        assert_eq!(render(ParameterType::Value, DataTypeKind::Null, int(0)), "null");
        assert_eq!(render(ParameterType::Value, DataTypeKind::Variable, int(5)), "$unknown5");
        assert_eq!(
            render(ParameterType::Expression, DataTypeKind::Operator, int(Operator::Add.code())),
            "+"
        );
    }

    #[test]
    fn test_data_type_modifiers() {
        let raw = DataTypeKind::Ship as i32 | 0x2_0000;
        let data_type = DataType::from_raw(raw).unwrap();
        assert_eq!(data_type.kind, DataTypeKind::Ship);
        assert!(data_type.encoded);
        assert!(!data_type.live);
        assert_eq!(data_type.to_raw(), raw);
        assert_eq!(DataType::from_raw(99), None);
    }

    #[test]
    fn test_operator_lookup() {
        assert_eq!(Operator::binary("and"), Some(Operator::And));
        assert_eq!(Operator::binary("-"), Some(Operator::Subtract));
        assert_eq!(Operator::binary("MOD"), Some(Operator::Modulus));
        assert_eq!(Operator::binary("!"), None);
        assert_eq!(Operator::unary("not"), Some(Operator::Not));
        assert_eq!(
            Operator::from_code(Operator::CloseBracket.code()),
            Some(Operator::CloseBracket)
        );
    }
}
