//! Reader for compiled scripts: the XML `codearray` form the game loads.
//!
//! Every value is an `sval` node with a `type` of `int`, `string` or `array`.
//! The codearray holds one array of ten entries:
//!
//! | pos | content |
//! |---|---|
//! | 0 | script name |
//! | 1 | engine version |
//! | 2 | description |
//! | 3 | format version |
//! | 4 | live flag |
//! | 5 | variable names, arguments first |
//! | 6 | standard commands |
//! | 7 | arguments, `[type, description]` each |
//! | 8 | auxiliary commands |
//! | 9 | reserved |
//!
//! A malformed file is rejected as a whole.

use std::io::Read;
use std::sync::Arc;

use roxmltree::{Document, Node};
use tracing::debug;

use crate::command::{DataType, DataTypeKind, ParameterValue, ScriptCommand, ScriptParameter};
use crate::error::{CompilerError, FileFormatError};
use crate::expression::{reconstruct, Term};
use crate::script::{ScriptArgument, ScriptFile, ScriptVariable};
use crate::syntax::{CommandKind, CommandSyntax, ParameterSyntax, ParameterType, SyntaxLibrary};
use crate::version::GameVersion;

const HEADER_SIZE: usize = 10;

/// How a command's parameters are laid out, chosen from its signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommandShape {
    Standard,
    Auxiliary,
    ScriptCall,
    Expression,
}

impl CommandShape {
    fn of(kind: CommandKind) -> Self {
        match kind {
            CommandKind::Standard => CommandShape::Standard,
            CommandKind::Auxiliary | CommandKind::Comment => CommandShape::Auxiliary,
            CommandKind::ScriptCall => CommandShape::ScriptCall,
            CommandKind::Expression => CommandShape::Expression,
        }
    }
}

fn expect_type(node: Node, expected: &str, context: &str) -> Result<(), FileFormatError> {
    if !node.has_tag_name("sval") {
        return Err(FileFormatError::new(
            context,
            format!("expected an sval node, found <{}>", node.tag_name().name()),
        ));
    }
    match node.attribute("type") {
        Some(found) if found == expected => Ok(()),
        found => Err(FileFormatError::new(
            context,
            format!(
                "expected sval of type '{}', found '{}'",
                expected,
                found.unwrap_or("")
            ),
        )),
    }
}

fn int_value(node: Node, context: &str) -> Result<i32, FileFormatError> {
    expect_type(node, "int", context)?;
    let val = node
        .attribute("val")
        .ok_or_else(|| FileFormatError::new(context, "int sval without a value"))?;
    val.trim()
        .parse()
        .map_err(|_| FileFormatError::new(context, format!("'{}' is not an integer", val)))
}

fn string_value(node: Node, context: &str) -> Result<String, FileFormatError> {
    expect_type(node, "string", context)?;
    Ok(node.attribute("val").unwrap_or_default().to_string())
}

fn array_items<'a, 'input>(
    node: Node<'a, 'input>,
    context: &str,
) -> Result<Vec<Node<'a, 'input>>, FileFormatError> {
    expect_type(node, "array", context)?;
    let items: Vec<Node> = node.children().filter(|n| n.is_element()).collect();
    if let Some(size) = node.attribute("size") {
        let size: usize = size
            .trim()
            .parse()
            .map_err(|_| FileFormatError::new(context, format!("invalid array size '{}'", size)))?;
        if size != items.len() {
            return Err(FileFormatError::new(
                context,
                format!("array declares {} items but holds {}", size, items.len()),
            ));
        }
    }
    Ok(items)
}

/// Sequential access to the items of one array node.
struct Cursor<'a, 'input> {
    items: Vec<Node<'a, 'input>>,
    pos: usize,
    context: String,
}

impl<'a, 'input> Cursor<'a, 'input> {
    fn over(node: Node<'a, 'input>, context: impl Into<String>) -> Result<Self, FileFormatError> {
        let context = context.into();
        Ok(Self {
            items: array_items(node, &context)?,
            pos: 0,
            context,
        })
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn is_done(&self) -> bool {
        self.pos >= self.items.len()
    }

    fn item_context(&self) -> String {
        format!("{}, item {}", self.context, self.pos)
    }

    fn next_node(&mut self) -> Result<(Node<'a, 'input>, String), FileFormatError> {
        let context = self.item_context();
        let node = self
            .items
            .get(self.pos)
            .copied()
            .ok_or_else(|| FileFormatError::new(&context, "missing value"))?;
        self.pos += 1;
        Ok((node, context))
    }

    fn next_int(&mut self) -> Result<i32, FileFormatError> {
        let (node, context) = self.next_node()?;
        int_value(node, &context)
    }

    fn next_index(&mut self) -> Result<usize, FileFormatError> {
        let context = self.item_context();
        let n = self.next_int()?;
        usize::try_from(n)
            .map_err(|_| FileFormatError::new(context, format!("{} is not a valid index", n)))
    }

    fn next_string(&mut self) -> Result<String, FileFormatError> {
        let (node, context) = self.next_node()?;
        string_value(node, &context)
    }

    fn next_array(
        &mut self,
        label: impl Into<String>,
    ) -> Result<Cursor<'a, 'input>, FileFormatError> {
        let (node, _) = self.next_node()?;
        Cursor::over(node, label)
    }

    /// A `(type, value)` pair. The value is a string only for string-typed data.
    fn next_pair(&mut self) -> Result<(DataType, ParameterValue), FileFormatError> {
        let context = self.item_context();
        let raw = self.next_int()?;
        let data_type = DataType::from_raw(raw)
            .ok_or_else(|| FileFormatError::new(context, format!("unknown data type {}", raw)))?;
        let value = if data_type.kind == DataTypeKind::String {
            ParameterValue::Str(self.next_string()?)
        } else {
            ParameterValue::Int(self.next_int()?)
        };
        Ok((data_type, value))
    }
}

pub struct ScriptReader<'l> {
    library: &'l SyntaxLibrary,
}

impl<'l> ScriptReader<'l> {
    pub fn new(library: &'l SyntaxLibrary) -> Self {
        Self { library }
    }

    pub fn read_file(&self, mut input: impl Read) -> Result<ScriptFile, CompilerError> {
        let mut text = String::new();
        input.read_to_string(&mut text)?;
        self.read_str(&text)
    }

    pub fn read_str(&self, xml: &str) -> Result<ScriptFile, CompilerError> {
        let document = Document::parse(xml)?;
        let root = document.root_element();
        let codearray = if root.has_tag_name("codearray") {
            root
        } else {
            root.children()
                .find(|n| n.has_tag_name("codearray"))
                .ok_or_else(|| {
                    FileFormatError::new(
                        format!("<{}>", root.tag_name().name()),
                        "no codearray node, not an MSCI script",
                    )
                })?
        };
        let array = codearray
            .children()
            .find(|n| n.is_element())
            .ok_or_else(|| FileFormatError::new("codearray", "codearray is empty"))?;

        let mut header = Cursor::over(array, "codearray")?;
        if header.len() != HEADER_SIZE {
            return Err(FileFormatError::new(
                "codearray",
                format!("expected {} header items, found {}", HEADER_SIZE, header.len()),
            )
            .into());
        }

        let name = header.next_string()?;
        let engine_version = header.next_int()?;
        let description = header.next_string()?;
        let format_version = header.next_int()?;
        let live = header.next_int()? != 0;
        let mut variable_list = header.next_array("variables")?;
        let mut standard_list = header.next_array("standard commands")?;
        let mut argument_list = header.next_array("arguments")?;
        let mut auxiliary_list = header.next_array("auxiliary commands")?;

        let version = GameVersion::from_engine_version(engine_version).ok_or_else(|| {
            FileFormatError::new(
                "codearray, item 1",
                format!("unknown engine version {}", engine_version),
            )
        })?;
        debug!(%name, engine_version, %version, "reading script");

        let mut variables = Vec::with_capacity(variable_list.len());
        while !variable_list.is_done() {
            let id = variables.len();
            variables.push(ScriptVariable::new(variable_list.next_string()?, id));
        }

        let mut arguments = Vec::with_capacity(argument_list.len());
        for index in 0..argument_list.len() {
            let mut entry = argument_list.next_array(format!("argument {}", index))?;
            let context = entry.item_context();
            let code = entry.next_int()?;
            let param_type = u8::try_from(code)
                .ok()
                .and_then(ParameterType::from_code)
                .ok_or_else(|| {
                    FileFormatError::new(context, format!("unknown argument type {}", code))
                })?;
            arguments.push(ScriptArgument {
                name: variables
                    .get(index)
                    .map_or_else(|| format!("argument{}", index + 1), |v| v.name.clone()),
                param_type,
                description: entry.next_string()?,
            });
        }

        let mut standard = Vec::with_capacity(standard_list.len());
        for index in 0..standard_list.len() {
            let mut cursor = standard_list.next_array(format!("standard command {}", index))?;
            standard.push(self.read_standard(&mut cursor, version)?);
        }

        let mut auxiliary = Vec::with_capacity(auxiliary_list.len());
        for index in 0..auxiliary_list.len() {
            let mut cursor = auxiliary_list.next_array(format!("auxiliary command {}", index))?;
            auxiliary.push(self.read_auxiliary(&mut cursor, version)?);
        }

        let mut commands = interlace(standard, auxiliary);
        for command in &mut commands {
            command.translate(&variables);
        }

        Ok(ScriptFile {
            name,
            description,
            engine_version,
            format_version,
            live,
            variables,
            arguments,
            commands,
        })
    }

    fn lookup(
        &self,
        cursor: &mut Cursor,
        version: GameVersion,
    ) -> Result<Arc<CommandSyntax>, CompilerError> {
        let context = cursor.item_context();
        let id = cursor.next_int()?;
        let id = u32::try_from(id)
            .map_err(|_| FileFormatError::new(context, format!("invalid command id {}", id)))?;
        Ok(self.library.find(id, version)?)
    }

    fn read_standard(
        &self,
        cursor: &mut Cursor,
        version: GameVersion,
    ) -> Result<ScriptCommand, CompilerError> {
        let syntax = self.lookup(cursor, version)?;
        let shape = CommandShape::of(syntax.kind);
        debug!(id = syntax.id, ?shape, context = %cursor.context, "decoding command");

        let parameters = match shape {
            CommandShape::Standard | CommandShape::Auxiliary => read_parameters(cursor, &syntax)?,
            CommandShape::ScriptCall => read_script_call(cursor, &syntax)?,
            CommandShape::Expression => read_expression(cursor, &syntax)?,
        };
        if !cursor.is_done() {
            debug!(
                id = syntax.id,
                unread = cursor.len() - cursor.pos,
                "ignoring trailing command data"
            );
        }
        Ok(ScriptCommand::new(syntax, parameters))
    }

    fn read_auxiliary(
        &self,
        cursor: &mut Cursor,
        version: GameVersion,
    ) -> Result<ScriptCommand, CompilerError> {
        let ref_index = cursor.next_index()?;
        let context = cursor.item_context();
        let syntax = self.lookup(cursor, version)?;
        if CommandShape::of(syntax.kind) != CommandShape::Auxiliary {
            return Err(FileFormatError::new(
                context,
                format!("command {} is not an auxiliary command", syntax.id),
            )
            .into());
        }

        let parameters = read_parameters(cursor, &syntax)?;
        let mut command = ScriptCommand::new(syntax, parameters);
        command.ref_index = Some(ref_index);
        Ok(command)
    }
}

fn read_parameter(
    cursor: &mut Cursor,
    formal: ParameterSyntax,
) -> Result<ScriptParameter, FileFormatError> {
    let parameter = if formal.param_type.is_bare_variable() {
        let index = cursor.next_int()?;
        ScriptParameter::new(formal, DataTypeKind::Variable, ParameterValue::Int(index))
    } else if formal.param_type.is_bare_string() {
        let text = cursor.next_string()?;
        ScriptParameter::new(formal, DataTypeKind::String, ParameterValue::Str(text))
    } else {
        let (data_type, value) = cursor.next_pair()?;
        ScriptParameter::new(formal, data_type, value)
    };
    Ok(parameter)
}

fn read_parameters(
    cursor: &mut Cursor,
    syntax: &CommandSyntax,
) -> Result<Vec<ScriptParameter>, FileFormatError> {
    syntax
        .physical_parameters()
        .into_iter()
        .map(|formal| read_parameter(cursor, formal.clone()))
        .collect()
}

/// Declared parameters, then an argument count and that many `(type, value)` pairs.
fn read_script_call(
    cursor: &mut Cursor,
    syntax: &CommandSyntax,
) -> Result<Vec<ScriptParameter>, FileFormatError> {
    let mut parameters = read_parameters(cursor, syntax)?;
    let count = cursor.next_index()?;

    for k in 0..count {
        let slot = u8::try_from(syntax.parameters.len() + k).unwrap_or(u8::MAX);
        let (data_type, value) = cursor.next_pair()?;
        parameters.push(ScriptParameter::new(
            ParameterSyntax::new(ParameterType::Argument, slot, slot),
            data_type,
            value,
        ));
    }
    Ok(parameters)
}

/// The result slot, the postfix operand array and the source-order index array.
fn read_expression(
    cursor: &mut Cursor,
    syntax: &CommandSyntax,
) -> Result<Vec<ScriptParameter>, FileFormatError> {
    let formal = syntax
        .return_parameter()
        .cloned()
        .unwrap_or_else(|| ParameterSyntax::new(ParameterType::ReturnValue, 0, 0));
    let result = cursor.next_int()?;

    let label = format!("{}, postfix", cursor.context);
    let mut postfix_list = cursor.next_array(label)?;
    let mut postfix = Vec::new();
    while !postfix_list.is_done() {
        let (data_type, value) = postfix_list.next_pair()?;
        postfix.push(Term { data_type, value });
    }

    let label = format!("{}, terms", cursor.context);
    let mut index_list = cursor.next_array(label)?;
    let mut indices = Vec::with_capacity(index_list.len());
    while !index_list.is_done() {
        indices.push(index_list.next_int()?);
    }

    let terms = reconstruct(&postfix, &indices)
        .map_err(|message| FileFormatError::new(index_list.context.as_str(), message))?;

    let mut parameters = vec![ScriptParameter::new(
        formal,
        DataTypeKind::Variable,
        ParameterValue::Int(result),
    )];
    parameters.extend(terms.into_iter().enumerate().map(|(i, term)| {
        let slot = u8::try_from(i + 1).unwrap_or(u8::MAX);
        ScriptParameter::new(
            ParameterSyntax::new(ParameterType::Expression, slot, slot),
            term.data_type,
            term.value,
        )
    }));
    Ok(parameters)
}

/// Merge auxiliary commands into the standard stream. An auxiliary command
/// with reference index `n` goes directly before standard command `n`;
/// ties keep their list order, and indexes past the end go last.
pub fn interlace(
    standard: Vec<ScriptCommand>,
    mut auxiliary: Vec<ScriptCommand>,
) -> Vec<ScriptCommand> {
    auxiliary.sort_by_key(|c| c.ref_index.unwrap_or(0));
    let mut pending = auxiliary.into_iter().peekable();
    let mut out = Vec::with_capacity(standard.len() + pending.len());

    for (index, command) in standard.into_iter().enumerate() {
        while let Some(aux) = pending.next_if(|c| c.ref_index.unwrap_or(0) <= index) {
            out.push(aux);
        }
        out.push(command);
    }
    out.extend(pending);
    out
}
