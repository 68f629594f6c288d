//! Script source text to a tree of commands.
//!
//! Each line is classified by its leading keywords, stripped of them, and the
//! rest is resolved against the syntax library. The lines are then assembled
//! into branches following `if`/`while`/`skip if`/`else` and `end`.
//!
//! Parsing never stops early: a line that cannot be resolved becomes an
//! invalid node plus an `ErrorToken`, and the next line is parsed as usual.

use std::sync::Arc;

use tracing::debug;

use crate::command::{
    BranchLogic, DataTypeKind, ParameterValue, ReturnObject, ScriptCommand, ScriptParameter,
};
use crate::error::ErrorToken;
use crate::expression::{parse_infix, Term};
use crate::lexer::tokenize;
use crate::script::ScriptVariable;
use crate::syntax::library::Resolved;
use crate::syntax::{
    CommandKind, CommandSyntax, ParameterSyntax, ParameterType, SyntaxLibrary, CMD_COMMENT,
    CMD_EXPRESSION, CMD_NOP,
};
use crate::token::{Token, TokenKind};
use crate::version::GameVersion;

/// The branch logic a line's leading keywords spell, without parsing the rest.
pub fn classify(line: &str) -> BranchLogic {
    leading_logic(&tokenize(line)).0
}

/// Branch logic plus how many leading tokens encode it. `else`, `end`,
/// `break` and `continue` are commands in their own right and consume nothing.
fn leading_logic(tokens: &[Token]) -> (BranchLogic, usize) {
    let word = |i: usize, w: &str| tokens.get(i).is_some_and(|t| t.is_keyword(w));

    match tokens.first() {
        None => return (BranchLogic::Nop, 0),
        Some(first) if first.kind == TokenKind::Comment => return (BranchLogic::Nop, 0),
        _ => {}
    }

    if word(0, "if") {
        if word(1, "not") {
            (BranchLogic::IfNot, 2)
        } else {
            (BranchLogic::If, 1)
        }
    } else if word(0, "while") {
        if word(1, "not") {
            (BranchLogic::WhileNot, 2)
        } else {
            (BranchLogic::While, 1)
        }
    } else if word(0, "skip") && word(1, "if") {
        if word(2, "not") {
            (BranchLogic::SkipIfNot, 3)
        } else {
            (BranchLogic::SkipIf, 2)
        }
    } else if word(0, "do") && word(1, "if") {
        // "do if x" runs the next line when x holds, i.e. skips it when it does not
        if word(2, "not") {
            (BranchLogic::SkipIf, 3)
        } else {
            (BranchLogic::SkipIfNot, 2)
        }
    } else if word(0, "else") {
        match (word(1, "if"), word(2, "not")) {
            (true, true) => (BranchLogic::ElseIfNot, 3),
            (true, false) => (BranchLogic::ElseIf, 2),
            _ => (BranchLogic::Else, 0),
        }
    } else if word(0, "end") {
        (BranchLogic::End, 0)
    } else if word(0, "break") {
        (BranchLogic::Break, 0)
    } else if word(0, "continue") {
        (BranchLogic::Continue, 0)
    } else {
        (BranchLogic::None, 0)
    }
}

/// One source line and the command it resolved to.
#[derive(Debug, Clone)]
pub struct CommandNode {
    pub command: ScriptCommand,
    pub logic: BranchLogic,
    /// 1-based; the implicit root is line 0.
    pub line_number: usize,
    pub valid: bool,
    pub source: String,
}

impl CommandNode {
    /// Rendered command text, or the original source when the line did not resolve.
    pub fn text(&self) -> &str {
        if self.valid {
            &self.command.rendered_text
        } else {
            self.source.trim()
        }
    }
}

/// A line that opens a block, with the lines nested under it.
#[derive(Debug, Clone)]
pub struct BranchNode {
    pub node: CommandNode,
    pub children: Vec<ScriptNode>,
}

impl BranchNode {
    fn new(node: CommandNode) -> Self {
        Self {
            node,
            children: Vec::new(),
        }
    }

    /// Every node below this one, depth first.
    pub fn nodes(&self) -> Nodes<'_> {
        Nodes {
            stack: vec![self.children.iter()],
        }
    }
}

#[derive(Debug, Clone)]
pub enum ScriptNode {
    Command(CommandNode),
    Branch(BranchNode),
}

impl ScriptNode {
    pub fn node(&self) -> &CommandNode {
        match self {
            ScriptNode::Command(node) => node,
            ScriptNode::Branch(branch) => &branch.node,
        }
    }
}

pub struct Nodes<'a> {
    stack: Vec<std::slice::Iter<'a, ScriptNode>>,
}

impl<'a> Iterator for Nodes<'a> {
    type Item = &'a CommandNode;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let level = self.stack.last_mut()?;
            match level.next() {
                Some(ScriptNode::Command(node)) => return Some(node),
                Some(ScriptNode::Branch(branch)) => {
                    self.stack.push(branch.children.iter());
                    return Some(&branch.node);
                }
                None => {
                    self.stack.pop();
                }
            }
        }
    }
}

/// The outcome of parsing a script's source text.
#[derive(Debug, Clone)]
pub struct ParsedScript {
    pub root: BranchNode,
    /// Sorted by line.
    pub errors: Vec<ErrorToken>,
    /// In order of first appearance; a variable's id is its position.
    pub variables: Vec<ScriptVariable>,
}

impl ParsedScript {
    /// Every node that failed to resolve or breaks the branch structure.
    pub fn verify(&self) -> Vec<&CommandNode> {
        self.root.nodes().filter(|node| !node.valid).collect()
    }

    pub fn commands(&self) -> impl Iterator<Item = &ScriptCommand> {
        self.root.nodes().map(|node| &node.command)
    }

    /// The tree as indented script text.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        render_branch(&self.root, 0, &mut out);
        out
    }
}

fn render_branch(branch: &BranchNode, depth: usize, out: &mut String) {
    for child in &branch.children {
        match child {
            ScriptNode::Command(node) => {
                let level = if node.logic == BranchLogic::End {
                    depth.saturating_sub(1)
                } else {
                    depth
                };
                render_line(node, level, out);
            }
            ScriptNode::Branch(nested) => {
                let level = if nested.node.logic.is_else() {
                    depth.saturating_sub(1)
                } else {
                    depth
                };
                render_line(&nested.node, level, out);
                render_branch(nested, level + 1, out);
            }
        }
    }
}

fn render_line(node: &CommandNode, depth: usize, out: &mut String) {
    out.push_str(&"    ".repeat(depth));
    out.push_str(node.text());
    out.push('\n');
}

/// A problem found on one line, located by byte columns.
struct Problem {
    start: usize,
    end: usize,
    message: String,
}

impl Problem {
    fn over(tokens: &[Token], message: impl Into<String>) -> Self {
        Self {
            start: tokens.first().map_or(0, |t| t.start),
            end: tokens.last().map_or(0, |t| t.end),
            message: message.into(),
        }
    }

    fn at(token: &Token, message: impl Into<String>) -> Self {
        Self::over(std::slice::from_ref(token), message)
    }
}

pub struct TextParser<'a> {
    library: &'a SyntaxLibrary,
    version: GameVersion,
    variables: Vec<ScriptVariable>,
    errors: Vec<ErrorToken>,
}

impl<'a> TextParser<'a> {
    pub fn new(library: &'a SyntaxLibrary, version: GameVersion) -> Self {
        Self {
            library,
            version,
            variables: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn parse<S: AsRef<str>>(mut self, lines: &[S]) -> ParsedScript {
        let nodes: Vec<CommandNode> = lines
            .iter()
            .enumerate()
            .map(|(index, line)| self.parse_line(index + 1, line.as_ref()))
            .collect();

        let root = CommandNode {
            command: ScriptCommand::new(self.builtin(CMD_NOP), Vec::new()),
            logic: BranchLogic::None,
            line_number: 0,
            valid: true,
            source: String::new(),
        };
        let root = TreeBuilder::new(root, &mut self.errors).build(nodes);

        self.errors.sort_by_key(|e| (e.line, e.start));
        ParsedScript {
            root,
            errors: self.errors,
            variables: self.variables,
        }
    }

    fn parse_line(&mut self, line_number: usize, text: &str) -> CommandNode {
        let tokens = tokenize(text);
        let (logic, used) = leading_logic(&tokens);

        let result = match logic {
            BranchLogic::Nop => Ok(self.auxiliary(&tokens)),
            logic if logic.is_conditional() => {
                self.conditional(logic, &tokens[..used], &tokens[used..])
            }
            _ => self.command(&tokens),
        };

        let (command, valid) = match result {
            Ok(mut command) => {
                command.translate(&self.variables);
                debug!(
                    line = line_number,
                    id = command.id(),
                    text = %command.rendered_text,
                    "parsed line"
                );
                (command, true)
            }
            Err(problem) => {
                self.errors.push(ErrorToken::new(
                    line_number,
                    problem.start,
                    problem.end,
                    problem.message,
                ));
                (ScriptCommand::new(Arc::new(CommandSyntax::unknown()), Vec::new()), false)
            }
        };

        CommandNode {
            command,
            logic,
            line_number,
            valid,
            source: text.to_string(),
        }
    }

    fn builtin(&self, id: u32) -> Arc<CommandSyntax> {
        self.library.find(id, self.version).unwrap_or_else(|_| {
            Arc::new(match id {
                CMD_COMMENT => CommandSyntax::comment(),
                _ => CommandSyntax::nop(),
            })
        })
    }

    /// Empty and comment-only lines.
    fn auxiliary(&self, tokens: &[Token]) -> ScriptCommand {
        match tokens.first() {
            Some(comment) if comment.kind == TokenKind::Comment => {
                let syntax = self.builtin(CMD_COMMENT);
                let parameter = ScriptParameter::new(
                    ParameterSyntax::new(ParameterType::Comment, 0, 0),
                    DataTypeKind::String,
                    ParameterValue::Str(comment.value().to_string()),
                );
                ScriptCommand::new(syntax, vec![parameter])
            }
            _ => ScriptCommand::new(self.builtin(CMD_NOP), Vec::new()),
        }
    }

    fn conditional(
        &mut self,
        logic: BranchLogic,
        keywords: &[Token],
        body: &[Token],
    ) -> Result<ScriptCommand, Problem> {
        if body.is_empty() {
            return Err(Problem::over(
                keywords,
                format!("missing condition after '{}'", logic.keywords()),
            ));
        }
        self.resolve(body, Some(ReturnObject::Conditional { logic, jump: 0 }))
    }

    fn command(&mut self, tokens: &[Token]) -> Result<ScriptCommand, Problem> {
        match tokens {
            [target, assign, body @ ..]
                if target.kind == TokenKind::Variable && assign.is_operator("=") =>
            {
                if body.is_empty() {
                    return Err(Problem::over(&tokens[..2], "missing value after '='"));
                }
                let id = self.variable(target.value());
                self.resolve(body, Some(ReturnObject::Variable(id)))
            }
            _ => self.resolve(tokens, None),
        }
    }

    fn resolve(
        &mut self,
        body: &[Token],
        result: Option<ReturnObject>,
    ) -> Result<ScriptCommand, Problem> {
        match self.library.resolve(body, self.version) {
            Ok(resolved) => self.build(resolved, result, body),
            Err(not_found) => {
                if result.is_some() {
                    if let Some(command) = self.expression(body, result) {
                        return Ok(command);
                    }
                }
                Err(Problem::over(body, not_found.to_string()))
            }
        }
    }

    fn build(
        &mut self,
        resolved: Resolved,
        result: Option<ReturnObject>,
        body: &[Token],
    ) -> Result<ScriptCommand, Problem> {
        let syntax = resolved.syntax;
        let mut parameters: Vec<ScriptParameter> = Vec::with_capacity(syntax.parameters.len());

        for (token, marker) in resolved.slots.iter().zip(syntax.slot_markers()) {
            let Some(formal) = syntax.parameter_by_display(marker) else {
                continue;
            };
            parameters.push(self.parameter(formal.clone(), token)?);
        }

        match syntax.return_parameter() {
            Some(formal) => {
                if !parameters.iter().any(|p| p.syntax.param_type.is_return_value()) {
                    let object = result.unwrap_or(ReturnObject::Discard);
                    parameters.push(ScriptParameter::new(
                        formal.clone(),
                        DataTypeKind::Variable,
                        ParameterValue::Int(object.encode()),
                    ));
                }
            }
            None if result.is_some() => {
                return Err(Problem::over(
                    body,
                    format!("'{}' does not return a value", syntax.plain_template()),
                ));
            }
            None => {}
        }

        for formal in &syntax.parameters {
            if parameters.iter().any(|p| p.syntax.physical_index == formal.physical_index) {
                continue;
            }
            if !formal.is_optional {
                return Err(Problem::over(
                    body,
                    format!("missing value for parameter ${}", formal.display_index),
                ));
            }
            parameters.push(ScriptParameter::new(
                formal.clone(),
                DataTypeKind::Null,
                ParameterValue::Int(0),
            ));
        }

        if syntax.kind == CommandKind::ScriptCall {
            self.arguments(&resolved.trailing, syntax.parameters.len(), &mut parameters)?;
        }

        parameters.sort_by_key(|p| p.syntax.physical_index);
        Ok(ScriptCommand::new(syntax, parameters))
    }

    /// Script call arguments, written `name = value` or as bare values.
    fn arguments(
        &mut self,
        trailing: &[Token],
        first_index: usize,
        parameters: &mut Vec<ScriptParameter>,
    ) -> Result<(), Problem> {
        let mut pos = 0;
        let mut index = first_index;

        while pos < trailing.len() {
            let named = matches!(trailing[pos].kind, TokenKind::Text | TokenKind::Label)
                && trailing.get(pos + 1).is_some_and(|t| t.is_operator("="));
            if named {
                pos += 2;
            }
            let Some(token) = trailing.get(pos) else {
                return Err(Problem::at(&trailing[pos - 1], "missing argument value"));
            };

            let slot = u8::try_from(index).unwrap_or(u8::MAX);
            let formal = ParameterSyntax::new(ParameterType::Argument, slot, slot);
            parameters.push(self.parameter(formal, token)?);
            index += 1;
            pos += 1;
        }
        Ok(())
    }

    fn parameter(
        &mut self,
        formal: ParameterSyntax,
        token: &Token,
    ) -> Result<ScriptParameter, Problem> {
        if formal.param_type.is_return_value() {
            if token.kind != TokenKind::Variable {
                return Err(Problem::at(token, "expected a variable to store the result in"));
            }
            let object = ReturnObject::Variable(self.variable(token.value()));
            return Ok(ScriptParameter::new(
                formal,
                DataTypeKind::Variable,
                ParameterValue::Int(object.encode()),
            ));
        }

        let (kind, value) = match token.kind {
            TokenKind::Variable => {
                let id = self.variable(token.value());
                (DataTypeKind::Variable, ParameterValue::Int(id as i32))
            }
            TokenKind::Number => {
                let n = token.text.parse::<i32>().map_err(|_| {
                    Problem::at(token, format!("'{}' is not a whole number", token.text))
                })?;
                (DataTypeKind::Integer, ParameterValue::Int(n))
            }
            TokenKind::String => (DataTypeKind::String, ParameterValue::Str(token.unescaped())),
            TokenKind::GameObjectRef => (
                object_kind(formal.param_type),
                ParameterValue::Str(token.value().to_string()),
            ),
            TokenKind::ScriptObjectRef => (
                DataTypeKind::Constant,
                ParameterValue::Str(token.value().to_string()),
            ),
            TokenKind::Null => (DataTypeKind::Null, ParameterValue::Int(0)),
            _ if formal.param_type.is_name() => {
                (DataTypeKind::String, ParameterValue::Str(token.text.clone()))
            }
            _ => {
                let message = format!(
                    "expected a value for ${}, found '{}'",
                    formal.display_index, token.text
                );
                return Err(Problem::at(token, message));
            }
        };
        Ok(ScriptParameter::new(formal, kind, value))
    }

    /// An assignment or condition written as an infix expression.
    fn expression(
        &mut self,
        body: &[Token],
        result: Option<ReturnObject>,
    ) -> Option<ScriptCommand> {
        let syntax = self.library.find(CMD_EXPRESSION, self.version).ok()?;

        let known = self.variables.len();
        let terms = match parse_infix(body, |token| self.operand(token)) {
            Ok(terms) => terms,
            Err(message) => {
                debug!(%message, "not an expression");
                self.variables.truncate(known);
                return None;
            }
        };

        let formal = syntax
            .return_parameter()
            .cloned()
            .unwrap_or_else(|| ParameterSyntax::new(ParameterType::ReturnValue, 0, 0));
        let object = result.unwrap_or(ReturnObject::Discard);
        let mut parameters = vec![ScriptParameter::new(
            formal,
            DataTypeKind::Variable,
            ParameterValue::Int(object.encode()),
        )];
        parameters.extend(terms.into_iter().enumerate().map(|(i, term)| {
            let slot = u8::try_from(i + 1).unwrap_or(u8::MAX);
            ScriptParameter::new(
                ParameterSyntax::new(ParameterType::Expression, slot, slot),
                term.data_type,
                term.value,
            )
        }));
        Some(ScriptCommand::new(syntax, parameters))
    }

    fn operand(&mut self, token: &Token) -> Option<Term> {
        let term = match token.kind {
            TokenKind::Variable => Term::new(
                DataTypeKind::Variable,
                ParameterValue::Int(self.variable(token.value()) as i32),
            ),
            TokenKind::Number => Term::new(
                DataTypeKind::Integer,
                ParameterValue::Int(token.text.parse().ok()?),
            ),
            TokenKind::String => {
                Term::new(DataTypeKind::String, ParameterValue::Str(token.unescaped()))
            }
            TokenKind::Null => Term::new(DataTypeKind::Null, ParameterValue::Int(0)),
            TokenKind::ScriptObjectRef => Term::new(
                DataTypeKind::Constant,
                ParameterValue::Str(token.value().to_string()),
            ),
            TokenKind::GameObjectRef => Term::new(
                DataTypeKind::Object,
                ParameterValue::Str(token.value().to_string()),
            ),
            _ => return None,
        };
        Some(term)
    }

    /// The id of variable `name`, registering it on first sight.
    fn variable(&mut self, name: &str) -> usize {
        if let Some(existing) = self.variables.iter().find(|v| v.name == name) {
            return existing.id;
        }
        let id = self.variables.len();
        self.variables.push(ScriptVariable::new(name, id));
        id
    }
}

fn object_kind(param_type: ParameterType) -> DataTypeKind {
    match param_type {
        ParameterType::VarShip => DataTypeKind::Ship,
        ParameterType::VarStation => DataTypeKind::Station,
        ParameterType::VarSector => DataTypeKind::Sector,
        ParameterType::VarWare => DataTypeKind::Ware,
        ParameterType::VarRace => DataTypeKind::Race,
        ParameterType::VarRelation => DataTypeKind::Relation,
        ParameterType::VarStationSerial => DataTypeKind::StationSerial,
        ParameterType::VarClass => DataTypeKind::ObjectClass,
        ParameterType::VarQuest => DataTypeKind::Quest,
        ParameterType::VarObjectCommand => DataTypeKind::ObjectCommand,
        ParameterType::VarWingCommand => DataTypeKind::WingCommand,
        ParameterType::VarPassenger => DataTypeKind::Passenger,
        _ => DataTypeKind::Object,
    }
}

/// Assembles parsed lines into branches.
struct TreeBuilder<'e> {
    stack: Vec<BranchNode>,
    errors: &'e mut Vec<ErrorToken>,
}

impl<'e> TreeBuilder<'e> {
    fn new(root: CommandNode, errors: &'e mut Vec<ErrorToken>) -> Self {
        Self {
            stack: vec![BranchNode::new(root)],
            errors,
        }
    }

    fn top_logic(&self) -> BranchLogic {
        self.stack.last().map_or(BranchLogic::None, |b| b.node.logic)
    }

    fn flag(&mut self, node: &mut CommandNode, message: impl Into<String>) {
        node.valid = false;
        self.errors.push(ErrorToken::new(
            node.line_number,
            0,
            node.source.len(),
            message,
        ));
    }

    fn build(mut self, nodes: Vec<CommandNode>) -> BranchNode {
        for mut node in nodes {
            let logic = node.logic;
            match logic {
                logic if logic.is_else() => {
                    if self.top_logic().is_else() {
                        self.close();
                    }
                    if self.top_logic().is_if() {
                        self.stack.push(BranchNode::new(node));
                    } else {
                        let message = format!("'{}' without a matching 'if'", logic.keywords());
                        self.flag(&mut node, message);
                        self.attach(ScriptNode::Command(node));
                    }
                }
                logic if logic.opens_branch() => {
                    if self.top_logic().is_skip() {
                        self.flag(
                            &mut node,
                            "a skip condition must be followed by a single command",
                        );
                    }
                    self.stack.push(BranchNode::new(node));
                }
                BranchLogic::End => {
                    if self.top_logic().is_else() {
                        self.close();
                    }
                    let open = self.top_logic();
                    if self.stack.len() > 1 && (open.is_if() || open.is_loop()) {
                        if let Some(branch) = self.stack.last_mut() {
                            branch.children.push(ScriptNode::Command(node));
                        }
                        self.close();
                    } else {
                        self.flag(&mut node, "'end' without an open 'if' or 'while'");
                        self.attach(ScriptNode::Command(node));
                    }
                }
                BranchLogic::Break | BranchLogic::Continue => {
                    if !self.stack.iter().any(|b| b.node.logic.is_loop()) {
                        let message = format!("'{}' outside of a 'while' loop", logic.keywords());
                        self.flag(&mut node, message);
                    }
                    self.attach(ScriptNode::Command(node));
                }
                _ => self.attach(ScriptNode::Command(node)),
            }
        }

        while self.stack.len() > 1 {
            let Some(mut branch) = self.stack.pop() else { break };
            let logic = branch.node.logic;
            if logic.is_if() || logic.is_loop() {
                self.flag(&mut branch.node, format!("'{}' is missing its 'end'", logic.keywords()));
            } else if logic.is_skip() {
                let message = format!("'{}' has no command to skip", logic.keywords());
                self.flag(&mut branch.node, message);
            }
            self.attach(ScriptNode::Branch(branch));
        }

        self.stack.pop().unwrap_or_else(|| BranchNode::new(CommandNode {
            command: ScriptCommand::new(Arc::new(CommandSyntax::nop()), Vec::new()),
            logic: BranchLogic::None,
            line_number: 0,
            valid: true,
            source: String::new(),
        }))
    }

    /// Close the innermost branch into its parent.
    fn close(&mut self) {
        if self.stack.len() > 1 {
            if let Some(branch) = self.stack.pop() {
                self.attach(ScriptNode::Branch(branch));
            }
        }
    }

    /// Add a child to the innermost branch. A skip branch closes once it holds a command.
    fn attach(&mut self, child: ScriptNode) {
        let mut child = child;
        loop {
            let depth = self.stack.len();
            let Some(top) = self.stack.last_mut() else { return };
            let closes_skip =
                depth > 1 && top.node.logic.is_skip() && child.node().logic != BranchLogic::Nop;
            top.children.push(child);
            if !closes_skip {
                return;
            }
            match self.stack.pop() {
                Some(skip) => child = ScriptNode::Branch(skip),
                None => return,
            }
        }
    }
}
