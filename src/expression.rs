//! Expressions: infix recognition for source text and the postfix encoding of compiled scripts.
//!
//! A compiled expression command stores its terms twice: once as postfix
//! tuples an interpreter can evaluate, and once as an index list in source
//! order, where a negative entry `-n` refers to postfix tuple `n` (one-based)
//! and a non-negative entry is an operator code.

use crate::command::{DataType, DataTypeKind, Operator, ParameterValue};
use crate::token::{Token, TokenKind};

/// One operand or operator of an expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Term {
    pub data_type: DataType,
    pub value: ParameterValue,
}

impl Term {
    pub fn new(data_type: impl Into<DataType>, value: ParameterValue) -> Self {
        Self {
            data_type: data_type.into(),
            value,
        }
    }

    pub fn operator(op: Operator) -> Self {
        Self::new(DataTypeKind::Operator, ParameterValue::Int(op.code()))
    }

    pub fn as_operator(&self) -> Option<Operator> {
        if self.data_type.kind != DataTypeKind::Operator {
            return None;
        }
        self.value.as_int().and_then(Operator::from_code)
    }
}

/// Both compiled forms of an expression. Only tests write compiled scripts.
#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Encoded {
    pub postfix: Vec<Term>,
    pub infix: Vec<i32>,
}

/// Check that `tokens` form an infix expression and convert them to terms, keeping source order.
///
/// `operand` turns a value token into a term, or returns `None` when the token cannot be one.
pub fn parse_infix(
    tokens: &[Token],
    mut operand: impl FnMut(&Token) -> Option<Term>,
) -> Result<Vec<Term>, String> {
    let mut terms = Vec::with_capacity(tokens.len());
    let mut expect_operand = true;
    let mut depth = 0usize;

    for token in tokens {
        if expect_operand {
            if token.is_operator("(") {
                terms.push(Term::operator(Operator::OpenBracket));
                depth += 1;
            } else if let Some(op) = prefix_operator(token) {
                terms.push(Term::operator(op));
            } else if let Some(term) = operand(token) {
                terms.push(term);
                expect_operand = false;
            } else {
                return Err(format!("expected a value, found '{}'", token.text));
            }
        } else if token.is_operator(")") {
            if depth == 0 {
                return Err("unmatched ')'".to_string());
            }
            depth -= 1;
            terms.push(Term::operator(Operator::CloseBracket));
        } else if let Some(op) = infix_operator(token) {
            terms.push(Term::operator(op));
            expect_operand = true;
        } else {
            return Err(format!("expected an operator, found '{}'", token.text));
        }
    }

    if terms.is_empty() {
        return Err("empty expression".to_string());
    }
    if expect_operand {
        return Err("expression ends without a value".to_string());
    }
    if depth > 0 {
        return Err("missing ')'".to_string());
    }
    Ok(terms)
}

fn prefix_operator(token: &Token) -> Option<Operator> {
    match token.kind {
        TokenKind::Operator | TokenKind::Keyword => Operator::unary(&token.text),
        _ => None,
    }
}

fn infix_operator(token: &Token) -> Option<Operator> {
    match token.kind {
        TokenKind::Operator | TokenKind::Text => Operator::binary(&token.text),
        _ => None,
    }
}

#[cfg(test)]
fn precedence(op: Operator) -> u8 {
    match op {
        Operator::Or => 1,
        Operator::And => 2,
        Operator::BitOr => 3,
        Operator::BitXor => 4,
        Operator::BitAnd => 5,
        Operator::Equal | Operator::NotEqual => 6,
        Operator::Less | Operator::LessEqual | Operator::Greater | Operator::GreaterEqual => 7,
        Operator::Add | Operator::Subtract => 8,
        Operator::Multiply | Operator::Divide | Operator::Modulus => 9,
        Operator::BitNot | Operator::Not | Operator::Minus => 10,
        Operator::OpenBracket | Operator::CloseBracket => 0,
    }
}

#[cfg(test)]
fn is_prefix(op: Operator) -> bool {
    matches!(op, Operator::BitNot | Operator::Not | Operator::Minus)
}

/// Compile source-order terms into postfix tuples and the source-order index list.
#[cfg(test)]
pub(crate) fn encode(terms: &[Term]) -> Encoded {
    let mut postfix: Vec<Term> = Vec::new();
    let mut infix = Vec::with_capacity(terms.len());
    let mut stack: Vec<Operator> = Vec::new();

    for term in terms {
        let Some(op) = term.as_operator() else {
            postfix.push(term.clone());
            infix.push(-(postfix.len() as i32));
            continue;
        };
        infix.push(op.code());

        match op {
            Operator::OpenBracket => stack.push(op),
            Operator::CloseBracket => {
                while let Some(top) = stack.pop() {
                    if top == Operator::OpenBracket {
                        break;
                    }
                    postfix.push(Term::operator(top));
                }
            }
            op if is_prefix(op) => stack.push(op),
            op => {
                while let Some(&top) = stack.last() {
                    if top == Operator::OpenBracket || precedence(top) < precedence(op) {
                        break;
                    }
                    postfix.push(Term::operator(top));
                    stack.pop();
                }
                stack.push(op);
            }
        }
    }

    while let Some(top) = stack.pop() {
        postfix.push(Term::operator(top));
    }
    Encoded { postfix, infix }
}

/// Rebuild the source-order terms from their compiled form.
pub fn reconstruct(postfix: &[Term], infix: &[i32]) -> Result<Vec<Term>, String> {
    infix
        .iter()
        .map(|&index| {
            if index < 0 {
                let position = (-(index as i64) - 1) as usize;
                postfix
                    .get(position)
                    .cloned()
                    .ok_or_else(|| format!("postfix reference {} out of range", index))
            } else {
                Operator::from_code(index)
                    .map(Term::operator)
                    .ok_or_else(|| format!("unknown operator code {}", index))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use pretty_assertions::assert_eq;

    fn operand(token: &Token) -> Option<Term> {
        match token.kind {
            TokenKind::Number => token
                .text
                .parse()
                .ok()
                .map(|n| Term::new(DataTypeKind::Integer, ParameterValue::Int(n))),
            TokenKind::Variable => Some(Term::new(
                DataTypeKind::Variable,
                ParameterValue::Str(token.value().to_string()),
            )),
            _ => None,
        }
    }

    fn int(n: i32) -> Term {
        Term::new(DataTypeKind::Integer, ParameterValue::Int(n))
    }

    #[test]
    fn test_parse_infix_keeps_source_order() {
        let terms = parse_infix(&tokenize("($a + 2) * -3"), operand).unwrap();
        let ops: Vec<Option<Operator>> = terms.iter().map(Term::as_operator).collect();
        assert_eq!(
            ops,
            vec![
                Some(Operator::OpenBracket),
                None,
                Some(Operator::Add),
                None,
                Some(Operator::CloseBracket),
                Some(Operator::Multiply),
                None,
            ]
        );
        assert_eq!(terms[6], int(-3));
    }

    #[test]
    fn test_parse_infix_word_operators() {
        let terms = parse_infix(&tokenize("not $a AND $b mod 2 == 0"), operand).unwrap();
        assert_eq!(terms[0].as_operator(), Some(Operator::Not));
        assert_eq!(terms[2].as_operator(), Some(Operator::And));
        assert_eq!(terms[4].as_operator(), Some(Operator::Modulus));
    }

    #[test]
    fn test_parse_infix_rejects_malformed() {
        assert!(parse_infix(&tokenize("$a +"), operand).is_err());
        assert!(parse_infix(&tokenize("$a $b"), operand).is_err());
        assert!(parse_infix(&tokenize("($a + 1"), operand).is_err());
        assert!(parse_infix(&tokenize("$a + 1)"), operand).is_err());
        assert!(parse_infix(&tokenize("get name"), operand).is_err());
        assert!(parse_infix(&[], operand).is_err());
    }

    #[test]
    fn test_reconstruct_resolves_back_references() {
        let a = int(1);
        let b = int(2);
        let terms = reconstruct(&[a.clone(), b.clone()], &[-1, -2, Operator::Add.code()]).unwrap();
        assert_eq!(terms, vec![a, b, Term::operator(Operator::Add)]);

        assert!(reconstruct(&[int(1)], &[-2]).is_err());
        assert!(reconstruct(&[], &[99]).is_err());
    }

    #[test]
    fn test_encode_respects_precedence() {
        // 1 + 2 * 3  =>  postfix 1 2 3 * +
        let terms = parse_infix(&tokenize("1 + 2 * 3"), operand).unwrap();
        let encoded = encode(&terms);
        assert_eq!(
            encoded.postfix,
            vec![
                int(1),
                int(2),
                int(3),
                Term::operator(Operator::Multiply),
                Term::operator(Operator::Add),
            ]
        );
        assert_eq!(
            encoded.infix,
            vec![-1, Operator::Add.code(), -2, Operator::Multiply.code(), -3]
        );
        assert_eq!(reconstruct(&encoded.postfix, &encoded.infix).unwrap(), terms);
    }

    #[test]
    fn test_encode_brackets() {
        // (1 - 2) - 3  =>  1 2 - 3 -
        let terms = parse_infix(&tokenize("(1 - 2) - 3"), operand).unwrap();
        let encoded = encode(&terms);
        let ops: Vec<Option<Operator>> = encoded.postfix.iter().map(Term::as_operator).collect();
        assert_eq!(
            ops,
            vec![None, None, Some(Operator::Subtract), None, Some(Operator::Subtract)]
        );
        assert_eq!(reconstruct(&encoded.postfix, &encoded.infix).unwrap(), terms);
    }
}
