//! Evaluation of compiled expression fragments
//!
//! The in-memory store receives the same flat wire fragments a remote
//! store would: an expression string over `#n`/`:v` placeholders plus the
//! two placeholder maps. This module parses that dialect back into a tree
//! and evaluates it against wire items. Placeholders are resolved at parse
//! time, so evaluation never touches the maps.

use alembic_core::{add_numbers, cmp_values, AlembicError, AttrValue, Result, WireItem};
use std::cmp::Ordering;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Name(String),
    Value(String),
    Ident(String),
    LParen,
    RParen,
    Comma,
    Dot,
    Plus,
    Minus,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

fn parse_error(msg: impl Into<String>) -> AlembicError {
    AlembicError::Expression(msg.into())
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '=' => {
                tokens.push(Token::Eq);
                i += 1;
            }
            '<' => match chars.get(i + 1) {
                Some('>') => {
                    tokens.push(Token::Ne);
                    i += 2;
                }
                Some('=') => {
                    tokens.push(Token::Le);
                    i += 2;
                }
                _ => {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            },
            '>' => match chars.get(i + 1) {
                Some('=') => {
                    tokens.push(Token::Ge);
                    i += 2;
                }
                _ => {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            },
            '#' | ':' => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                if word.len() == 1 {
                    return Err(parse_error(format!("dangling '{}' in expression", c)));
                }
                if c == '#' {
                    tokens.push(Token::Name(word));
                } else {
                    tokens.push(Token::Value(word));
                }
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(parse_error(format!("unexpected character '{}'", other))),
        }
    }

    Ok(tokens)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum CmpKind {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// A condition tree with placeholders already resolved.
#[derive(Debug, Clone)]
pub(crate) enum Cond {
    Cmp {
        path: Vec<String>,
        op: CmpKind,
        value: AttrValue,
    },
    Between {
        path: Vec<String>,
        low: AttrValue,
        high: AttrValue,
    },
    And(Box<Cond>, Box<Cond>),
    Or(Box<Cond>, Box<Cond>),
    Not(Box<Cond>),
    Exists(Vec<String>),
    NotExists(Vec<String>),
    BeginsWith {
        path: Vec<String>,
        prefix: AttrValue,
    },
    Contains {
        path: Vec<String>,
        value: AttrValue,
    },
}

#[derive(Debug, Clone)]
pub(crate) enum SetRhs {
    Value(AttrValue),
    IfNotExists(Vec<String>, AttrValue),
    Plus(Vec<String>, AttrValue),
    Minus(Vec<String>, AttrValue),
}

/// One resolved update action.
#[derive(Debug, Clone)]
pub(crate) enum UpdateOp {
    Set(Vec<String>, SetRhs),
    Remove(Vec<String>),
    Add(Vec<String>, AttrValue),
    Delete(Vec<String>, AttrValue),
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    names: &'a BTreeMap<String, String>,
    values: &'a BTreeMap<String, AttrValue>,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<Token> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| parse_error("unexpected end of expression"))?;
        self.pos += 1;
        Ok(token)
    }

    fn expect(&mut self, want: Token) -> Result<()> {
        let got = self.next()?;
        if got == want {
            Ok(())
        } else {
            Err(parse_error(format!("expected {:?}, got {:?}", want, got)))
        }
    }

    fn expect_keyword(&mut self, word: &str) -> Result<()> {
        match self.next()? {
            Token::Ident(ident) if ident == word => Ok(()),
            got => Err(parse_error(format!("expected {}, got {:?}", word, got))),
        }
    }

    fn resolve_name(&self, placeholder: &str) -> Result<String> {
        self.names
            .get(placeholder)
            .cloned()
            .ok_or_else(|| parse_error(format!("unresolved name placeholder '{}'", placeholder)))
    }

    fn resolve_value(&mut self) -> Result<AttrValue> {
        match self.next()? {
            Token::Value(placeholder) => self.values.get(&placeholder).cloned().ok_or_else(|| {
                parse_error(format!("unresolved value placeholder '{}'", placeholder))
            }),
            got => Err(parse_error(format!("expected value placeholder, got {:?}", got))),
        }
    }

    /// `#nX(.#nY)*`, resolved to field names.
    fn path(&mut self) -> Result<Vec<String>> {
        let mut segments = Vec::new();
        loop {
            match self.next()? {
                Token::Name(placeholder) => segments.push(self.resolve_name(&placeholder)?),
                got => return Err(parse_error(format!("expected path, got {:?}", got))),
            }
            if self.peek() == Some(&Token::Dot) {
                self.pos += 1;
            } else {
                return Ok(segments);
            }
        }
    }

    fn condition(&mut self) -> Result<Cond> {
        let mut left = self.and_condition()?;
        while let Some(Token::Ident(word)) = self.peek() {
            if word != "OR" {
                break;
            }
            self.pos += 1;
            let right = self.and_condition()?;
            left = Cond::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_condition(&mut self) -> Result<Cond> {
        let mut left = self.unary_condition()?;
        while let Some(Token::Ident(word)) = self.peek() {
            if word != "AND" {
                break;
            }
            self.pos += 1;
            let right = self.unary_condition()?;
            left = Cond::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary_condition(&mut self) -> Result<Cond> {
        if let Some(Token::Ident(word)) = self.peek() {
            if word == "NOT" {
                self.pos += 1;
                return Ok(Cond::Not(Box::new(self.unary_condition()?)));
            }
        }
        self.primary_condition()
    }

    fn primary_condition(&mut self) -> Result<Cond> {
        match self.peek() {
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.condition()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(_)) => self.function_condition(),
            Some(Token::Name(_)) => self.comparison(),
            got => Err(parse_error(format!("expected condition, got {:?}", got))),
        }
    }

    fn function_condition(&mut self) -> Result<Cond> {
        let name = match self.next()? {
            Token::Ident(name) => name,
            got => return Err(parse_error(format!("expected function, got {:?}", got))),
        };
        self.expect(Token::LParen)?;
        let cond = match name.as_str() {
            "attribute_exists" => Cond::Exists(self.path()?),
            "attribute_not_exists" => Cond::NotExists(self.path()?),
            "begins_with" => {
                let path = self.path()?;
                self.expect(Token::Comma)?;
                let prefix = self.resolve_value()?;
                Cond::BeginsWith { path, prefix }
            }
            "contains" => {
                let path = self.path()?;
                self.expect(Token::Comma)?;
                let value = self.resolve_value()?;
                Cond::Contains { path, value }
            }
            other => return Err(parse_error(format!("unknown function '{}'", other))),
        };
        self.expect(Token::RParen)?;
        Ok(cond)
    }

    fn comparison(&mut self) -> Result<Cond> {
        let path = self.path()?;
        match self.next()? {
            Token::Eq => Ok(Cond::Cmp {
                path,
                op: CmpKind::Eq,
                value: self.resolve_value()?,
            }),
            Token::Ne => Ok(Cond::Cmp {
                path,
                op: CmpKind::Ne,
                value: self.resolve_value()?,
            }),
            Token::Lt => Ok(Cond::Cmp {
                path,
                op: CmpKind::Lt,
                value: self.resolve_value()?,
            }),
            Token::Le => Ok(Cond::Cmp {
                path,
                op: CmpKind::Le,
                value: self.resolve_value()?,
            }),
            Token::Gt => Ok(Cond::Cmp {
                path,
                op: CmpKind::Gt,
                value: self.resolve_value()?,
            }),
            Token::Ge => Ok(Cond::Cmp {
                path,
                op: CmpKind::Ge,
                value: self.resolve_value()?,
            }),
            Token::Ident(word) if word == "BETWEEN" => {
                let low = self.resolve_value()?;
                self.expect_keyword("AND")?;
                let high = self.resolve_value()?;
                Ok(Cond::Between { path, low, high })
            }
            got => Err(parse_error(format!("expected comparator, got {:?}", got))),
        }
    }

    fn update(&mut self) -> Result<Vec<UpdateOp>> {
        let mut ops = Vec::new();
        while let Some(token) = self.peek().cloned() {
            let section = match token {
                Token::Ident(word) => word,
                got => return Err(parse_error(format!("expected update verb, got {:?}", got))),
            };
            self.pos += 1;
            match section.as_str() {
                "SET" => self.clauses(&mut ops, Self::set_clause)?,
                "REMOVE" => self.clauses(&mut ops, |p| Ok(UpdateOp::Remove(p.path()?)))?,
                "ADD" => self.clauses(&mut ops, |p| {
                    Ok(UpdateOp::Add(p.path()?, p.resolve_value()?))
                })?,
                "DELETE" => self.clauses(&mut ops, |p| {
                    Ok(UpdateOp::Delete(p.path()?, p.resolve_value()?))
                })?,
                other => return Err(parse_error(format!("unknown update verb '{}'", other))),
            }
        }
        if ops.is_empty() {
            return Err(parse_error("update expression has no actions"));
        }
        Ok(ops)
    }

    /// Comma-separated clauses until the next section verb or the end.
    fn clauses(
        &mut self,
        ops: &mut Vec<UpdateOp>,
        clause: impl Fn(&mut Self) -> Result<UpdateOp>,
    ) -> Result<()> {
        loop {
            ops.push(clause(self)?);
            if self.peek() == Some(&Token::Comma) {
                self.pos += 1;
            } else {
                return Ok(());
            }
        }
    }

    fn set_clause(&mut self) -> Result<UpdateOp> {
        let path = self.path()?;
        self.expect(Token::Eq)?;
        let rhs = match self.peek() {
            Some(Token::Value(_)) => SetRhs::Value(self.resolve_value()?),
            Some(Token::Ident(word)) if word == "if_not_exists" => {
                self.pos += 1;
                self.expect(Token::LParen)?;
                let source = self.path()?;
                self.expect(Token::Comma)?;
                let default = self.resolve_value()?;
                self.expect(Token::RParen)?;
                SetRhs::IfNotExists(source, default)
            }
            Some(Token::Name(_)) => {
                let operand = self.path()?;
                match self.next()? {
                    Token::Plus => SetRhs::Plus(operand, self.resolve_value()?),
                    Token::Minus => SetRhs::Minus(operand, self.resolve_value()?),
                    got => {
                        return Err(parse_error(format!("expected + or -, got {:?}", got)))
                    }
                }
            }
            got => return Err(parse_error(format!("expected SET operand, got {:?}", got))),
        };
        Ok(UpdateOp::Set(path, rhs))
    }

    fn finish(&self) -> Result<()> {
        if self.pos == self.tokens.len() {
            Ok(())
        } else {
            Err(parse_error(format!(
                "trailing tokens after expression: {:?}",
                &self.tokens[self.pos..]
            )))
        }
    }
}

/// Parse a condition fragment back into an evaluable tree.
pub(crate) fn parse_condition(
    expression: &str,
    names: &BTreeMap<String, String>,
    values: &BTreeMap<String, AttrValue>,
) -> Result<Cond> {
    let mut parser = Parser {
        tokens: tokenize(expression)?,
        pos: 0,
        names,
        values,
    };
    let cond = parser.condition()?;
    parser.finish()?;
    Ok(cond)
}

/// Parse an update fragment into its resolved actions.
pub(crate) fn parse_update(
    expression: &str,
    names: &BTreeMap<String, String>,
    values: &BTreeMap<String, AttrValue>,
) -> Result<Vec<UpdateOp>> {
    let mut parser = Parser {
        tokens: tokenize(expression)?,
        pos: 0,
        names,
        values,
    };
    let ops = parser.update()?;
    parser.finish()?;
    Ok(ops)
}

fn lookup<'a>(item: &'a WireItem, path: &[String]) -> Option<&'a AttrValue> {
    let (first, rest) = path.split_first()?;
    let mut current = item.get(first)?;
    for segment in rest {
        current = match current {
            AttrValue::M(m) => m.get(segment)?,
            _ => return None,
        };
    }
    Some(current)
}

fn cmp_matches(op: CmpKind, ordering: Ordering) -> bool {
    match op {
        CmpKind::Eq => ordering == Ordering::Equal,
        CmpKind::Ne => ordering != Ordering::Equal,
        CmpKind::Lt => ordering == Ordering::Less,
        CmpKind::Le => ordering != Ordering::Greater,
        CmpKind::Gt => ordering == Ordering::Greater,
        CmpKind::Ge => ordering != Ordering::Less,
    }
}

/// Evaluate a condition tree against one item. A comparison on a missing
/// path is false, so its negation through `NOT` is true.
pub(crate) fn eval_condition(cond: &Cond, item: &WireItem) -> bool {
    match cond {
        Cond::Cmp { path, op, value } => match lookup(item, path) {
            // All comparators share cmp_values, so equality is numeric for
            // N values just like the ordering operators.
            Some(actual) => cmp_matches(*op, cmp_values(actual, value)),
            None => false,
        },
        Cond::Between { path, low, high } => match lookup(item, path) {
            Some(actual) => {
                cmp_values(actual, low) != Ordering::Less
                    && cmp_values(actual, high) != Ordering::Greater
            }
            None => false,
        },
        Cond::And(a, b) => eval_condition(a, item) && eval_condition(b, item),
        Cond::Or(a, b) => eval_condition(a, item) || eval_condition(b, item),
        Cond::Not(inner) => !eval_condition(inner, item),
        Cond::Exists(path) => lookup(item, path).is_some(),
        Cond::NotExists(path) => lookup(item, path).is_none(),
        Cond::BeginsWith { path, prefix } => match (lookup(item, path), prefix) {
            (Some(AttrValue::S(s)), AttrValue::S(p)) => s.starts_with(p.as_str()),
            _ => false,
        },
        Cond::Contains { path, value } => match lookup(item, path) {
            Some(AttrValue::S(s)) => match value {
                AttrValue::S(needle) => s.contains(needle.as_str()),
                _ => false,
            },
            Some(AttrValue::L(items)) => items.contains(value),
            Some(AttrValue::Ss(set)) => match value {
                AttrValue::S(s) => set.contains(s),
                _ => false,
            },
            Some(AttrValue::Ns(set)) => match value {
                AttrValue::N(n) => set.contains(n),
                _ => false,
            },
            _ => false,
        },
    }
}

fn negate(value: &AttrValue) -> Result<AttrValue> {
    if let Ok(n) = value.as_i64() {
        return Ok(AttrValue::N((-n).to_string()));
    }
    Ok(AttrValue::N((-value.as_f64()?).to_string()))
}

fn set_at(item: &mut WireItem, path: &[String], value: AttrValue) -> Result<()> {
    let (last, init) = path
        .split_last()
        .ok_or_else(|| parse_error("empty path in update"))?;
    let mut map = item;
    for segment in init {
        let entry = map
            .entry(segment.clone())
            .or_insert_with(|| AttrValue::M(BTreeMap::new()));
        map = match entry {
            AttrValue::M(m) => m,
            _ => {
                return Err(parse_error(format!(
                    "path segment '{}' is not a map",
                    segment
                )))
            }
        };
    }
    map.insert(last.clone(), value);
    Ok(())
}

fn remove_at(item: &mut WireItem, path: &[String]) {
    let Some((last, init)) = path.split_last() else {
        return;
    };
    let mut map = item;
    for segment in init {
        map = match map.get_mut(segment) {
            Some(AttrValue::M(m)) => m,
            _ => return,
        };
    }
    map.remove(last);
}

/// Apply resolved update actions to an item in place.
pub(crate) fn apply_update(item: &mut WireItem, ops: &[UpdateOp]) -> Result<()> {
    for op in ops {
        match op {
            UpdateOp::Set(path, rhs) => {
                let value = match rhs {
                    SetRhs::Value(v) => v.clone(),
                    SetRhs::IfNotExists(source, default) => lookup(item, source)
                        .cloned()
                        .unwrap_or_else(|| default.clone()),
                    SetRhs::Plus(operand, v) => {
                        let current = lookup(item, operand).ok_or_else(|| {
                            parse_error(format!("operand '{}' is missing", operand.join(".")))
                        })?;
                        add_numbers(current, v)?
                    }
                    SetRhs::Minus(operand, v) => {
                        let current = lookup(item, operand).ok_or_else(|| {
                            parse_error(format!("operand '{}' is missing", operand.join(".")))
                        })?;
                        add_numbers(current, &negate(v)?)?
                    }
                };
                set_at(item, path, value)?;
            }
            UpdateOp::Remove(path) => remove_at(item, path),
            UpdateOp::Add(path, value) => {
                let next = match (lookup(item, path), value) {
                    (None, v) => v.clone(),
                    (Some(current @ AttrValue::N(_)), v @ AttrValue::N(_)) => {
                        add_numbers(current, v)?
                    }
                    (Some(AttrValue::Ss(current)), AttrValue::Ss(extra)) => {
                        AttrValue::Ss(current.union(extra).cloned().collect())
                    }
                    (Some(AttrValue::Ns(current)), AttrValue::Ns(extra)) => {
                        AttrValue::Ns(current.union(extra).cloned().collect())
                    }
                    (Some(other), _) => {
                        return Err(parse_error(format!(
                            "ADD needs a number or set target, got {:?}",
                            other
                        )))
                    }
                };
                set_at(item, path, next)?;
            }
            UpdateOp::Delete(path, value) => {
                let next = match (lookup(item, path), value) {
                    (None, _) => continue,
                    (Some(AttrValue::Ss(current)), AttrValue::Ss(gone)) => {
                        AttrValue::Ss(current.difference(gone).cloned().collect())
                    }
                    (Some(AttrValue::Ns(current)), AttrValue::Ns(gone)) => {
                        AttrValue::Ns(current.difference(gone).cloned().collect())
                    }
                    (Some(other), _) => {
                        return Err(parse_error(format!(
                            "DELETE needs a set target, got {:?}",
                            other
                        )))
                    }
                };
                set_at(item, path, next)?;
            }
        }
    }
    Ok(())
}
