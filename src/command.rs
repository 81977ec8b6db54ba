//! Text command language.
//!
//! Commands are tokenized (bare words, single-quoted strings with `''` as an escaped
//! quote, and commas) and parsed into a typed [`Command`]. Keywords are case-insensitive;
//! references follow [`EntityRef::parse`] (`#12`, `/a/b`, `title`).

use serde::Serialize;

use crate::error::{RbacError, Result};
use crate::identity::SubjectId;
use crate::storage::{EntityRef, PartitionKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResetTarget {
    Roles,
    Permissions,
    Assignments,
    All,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Add { kind: PartitionKind, title: String, description: String, parent: Option<EntityRef> },
    AddPath { kind: PartitionKind, path: String, descriptions: Vec<String> },
    Remove { kind: PartitionKind, node: EntityRef, recursive: bool },
    /// A missing description keeps the current one.
    Edit { kind: PartitionKind, node: EntityRef, title: String, description: Option<String> },
    Show { kind: PartitionKind, node: EntityRef },
    Children { kind: PartitionKind, node: EntityRef },
    Descendants { kind: PartitionKind, node: EntityRef, absolute: bool },
    Path { kind: PartitionKind, node: EntityRef },
    Count { kind: PartitionKind },
    Assign { role: EntityRef, permission: EntityRef },
    Unassign { role: EntityRef, permission: EntityRef },
    Grant { role: EntityRef, subject: SubjectId, constraint: Option<String> },
    Revoke { role: EntityRef, subject: SubjectId },
    Check { permission: EntityRef, subject: SubjectId },
    Explain { permission: EntityRef, subject: SubjectId },
    Roles { subject: SubjectId, scope: Option<EntityRef> },
    Permissions { role: EntityRef },
    Reset { target: ResetTarget, confirmed: bool },
    Save,
    Load,
}

impl Command {
    /// True for commands that change the store.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Command::Add { .. } | Command::AddPath { .. } | Command::Remove { .. } | Command::Edit { .. }
                | Command::Assign { .. } | Command::Unassign { .. } | Command::Grant { .. } | Command::Revoke { .. }
                | Command::Reset { .. } | Command::Load
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Quoted(String),
    Comma,
}

fn parse_error<M: Into<String>>(msg: M) -> RbacError { RbacError::invalid("parse_error", msg) }

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut out = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() { chars.next(); continue; }
        if c == ',' { chars.next(); out.push(Token::Comma); continue; }
        if c == '\'' {
            chars.next();
            let mut s = String::new();
            loop {
                match chars.next() {
                    Some('\'') => {
                        if chars.peek() == Some(&'\'') { chars.next(); s.push('\''); } else { break; }
                    }
                    Some(ch) => s.push(ch),
                    None => return Err(parse_error("unterminated quoted string")),
                }
            }
            out.push(Token::Quoted(s));
            continue;
        }
        let mut w = String::new();
        while let Some(&ch) = chars.peek() {
            if ch.is_whitespace() || ch == ',' || ch == '\'' { break; }
            w.push(ch);
            chars.next();
        }
        out.push(Token::Word(w));
    }
    Ok(out)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek_keyword(&self, kw: &str) -> bool {
        matches!(self.tokens.get(self.pos), Some(Token::Word(w)) if w.eq_ignore_ascii_case(kw))
    }

    fn keyword(&mut self, kw: &str) -> bool {
        if self.peek_keyword(kw) { self.pos += 1; true } else { false }
    }

    fn expect(&mut self, kw: &str) -> Result<()> {
        if self.keyword(kw) { Ok(()) } else { Err(parse_error(format!("expected {} {}", kw, self.near()))) }
    }

    fn near(&self) -> String {
        match self.tokens.get(self.pos) {
            Some(Token::Word(w)) => format!("near '{}'", w),
            Some(Token::Quoted(q)) => format!("near '{}'", q),
            Some(Token::Comma) => "near ','".to_string(),
            None => "at end of input".to_string(),
        }
    }

    fn value(&mut self, what: &str) -> Result<String> {
        match self.tokens.get(self.pos) {
            Some(Token::Word(w)) | Some(Token::Quoted(w)) => {
                let v = w.clone();
                self.pos += 1;
                Ok(v)
            }
            _ => Err(parse_error(format!("expected {} {}", what, self.near()))),
        }
    }

    fn quoted(&mut self, what: &str) -> Result<String> {
        match self.tokens.get(self.pos) {
            Some(Token::Quoted(q)) => {
                let v = q.clone();
                self.pos += 1;
                Ok(v)
            }
            _ => Err(parse_error(format!("expected quoted {} {}", what, self.near()))),
        }
    }

    fn reference(&mut self, what: &str) -> Result<EntityRef> {
        match self.tokens.get(self.pos) {
            Some(Token::Word(w)) => {
                let r = EntityRef::parse(w)?;
                self.pos += 1;
                Ok(r)
            }
            // Quoted references are always titles or paths, never ids.
            Some(Token::Quoted(q)) => {
                let r = EntityRef::from(q.as_str());
                self.pos += 1;
                Ok(r)
            }
            _ => Err(parse_error(format!("expected {} {}", what, self.near()))),
        }
    }

    fn subject(&mut self) -> Result<SubjectId> { self.value("subject").map(SubjectId::from) }

    fn done(&self) -> Result<()> {
        if self.pos < self.tokens.len() { Err(parse_error(format!("unexpected input {}", self.near()))) } else { Ok(()) }
    }
}

fn once<T>(slot: &mut Option<T>, value: T, clause: &str) -> Result<()> {
    if slot.is_some() {
        return Err(RbacError::conflict("conflicting_clause", format!("{} given more than once", clause)));
    }
    *slot = Some(value);
    Ok(())
}

pub fn parse(input: &str) -> Result<Command> {
    let tokens = tokenize(input.trim().trim_end_matches(';'))?;
    if tokens.is_empty() { return Err(parse_error("empty command")); }
    let mut p = Parser { tokens, pos: 0 };
    let cmd = if p.keyword("ROLE") {
        parse_entity(&mut p, PartitionKind::Roles)?
    } else if p.keyword("PERMISSION") {
        parse_entity(&mut p, PartitionKind::Permissions)?
    } else if p.keyword("ASSIGN") {
        let role = p.reference("role")?;
        p.expect("TO")?;
        Command::Assign { role, permission: p.reference("permission")? }
    } else if p.keyword("UNASSIGN") {
        let role = p.reference("role")?;
        p.expect("FROM")?;
        Command::Unassign { role, permission: p.reference("permission")? }
    } else if p.keyword("GRANT") {
        let role = p.reference("role")?;
        p.expect("TO")?;
        p.expect("SUBJECT")?;
        let subject = p.subject()?;
        let constraint = if p.keyword("CONSTRAINT") { Some(p.quoted("constraint")?) } else { None };
        Command::Grant { role, subject, constraint }
    } else if p.keyword("REVOKE") {
        let role = p.reference("role")?;
        p.expect("FROM")?;
        p.expect("SUBJECT")?;
        Command::Revoke { role, subject: p.subject()? }
    } else if p.keyword("CHECK") || p.keyword("EXPLAIN") {
        let explain = matches!(&p.tokens[0], Token::Word(w) if w.eq_ignore_ascii_case("EXPLAIN"));
        let permission = p.reference("permission")?;
        p.expect("FOR")?;
        let subject = p.subject()?;
        if explain { Command::Explain { permission, subject } } else { Command::Check { permission, subject } }
    } else if p.keyword("ROLES") {
        p.expect("FOR")?;
        let subject = p.subject()?;
        let scope = if p.keyword("UNDER") { Some(p.reference("scope")?) } else { None };
        Command::Roles { subject, scope }
    } else if p.keyword("PERMISSIONS") {
        p.expect("OF")?;
        Command::Permissions { role: p.reference("role")? }
    } else if p.keyword("RESET") {
        let target = if p.keyword("ROLES") {
            ResetTarget::Roles
        } else if p.keyword("PERMISSIONS") {
            ResetTarget::Permissions
        } else if p.keyword("ASSIGNMENTS") {
            ResetTarget::Assignments
        } else {
            p.keyword("ALL");
            ResetTarget::All
        };
        Command::Reset { target, confirmed: p.keyword("CONFIRM") }
    } else if p.keyword("SAVE") {
        Command::Save
    } else if p.keyword("LOAD") {
        Command::Load
    } else {
        return Err(parse_error(format!("unknown command {}", p.near())));
    };
    p.done()?;
    Ok(cmd)
}

fn parse_entity(p: &mut Parser, kind: PartitionKind) -> Result<Command> {
    if p.keyword("ADD") {
        if p.peek_keyword("PATH") && p.tokens.len() > p.pos + 1 {
            p.pos += 1;
            let path = p.value("path")?;
            let mut descriptions = Vec::new();
            if p.keyword("DESCRIPTIONS") {
                descriptions.push(p.quoted("description")?);
                while matches!(p.tokens.get(p.pos), Some(Token::Comma)) {
                    p.pos += 1;
                    descriptions.push(p.quoted("description")?);
                }
            }
            return Ok(Command::AddPath { kind, path, descriptions });
        }
        let title = p.value("title")?;
        let mut description = None;
        let mut parent = None;
        loop {
            if p.keyword("DESCRIPTION") {
                let d = p.quoted("description")?;
                once(&mut description, d, "DESCRIPTION")?;
            } else if p.keyword("UNDER") {
                let r = p.reference("parent")?;
                once(&mut parent, r, "UNDER")?;
            } else {
                break;
            }
        }
        return Ok(Command::Add { kind, title, description: description.unwrap_or_default(), parent });
    }
    if p.keyword("REMOVE") {
        let node = p.reference("node")?;
        return Ok(Command::Remove { kind, node, recursive: p.keyword("RECURSIVE") });
    }
    if p.keyword("EDIT") {
        let node = p.reference("node")?;
        p.expect("TITLE")?;
        let title = p.value("title")?;
        let description = if p.keyword("DESCRIPTION") { Some(p.quoted("description")?) } else { None };
        return Ok(Command::Edit { kind, node, title, description });
    }
    if p.keyword("SHOW") { return Ok(Command::Show { kind, node: p.reference("node")? }); }
    if p.keyword("CHILDREN") { return Ok(Command::Children { kind, node: p.reference("node")? }); }
    if p.keyword("DESCENDANTS") {
        let node = p.reference("node")?;
        return Ok(Command::Descendants { kind, node, absolute: p.keyword("ABSOLUTE") });
    }
    if p.keyword("PATH") { return Ok(Command::Path { kind, node: p.reference("node")? }); }
    if p.keyword("COUNT") { return Ok(Command::Count { kind }); }
    Err(parse_error(format!("unknown {} operation {}", kind, p.near())))
}
