//! Handlebars-subset template rendering.
//!
//! Supported: `{{name}}`, `{{{name}}}`, `{{#if name}}…{{else}}…{{/if}}`
//! (nestable), `{{! comment }}` and `{{!-- comment --}}`. Values are inserted
//! verbatim in both substitution forms. A guard is true when its value is
//! a non-empty string.
//!
//! Every variable named by a template, in either branch of a block, must be
//! part of the supplied [`TemplateVars`]. A template is checked in full
//! before any output is produced.

use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use crate::errors::{TemplateErrorKind, TemplateSyntaxError};

static NAME_PATTERN: OnceLock<Regex> = OnceLock::new();

fn name_pattern() -> &'static Regex {
    NAME_PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_.]*$").expect("variable name pattern is valid")
    })
}

/// The closed set of variables available to one render call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateVars {
    values: BTreeMap<String, String>,
}

impl TemplateVars {
    /// Creates an empty variable set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a variable.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    /// Adds a variable, consuming and returning the set.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Returns a variable's value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Returns true if the name is part of the set.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Returns the declared names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Returns the number of variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token<'a> {
    Text(&'a str),
    Var(&'a str),
    If(&'a str),
    Else,
    EndIf,
    Comment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Text(String),
    Var {
        name: String,
        offset: usize,
    },
    If {
        guard: String,
        offset: usize,
        then: Vec<Node>,
        otherwise: Vec<Node>,
    },
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    nodes: Vec<Node>,
}

impl Template {
    /// Parses template text.
    pub fn parse(source: &str) -> Result<Self, TemplateSyntaxError> {
        let tokens = tokenize(source)?;
        Ok(Self {
            nodes: build(tokens)?,
        })
    }

    /// Returns every variable name the template references.
    #[must_use]
    pub fn variables(&self) -> BTreeSet<&str> {
        let mut names = BTreeSet::new();
        collect_names(&self.nodes, &mut names);
        names
    }

    /// Renders the template.
    pub fn render(&self, vars: &TemplateVars) -> Result<String, TemplateSyntaxError> {
        check_names(&self.nodes, vars)?;
        let mut out = String::new();
        emit(&self.nodes, vars, &mut out);
        Ok(out)
    }
}

/// Parses and renders a template in one step.
pub fn render(template: &str, vars: &TemplateVars) -> Result<String, TemplateSyntaxError> {
    Template::parse(template)?.render(vars)
}

fn err(kind: TemplateErrorKind, offset: usize) -> TemplateSyntaxError {
    TemplateSyntaxError::new(kind, offset)
}

fn tokenize(source: &str) -> Result<Vec<(Token<'_>, usize)>, TemplateSyntaxError> {
    let mut tokens = Vec::new();
    let mut pos = 0;

    while let Some(rel) = source[pos..].find("{{") {
        let start = pos + rel;
        if start > pos {
            tokens.push((Token::Text(&source[pos..start]), pos));
        }
        let rest = &source[start..];

        let (token, len) = if rest.starts_with("{{!--") {
            let end = rest[5..]
                .find("--}}")
                .ok_or_else(|| err(TemplateErrorKind::UnterminatedTag, start))?;
            (Token::Comment, 5 + end + 4)
        } else if rest.starts_with("{{!") {
            let end = rest[3..]
                .find("}}")
                .ok_or_else(|| err(TemplateErrorKind::UnterminatedTag, start))?;
            (Token::Comment, 3 + end + 2)
        } else if rest.starts_with("{{{") {
            let end = rest[3..]
                .find("}}}")
                .ok_or_else(|| err(TemplateErrorKind::UnterminatedTag, start))?;
            (raw_tag(&rest[3..3 + end], start)?, 3 + end + 3)
        } else {
            let end = rest[2..]
                .find("}}")
                .ok_or_else(|| err(TemplateErrorKind::UnterminatedTag, start))?;
            (tag(&rest[2..2 + end], start)?, 2 + end + 2)
        };

        tokens.push((token, start));
        pos = start + len;
    }

    if pos < source.len() {
        tokens.push((Token::Text(&source[pos..]), pos));
    }
    Ok(tokens)
}

fn raw_tag(content: &str, offset: usize) -> Result<Token<'_>, TemplateSyntaxError> {
    let name = content.trim();
    if name.is_empty() {
        return Err(err(TemplateErrorKind::EmptyTag, offset));
    }
    if name_pattern().is_match(name) {
        Ok(Token::Var(name))
    } else {
        Err(err(TemplateErrorKind::InvalidTag(name.to_string()), offset))
    }
}

fn tag(content: &str, offset: usize) -> Result<Token<'_>, TemplateSyntaxError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(err(TemplateErrorKind::EmptyTag, offset));
    }

    if let Some(block) = content.strip_prefix('#') {
        let mut parts = block.split_whitespace();
        let helper = parts.next().unwrap_or_default();
        if helper != "if" {
            return Err(err(
                TemplateErrorKind::UnsupportedHelper(format!("#{helper}")),
                offset,
            ));
        }
        return match (parts.next(), parts.next()) {
            (Some(guard), None) if name_pattern().is_match(guard) => Ok(Token::If(guard)),
            _ => Err(err(TemplateErrorKind::InvalidTag(content.to_string()), offset)),
        };
    }

    if let Some(close) = content.strip_prefix('/') {
        return if close.trim() == "if" {
            Ok(Token::EndIf)
        } else {
            Err(err(
                TemplateErrorKind::UnsupportedHelper(content.to_string()),
                offset,
            ))
        };
    }

    if content == "else" {
        return Ok(Token::Else);
    }

    if content.starts_with(['>', '^', '&', '~']) || content.split_whitespace().count() > 1 {
        return Err(err(
            TemplateErrorKind::UnsupportedHelper(content.to_string()),
            offset,
        ));
    }

    if name_pattern().is_match(content) {
        Ok(Token::Var(content))
    } else {
        Err(err(TemplateErrorKind::InvalidTag(content.to_string()), offset))
    }
}

struct Frame {
    guard: String,
    offset: usize,
    then: Vec<Node>,
    otherwise: Option<Vec<Node>>,
}

impl Frame {
    fn current(&mut self) -> &mut Vec<Node> {
        match self.otherwise {
            Some(ref mut nodes) => nodes,
            None => &mut self.then,
        }
    }
}

fn build(tokens: Vec<(Token<'_>, usize)>) -> Result<Vec<Node>, TemplateSyntaxError> {
    let mut root = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();

    for (token, offset) in tokens {
        let node = match token {
            Token::Comment => continue,
            Token::Text(text) => Node::Text(text.to_string()),
            Token::Var(name) => Node::Var {
                name: name.to_string(),
                offset,
            },
            Token::If(guard) => {
                stack.push(Frame {
                    guard: guard.to_string(),
                    offset,
                    then: Vec::new(),
                    otherwise: None,
                });
                continue;
            }
            Token::Else => {
                let frame = stack
                    .last_mut()
                    .ok_or_else(|| err(TemplateErrorKind::UnexpectedElse, offset))?;
                if frame.otherwise.is_some() {
                    return Err(err(TemplateErrorKind::DuplicateElse, offset));
                }
                frame.otherwise = Some(Vec::new());
                continue;
            }
            Token::EndIf => {
                let frame = stack
                    .pop()
                    .ok_or_else(|| err(TemplateErrorKind::UnexpectedClose, offset))?;
                Node::If {
                    guard: frame.guard,
                    offset: frame.offset,
                    then: frame.then,
                    otherwise: frame.otherwise.unwrap_or_default(),
                }
            }
        };

        match stack.last_mut() {
            Some(frame) => frame.current().push(node),
            None => root.push(node),
        }
    }

    if let Some(frame) = stack.pop() {
        return Err(err(
            TemplateErrorKind::UnclosedBlock(frame.guard),
            frame.offset,
        ));
    }
    Ok(root)
}

fn collect_names<'a>(nodes: &'a [Node], names: &mut BTreeSet<&'a str>) {
    for node in nodes {
        match node {
            Node::Text(_) => {}
            Node::Var { name, .. } => {
                names.insert(name);
            }
            Node::If {
                guard,
                then,
                otherwise,
                ..
            } => {
                names.insert(guard);
                collect_names(then, names);
                collect_names(otherwise, names);
            }
        }
    }
}

fn check_names(nodes: &[Node], vars: &TemplateVars) -> Result<(), TemplateSyntaxError> {
    for node in nodes {
        match node {
            Node::Text(_) => {}
            Node::Var { name, offset } => {
                if !vars.contains(name) {
                    return Err(err(TemplateErrorKind::UnknownVariable(name.clone()), *offset));
                }
            }
            Node::If {
                guard,
                offset,
                then,
                otherwise,
            } => {
                if !vars.contains(guard) {
                    return Err(err(TemplateErrorKind::UnknownVariable(guard.clone()), *offset));
                }
                check_names(then, vars)?;
                check_names(otherwise, vars)?;
            }
        }
    }
    Ok(())
}

fn emit(nodes: &[Node], vars: &TemplateVars, out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Var { name, .. } => out.push_str(vars.get(name).unwrap_or_default()),
            Node::If {
                guard,
                then,
                otherwise,
                ..
            } => {
                let taken = vars.get(guard).is_some_and(|v| !v.is_empty());
                emit(if taken { then } else { otherwise }, vars, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kind_of(template: &str, vars: &TemplateVars) -> TemplateErrorKind {
        render(template, vars).unwrap_err().kind
    }

    #[test]
    fn test_substitution_is_verbatim() {
        let vars = TemplateVars::new().with("brand", "<美的> & \"酷开\"");
        assert_eq!(
            render("品牌：{{brand}} / {{{brand}}}", &vars).unwrap(),
            "品牌：<美的> & \"酷开\" / <美的> & \"酷开\""
        );
    }

    #[test]
    fn test_if_else_branches() {
        let template = "{{#if x}}A{{else}}B{{/if}}";
        assert_eq!(render(template, &TemplateVars::new().with("x", "")).unwrap(), "B");
        assert_eq!(render(template, &TemplateVars::new().with("x", "yes")).unwrap(), "A");
    }

    #[test]
    fn test_if_without_else() {
        let template = "start{{#if note}}\n备注：{{{note}}}{{/if}}\nend";
        assert_eq!(
            render(template, &TemplateVars::new().with("note", "")).unwrap(),
            "start\nend"
        );
        assert_eq!(
            render(template, &TemplateVars::new().with("note", "简短")).unwrap(),
            "start\n备注：简短\nend"
        );
    }

    #[test]
    fn test_nested_blocks() {
        let template = "{{#if a}}[{{#if b}}ab{{else}}a{{/if}}]{{else}}none{{/if}}";
        let vars = TemplateVars::new().with("a", "1").with("b", "");
        assert_eq!(render(template, &vars).unwrap(), "[a]");
        let vars = vars.with("b", "1");
        assert_eq!(render(template, &vars).unwrap(), "[ab]");
    }

    #[test]
    fn test_comments_are_removed() {
        let vars = TemplateVars::new();
        assert_eq!(
            render("a{{! short }}b{{!-- has }} inside --}}c", &vars).unwrap(),
            "abc"
        );
    }

    #[test]
    fn test_render_is_deterministic() {
        let template = "{{#if s}}{{{s}}}{{else}}默认{{/if}} {{t}}";
        let vars = TemplateVars::new().with("s", "风格").with("t", "稿件");
        let first = render(template, &vars).unwrap();
        for _ in 0..5 {
            assert_eq!(render(template, &vars).unwrap(), first);
        }
    }

    #[test]
    fn test_unterminated_tag() {
        let err = render("abc {{name", &TemplateVars::new()).unwrap_err();
        assert_eq!(err.kind, TemplateErrorKind::UnterminatedTag);
        assert_eq!(err.offset, 4);
        assert_eq!(
            kind_of("{{{name}}", &TemplateVars::new()),
            TemplateErrorKind::UnterminatedTag
        );
        assert_eq!(
            kind_of("{{!-- open", &TemplateVars::new()),
            TemplateErrorKind::UnterminatedTag
        );
    }

    #[test]
    fn test_block_structure_errors() {
        let vars = TemplateVars::new().with("x", "1");
        assert_eq!(kind_of("a{{else}}b", &vars), TemplateErrorKind::UnexpectedElse);
        assert_eq!(kind_of("a{{/if}}", &vars), TemplateErrorKind::UnexpectedClose);
        assert_eq!(
            kind_of("{{#if x}}a{{else}}b{{else}}c{{/if}}", &vars),
            TemplateErrorKind::DuplicateElse
        );
        let err = render("ok {{#if x}}never closed", &vars).unwrap_err();
        assert_eq!(err.kind, TemplateErrorKind::UnclosedBlock("x".to_string()));
        assert_eq!(err.offset, 3);
    }

    #[test]
    fn test_unsupported_helpers() {
        let vars = TemplateVars::new().with("items", "a");
        assert_eq!(
            kind_of("{{#each items}}x{{/each}}", &vars),
            TemplateErrorKind::UnsupportedHelper("#each".to_string())
        );
        assert!(matches!(
            kind_of("{{> header}}", &vars),
            TemplateErrorKind::UnsupportedHelper(_)
        ));
        assert!(matches!(
            kind_of("{{lookup items 0}}", &vars),
            TemplateErrorKind::UnsupportedHelper(_)
        ));
    }

    #[test]
    fn test_empty_and_invalid_tags() {
        let vars = TemplateVars::new();
        assert_eq!(kind_of("{{}}", &vars), TemplateErrorKind::EmptyTag);
        assert_eq!(kind_of("{{{  }}}", &vars), TemplateErrorKind::EmptyTag);
        assert!(matches!(kind_of("{{9lives}}", &vars), TemplateErrorKind::InvalidTag(_)));
        assert!(matches!(kind_of("{{#if}}x{{/if}}", &vars), TemplateErrorKind::InvalidTag(_)));
    }

    #[test]
    fn test_unknown_variable_in_untaken_branch() {
        let vars = TemplateVars::new().with("x", "1");
        let err = render("{{#if x}}ok{{else}}{{ghost}}{{/if}}", &vars).unwrap_err();
        assert_eq!(err.kind, TemplateErrorKind::UnknownVariable("ghost".to_string()));
        assert_eq!(err.offset, 19);
    }

    #[test]
    fn test_unknown_guard() {
        assert_eq!(
            kind_of("{{#if ghost}}a{{/if}}", &TemplateVars::new()),
            TemplateErrorKind::UnknownVariable("ghost".to_string())
        );
    }

    #[test]
    fn test_variables_lists_every_reference() {
        let template = Template::parse("{{a}}{{#if b}}{{{c}}}{{else}}{{d}}{{/if}}").unwrap();
        let names: Vec<_> = template.variables().into_iter().collect();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_single_braces_are_text() {
        let vars = TemplateVars::new().with("json", "{}");
        assert_eq!(
            render(r#"{"k": "{{json}}"}"#, &vars).unwrap(),
            r#"{"k": "{}"}"#
        );
    }
}
