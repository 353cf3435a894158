//! Template pre-processing for YAML documents.
//!
//! Hardware descriptions repeat themselves (`GPIO0` .. `GPIO31`), so documents
//! may be written as templates and expanded before they are parsed. A small
//! Jinja-compatible subset is supported:
//!
//! - `{{ name }}` and `{{ name.field }}` substitutions,
//! - `{% for x in range(n) %}` .. `{% endfor %}` loops over `range(n)`,
//!   `range(start, stop[, step])`, a list literal such as `[1, "a"]`, or a
//!   sequence taken from the render context. A range may yield at most
//!   [`MAX_RANGE_LEN`] values.
//!
//! Text outside of tags is copied verbatim. Undefined names render as the
//! empty string and iterate as an empty sequence.

use std::sync::LazyLock;

use regex::Regex;
use serde_yaml::{Mapping, Value};
use thiserror::Error;

static TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\{%\s*(?P<stmt>.*?)\s*%\}|\{\{\s*(?P<expr>.*?)\s*\}\}")
        .expect("tag pattern is valid")
});

static FOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^for\s+(?P<var>[A-Za-z_]\w*)\s+in\s+(?P<iter>.+)$").expect("for pattern is valid")
});

/// The largest number of values a single `range(...)` may produce.
pub const MAX_RANGE_LEN: usize = 1 << 16;

static RANGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^range\((?P<args>.*)\)$").expect("range pattern is valid"));

/// Errors raised while expanding a template.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    /// A `{% ... %}` statement that is not `for` or `endfor`.
    #[error("unknown template tag '{0}'")]
    UnknownTag(String),

    /// An `{% endfor %}` without a matching `{% for %}`.
    #[error("'endfor' without a matching 'for'")]
    StrayEndFor,

    /// A `{% for %}` that is never closed.
    #[error("'for {0}' is not closed by 'endfor'")]
    Unterminated(String),

    /// The loop iterable could not be evaluated.
    #[error("cannot iterate over '{0}'")]
    NotIterable(String),

    /// A `range(...)` call with invalid arguments.
    #[error("invalid range arguments '{0}'")]
    InvalidRange(String),

    /// A substitution resolved to a sequence or mapping.
    #[error("'{0}' is not a scalar value")]
    NotScalar(String),
}

#[derive(Debug)]
enum Block {
    Text(String),
    Expr(String),
    For {
        var: String,
        iterable: String,
        body: Vec<Self>,
    },
}

struct Frame {
    header: Option<(String, String)>,
    body: Vec<Block>,
}

fn parse(text: &str) -> Result<Vec<Block>, TemplateError> {
    let mut stack = vec![Frame {
        header: None,
        body: Vec::new(),
    }];
    let mut cursor = 0;

    for captures in TAG.captures_iter(text) {
        let whole = captures.get(0).expect("group 0 always matches");
        let frame = stack.last_mut().expect("root frame is never popped");
        if whole.start() > cursor {
            frame
                .body
                .push(Block::Text(text[cursor..whole.start()].to_string()));
        }
        cursor = whole.end();

        if let Some(expr) = captures.name("expr") {
            frame.body.push(Block::Expr(expr.as_str().to_string()));
            continue;
        }

        let stmt = captures.name("stmt").map_or("", |m| m.as_str());
        if stmt == "endfor" {
            let Frame {
                header: Some((var, iterable)),
                body,
            } = stack.pop().expect("root frame is never popped")
            else {
                return Err(TemplateError::StrayEndFor);
            };
            stack
                .last_mut()
                .ok_or(TemplateError::StrayEndFor)?
                .body
                .push(Block::For {
                    var,
                    iterable,
                    body,
                });
        } else if let Some(for_loop) = FOR.captures(stmt) {
            stack.push(Frame {
                header: Some((for_loop["var"].to_string(), for_loop["iter"].trim().to_string())),
                body: Vec::new(),
            });
        } else {
            return Err(TemplateError::UnknownTag(stmt.to_string()));
        }
    }

    let mut root = match stack.pop() {
        Some(Frame {
            header: Some((var, _)),
            ..
        }) => return Err(TemplateError::Unterminated(var)),
        Some(frame) if stack.is_empty() => frame,
        _ => return Err(TemplateError::StrayEndFor),
    };
    if cursor < text.len() {
        root.body.push(Block::Text(text[cursor..].to_string()));
    }
    Ok(root.body)
}

struct Scope<'a> {
    context: &'a Mapping,
    locals: Vec<(String, Value)>,
}

impl Scope<'_> {
    fn lookup(&self, path: &str) -> Option<Value> {
        let mut segments = path.split('.').map(str::trim);
        let head = segments.next()?;

        let mut value = self
            .locals
            .iter()
            .rev()
            .find(|(name, _)| name == head)
            .map(|(_, value)| value.clone())
            .or_else(|| self.context.get(head).cloned())?;

        for segment in segments {
            value = match segment.parse::<usize>() {
                Ok(index) => value.get(index)?.clone(),
                Err(_) => value.get(segment)?.clone(),
            };
        }
        Some(value)
    }

    fn iterate(&self, iterable: &str) -> Result<Vec<Value>, TemplateError> {
        if let Some(range) = RANGE.captures(iterable) {
            return range_values(&range["args"]);
        }

        if iterable.starts_with('[') {
            return match serde_yaml::from_str::<Value>(iterable) {
                Ok(Value::Sequence(items)) => Ok(items),
                _ => Err(TemplateError::NotIterable(iterable.to_string())),
            };
        }

        match self.lookup(iterable) {
            None => Ok(Vec::new()),
            Some(Value::Sequence(items)) => Ok(items),
            Some(_) => Err(TemplateError::NotIterable(iterable.to_string())),
        }
    }

    fn render(&mut self, blocks: &[Block], out: &mut String) -> Result<(), TemplateError> {
        for block in blocks {
            match block {
                Block::Text(text) => out.push_str(text),
                Block::Expr(expr) => match self.lookup(expr) {
                    None => tracing::debug!(expr, "undefined template variable"),
                    Some(value) => out.push_str(&display(expr, &value)?),
                },
                Block::For {
                    var,
                    iterable,
                    body,
                } => {
                    for item in self.iterate(iterable)? {
                        self.locals.push((var.clone(), item));
                        let rendered = self.render(body, out);
                        self.locals.pop();
                        rendered?;
                    }
                }
            }
        }
        Ok(())
    }
}

fn range_values(args: &str) -> Result<Vec<Value>, TemplateError> {
    let invalid = || TemplateError::InvalidRange(args.to_string());

    let numbers = args
        .split(',')
        .map(|arg| arg.trim().parse::<i64>().map_err(|_| invalid()))
        .collect::<Result<Vec<_>, _>>()?;

    let (start, stop, step) = match numbers.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] if *step != 0 => (*start, *stop, *step),
        _ => return Err(invalid()),
    };

    let span = i128::from(stop) - i128::from(start);
    let step_wide = i128::from(step);
    let len = if span.signum() == step_wide.signum() {
        (span + step_wide - step_wide.signum()) / step_wide
    } else {
        0
    };
    let len = usize::try_from(len)
        .ok()
        .filter(|&len| len <= MAX_RANGE_LEN)
        .ok_or_else(invalid)?;

    let mut values = Vec::with_capacity(len);
    let mut current = Some(start);
    for _ in 0..len {
        let Some(value) = current else { break };
        values.push(Value::Number(value.into()));
        current = value.checked_add(step);
    }
    Ok(values)
}

fn display(expr: &str, value: &Value) -> Result<String, TemplateError> {
    match value {
        Value::Null => Ok(String::new()),
        Value::Bool(true) => Ok("True".to_string()),
        Value::Bool(false) => Ok("False".to_string()),
        Value::Number(number) => Ok(number.to_string()),
        Value::String(string) => Ok(string.clone()),
        Value::Tagged(tagged) => display(expr, &tagged.value),
        Value::Sequence(_) | Value::Mapping(_) => Err(TemplateError::NotScalar(expr.to_string())),
    }
}

/// Expands a template using the given render context.
///
/// # Errors
///
/// Returns an error if the template is malformed (unknown tags, unbalanced
/// loops) or a loop iterable or substitution cannot be evaluated.
pub fn render(text: &str, context: &Mapping) -> Result<String, TemplateError> {
    let blocks = parse(text)?;
    let mut out = String::with_capacity(text.len());
    Scope {
        context,
        locals: Vec::new(),
    }
    .render(&blocks, &mut out)?;
    Ok(out)
}
