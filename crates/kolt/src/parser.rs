use chumsky::{input::ValueInput, pratt::*, prelude::*};
use std::borrow::Cow;
use std::fmt;
use std::rc::Rc;

mod lexer;
pub use lexer::{Token, lexer};

mod scope_resolver;
pub use scope_resolver::{ResolveError, Resolved, resolve};

pub use chumsky::input::Stream;
pub use chumsky::prelude::{Input, Parser};

pub type Span = SimpleSpan;
pub type ParseError<'code, T> = Rich<'code, T, Span>;

#[derive(Debug, Clone)]
pub struct Spanned<T> {
    pub span: Span,
    pub node: T,
}

/// End-of-input span for feeding a lexed token stream into [`parser`].
pub fn span_at(offset: usize) -> Span {
    Span::from(offset..offset)
}

pub fn parser<'code, I>()
-> impl Parser<'code, I, Vec<Spanned<Statement<'code>>>, extra::Err<ParseError<'code, Token<'code>>>>
where
    I: ValueInput<'code, Token = Token<'code>, Span = Span>,
{
    let expression = expression();

    let statement = recursive(|statement| {
        let identifier = select! { Token::Identifier(identifier) => identifier };

        let spanned_identifier = identifier.map_with(|name, extra| Spanned {
            span: extra.span(),
            node: name,
        });

        let block = statement
            .clone()
            .repeated()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::BraceOpen), just(Token::BraceClose));

        let variable_decl = choice((just(Token::Val).to(false), just(Token::Var).to(true)))
            .then(spanned_identifier)
            .then(just(Token::Assign).ignore_then(expression.clone()).or_not())
            .map(|((mutable, name), initializer)| {
                Statement::VariableDecl(VariableDecl {
                    mutable,
                    name,
                    initializer,
                })
            });

        let function_decl = {
            let parameters = spanned_identifier
                .separated_by(just(Token::Comma))
                .collect()
                .delimited_by(just(Token::ParenOpen), just(Token::ParenClose));

            just(Token::Fun)
                .ignore_then(spanned_identifier)
                .then(parameters)
                .then(block.clone())
                .map(|((name, parameters), body)| {
                    Statement::FunctionDecl(Rc::new(FunctionDecl {
                        name,
                        parameters,
                        body,
                    }))
                })
        };

        let condition = expression
            .clone()
            .delimited_by(just(Token::ParenOpen), just(Token::ParenClose));

        // `else if` nests as an else branch holding a single `if` statement
        let if_statement = recursive(|if_statement| {
            just(Token::If)
                .ignore_then(condition.clone())
                .then(block.clone())
                .then(
                    just(Token::Else)
                        .ignore_then(choice((
                            if_statement.map_with(|nested, extra| {
                                vec![Spanned {
                                    span: extra.span(),
                                    node: nested,
                                }]
                            }),
                            block.clone(),
                        )))
                        .or_not(),
                )
                .map(|((condition, then_branch), else_branch)| Statement::If {
                    condition,
                    then_branch,
                    else_branch,
                })
        });

        let while_statement = just(Token::While)
            .ignore_then(condition)
            .then(block.clone())
            .map(|(condition, body)| Statement::While { condition, body });

        let return_statement = just(Token::Return)
            .ignore_then(expression.clone().or_not())
            .map(|value| Statement::Return { value });

        let run_block = just(Token::Run)
            .ignore_then(block.clone())
            .map(|body| Statement::Run { body });

        let assign_operator = choice((
            just(Token::Assign).to(AssignOperator::Set),
            just(Token::PlusAssign).to(AssignOperator::Add),
            just(Token::MinusAssign).to(AssignOperator::Subtract),
            just(Token::StarAssign).to(AssignOperator::Multiply),
            just(Token::SlashAssign).to(AssignOperator::Divide),
        ));

        let assign_name = identifier.map_with(|name, extra| Spanned {
            span: extra.span(),
            node: Identifier { name, slot: None },
        });

        let assign_target = choice((
            assign_name
                .then(
                    expression
                        .clone()
                        .delimited_by(just(Token::BracketOpen), just(Token::BracketClose)),
                )
                .map(|(array, index)| AssignTarget::Index { array, index }),
            assign_name.map(AssignTarget::Name),
        ));

        let assignment = assign_target
            .then(assign_operator)
            .then(expression.clone())
            .map(|((target, operator), value)| Statement::Assign {
                target,
                operator,
                value,
            });

        let expression_statement = expression.clone().map(Statement::Expression);

        choice((
            variable_decl,
            function_decl,
            if_statement,
            while_statement,
            return_statement,
            run_block,
            assignment,
            expression_statement,
        ))
        .map_with(|statement, extra| Spanned {
            span: extra.span(),
            node: statement,
        })
    });

    statement.repeated().collect()
}

pub fn expression<'code, I>()
-> impl Parser<'code, I, Spanned<Expression<'code>>, extra::Err<ParseError<'code, Token<'code>>>> + Clone
where
    I: ValueInput<'code, Token = Token<'code>, Span = Span>,
{
    recursive(|expression| {
        let identifier = select! { Token::Identifier(identifier) => identifier };

        let literal = choice((
            select! { Token::Int(int) => Literal::Int(int) },
            select! { Token::Float(float) => Literal::Float(float) },
            select! { Token::True => Literal::Bool(true) },
            select! { Token::False => Literal::Bool(false) },
        ));
        let expression_literal = literal.map(Expression::Literal);

        let text = select! { Token::Text(content) => content }.validate(
            |content: &'code str, extra, emitter| match split_template(content, extra.span()) {
                Ok(Some(parts)) => Expression::Template { parts },
                Ok(None) => Expression::Literal(Literal::Text(Cow::Borrowed(content))),
                Err(error) => {
                    emitter.emit(error);
                    Expression::Literal(Literal::Text(Cow::Borrowed(content)))
                }
            },
        );

        let call = identifier
            .then(
                expression
                    .clone()
                    .separated_by(just(Token::Comma))
                    .collect()
                    .delimited_by(just(Token::ParenOpen), just(Token::ParenClose)),
            )
            .map(|(name, arguments)| Expression::Call {
                function: Identifier { name, slot: None },
                arguments,
            });

        let expression_identifier =
            identifier.map(|name| Expression::Identifier(Identifier { name, slot: None }));

        let nested = just(Token::ParenOpen)
            .ignore_then(expression.clone())
            .then_ignore(just(Token::ParenClose));

        let atom = choice((call, expression_identifier, expression_literal, text));

        let index = expression
            .clone()
            .delimited_by(just(Token::BracketOpen), just(Token::BracketClose));

        atom.map_with(|expression, extra| Spanned {
            span: extra.span(),
            node: expression,
        })
        .or(nested)
        .pratt((
            // Precedence 15 (highest): postfix indexing
            postfix(15, index, |array, index, extra| Spanned {
                span: extra.span(),
                node: Expression::Index {
                    array: Box::new(array),
                    index: Box::new(index),
                },
            }),
            // Precedence 13: unary prefix operators
            prefix(13, just(Token::Minus), |_, operand, extra| Spanned {
                span: extra.span(),
                node: Expression::Unary {
                    operator: UnaryOperator::Negate,
                    operand: Box::new(operand),
                },
            }),
            prefix(13, just(Token::Not), |_, operand, extra| Spanned {
                span: extra.span(),
                node: Expression::Unary {
                    operator: UnaryOperator::Not,
                    operand: Box::new(operand),
                },
            }),
            // Precedence 11: multiplicative operators
            infix(left(11), just(Token::Star), |left, _, right, extra| Spanned {
                span: extra.span(),
                node: Expression::Binary {
                    operator: BinaryOperator::Multiply,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            }),
            infix(left(11), just(Token::Slash), |left, _, right, extra| Spanned {
                span: extra.span(),
                node: Expression::Binary {
                    operator: BinaryOperator::Divide,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            }),
            infix(left(11), just(Token::Percent), |left, _, right, extra| Spanned {
                span: extra.span(),
                node: Expression::Binary {
                    operator: BinaryOperator::Modulo,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            }),
            // Precedence 9: additive operators
            infix(left(9), just(Token::Plus), |left, _, right, extra| Spanned {
                span: extra.span(),
                node: Expression::Binary {
                    operator: BinaryOperator::Add,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            }),
            infix(left(9), just(Token::Minus), |left, _, right, extra| Spanned {
                span: extra.span(),
                node: Expression::Binary {
                    operator: BinaryOperator::Subtract,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            }),
            // Precedence 7: comparison operators
            infix(left(7), just(Token::Less), |left, _, right, extra| Spanned {
                span: extra.span(),
                node: Expression::Binary {
                    operator: BinaryOperator::Less,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            }),
            infix(
                left(7),
                just(Token::LessOrEqual),
                |left, _, right, extra| Spanned {
                    span: extra.span(),
                    node: Expression::Binary {
                        operator: BinaryOperator::LessOrEqual,
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                },
            ),
            infix(left(7), just(Token::Greater), |left, _, right, extra| {
                Spanned {
                    span: extra.span(),
                    node: Expression::Binary {
                        operator: BinaryOperator::Greater,
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                }
            }),
            infix(
                left(7),
                just(Token::GreaterOrEqual),
                |left, _, right, extra| Spanned {
                    span: extra.span(),
                    node: Expression::Binary {
                        operator: BinaryOperator::GreaterOrEqual,
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                },
            ),
            // Precedence 5: equality operators
            infix(left(5), just(Token::EqualEqual), |left, _, right, extra| {
                Spanned {
                    span: extra.span(),
                    node: Expression::Binary {
                        operator: BinaryOperator::Equal,
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                }
            }),
            infix(left(5), just(Token::NotEqual), |left, _, right, extra| {
                Spanned {
                    span: extra.span(),
                    node: Expression::Binary {
                        operator: BinaryOperator::NotEqual,
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                }
            }),
            // Precedence 3: logical and
            infix(left(3), just(Token::And), |left, _, right, extra| Spanned {
                span: extra.span(),
                node: Expression::Binary {
                    operator: BinaryOperator::And,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            }),
            // Precedence 1 (lowest): logical or
            infix(left(1), just(Token::Or), |left, _, right, extra| Spanned {
                span: extra.span(),
                node: Expression::Binary {
                    operator: BinaryOperator::Or,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            }),
        ))
    })
}

/// Splits raw text content into literal runs and `${expression}` / `$name`
/// holes. `Ok(None)` means the content has no holes at all.
fn split_template<'code>(
    content: &'code str,
    span: Span,
) -> Result<Option<Vec<TemplatePart<'code>>>, ParseError<'code, Token<'code>>> {
    let bytes = content.as_bytes();
    // The span covers the quotes, the content starts one byte in
    let content_offset = span.start + 1;
    let mut parts = Vec::new();
    let mut has_holes = false;
    let mut text_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'$' && i + 1 < bytes.len() {
            if bytes[i + 1] == b'{' {
                let hole_start = i + 2;
                let mut depth = 1usize;
                let mut j = hole_start;
                while j < bytes.len() && depth > 0 {
                    match bytes[j] {
                        b'{' => depth += 1,
                        b'}' => depth -= 1,
                        _ => {}
                    }
                    j += 1;
                }
                if depth > 0 {
                    return Err(ParseError::custom(
                        span,
                        "Unterminated '${' interpolation in text literal".to_owned(),
                    ));
                }
                let hole_end = j - 1;
                if i > text_start {
                    parts.push(TemplatePart::Text(&content[text_start..i]));
                }
                let hole_span = Span::from(content_offset + i..content_offset + j);
                let embedded = parse_embedded(&content[hole_start..hole_end], content_offset + hole_start)
                    .map_err(|message| ParseError::custom(hole_span, message))?;
                parts.push(TemplatePart::Expression(embedded));
                has_holes = true;
                text_start = j;
                i = j;
                continue;
            }
            if bytes[i + 1].is_ascii_alphabetic() || bytes[i + 1] == b'_' {
                let name_start = i + 1;
                let mut j = name_start + 1;
                while j < bytes.len() && (bytes[j].is_ascii_alphanumeric() || bytes[j] == b'_') {
                    j += 1;
                }
                if i > text_start {
                    parts.push(TemplatePart::Text(&content[text_start..i]));
                }
                parts.push(TemplatePart::Expression(Spanned {
                    span: Span::from(content_offset + i..content_offset + j),
                    node: Expression::Identifier(Identifier {
                        name: &content[name_start..j],
                        slot: None,
                    }),
                }));
                has_holes = true;
                text_start = j;
                i = j;
                continue;
            }
        }
        i += 1;
    }

    if !has_holes {
        return Ok(None);
    }
    if text_start < content.len() {
        parts.push(TemplatePart::Text(&content[text_start..]));
    }
    Ok(Some(parts))
}

/// Lexes and parses one interpolation hole with the expression grammar,
/// then rebases its spans so diagnostics point into the enclosing source.
fn parse_embedded<'code>(
    source: &'code str,
    base: usize,
) -> Result<Spanned<Expression<'code>>, String> {
    let (tokens, lex_errors) = lexer().parse(source).into_output_errors();
    if let Some(error) = lex_errors.first() {
        return Err(format!("Invalid interpolation: {error}"));
    }
    let mut tokens = tokens.unwrap_or_default();
    tokens.retain(|token| !matches!(token.node, Token::Comment(_)));
    if tokens.is_empty() {
        return Err("Empty interpolation".to_owned());
    }
    // An owning input: the expression must outlive the token buffer
    let input = Stream::from_iter(tokens)
        .map(span_at(source.len()), |Spanned { node, span }| (node, span));
    let (embedded, parse_errors) = expression().parse(input).into_output_errors();
    if let Some(error) = parse_errors.first() {
        return Err(format!("Invalid interpolation: {error}"));
    }
    let Some(mut embedded) = embedded else {
        return Err("Empty interpolation".to_owned());
    };
    rebase_spans(&mut embedded, base);
    Ok(embedded)
}

fn rebase_spans(expression: &mut Spanned<Expression>, base: usize) {
    expression.span = Span::from(expression.span.start + base..expression.span.end + base);
    match &mut expression.node {
        Expression::Literal(_) | Expression::Identifier(_) => {}
        Expression::Template { parts } => {
            for part in parts {
                if let TemplatePart::Expression(embedded) = part {
                    rebase_spans(embedded, base);
                }
            }
        }
        Expression::Unary {
            operator: _,
            operand,
        } => rebase_spans(operand, base),
        Expression::Binary {
            operator: _,
            left,
            right,
        } => {
            rebase_spans(left, base);
            rebase_spans(right, base);
        }
        Expression::Call {
            function: _,
            arguments,
        } => {
            for argument in arguments {
                rebase_spans(argument, base);
            }
        }
        Expression::Index { array, index } => {
            rebase_spans(array, base);
            rebase_spans(index, base);
        }
    }
}

#[derive(Debug, Clone)]
pub enum Statement<'code> {
    VariableDecl(VariableDecl<'code>),
    FunctionDecl(Rc<FunctionDecl<'code>>),
    Assign {
        target: AssignTarget<'code>,
        operator: AssignOperator,
        value: Spanned<Expression<'code>>,
    },
    If {
        condition: Spanned<Expression<'code>>,
        then_branch: Vec<Spanned<Self>>,
        else_branch: Option<Vec<Spanned<Self>>>,
    },
    While {
        condition: Spanned<Expression<'code>>,
        body: Vec<Spanned<Self>>,
    },
    Return {
        value: Option<Spanned<Expression<'code>>>,
    },
    Run {
        body: Vec<Spanned<Self>>,
    },
    Expression(Spanned<Expression<'code>>),
}

#[derive(Debug, Clone)]
pub struct VariableDecl<'code> {
    pub mutable: bool,
    pub name: Spanned<&'code str>,
    pub initializer: Option<Spanned<Expression<'code>>>,
}

#[derive(Debug, Clone)]
pub struct FunctionDecl<'code> {
    pub name: Spanned<&'code str>,
    pub parameters: Vec<Spanned<&'code str>>,
    pub body: Vec<Spanned<Statement<'code>>>,
}

#[derive(Debug, Clone)]
pub enum AssignTarget<'code> {
    Name(Spanned<Identifier<'code>>),
    Index {
        array: Spanned<Identifier<'code>>,
        index: Spanned<Expression<'code>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AssignOperator {
    Set,
    Add,
    Subtract,
    Multiply,
    Divide,
}

#[derive(Debug, Clone)]
pub enum Expression<'code> {
    Literal(Literal<'code>),
    Template {
        parts: Vec<TemplatePart<'code>>,
    },
    Identifier(Identifier<'code>),
    Unary {
        operator: UnaryOperator,
        operand: Box<Spanned<Self>>,
    },
    Binary {
        operator: BinaryOperator,
        left: Box<Spanned<Self>>,
        right: Box<Spanned<Self>>,
    },
    Call {
        function: Identifier<'code>,
        arguments: Vec<Spanned<Self>>,
    },
    Index {
        array: Box<Spanned<Self>>,
        index: Box<Spanned<Self>>,
    },
}

#[derive(Debug, Clone)]
pub struct Identifier<'code> {
    pub name: &'code str,
    /// Filled in by the scope resolver for local bindings; globals and
    /// builtins stay name-addressed.
    pub slot: Option<Slot>,
}

/// Resolver-computed coordinates of a local binding: walk `distance`
/// enclosing environments, then read position `index`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Slot {
    pub distance: u32,
    pub index: u32,
}

#[derive(Debug, Clone)]
pub enum Literal<'code> {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(Cow<'code, str>),
}

#[derive(Debug, Clone)]
pub enum TemplatePart<'code> {
    Text(&'code str),
    Expression(Spanned<Expression<'code>>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOperator {
    Negate,
    Not,
}

impl fmt::Display for UnaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Negate => write!(f, "-"),
            Self::Not => write!(f, "!"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    And,
    Or,
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let symbol = match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Modulo => "%",
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::Less => "<",
            Self::LessOrEqual => "<=",
            Self::Greater => ">",
            Self::GreaterOrEqual => ">=",
            Self::And => "&&",
            Self::Or => "||",
        };
        write!(f, "{symbol}")
    }
}
