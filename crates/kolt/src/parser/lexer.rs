use super::{ParseError, Spanned};
use chumsky::prelude::*;
use std::borrow::Cow;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Token<'code> {
    ParenOpen,
    ParenClose,
    BraceOpen,
    BraceClose,
    BracketOpen,
    BracketClose,
    Comment(&'code str),
    Int(i64),
    Float(f64),
    // Raw string content between the quotes, interpolation still unsplit
    Text(&'code str),
    Identifier(&'code str),
    Fun,
    Val,
    Var,
    If,
    Else,
    While,
    Return,
    Run,
    True,
    False,
    Comma,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    EqualEqual,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    And,
    Or,
    Not,
}

impl<'code> Token<'code> {
    pub fn into_cow_str(self) -> Cow<'code, str> {
        match self {
            Self::ParenOpen => "(".into(),
            Self::ParenClose => ")".into(),
            Self::BraceOpen => "{".into(),
            Self::BraceClose => "}".into(),
            Self::BracketOpen => "[".into(),
            Self::BracketClose => "]".into(),
            Self::Comment(comment) => comment.into(),
            Self::Int(int) => int.to_string().into(),
            Self::Float(float) => float.to_string().into(),
            Self::Text(text) => text.into(),
            Self::Identifier(identifier) => identifier.into(),
            Self::Fun => "fun".into(),
            Self::Val => "val".into(),
            Self::Var => "var".into(),
            Self::If => "if".into(),
            Self::Else => "else".into(),
            Self::While => "while".into(),
            Self::Return => "return".into(),
            Self::Run => "run".into(),
            Self::True => "true".into(),
            Self::False => "false".into(),
            Self::Comma => ",".into(),
            Self::Plus => "+".into(),
            Self::Minus => "-".into(),
            Self::Star => "*".into(),
            Self::Slash => "/".into(),
            Self::Percent => "%".into(),
            Self::Assign => "=".into(),
            Self::PlusAssign => "+=".into(),
            Self::MinusAssign => "-=".into(),
            Self::StarAssign => "*=".into(),
            Self::SlashAssign => "/=".into(),
            Self::EqualEqual => "==".into(),
            Self::NotEqual => "!=".into(),
            Self::Less => "<".into(),
            Self::LessOrEqual => "<=".into(),
            Self::Greater => ">".into(),
            Self::GreaterOrEqual => ">=".into(),
            Self::And => "&&".into(),
            Self::Or => "||".into(),
            Self::Not => "!".into(),
        }
    }
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.into_cow_str())
    }
}

pub fn lexer<'code>()
-> impl Parser<'code, &'code str, Vec<Spanned<Token<'code>>>, extra::Err<ParseError<'code, char>>> {
    let bracket = choice((
        just('(').to(Token::ParenOpen),
        just(')').to(Token::ParenClose),
        just('{').to(Token::BraceOpen),
        just('}').to(Token::BraceClose),
        just('[').to(Token::BracketOpen),
        just(']').to(Token::BracketClose),
    ));

    let comment = just("//")
        .then(any().and_is(text::newline().not()).repeated())
        .to_slice()
        .map(Token::Comment);

    // 1_000_000 lexes as one literal; the separators are only valid between digit groups
    let number = text::int(10)
        .then(just('_').then(text::digits(10)).repeated())
        .then(just('.').then(text::digits(10)).or_not())
        .to_slice()
        .try_map(|raw: &str, span| {
            let digits = raw.replace('_', "");
            if digits.contains('.') {
                digits.parse().map(Token::Float).map_err(|_| {
                    ParseError::custom(span, format!("Invalid number literal '{raw}'"))
                })
            } else {
                digits.parse().map(Token::Int).map_err(|_| {
                    ParseError::custom(
                        span,
                        format!("Number literal '{raw}' does not fit into a 64-bit integer"),
                    )
                })
            }
        });

    // Raw content between the quotes; no escapes, `${...}` holes are split by the parser
    let text = just('"')
        .ignore_then(none_of('"').repeated().to_slice())
        .then_ignore(just('"'))
        .map(Token::Text);

    let comparator = choice((
        just("==").to(Token::EqualEqual),
        just("!=").to(Token::NotEqual),
        just(">=").to(Token::GreaterOrEqual),
        just('>').to(Token::Greater),
        just("<=").to(Token::LessOrEqual),
        just('<').to(Token::Less),
    ));

    let logical_operator = choice((
        just("&&").to(Token::And),
        just("||").to(Token::Or),
        just('!').to(Token::Not),
    ));

    let assignment_operator = choice((
        just("+=").to(Token::PlusAssign),
        just("-=").to(Token::MinusAssign),
        just("*=").to(Token::StarAssign),
        just("/=").to(Token::SlashAssign),
        just('=').to(Token::Assign),
    ));

    let arithmetic_operator = choice((
        just('+').to(Token::Plus),
        just('-').to(Token::Minus),
        just('*').to(Token::Star),
        just('/').to(Token::Slash),
        just('%').to(Token::Percent),
    ));

    let identifier_or_keyword = any()
        .filter(|character: &char| character.is_ascii_alphabetic() || *character == '_')
        .then(
            any()
                .filter(|character: &char| character.is_ascii_alphanumeric() || *character == '_')
                .repeated(),
        )
        .to_slice()
        .map(|identifier: &str| match identifier {
            "fun" => Token::Fun,
            "val" => Token::Val,
            "var" => Token::Var,
            "if" => Token::If,
            "else" => Token::Else,
            "while" => Token::While,
            "return" => Token::Return,
            "run" => Token::Run,
            "true" => Token::True,
            "false" => Token::False,
            _ => Token::Identifier(identifier),
        });

    let token = choice((
        bracket,
        comment,
        number,
        text,
        comparator,
        logical_operator,
        assignment_operator,
        arithmetic_operator,
        just(',').to(Token::Comma),
        identifier_or_keyword,
    ));

    token
        .map_with(|token, extra| Spanned {
            node: token,
            span: extra.span(),
        })
        .padded_by(text::whitespace())
        .recover_with(skip_then_retry_until(any().ignored(), end()))
        .repeated()
        .collect()
}
