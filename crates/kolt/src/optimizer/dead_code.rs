use crate::parser::{Expression, Literal, Spanned, Statement};
use std::rc::Rc;

pub(super) fn eliminate(statements: Vec<Spanned<Statement<'_>>>) -> Vec<Spanned<Statement<'_>>> {
    let mut live = Vec::with_capacity(statements.len());
    for statement in statements {
        let ends_the_block = matches!(statement.node, Statement::Return { .. });
        if let Some(statement) = eliminate_statement(statement) {
            live.push(statement);
        }
        if ends_the_block {
            // Nothing after a return can run
            break;
        }
    }
    live
}

fn eliminate_statement(statement: Spanned<Statement<'_>>) -> Option<Spanned<Statement<'_>>> {
    let Spanned { span, node } = statement;
    let node = match node {
        Statement::If {
            condition,
            then_branch,
            else_branch,
        } => match literal_bool(&condition) {
            Some(true) => Statement::Run {
                body: eliminate(then_branch),
            },
            Some(false) => match else_branch {
                Some(else_branch) => Statement::Run {
                    body: eliminate(else_branch),
                },
                None => return None,
            },
            None => Statement::If {
                condition,
                then_branch: eliminate(then_branch),
                else_branch: else_branch.map(eliminate),
            },
        },
        Statement::While { condition, body } => match literal_bool(&condition) {
            Some(false) => return None,
            _ => Statement::While {
                condition,
                body: eliminate(body),
            },
        },
        Statement::Run { body } => Statement::Run {
            body: eliminate(body),
        },
        Statement::FunctionDecl(function) => {
            let mut function = Rc::try_unwrap(function).unwrap_or_else(|shared| (*shared).clone());
            function.body = eliminate(function.body);
            Statement::FunctionDecl(Rc::new(function))
        }
        other => other,
    };
    Some(Spanned { span, node })
}

fn literal_bool(condition: &Spanned<Expression<'_>>) -> Option<bool> {
    match condition.node {
        Expression::Literal(Literal::Bool(value)) => Some(value),
        _ => None,
    }
}
