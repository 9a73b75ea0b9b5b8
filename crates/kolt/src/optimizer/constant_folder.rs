use crate::parser::{
    AssignTarget, BinaryOperator, Expression, Literal, Spanned, Statement, TemplatePart,
    UnaryOperator,
};
use std::borrow::Cow;
use std::rc::Rc;

pub(super) fn fold(statements: Vec<Spanned<Statement<'_>>>) -> Vec<Spanned<Statement<'_>>> {
    statements.into_iter().map(fold_statement).collect()
}

fn fold_statement(statement: Spanned<Statement<'_>>) -> Spanned<Statement<'_>> {
    let Spanned { span, node } = statement;
    let node = match node {
        Statement::VariableDecl(mut decl) => {
            decl.initializer = decl.initializer.map(fold_expression);
            Statement::VariableDecl(decl)
        }
        Statement::FunctionDecl(function) => {
            // Unshared at this stage; resolving has not run yet
            let mut function = Rc::try_unwrap(function).unwrap_or_else(|shared| (*shared).clone());
            function.body = fold(function.body);
            Statement::FunctionDecl(Rc::new(function))
        }
        Statement::Assign {
            target,
            operator,
            value,
        } => Statement::Assign {
            target: fold_target(target),
            operator,
            value: fold_expression(value),
        },
        Statement::If {
            condition,
            then_branch,
            else_branch,
        } => Statement::If {
            condition: fold_expression(condition),
            then_branch: fold(then_branch),
            else_branch: else_branch.map(fold),
        },
        Statement::While { condition, body } => Statement::While {
            condition: fold_expression(condition),
            body: fold(body),
        },
        Statement::Return { value } => Statement::Return {
            value: value.map(fold_expression),
        },
        Statement::Run { body } => Statement::Run { body: fold(body) },
        Statement::Expression(expression) => Statement::Expression(fold_expression(expression)),
    };
    Spanned { span, node }
}

fn fold_target(target: AssignTarget<'_>) -> AssignTarget<'_> {
    match target {
        AssignTarget::Index { array, index } => AssignTarget::Index {
            array,
            index: fold_expression(index),
        },
        name => name,
    }
}

fn fold_expression(expression: Spanned<Expression<'_>>) -> Spanned<Expression<'_>> {
    let Spanned { span, node } = expression;
    let node = match node {
        Expression::Unary { operator, operand } => {
            let operand = fold_expression(*operand);
            fold_unary(operator, operand)
        }
        Expression::Binary {
            operator,
            left,
            right,
        } => {
            let left = fold_expression(*left);
            let right = fold_expression(*right);
            fold_binary(operator, left, right)
        }
        Expression::Call {
            function,
            arguments,
        } => Expression::Call {
            function,
            arguments: arguments.into_iter().map(fold_expression).collect(),
        },
        Expression::Index { array, index } => Expression::Index {
            array: Box::new(fold_expression(*array)),
            index: Box::new(fold_expression(*index)),
        },
        Expression::Template { parts } => fold_template(parts),
        other => other,
    };
    Spanned { span, node }
}

fn fold_unary<'code>(
    operator: UnaryOperator,
    operand: Spanned<Expression<'code>>,
) -> Expression<'code> {
    let folded = match (operator, &operand.node) {
        (UnaryOperator::Negate, Expression::Literal(Literal::Int(int))) => {
            int.checked_neg().map(Literal::Int)
        }
        (UnaryOperator::Negate, Expression::Literal(Literal::Float(float))) => {
            Some(Literal::Float(-float))
        }
        (UnaryOperator::Not, Expression::Literal(Literal::Bool(boolean))) => {
            Some(Literal::Bool(!boolean))
        }
        _ => None,
    };
    match folded {
        Some(literal) => Expression::Literal(literal),
        None => Expression::Unary {
            operator,
            operand: Box::new(operand),
        },
    }
}

fn fold_binary<'code>(
    operator: BinaryOperator,
    left: Spanned<Expression<'code>>,
    right: Spanned<Expression<'code>>,
) -> Expression<'code> {
    let folded = match (&left.node, &right.node) {
        (Expression::Literal(left), Expression::Literal(right)) => {
            fold_literals(operator, left, right)
        }
        _ => None,
    };
    match folded {
        Some(literal) => Expression::Literal(literal),
        None => Expression::Binary {
            operator,
            left: Box::new(left),
            right: Box::new(right),
        },
    }
}

/// Folds same-type operands only; mixed `Int`/`Float` math and anything
/// that would fail at runtime (overflow, division by zero) is left alone
/// so the error surfaces where the author wrote it.
fn fold_literals<'code>(
    operator: BinaryOperator,
    left: &Literal<'code>,
    right: &Literal<'code>,
) -> Option<Literal<'code>> {
    match (left, right) {
        (Literal::Int(a), Literal::Int(b)) => fold_ints(operator, *a, *b),
        (Literal::Float(a), Literal::Float(b)) => fold_floats(operator, *a, *b),
        (Literal::Bool(a), Literal::Bool(b)) => fold_bools(operator, *a, *b),
        (Literal::Text(a), Literal::Text(b)) => fold_texts(operator, a, b),
        _ => None,
    }
}

fn fold_ints<'code>(operator: BinaryOperator, a: i64, b: i64) -> Option<Literal<'code>> {
    let literal = match operator {
        BinaryOperator::Add => Literal::Int(a.checked_add(b)?),
        BinaryOperator::Subtract => Literal::Int(a.checked_sub(b)?),
        BinaryOperator::Multiply => Literal::Int(a.checked_mul(b)?),
        BinaryOperator::Divide => Literal::Int(a.checked_div(b)?),
        BinaryOperator::Modulo => Literal::Int(a.checked_rem(b)?),
        BinaryOperator::Equal => Literal::Bool(a == b),
        BinaryOperator::NotEqual => Literal::Bool(a != b),
        BinaryOperator::Less => Literal::Bool(a < b),
        BinaryOperator::LessOrEqual => Literal::Bool(a <= b),
        BinaryOperator::Greater => Literal::Bool(a > b),
        BinaryOperator::GreaterOrEqual => Literal::Bool(a >= b),
        BinaryOperator::And | BinaryOperator::Or => return None,
    };
    Some(literal)
}

fn fold_floats<'code>(operator: BinaryOperator, a: f64, b: f64) -> Option<Literal<'code>> {
    let literal = match operator {
        BinaryOperator::Add => Literal::Float(a + b),
        BinaryOperator::Subtract => Literal::Float(a - b),
        BinaryOperator::Multiply => Literal::Float(a * b),
        BinaryOperator::Divide => Literal::Float(a / b),
        BinaryOperator::Equal => Literal::Bool(a == b),
        BinaryOperator::NotEqual => Literal::Bool(a != b),
        BinaryOperator::Less => Literal::Bool(a < b),
        BinaryOperator::LessOrEqual => Literal::Bool(a <= b),
        BinaryOperator::Greater => Literal::Bool(a > b),
        BinaryOperator::GreaterOrEqual => Literal::Bool(a >= b),
        _ => return None,
    };
    Some(literal)
}

fn fold_bools<'code>(operator: BinaryOperator, a: bool, b: bool) -> Option<Literal<'code>> {
    let literal = match operator {
        BinaryOperator::And => Literal::Bool(a && b),
        BinaryOperator::Or => Literal::Bool(a || b),
        BinaryOperator::Equal => Literal::Bool(a == b),
        BinaryOperator::NotEqual => Literal::Bool(a != b),
        _ => return None,
    };
    Some(literal)
}

fn fold_texts<'code>(
    operator: BinaryOperator,
    a: &Cow<'code, str>,
    b: &Cow<'code, str>,
) -> Option<Literal<'code>> {
    match operator {
        BinaryOperator::Add => {
            let mut joined = String::with_capacity(a.len() + b.len());
            joined.push_str(a);
            joined.push_str(b);
            Some(Literal::Text(Cow::Owned(joined)))
        }
        BinaryOperator::Equal => Some(Literal::Bool(a == b)),
        BinaryOperator::NotEqual => Some(Literal::Bool(a != b)),
        _ => None,
    }
}

fn fold_template(parts: Vec<TemplatePart<'_>>) -> Expression<'_> {
    let parts: Vec<TemplatePart> = parts.into_iter().map(fold_part).collect();
    if !parts.iter().all(is_static) {
        return Expression::Template { parts };
    }
    let mut rendered = String::new();
    for part in &parts {
        match part {
            TemplatePart::Text(text) => rendered.push_str(text),
            TemplatePart::Expression(expression) => {
                let Expression::Literal(literal) = &expression.node else {
                    unreachable!("only literal parts count as static");
                };
                rendered.push_str(&literal_text(literal));
            }
        }
    }
    Expression::Literal(Literal::Text(Cow::Owned(rendered)))
}

fn fold_part(part: TemplatePart<'_>) -> TemplatePart<'_> {
    match part {
        TemplatePart::Expression(expression) => {
            TemplatePart::Expression(fold_expression(expression))
        }
        text => text,
    }
}

fn is_static(part: &TemplatePart<'_>) -> bool {
    match part {
        TemplatePart::Text(_) => true,
        TemplatePart::Expression(expression) => {
            matches!(expression.node, Expression::Literal(_))
        }
    }
}

// Keep in sync with how `Value` renders scalars at runtime
fn literal_text(literal: &Literal<'_>) -> String {
    match literal {
        Literal::Int(int) => int.to_string(),
        Literal::Float(float) => {
            if float.fract() == 0.0 && float.is_finite() {
                format!("{float:.1}")
            } else {
                float.to_string()
            }
        }
        Literal::Bool(boolean) => boolean.to_string(),
        Literal::Text(text) => text.to_string(),
    }
}
