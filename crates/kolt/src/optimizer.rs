//! AST-level optimizations applied between parsing and resolving.
//!
//! Two passes run in order: constant folding collapses expressions whose
//! operands are already literals, then dead-code elimination drops
//! statements that can never execute. Neither pass removes a live binding,
//! so the scopes the resolver sees keep the shape the author wrote.

mod constant_folder;
mod dead_code;

use crate::parser::{Spanned, Statement};

pub fn optimize(statements: Vec<Spanned<Statement<'_>>>) -> Vec<Spanned<Statement<'_>>> {
    let before = statements.len();
    let statements = constant_folder::fold(statements);
    let statements = dead_code::eliminate(statements);
    log::debug!(
        "optimized {before} top-level statements down to {}",
        statements.len()
    );
    statements
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{
        Expression, Input as _, Literal, Parser as _, Stream, Token, lexer, parser, span_at,
    };
    use std::borrow::Cow;

    fn parse(code: &str) -> Vec<Spanned<Statement<'_>>> {
        let mut tokens = lexer().parse(code).into_result().expect("lexing failed");
        tokens.retain(|token| !matches!(token.node, Token::Comment(_)));
        let input = Stream::from_iter(tokens)
            .map(span_at(code.len()), |Spanned { node, span }| (node, span));
        parser()
            .parse(input)
            .into_result()
            .expect("parsing failed")
    }

    fn initializer_of<'a, 'code>(
        statement: &'a Spanned<Statement<'code>>,
    ) -> &'a Expression<'code> {
        let Statement::VariableDecl(decl) = &statement.node else {
            panic!("Expected a variable declaration, got {:?}", statement.node);
        };
        &decl.initializer.as_ref().expect("an initializer").node
    }

    #[test]
    fn test_folds_integer_arithmetic() {
        let optimized = optimize(parse("val x = 1 + 2 * 3"));
        let Expression::Literal(Literal::Int(7)) = initializer_of(&optimized[0]) else {
            panic!("Expected the folded literal 7, got {:?}", optimized[0]);
        };
    }

    #[test]
    fn test_folds_through_parentheses() {
        let optimized = optimize(parse("val x = (2 + 2) * (3 - 1)"));
        let Expression::Literal(Literal::Int(8)) = initializer_of(&optimized[0]) else {
            panic!("Expected the folded literal 8, got {:?}", optimized[0]);
        };
    }

    #[test]
    fn test_folds_unary_negation() {
        let optimized = optimize(parse("val x = -(2 + 3)"));
        let Expression::Literal(Literal::Int(-5)) = initializer_of(&optimized[0]) else {
            panic!("Expected the folded literal -5, got {:?}", optimized[0]);
        };
    }

    #[test]
    fn test_division_by_zero_is_left_for_the_runtime() {
        let optimized = optimize(parse("val x = 1 / 0"));
        let Expression::Binary { .. } = initializer_of(&optimized[0]) else {
            panic!("Expected the division to survive, got {:?}", optimized[0]);
        };
    }

    #[test]
    fn test_integer_overflow_is_left_for_the_runtime() {
        let optimized = optimize(parse("val x = 9223372036854775807 + 1"));
        let Expression::Binary { .. } = initializer_of(&optimized[0]) else {
            panic!("Expected the addition to survive, got {:?}", optimized[0]);
        };
    }

    #[test]
    fn test_mixed_numeric_types_are_not_folded() {
        let optimized = optimize(parse("val x = 1 + 2.5"));
        let Expression::Binary { .. } = initializer_of(&optimized[0]) else {
            panic!("Expected the addition to survive, got {:?}", optimized[0]);
        };
    }

    #[test]
    fn test_folds_text_concatenation() {
        let optimized = optimize(parse(r#"val s = "foo" + "bar""#));
        let Expression::Literal(Literal::Text(text)) = initializer_of(&optimized[0]) else {
            panic!("Expected a folded text literal, got {:?}", optimized[0]);
        };
        assert!(matches!(text, Cow::Owned(_)));
        assert_eq!(text.as_ref(), "foobar");
    }

    #[test]
    fn test_folds_comparisons_and_logic() {
        let optimized = optimize(parse("val b = 2 < 3 && true"));
        let Expression::Literal(Literal::Bool(true)) = initializer_of(&optimized[0]) else {
            panic!("Expected the folded literal true, got {:?}", optimized[0]);
        };
    }

    #[test]
    fn test_folds_an_all_literal_template() {
        let optimized = optimize(parse(r#"val s = "n is ${1 + 1}""#));
        let Expression::Literal(Literal::Text(text)) = initializer_of(&optimized[0]) else {
            panic!("Expected a folded text literal, got {:?}", optimized[0]);
        };
        assert_eq!(text.as_ref(), "n is 2");
    }

    #[test]
    fn test_templates_with_variables_survive() {
        let optimized = optimize(parse(r#"val s = "n is ${n}""#));
        let Expression::Template { .. } = initializer_of(&optimized[0]) else {
            panic!("Expected the template to survive, got {:?}", optimized[0]);
        };
    }

    #[test]
    fn test_if_true_becomes_a_run_block() {
        let optimized = optimize(parse("if (true) { println(1) } else { println(2) }"));
        assert_eq!(optimized.len(), 1);
        let Statement::Run { body } = &optimized[0].node else {
            panic!("Expected a run block, got {:?}", optimized[0].node);
        };
        assert_eq!(body.len(), 1);
    }

    #[test]
    fn test_if_false_keeps_only_the_else_branch() {
        let optimized = optimize(parse("if (1 > 2) { println(1) } else { println(2) }"));
        let Statement::Run { body } = &optimized[0].node else {
            panic!("Expected a run block, got {:?}", optimized[0].node);
        };
        let Statement::Expression(expression) = &body[0].node else {
            panic!("Expected a call, got {:?}", body[0].node);
        };
        let Expression::Call { arguments, .. } = &expression.node else {
            panic!("Expected a call, got {:?}", expression.node);
        };
        let Expression::Literal(Literal::Int(2)) = &arguments[0].node else {
            panic!("Expected the else branch, got {:?}", arguments[0].node);
        };
    }

    #[test]
    fn test_if_false_without_else_disappears() {
        let optimized = optimize(parse("if (false) { println(1) }\nprintln(2)"));
        assert_eq!(optimized.len(), 1);
    }

    #[test]
    fn test_while_false_disappears() {
        let optimized = optimize(parse("while (false) { println(1) }\nprintln(2)"));
        assert_eq!(optimized.len(), 1);
    }

    #[test]
    fn test_while_true_is_kept() {
        let optimized = optimize(parse("while (true) { println(1) }"));
        let Statement::While { .. } = &optimized[0].node else {
            panic!("Expected the loop to survive, got {:?}", optimized[0].node);
        };
    }

    #[test]
    fn test_statements_after_a_return_are_dropped() {
        let optimized = optimize(parse("fun f() { return 1 println(2) }"));
        let Statement::FunctionDecl(function) = &optimized[0].node else {
            panic!("Expected a function, got {:?}", optimized[0].node);
        };
        assert_eq!(function.body.len(), 1);
    }

    #[test]
    fn test_bindings_are_never_removed() {
        let code = r#"
            val unused = 1 + 2
            val after = unused
        "#;
        let optimized = optimize(parse(code));
        assert_eq!(optimized.len(), 2);
        let Expression::Literal(Literal::Int(3)) = initializer_of(&optimized[0]) else {
            panic!("Expected the initializer to fold, got {:?}", optimized[0]);
        };
    }

    #[test]
    fn test_non_literal_conditions_are_untouched() {
        let optimized = optimize(parse("if (ready) { println(1) }"));
        let Statement::If { .. } = &optimized[0].node else {
            panic!("Expected the if to survive, got {:?}", optimized[0].node);
        };
    }
}
