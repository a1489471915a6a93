//! Expansion of surface sugar into core expressions.
//!
//! The only sugar form is `for`:
//!
//! ```scheme
//! (for (i start) cond (i update) body)
//! ```
//!
//! becomes a self-applying loop bound under a generated name:
//!
//! ```scheme
//! (letrec ((#:loop0 (lambda (i)
//!                     (if cond
//!                         (begin body (#:loop0 update))
//!                         'done))))
//!   (#:loop0 start))
//! ```
//!
//! The recursive call sits in tail position of the loop body, so the
//! evaluator's trampoline runs loops of any length in constant stack.

use tracing::trace;

use crate::ast::{Datum, Expr, Symbol};

/// Hands out loop names that cannot collide with anything the user wrote.
///
/// Each [`desugar`] call starts from zero, so expanding the same program
/// twice yields identical trees.
#[derive(Debug, Default)]
pub struct NameAllocator {
    next: usize,
}

impl NameAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh(&mut self) -> Symbol {
        let symbol = Symbol::Generated(self.next);
        self.next += 1;
        symbol
    }
}

/// Value of a `for` loop once its condition turns false
pub fn loop_result() -> Datum {
    Datum::Symbol("done".to_owned())
}

/// Rewrites `for` loops, threading one [`NameAllocator`] through the tree
#[derive(Debug, Default)]
pub struct Desugarer {
    names: NameAllocator,
}

impl Desugarer {
    pub fn new() -> Self {
        Self::default()
    }

    fn boxed(&mut self, expr: &Expr) -> Box<Expr> {
        Box::new(self.desugar(expr))
    }

    pub fn desugar(&mut self, expr: &Expr) -> Expr {
        match expr {
            // Checked before generic recursion
            Expr::For {
                loop_var,
                start,
                cond,
                update_var: _,
                update,
                body,
            } => self.expand_for(loop_var, start, cond, update, body),

            Expr::Number(_)
            | Expr::String(_)
            | Expr::Bool(_)
            | Expr::Identifier(_)
            | Expr::Quote(_) => expr.clone(),

            Expr::Define { name, value } => Expr::Define {
                name: name.clone(),
                value: self.boxed(value),
            },
            Expr::LetRec {
                name,
                binding,
                body,
            } => Expr::LetRec {
                name: name.clone(),
                binding: self.boxed(binding),
                body: self.boxed(body),
            },
            Expr::BinaryOp { op, lhs, rhs } => Expr::BinaryOp {
                op: *op,
                lhs: self.boxed(lhs),
                rhs: self.boxed(rhs),
            },
            Expr::If {
                cond,
                then,
                otherwise,
            } => Expr::If {
                cond: self.boxed(cond),
                then: self.boxed(then),
                otherwise: self.boxed(otherwise),
            },
            Expr::Begin(exprs) => Expr::Begin(exprs.iter().map(|e| self.desugar(e)).collect()),
            Expr::Lambda { param, body } => Expr::lambda(param.clone(), self.desugar(body)),
            Expr::Apply { callee, arg } => Expr::Apply {
                callee: self.boxed(callee),
                arg: self.boxed(arg),
            },
        }
    }

    /// The update target is not consulted: the loop variable is always
    /// rebound to the update expression's value.
    fn expand_for(
        &mut self,
        loop_var: &Symbol,
        start: &Expr,
        cond: &Expr,
        update: &Expr,
        body: &Expr,
    ) -> Expr {
        let loop_name = self.names.fresh();
        trace!(%loop_name, %loop_var, "expanding for loop");

        let call_loop = |arg: Expr| Expr::apply(Expr::Identifier(loop_name.clone()), arg);

        let step = Expr::if_(
            self.desugar(cond),
            Expr::Begin(vec![self.desugar(body), call_loop(self.desugar(update))]),
            Expr::Quote(loop_result()),
        );

        Expr::letrec(
            loop_name.clone(),
            Expr::lambda(loop_var.clone(), step),
            call_loop(self.desugar(start)),
        )
    }
}

/// Expand every `for` in `expr`. Pure: no environment access, and generated
/// names are numbered from zero on every call.
pub fn desugar(expr: &Expr) -> Expr {
    Desugarer::new().desugar(expr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOperator, NumberType, sym, val};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn num(n: NumberType) -> Expr {
        Expr::Number(n)
    }

    fn id(name: &str) -> Expr {
        Expr::ident(name)
    }

    fn for_loop(var: &str, start: Expr, limit: Expr, body: Expr) -> Expr {
        Expr::For {
            loop_var: Symbol::named(var),
            start: Box::new(start),
            cond: Box::new(Expr::binary(BinaryOperator::Lt, id(var), limit)),
            update_var: Symbol::named(var),
            update: Box::new(Expr::binary(BinaryOperator::Add, id(var), num(1))),
            body: Box::new(body),
        }
    }

    #[test]
    fn test_for_expansion_shape() {
        let program = for_loop("i", num(0), num(5), Expr::apply(id("print"), id("i")));
        let loop_name = Symbol::Generated(0);
        let call = |arg| Expr::apply(Expr::Identifier(loop_name.clone()), arg);

        let expected = Expr::letrec(
            loop_name.clone(),
            Expr::lambda(
                "i",
                Expr::if_(
                    Expr::binary(BinaryOperator::Lt, id("i"), num(5)),
                    Expr::Begin(vec![
                        Expr::apply(id("print"), id("i")),
                        call(Expr::binary(BinaryOperator::Add, id("i"), num(1))),
                    ]),
                    Expr::Quote(sym("done")),
                ),
            ),
            call(num(0)),
        );

        assert_eq!(desugar(&program), expected);
    }

    #[test]
    fn test_nested_loops_get_distinct_names() {
        let inner = for_loop("j", num(0), num(2), id("j"));
        let outer = for_loop("i", num(0), num(3), inner);
        let expanded = desugar(&outer);

        assert!(!expanded.contains_sugar());
        let Expr::LetRec { name, binding, .. } = &expanded else {
            panic!("expected letrec, got {expanded}");
        };
        assert_eq!(name, &Symbol::Generated(0));
        // The inner loop is expanded while building the outer body
        assert!(binding.to_string().contains("#:loop1"));
    }

    #[test]
    fn test_sugar_found_in_nested_positions() {
        let looped = || for_loop("i", num(0), num(1), id("i"));
        let programs = vec![
            Expr::if_(Expr::Bool(true), looped(), num(0)),
            Expr::Begin(vec![num(1), looped()]),
            Expr::lambda("x", looped()),
            Expr::define("r", looped()),
            Expr::apply(Expr::lambda("x", id("x")), looped()),
            Expr::binary(BinaryOperator::Eq, looped(), num(0)),
            Expr::letrec("f", Expr::lambda("x", looped()), looped()),
        ];
        for program in programs {
            assert!(program.contains_sugar());
            let expanded = desugar(&program);
            assert!(!expanded.contains_sugar(), "sugar left in {expanded}");
        }
    }

    #[test]
    fn test_atoms_and_quotes_unchanged() {
        let quoted = Expr::Quote(val(vec![sym("for"), val(1)]));
        for expr in [num(3), id("x"), Expr::Bool(false), quoted] {
            assert_eq!(desugar(&expr), expr);
        }
    }

    #[test]
    fn test_user_identifier_cannot_capture_loop_name() {
        // A user binding spelled like the generated name is a different symbol
        let program = Expr::Begin(vec![
            Expr::define("#:loop0", num(1)),
            for_loop("i", num(0), num(1), id("i")),
        ]);
        let Expr::Begin(exprs) = desugar(&program) else {
            panic!("expected begin");
        };
        let Expr::LetRec { name, .. } = &exprs[1] else {
            panic!("expected letrec");
        };
        assert_ne!(name, &Symbol::named("#:loop0"));
    }

    #[test]
    fn test_reproducible_across_calls() {
        let program = for_loop("i", num(0), num(3), id("i"));
        assert_eq!(desugar(&program), desugar(&program));
    }

    fn arb_expr() -> impl Strategy<Value = Expr> {
        let leaf = prop_oneof![
            any::<i32>().prop_map(|n| Expr::Number(n.into())),
            any::<bool>().prop_map(Expr::Bool),
            "[a-z]{1,3}".prop_map(|name| Expr::ident(&name)),
            "[a-z ]{0,6}".prop_map(Expr::String),
            Just(Expr::Quote(sym("done"))),
            (any::<i32>(), "[a-z]{1,3}")
                .prop_map(|(n, name)| Expr::Quote(val(vec![val(n), sym(name), val(true)]))),
        ];
        leaf.prop_recursive(4, 32, 4, |inner| {
            prop_oneof![
                (inner.clone(), inner.clone())
                    .prop_map(|(a, b)| Expr::binary(BinaryOperator::Add, a, b)),
                (inner.clone(), inner.clone(), inner.clone())
                    .prop_map(|(c, t, e)| Expr::if_(c, t, e)),
                prop::collection::vec(inner.clone(), 1..4).prop_map(Expr::Begin),
                inner.clone().prop_map(|body| Expr::lambda("x", body)),
                (inner.clone(), inner.clone()).prop_map(|(f, a)| Expr::apply(f, a)),
                (inner.clone(), inner.clone())
                    .prop_map(|(start, body)| for_loop("i", start, num(3), body)),
                inner.clone().prop_map(|value| Expr::define("v", value)),
                (inner.clone(), inner.clone())
                    .prop_map(|(value, body)| Expr::letrec("f", Expr::lambda("x", value), body)),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_desugar_is_idempotent(expr in arb_expr()) {
            let once = desugar(&expr);
            prop_assert!(!once.contains_sugar());
            prop_assert_eq!(desugar(&once), once);
        }
    }
}
