//! Top-level AND decomposition and recombination.

use super::Criteria;

/// Split a criteria tree into its top-level conjuncts, flattening nested
/// ANDs. Order is preserved; non-AND nodes yield themselves.
#[must_use]
pub fn split_conjuncts(criteria: Criteria) -> Vec<Criteria> {
    let mut out = Vec::new();
    push_conjuncts(criteria, &mut out);
    out
}

fn push_conjuncts(criteria: Criteria, out: &mut Vec<Criteria>) {
    match criteria {
        Criteria::And(children) => {
            for child in children {
                push_conjuncts(child, out);
            }
        }
        other => out.push(other),
    }
}

/// AND a new conjunct into an accumulated filter, flattening as we go.
#[must_use]
pub fn and_combine(existing: Option<Criteria>, conjunct: Criteria) -> Criteria {
    match existing {
        None => conjunct,
        Some(Criteria::And(mut children)) => {
            push_conjuncts(conjunct, &mut children);
            Criteria::And(children)
        }
        Some(single) => {
            let mut children = vec![single];
            push_conjuncts(conjunct, &mut children);
            Criteria::And(children)
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn eq(field: &str, n: i64) -> Criteria {
        Criteria::eq(field, Value::Int(n))
    }

    #[test]
    fn split_flattens_nested_ands() {
        let tree = Criteria::And(vec![
            eq("a", 1),
            Criteria::And(vec![eq("b", 2), eq("c", 3)]),
        ]);

        let conjuncts = split_conjuncts(tree);
        assert_eq!(conjuncts, vec![eq("a", 1), eq("b", 2), eq("c", 3)]);
    }

    #[test]
    fn split_leaves_or_intact() {
        let or = Criteria::Or(vec![eq("a", 1), eq("b", 2)]);
        assert_eq!(split_conjuncts(or.clone()), vec![or]);
    }

    #[test]
    fn combine_preserves_order() {
        let combined = and_combine(Some(eq("a", 1)), Criteria::And(vec![eq("b", 2), eq("c", 3)]));
        assert_eq!(
            combined,
            Criteria::And(vec![eq("a", 1), eq("b", 2), eq("c", 3)])
        );
    }

    #[test]
    fn combine_into_empty_is_identity() {
        assert_eq!(and_combine(None, eq("a", 1)), eq("a", 1));
    }
}
