//! Dead-join elimination.
//!
//! A joined source is dropped when nothing in the query can be referring to
//! it. The check is purely textual: a fragment references a source when it
//! contains `alias.` or `table.`. Failing to drop a removable join is fine;
//! dropping a referenced one is not, so every doubt keeps the source.

use crate::condition::{Operand, Predicate};
use crate::query::Query;
use crate::source::{Constraint, Source};
use tracing::trace;

/// Return the sources of `query` that must stay, in their original order.
pub fn optimize_sources(query: &Query) -> Vec<Source> {
    let sources = &query.sources;
    if sources.len() < 2 {
        return sources.clone();
    }

    let mut fragments = Vec::new();
    collect_query_fragments(query, &mut fragments);

    // An unqualified identifier could resolve to any source.
    if fragments.iter().any(|f| !f.contains('.')) {
        trace!("unqualified column reference, keeping every source");
        return sources.clone();
    }

    let mut keep = vec![true; sources.len()];
    for i in (1..sources.len()).rev() {
        let source = &sources[i];
        if !is_candidate(source) {
            continue;
        }

        let later_kept = sources
            .iter()
            .enumerate()
            .skip(i + 1)
            .filter(|(j, _)| keep[*j])
            .map(|(_, s)| s);

        let mut referenced = false;
        for later in later_kept {
            match &later.constraint {
                // USING names columns without qualifiers, so it may bind
                // to any source on its left.
                Some(Constraint::Using(_)) => referenced = true,
                Some(Constraint::On(preds)) => {
                    let mut on = Vec::new();
                    collect_predicate_fragments(preds, &mut on);
                    referenced |= on.iter().any(|f| mentions(f, source));
                }
                None => {}
            }
            if let Some(sub) = &later.sub {
                let mut inner = Vec::new();
                collect_query_fragments(sub, &mut inner);
                referenced |= inner.iter().any(|f| mentions(f, source));
            }
        }

        if !referenced {
            referenced = fragments.iter().any(|f| mentions(f, source));
        }

        if !referenced {
            trace!(source = source.label(), "join is unreferenced");
            keep[i] = false;
        }
    }

    sources
        .iter()
        .zip(keep)
        .filter(|(_, k)| *k)
        .map(|(s, _)| s.clone())
        .collect()
}

fn is_candidate(source: &Source) -> bool {
    match source.join {
        Some(join) => !join.is_outer() && !source.is_sub_query(),
        None => false,
    }
}

fn mentions(fragment: &str, source: &Source) -> bool {
    let fragment = unquote(fragment);
    let mut names = vec![unquote(&source.name)];
    if let Some(alias) = source.alias.as_deref() {
        names.push(unquote(alias));
    }
    names
        .into_iter()
        .filter(|n| !n.is_empty())
        .any(|n| fragment.contains(&format!("{}.", n)))
}

/// Drop identifier quoting so `"d"."name"`, `` `d`.name `` and `[d].[name]`
/// all read as `d.name`.
fn unquote(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '"' | '`' | '[' | ']'))
        .collect()
}

/// Every textual fragment of the query outside its FROM clause.
fn collect_query_fragments(query: &Query, out: &mut Vec<String>) {
    out.extend(query.results.iter().cloned());
    out.extend(
        query
            .aggregates
            .iter()
            .filter(|a| !(a.column.is_empty() || a.column == "*"))
            .map(|a| a.column.clone()),
    );
    out.extend(query.group_by.iter().cloned());
    out.extend(query.sorts.iter().map(|s| s.field.clone()));
    collect_predicate_fragments(&query.conds, out);
    collect_predicate_fragments(&query.having, out);
    for union in &query.unions {
        collect_query_fragments(&union.query, out);
    }
}

fn collect_predicate_fragments(preds: &[Predicate], out: &mut Vec<String>) {
    for p in preds {
        if !p.key.is_empty() {
            out.push(p.key.clone());
        }
        if let Some(Operand::SubQuery(sub)) = &p.value {
            collect_query_fragments(sub, out);
            for source in &sub.sources {
                if let Some(Constraint::On(on)) = &source.constraint {
                    collect_predicate_fragments(on, out);
                }
            }
        }
        collect_predicate_fragments(&p.subs, out);
    }
}
