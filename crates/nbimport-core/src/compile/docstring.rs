//! Promotion of prose cells to doc attributes.

use syn::spanned::Spanned;
use syn::{Attribute, Expr, ExprLit, Item, Lit, LitStr, Stmt, parse_quote_spanned};

use super::assemble::{Fragment, ModuleDoc};
use crate::decode::CellKind;

/// Attach each prose literal to the item that starts the next cell.
///
/// The unit's first fragment is never promoted; it is the module's own
/// documentation. Returns the number of promoted literals. A promoted fragment keeps its
/// place in the list but loses its statement.
pub(crate) fn promote(fragments: &mut [Fragment]) -> usize {
    let mut promoted = 0;

    for i in 2..fragments.len() {
        let (head, tail) = fragments.split_at_mut(i);
        let prose = &mut head[i - 1];
        let target = &mut tail[0];

        if prose.kind != CellKind::Markdown || target.cell_index != prose.cell_index + 1 {
            continue;
        }
        let Some(lit) = single_literal(&prose.stmts) else {
            continue;
        };
        let Some(first) = target.stmts.first_mut() else {
            continue;
        };
        let Some(attrs) = documentable_attrs(first) else {
            continue;
        };

        attrs.insert(0, doc_attribute(lit.clone()));
        prose.stmts.clear();
        promoted += 1;
    }

    promoted
}

/// Take the leading prose cell as module documentation, unless it was
/// already promoted.
pub(crate) fn module_doc(fragments: &mut [Fragment]) -> Option<ModuleDoc> {
    let first = fragments.first_mut()?;
    if first.kind != CellKind::Markdown || first.cell_index != 0 {
        return None;
    }
    let text = single_literal(&first.stmts)?.value();
    first.stmts.clear();

    Some(ModuleDoc {
        text,
        line: first.line,
    })
}

/// The string literal of a fragment that consists of nothing else.
pub(crate) fn single_literal(stmts: &[Stmt]) -> Option<&LitStr> {
    match stmts {
        [stmt] => string_literal(stmt),
        _ => None,
    }
}

fn string_literal(stmt: &Stmt) -> Option<&LitStr> {
    match stmt {
        Stmt::Expr(
            Expr::Lit(ExprLit {
                attrs,
                lit: Lit::Str(lit),
            }),
            _,
        ) if attrs.is_empty() => Some(lit),
        _ => None,
    }
}

/// Attributes of an item that may receive a doc attribute.
fn documentable_attrs(stmt: &mut Stmt) -> Option<&mut Vec<Attribute>> {
    let Stmt::Item(item) = stmt else {
        return None;
    };

    let attrs = match item {
        Item::Fn(f) => {
            if f.block.stmts.first().and_then(string_literal).is_some() {
                return None;
            }
            &mut f.attrs
        }
        Item::Struct(s) => &mut s.attrs,
        Item::Enum(e) => &mut e.attrs,
        Item::Union(u) => &mut u.attrs,
        Item::Trait(t) => &mut t.attrs,
        _ => return None,
    };

    (!has_doc(attrs)).then_some(attrs)
}

fn has_doc(attrs: &[Attribute]) -> bool {
    attrs
        .iter()
        .any(|attr| matches!(attr.style, syn::AttrStyle::Outer) && attr.path().is_ident("doc"))
}

fn doc_attribute(lit: LitStr) -> Attribute {
    let span = lit.span();
    parse_quote_spanned! {span=> #[doc = #lit]}
}

/// The doc text of an item statement, if it has one.
pub fn item_doc(stmt: &Stmt) -> Option<String> {
    let Stmt::Item(item) = stmt else {
        return None;
    };
    let attrs = match item {
        Item::Fn(f) => &f.attrs,
        Item::Struct(s) => &s.attrs,
        Item::Enum(e) => &e.attrs,
        Item::Union(u) => &u.attrs,
        Item::Trait(t) => &t.attrs,
        _ => return None,
    };

    let docs: Vec<String> = attrs
        .iter()
        .filter_map(|attr| {
            if attr.path().is_ident("doc")
                && let syn::Meta::NameValue(nv) = &attr.meta
                && let Expr::Lit(ExprLit {
                    lit: Lit::Str(s), ..
                }) = &nv.value
            {
                return Some(s.value());
            }
            None
        })
        .collect();

    (!docs.is_empty()).then(|| docs.join("\n"))
}

/// Span line of the first token of a statement's doc attribute, if any.
pub fn doc_line(stmt: &Stmt) -> Option<usize> {
    let Stmt::Item(item) = stmt else {
        return None;
    };
    let attrs = match item {
        Item::Fn(f) => &f.attrs,
        Item::Struct(s) => &s.attrs,
        Item::Enum(e) => &e.attrs,
        Item::Union(u) => &u.attrs,
        Item::Trait(t) => &t.attrs,
        _ => return None,
    };
    attrs
        .iter()
        .find(|attr| attr.path().is_ident("doc"))
        .map(|attr| attr.span().start().line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::Assembler;
    use crate::decode::{Document, NotebookValidator};

    fn unit(cells: &str) -> crate::compile::ProgramUnit {
        let text = format!(
            "{{\"nbformat\": 4, \"metadata\": {{\"language_info\": {{\"name\": \"rust\"}}}}, \"cells\": [\n{cells}\n]}}"
        );
        let doc = Document::decode(text.as_bytes(), &NotebookValidator::default()).unwrap();
        Assembler::new().assemble(&doc).unwrap()
    }

    #[test]
    fn test_prose_before_fn_is_promoted() {
        let unit = unit(
            r#"{"cell_type": "code", "metadata": {}, "source": "let setup = 1;"},
{"cell_type": "markdown", "metadata": {}, "source": "Adds one."},
{"cell_type": "code", "metadata": {}, "source": "fn f(x: i32) -> i32 { x + 1 }"}"#,
        );

        let fragments = unit.fragments();
        assert!(fragments[1].statements().is_empty());

        let item = &fragments[2].statements()[0];
        assert_eq!(item_doc(item).as_deref(), Some("Adds one."));
        assert_eq!(doc_line(item), Some(fragments[1].line()));
        assert!(unit.doc().is_none());
    }

    #[test]
    fn test_documented_fn_keeps_prose_statement() {
        let unit = unit(
            r#"{"cell_type": "code", "metadata": {}, "source": "let setup = 1;"},
{"cell_type": "markdown", "metadata": {}, "source": "Prose."},
{"cell_type": "code", "metadata": {}, "source": "/// Own docs.\nfn f() {}"}"#,
        );

        let fragments = unit.fragments();
        assert_eq!(fragments[1].statements().len(), 1);
        assert_eq!(item_doc(&fragments[2].statements()[0]).as_deref(), Some(" Own docs."));
    }

    #[test]
    fn test_fn_with_leading_literal_is_not_promoted() {
        let unit = unit(
            r#"{"cell_type": "code", "metadata": {}, "source": ""},
{"cell_type": "markdown", "metadata": {}, "source": "Prose."},
{"cell_type": "code", "metadata": {}, "source": "fn f() { \"already\"; }"}"#,
        );

        assert_eq!(unit.fragments()[1].statements().len(), 1);
        assert!(item_doc(&unit.fragments()[2].statements()[0]).is_none());
    }

    #[test]
    fn test_types_and_traits_are_promoted() {
        let unit = unit(
            r#"{"cell_type": "code", "metadata": {}, "source": ""},
{"cell_type": "markdown", "metadata": {}, "source": "A point."},
{"cell_type": "code", "metadata": {}, "source": "struct P { x: i32 }"},
{"cell_type": "markdown", "metadata": {}, "source": "Shapes."},
{"cell_type": "code", "metadata": {}, "source": "trait Shape {}"},
{"cell_type": "markdown", "metadata": {}, "source": "Not an item."},
{"cell_type": "code", "metadata": {}, "source": "let y = 2;"}"#,
        );
        let fragments = unit.fragments();

        assert_eq!(item_doc(&fragments[2].statements()[0]).as_deref(), Some("A point."));
        assert_eq!(item_doc(&fragments[4].statements()[0]).as_deref(), Some("Shapes."));
        assert_eq!(fragments[5].statements().len(), 1);
    }

    #[test]
    fn test_item_must_be_first_statement() {
        let unit = unit(
            r#"{"cell_type": "code", "metadata": {}, "source": ""},
{"cell_type": "markdown", "metadata": {}, "source": "Prose."},
{"cell_type": "code", "metadata": {}, "source": "let a = 1;\nfn f() {}"}"#,
        );

        assert_eq!(unit.fragments()[1].statements().len(), 1);
    }

    #[test]
    fn test_leading_prose_becomes_module_doc() {
        let unit = unit(
            r##"{"cell_type": "markdown", "metadata": {}, "source": "# Title"},
{"cell_type": "code", "metadata": {}, "source": "let a = 1;"}"##,
        );

        assert_eq!(unit.doc(), Some("# Title"));
        assert!(unit.fragments()[0].statements().is_empty());
    }

    #[test]
    fn test_leading_prose_before_item_stays_module_doc() {
        let unit = unit(
            r##"{"cell_type": "markdown", "metadata": {}, "source": "# My notebook"},
{"cell_type": "code", "metadata": {}, "source": "fn f() {}"}"##,
        );

        assert_eq!(unit.doc(), Some("# My notebook"));
        assert!(unit.fragments()[0].statements().is_empty());
        assert!(item_doc(&unit.fragments()[1].statements()[0]).is_none());
    }

    #[test]
    fn test_single_prose_cell() {
        let unit = unit(r#"{"cell_type": "markdown", "metadata": {}, "source": "Only prose."}"#);

        assert_eq!(unit.doc(), Some("Only prose."));
        assert_eq!(unit.statements().count(), 0);
    }

    #[test]
    fn test_disabled_promotion() {
        let text = r#"{"nbformat": 4, "metadata": {"language_info": {"name": "rust"}}, "cells": [
{"cell_type": "code", "metadata": {}, "source": ""},
{"cell_type": "markdown", "metadata": {}, "source": "Prose."},
{"cell_type": "code", "metadata": {}, "source": "fn f() {}"}]}"#;
        let doc = Document::decode(text.as_bytes(), &NotebookValidator::default()).unwrap();
        let unit = Assembler::new().docstrings(false).assemble(&doc).unwrap();

        assert_eq!(unit.fragments()[1].statements().len(), 1);
        assert!(item_doc(&unit.fragments()[2].statements()[0]).is_none());
    }
}
