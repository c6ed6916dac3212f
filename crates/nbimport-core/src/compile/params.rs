//! Notebook parameters: literal top-level `let` bindings that callers may
//! override before execution.

use quote::ToTokens;
use syn::{Expr, Local, Pat, Stmt};

use super::assemble::ProgramUnit;
use crate::error::{Error, Result};

/// One discovered parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    /// Declared type, as written.
    pub ty: Option<String>,
    /// Default value, as written.
    pub default: String,
    pub cell_index: usize,
    pub line: usize,
}

/// The parameters of a program unit, in order of first appearance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parameters {
    params: Vec<Parameter>,
}

impl Parameters {
    /// Collect every literal binding in code cells whose name does not start
    /// with `_`. When a name is bound more than once the last literal is the
    /// default.
    pub fn extract(unit: &ProgramUnit) -> Self {
        let mut params: Vec<Parameter> = Vec::new();

        for fragment in unit.code_fragments() {
            for stmt in fragment.statements() {
                let Some((name, ty, init)) = literal_binding(stmt) else {
                    continue;
                };
                let default = init.to_token_stream().to_string();
                let line = init.span_line();

                match params.iter_mut().find(|p| p.name == name) {
                    Some(existing) => {
                        existing.default = default;
                        existing.ty = ty;
                    }
                    None => params.push(Parameter {
                        name,
                        ty,
                        default,
                        cell_index: fragment.cell_index(),
                        line,
                    }),
                }
            }
        }

        Self { params }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

impl ProgramUnit {
    /// Replace parameter defaults with the given Rust expressions.
    ///
    /// Every literal binding of an overridden name is rewritten. The new
    /// expression is parsed at the line of the value it replaces. All
    /// overrides are checked before any is applied, so on error the unit is
    /// unchanged.
    pub fn parameterize<I, K, V>(&mut self, overrides: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let known = Parameters::extract(self);
        let mut edits: Vec<(usize, usize, Expr)> = Vec::new();

        for (name, value) in overrides {
            let (name, value) = (name.as_ref(), value.as_ref());
            if known.get(name).is_none() {
                return Err(Error::Parameter(format!("unknown parameter `{name}`")));
            }

            let mut replaced = 0;
            for (f, fragment) in self.fragments.iter().enumerate() {
                if !fragment.is_code() {
                    continue;
                }
                for (s, stmt) in fragment.stmts.iter().enumerate() {
                    let Stmt::Local(local) = stmt else {
                        continue;
                    };
                    if binding_name(local).as_deref() != Some(name) {
                        continue;
                    }
                    let Some(init) = &local.init else {
                        continue;
                    };
                    if !is_literal(&init.expr) {
                        continue;
                    }

                    let line = init.expr.span_line();
                    let padded = format!("{}{}", "\n".repeat(line.saturating_sub(1)), value);
                    let expr: Expr = syn::parse_str(&padded).map_err(|err| {
                        Error::Parameter(format!("invalid value for `{name}`: {err}"))
                    })?;
                    edits.push((f, s, expr));
                    replaced += 1;
                }
            }

            tracing::debug!("Parameter `{}` set to `{}` ({} bindings)", name, value, replaced);
        }

        for (f, s, expr) in edits {
            if let Stmt::Local(local) = &mut self.fragments[f].stmts[s]
                && let Some(init) = local.init.as_mut()
            {
                *init.expr = expr;
            }
        }

        Ok(())
    }
}

trait SpanLine {
    fn span_line(&self) -> usize;
}

impl SpanLine for Expr {
    fn span_line(&self) -> usize {
        syn::spanned::Spanned::span(self).start().line
    }
}

fn literal_binding(stmt: &Stmt) -> Option<(String, Option<String>, &Expr)> {
    let Stmt::Local(local) = stmt else {
        return None;
    };
    let name = binding_name(local)?;
    let init = local.init.as_ref()?;
    if init.diverge.is_some() || !is_literal(&init.expr) {
        return None;
    }
    let ty = match &local.pat {
        Pat::Type(typed) => Some(typed.ty.to_token_stream().to_string()),
        _ => None,
    };
    Some((name, ty, init.expr.as_ref()))
}

fn binding_name(local: &Local) -> Option<String> {
    let pat = match &local.pat {
        Pat::Type(typed) => typed.pat.as_ref(),
        pat => pat,
    };
    let Pat::Ident(ident) = pat else {
        return None;
    };
    if ident.subpat.is_some() {
        return None;
    }
    let name = ident.ident.to_string();
    (!name.starts_with('_')).then_some(name)
}

/// A literal, optionally negated.
fn is_literal(expr: &Expr) -> bool {
    match expr {
        Expr::Lit(_) => true,
        Expr::Unary(unary) => {
            matches!(unary.op, syn::UnOp::Neg(_)) && matches!(unary.expr.as_ref(), Expr::Lit(_))
        }
        Expr::Group(group) => is_literal(&group.expr),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::{Assembler, export_program};
    use crate::decode::{Document, NotebookValidator};

    const NOTEBOOK: &str = r#"{
 "nbformat": 4,
 "metadata": {"language_info": {"name": "rust"}},
 "cells": [
  {
   "cell_type": "code",
   "metadata": {},
   "source": [
    "let param = \"xyz\";\n",
    "let extra: i64 = 42;\n",
    "let _hidden = 1;\n",
    "let computed = extra * 2;\n",
    "let (a, b) = (1, 2);\n",
    "let negative = -3.5;"
   ]
  },
  {
   "cell_type": "markdown",
   "metadata": {},
   "source": "let fake = 1;"
  }
 ]
}"#;

    fn unit() -> ProgramUnit {
        let doc = Document::decode(NOTEBOOK.as_bytes(), &NotebookValidator::default()).unwrap();
        Assembler::new().assemble(&doc).unwrap()
    }

    #[test]
    fn test_extract() {
        let params = Parameters::extract(&unit());
        let names: Vec<_> = params.iter().map(|p| p.name.as_str()).collect();

        assert_eq!(names, ["param", "extra", "negative"]);
        assert_eq!(params.get("param").unwrap().default, "\"xyz\"");
        assert_eq!(params.get("extra").unwrap().ty.as_deref(), Some("i64"));
        assert_eq!(params.get("negative").unwrap().default, "- 3.5");

        let line = NOTEBOOK.lines().position(|l| l.contains("let extra")).unwrap() + 1;
        assert_eq!(params.get("extra").unwrap().line, line);
    }

    #[test]
    fn test_parameterize() {
        let mut unit = unit();
        unit.parameterize([("extra", "7"), ("param", "\"abc\"")]).unwrap();

        let params = Parameters::extract(&unit);
        assert_eq!(params.get("extra").unwrap().default, "7");
        assert_eq!(params.get("param").unwrap().default, "\"abc\"");

        let program = export_program(&unit);
        let line = NOTEBOOK.lines().position(|l| l.contains("let extra")).unwrap() + 1;
        assert!(program.lines().nth(line - 1).unwrap().contains("let extra : i64 = 7"));
    }

    #[test]
    fn test_parameterize_errors() {
        let mut unit = unit();

        let err = unit.parameterize([("computed", "1")]).unwrap_err();
        assert!(err.to_string().contains("unknown parameter `computed`"));

        let err = unit.parameterize([("extra", "1 +")]).unwrap_err();
        assert!(err.to_string().contains("invalid value for `extra`"));
    }

    #[test]
    fn test_failed_parameterize_leaves_unit_unchanged() {
        let mut unit = unit();
        let before = export_program(&unit);

        assert!(unit.parameterize([("extra", "7"), ("missing", "1")]).is_err());
        assert!(unit.parameterize([("extra", "7"), ("param", "\"unterminated")]).is_err());

        assert_eq!(export_program(&unit), before);
        assert_eq!(Parameters::extract(&unit).get("extra").unwrap().default, "42");
    }
}
