//! rsgrammer compiles a grammar description in an EBNF-like dialect into the
//! source of a stand-alone recursive-descent parser that reads conforming
//! text and emits its AST as JSON.
//!
//! The pipeline is strictly sequential: lexing and parsing build the
//! [`ast::Grammar`] model, the resolver passes in [`analysis`] validate and
//! annotate it, and [`translate`] lowers it to source text. Diagnostics flow
//! through a [`Reporter`]; each pass reports its full batch, and the first
//! batch containing an error aborts the pipeline.

pub mod analysis;
pub mod ast;
pub mod grammar;
pub mod lexer;
pub mod reporting;
pub mod translate;
mod templates;
mod writer;

use thiserror::Error;

pub use reporting::{Diagnostic, Loc, Reporter, Verbosity};

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("{pass} recorded {count} error(s)")]
    Failed { pass: &'static str, count: usize },
}

/// Compiles a grammar description into parser source. Diagnostics, including
/// the errors behind a `CompileError`, are recorded in `reporter`.
pub fn compile(source: &str, reporter: &mut Reporter) -> Result<String, CompileError> {
    let mut grammar = grammar::parse(source, reporter);
    end_batch(reporter, "grammar parsing")?;

    analysis::bind_names(&mut grammar, reporter);
    end_batch(reporter, "name resolution")?;

    analysis::expand_tokens(&mut grammar, reporter);
    end_batch(reporter, "token expansion")?;

    analysis::align_captures(&mut grammar, reporter);
    end_batch(reporter, "capture alignment")?;

    analysis::check_semantics(&grammar, reporter);
    end_batch(reporter, "semantic checks")?;

    let code = translate::translate(&grammar, reporter.filename());
    reporter.success("parser generation finished");
    Ok(code)
}

fn end_batch(reporter: &mut Reporter, pass: &'static str) -> Result<(), CompileError> {
    match reporter.end_batch() {
        0 => Ok(()),
        count => Err(CompileError::Failed { pass, count }),
    }
}
