// hlsopt — array partitioning and dataflow level scheduling
//
// Library root. The front-end (lexer, parser, resolve) builds the IR; the
// passes (layout, dataflow, legality) transform it; pipeline orchestrates.

pub mod ast;
pub mod collect;
pub mod dataflow;
pub mod diag;
pub mod expr;
pub mod id;
pub mod ir;
pub mod layout;
pub mod legality;
pub mod lexer;
pub mod parser;
pub mod partition;
pub mod pass;
pub mod pipeline;
pub mod report;
pub mod resolve;
