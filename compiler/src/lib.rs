// mirc — kernel-bound dataflow graph compiler
//
// Library root. Front end, graph store, io-complement pass and the pipeline
// that drives them.

pub mod ast;
pub mod build;
pub mod catalog;
pub mod config;
pub mod diag;
pub mod dot;
pub mod graph;
pub mod id;
pub mod io_complement;
pub mod lexer;
pub mod op_desc;
pub mod parser;
pub mod pass;
pub mod pipeline;
pub mod types;
