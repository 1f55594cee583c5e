// catalog.rs — Operator and kernel catalog
//
// Holds the kernels available for each operator type. Kernels are declared
// with `kernel` statements in `.mir` files, either in the compiled source or
// in catalog files loaded with `-I`. The catalog creates `Operator`
// instances; an operator enumerates its candidate kernels for a list of
// valid places.
//
// Kernels are plain values: they never point back at an operator or its
// descriptor, so rewriting a descriptor never invalidates a kernel.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use chumsky::span::Span as _;
use serde::Serialize;

use crate::ast::{KernelStmt, ParamSig, Program, StatementKind};
use crate::diag::{codes, line_col, Diagnostic};
use crate::op_desc::{DescError, OpDesc};
use crate::types::{Place, Type};

/// Operator type of the conversion instruction inserted between mismatched
/// producers and consumers.
pub const IO_COPY_OP: &str = "io_copy";

/// Alias given to kernels declared without one.
pub const DEFAULT_ALIAS: &str = "def";

// ── Data types ──────────────────────────────────────────────────────────────

/// Declared type of one formal parameter of a kernel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamDecl {
    pub formal: String,
    pub ty: Type,
}

/// A concrete implementation of an operator for one place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Kernel {
    pub op_type: String,
    pub alias: String,
    pub place: Place,
    pub inputs: Vec<ParamDecl>,
    pub outputs: Vec<ParamDecl>,
}

impl Kernel {
    /// Unique key within the catalog: `op/alias/place`.
    pub fn key(&self) -> String {
        format!("{}/{}/{}", self.op_type, self.alias, self.place)
    }

    pub fn input_decl_type(&self, formal: &str) -> Option<&Type> {
        self.inputs.iter().find(|p| p.formal == formal).map(|p| &p.ty)
    }

    pub fn output_decl_type(&self, formal: &str) -> Option<&Type> {
        self.outputs.iter().find(|p| p.formal == formal).map(|p| &p.ty)
    }
}

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.alias == DEFAULT_ALIAS {
            write!(f, "{}@{}", self.op_type, self.place)
        } else {
            write!(f, "{}:{}@{}", self.op_type, self.alias, self.place)
        }
    }
}

/// Errors from catalog loading and operator creation.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("{}: {}", path.display(), source)]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{}:{}: {}", file.display(), line, message)]
    Parse {
        file: PathBuf,
        line: usize,
        message: String,
    },
    #[error("duplicate kernel '{key}': first declared in {}, redeclared in {}", first.display(), second.display())]
    DuplicateKernel {
        key: String,
        first: PathBuf,
        second: PathBuf,
    },
    #[error("unknown operator '{0}'")]
    UnknownOperator(String),
    #[error("cannot attach a '{found}' descriptor to a '{expected}' operator")]
    OperatorMismatch { expected: String, found: String },
    #[error(transparent)]
    Desc(#[from] DescError),
}

// ── Operator ────────────────────────────────────────────────────────────────

/// An operator instance: an op type, its descriptor and the kernels the
/// catalog knows for it.
#[derive(Debug, Clone, Serialize)]
pub struct Operator {
    op_type: String,
    desc: OpDesc,
    #[serde(skip)]
    registered: Vec<Kernel>,
}

impl Operator {
    pub fn op_type(&self) -> &str {
        &self.op_type
    }

    pub fn desc(&self) -> &OpDesc {
        &self.desc
    }

    /// Bind a descriptor, replacing the previous one. The descriptor is
    /// flushed if it has not been already.
    pub fn attach(&mut self, mut desc: OpDesc) -> Result<(), CatalogError> {
        if desc.op_type() != self.op_type {
            return Err(CatalogError::OperatorMismatch {
                expected: self.op_type.clone(),
                found: desc.op_type().to_string(),
            });
        }
        if !desc.is_flushed() {
            desc.flush()?;
        }
        self.desc = desc;
        Ok(())
    }

    /// Candidate kernels for `places`, ordered by place priority and then by
    /// registration order. A kernel appears at most once.
    pub fn create_kernels(&self, places: &[Place]) -> Vec<Kernel> {
        let mut kernels: Vec<Kernel> = Vec::new();
        for place in places {
            for kernel in &self.registered {
                if place.matches(&kernel.place) && !kernels.contains(kernel) {
                    kernels.push(kernel.clone());
                }
            }
        }
        kernels
    }
}

// ── Catalog ─────────────────────────────────────────────────────────────────

/// Kernel catalog, keyed by operator type.
#[derive(Debug, Default)]
pub struct OpCatalog {
    kernels: HashMap<String, Vec<(Kernel, PathBuf)>>,
}

impl OpCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one kernel. `origin` names where it was declared.
    pub fn register(&mut self, kernel: Kernel, origin: &Path) -> Result<(), CatalogError> {
        let entries = self.kernels.entry(kernel.op_type.clone()).or_default();
        if let Some((existing, first)) = entries.iter().find(|(k, _)| k.key() == kernel.key()) {
            return Err(CatalogError::DuplicateKernel {
                key: existing.key(),
                first: first.clone(),
                second: origin.to_path_buf(),
            });
        }
        entries.push((kernel, origin.to_path_buf()));
        Ok(())
    }

    /// Load kernels from a `.mir` file. Only `kernel` statements are
    /// considered. Returns the number of kernels registered.
    pub fn load_file(&mut self, path: &Path) -> Result<usize, CatalogError> {
        let source = std::fs::read_to_string(path).map_err(|e| CatalogError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        let parse_result = crate::parser::parse(&source);
        if let Some(err) = parse_result.errors.first() {
            return Err(CatalogError::Parse {
                file: path.to_path_buf(),
                line: line_col(&source, err.span().start()).0,
                message: err.to_string(),
            });
        }
        let program = parse_result.program.ok_or_else(|| CatalogError::Parse {
            file: path.to_path_buf(),
            line: 1,
            message: "parse failed with no output".to_string(),
        })?;

        let (count, diags) = self.register_program(&program, path);
        if let Some(d) = diags.iter().find(|d| d.is_error()) {
            return Err(CatalogError::Parse {
                file: path.to_path_buf(),
                line: d.span.map_or(1, |s| line_col(&source, s.start()).0),
                message: d.message.clone(),
            });
        }
        Ok(count)
    }

    /// Register every `kernel` statement of `program`. Problems are reported
    /// as diagnostics; well-formed kernels are still registered.
    pub fn register_program(&mut self, program: &Program, origin: &Path) -> (usize, Vec<Diagnostic>) {
        let mut count = 0;
        let mut diags = Vec::new();
        for stmt in &program.statements {
            let StatementKind::Kernel(k) = &stmt.kind else {
                continue;
            };
            let kernel = match kernel_from_stmt(k) {
                Ok(kernel) => kernel,
                Err(d) => {
                    diags.push(d);
                    continue;
                }
            };
            match self.register(kernel, origin) {
                Ok(()) => count += 1,
                Err(e) => diags.push(
                    Diagnostic::error(codes::E0106, e.to_string()).with_span(stmt.span),
                ),
            }
        }
        (count, diags)
    }

    /// Create an operator instance of `op_type`.
    pub fn create(&self, op_type: &str) -> Result<Operator, CatalogError> {
        let entries = self
            .kernels
            .get(op_type)
            .ok_or_else(|| CatalogError::UnknownOperator(op_type.to_string()))?;
        Ok(Operator {
            op_type: op_type.to_string(),
            desc: OpDesc::new(),
            registered: entries.iter().map(|(k, _)| k.clone()).collect(),
        })
    }

    pub fn contains(&self, op_type: &str) -> bool {
        self.kernels.contains_key(op_type)
    }

    /// Kernels registered for `op_type`, in registration order.
    pub fn kernels(&self, op_type: &str) -> impl Iterator<Item = &Kernel> {
        self.kernels
            .get(op_type)
            .into_iter()
            .flat_map(|entries| entries.iter().map(|(k, _)| k))
    }

    /// Number of registered kernels across all operators.
    pub fn len(&self) -> usize {
        self.kernels.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.kernels.is_empty()
    }
}

fn kernel_from_stmt(k: &KernelStmt) -> Result<Kernel, Diagnostic> {
    let place = k.place.to_place().map_err(|e| {
        Diagnostic::error(codes::E0100, e.to_string()).with_span(k.place.span)
    })?;
    Ok(Kernel {
        op_type: k.op.name.clone(),
        alias: k
            .alias
            .as_ref()
            .map_or_else(|| DEFAULT_ALIAS.to_string(), |a| a.name.clone()),
        place,
        inputs: param_decls(&k.inputs)?,
        outputs: param_decls(&k.outputs)?,
    })
}

fn param_decls(sigs: &[ParamSig]) -> Result<Vec<ParamDecl>, Diagnostic> {
    sigs.iter()
        .map(|sig| {
            let ty = sig.ty.to_type().map_err(|e| {
                Diagnostic::error(codes::E0100, e.to_string()).with_span(sig.ty.span)
            })?;
            Ok(ParamDecl {
                formal: sig.formal.name.clone(),
                ty,
            })
        })
        .collect()
}
