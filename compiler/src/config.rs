// config.rs — Compilation settings
//
// Settings come from two layers: `set` statements in the `.mir` source, then
// command-line overrides. A later `set` of the same key replaces an earlier
// one.
//
// Preconditions: none.
// Postconditions: `Settings` holds the resolved values; problems are
//   reported as diagnostics.
// Failure modes: malformed values (E0100, E0107); unknown keys (W0100).
// Side effects: none.

use crate::ast::{Program, SetStmt, SetValue, StatementKind};
use crate::diag::{codes, Diagnostic};
use crate::types::Place;

pub const VALID_PLACES: &str = "valid_places";
pub const PICK_IO_COPY_KERNEL: &str = "pick_io_copy_kernel";

/// Resolved settings for one compilation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    /// Ordered places kernels are enumerated for, highest priority first.
    pub valid_places: Vec<Place>,
    /// Run io_copy kernel narrowing after io-complement.
    pub pick_io_copy_kernel: bool,
}

/// Command-line values that take precedence over the source.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub valid_places: Option<Vec<Place>>,
    pub pick_io_copy_kernel: Option<bool>,
}

impl Settings {
    /// Collect settings from the `set` statements of `program`.
    pub fn from_program(program: &Program) -> (Settings, Vec<Diagnostic>) {
        let mut settings = Settings::default();
        let mut diags = Vec::new();
        for stmt in &program.statements {
            if let StatementKind::Set(set) = &stmt.kind {
                if let Err(d) = settings.apply_set(set) {
                    diags.push(d.with_span(stmt.span));
                }
            }
        }
        (settings, diags)
    }

    fn apply_set(&mut self, set: &SetStmt) -> Result<(), Diagnostic> {
        match set.name.name.as_str() {
            VALID_PLACES => {
                let SetValue::Places(places, _) = &set.value else {
                    return Err(Diagnostic::error(
                        codes::E0107,
                        format!("'{}' expects a list of places", VALID_PLACES),
                    )
                    .with_hint("write `set valid_places = [cuda/float32/nchw, host/float32/nchw]`"));
                };
                let parsed = places
                    .iter()
                    .map(|p| {
                        p.to_place()
                            .map_err(|e| Diagnostic::error(codes::E0100, e.to_string()))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                self.valid_places = parsed;
                Ok(())
            }
            PICK_IO_COPY_KERNEL => {
                let value = match &set.value {
                    SetValue::Ident(v) if v.name == "true" => true,
                    SetValue::Ident(v) if v.name == "false" => false,
                    _ => {
                        return Err(Diagnostic::error(
                            codes::E0107,
                            format!("'{}' expects true or false", PICK_IO_COPY_KERNEL),
                        ))
                    }
                };
                self.pick_io_copy_kernel = value;
                Ok(())
            }
            other => Err(Diagnostic::warning(
                codes::W0100,
                format!("unknown setting '{}'", other),
            )
            .with_hint(format!("known settings: {}, {}", VALID_PLACES, PICK_IO_COPY_KERNEL))),
        }
    }

    /// Apply command-line overrides on top of the source settings.
    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(places) = &overrides.valid_places {
            self.valid_places = places.clone();
        }
        if let Some(pick) = overrides.pick_io_copy_kernel {
            self.pick_io_copy_kernel = pick;
        }
    }
}
