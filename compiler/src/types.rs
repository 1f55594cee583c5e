// types.rs — Value types and places for kernel-bound dataflow graphs
//
// A `Type` describes what an argument actually holds (target, precision,
// layout). A `Place` is the key used to select kernels from the catalog.
// Both share the same three components; `Any` is only meaningful on the
// declared side (kernel signatures and places).
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: `FromStr` rejects unknown component names.
// Side effects: none.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ── Components ──────────────────────────────────────────────────────────────

/// Execution target (device class / memory space).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Host,
    X86,
    Arm,
    Cuda,
    OpenCl,
    Any,
}

/// Element kind of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrecisionType {
    Float32,
    Float16,
    Int8,
    Int32,
    Int64,
    Any,
}

/// Memory layout of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataLayoutType {
    Nchw,
    Nhwc,
    RowMajor,
    Any,
}

impl TargetType {
    pub fn name(self) -> &'static str {
        match self {
            TargetType::Host => "host",
            TargetType::X86 => "x86",
            TargetType::Arm => "arm",
            TargetType::Cuda => "cuda",
            TargetType::OpenCl => "opencl",
            TargetType::Any => "any",
        }
    }
}

impl PrecisionType {
    pub fn name(self) -> &'static str {
        match self {
            PrecisionType::Float32 => "float32",
            PrecisionType::Float16 => "float16",
            PrecisionType::Int8 => "int8",
            PrecisionType::Int32 => "int32",
            PrecisionType::Int64 => "int64",
            PrecisionType::Any => "any",
        }
    }
}

impl DataLayoutType {
    pub fn name(self) -> &'static str {
        match self {
            DataLayoutType::Nchw => "nchw",
            DataLayoutType::Nhwc => "nhwc",
            DataLayoutType::RowMajor => "row_major",
            DataLayoutType::Any => "any",
        }
    }
}

impl FromStr for TargetType {
    type Err = TypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "host" => Ok(TargetType::Host),
            "x86" => Ok(TargetType::X86),
            "arm" => Ok(TargetType::Arm),
            "cuda" => Ok(TargetType::Cuda),
            "opencl" => Ok(TargetType::OpenCl),
            "any" => Ok(TargetType::Any),
            _ => Err(TypeParseError::UnknownTarget(s.to_string())),
        }
    }
}

impl FromStr for PrecisionType {
    type Err = TypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "float32" | "float" => Ok(PrecisionType::Float32),
            "float16" => Ok(PrecisionType::Float16),
            "int8" => Ok(PrecisionType::Int8),
            "int32" => Ok(PrecisionType::Int32),
            "int64" => Ok(PrecisionType::Int64),
            "any" => Ok(PrecisionType::Any),
            _ => Err(TypeParseError::UnknownPrecision(s.to_string())),
        }
    }
}

impl FromStr for DataLayoutType {
    type Err = TypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nchw" => Ok(DataLayoutType::Nchw),
            "nhwc" => Ok(DataLayoutType::Nhwc),
            "row_major" => Ok(DataLayoutType::RowMajor),
            "any" => Ok(DataLayoutType::Any),
            _ => Err(TypeParseError::UnknownLayout(s.to_string())),
        }
    }
}

/// Errors from parsing `target/precision/layout` triples.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TypeParseError {
    #[error("unknown target '{0}' (expected host, x86, arm, cuda, opencl or any)")]
    UnknownTarget(String),
    #[error("unknown precision '{0}' (expected float32, float16, int8, int32, int64 or any)")]
    UnknownPrecision(String),
    #[error("unknown layout '{0}' (expected nchw, nhwc, row_major or any)")]
    UnknownLayout(String),
    #[error("expected 'target/precision/layout', found '{0}'")]
    Malformed(String),
}

// ── Type ────────────────────────────────────────────────────────────────────

/// The type of a value flowing along a dataflow edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Type {
    pub target: TargetType,
    pub precision: PrecisionType,
    pub layout: DataLayoutType,
}

impl Type {
    pub const fn new(target: TargetType, precision: PrecisionType, layout: DataLayoutType) -> Self {
        Type {
            target,
            precision,
            layout,
        }
    }

    /// Fill every `Any` component of `self` with the matching component of
    /// `actual`. Used to type a conversion output from its declared type.
    pub fn refine(&self, actual: &Type) -> Type {
        Type {
            target: if self.target == TargetType::Any {
                actual.target
            } else {
                self.target
            },
            precision: if self.precision == PrecisionType::Any {
                actual.precision
            } else {
                self.precision
            },
            layout: if self.layout == DataLayoutType::Any {
                actual.layout
            } else {
                self.layout
            },
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.target.name(),
            self.precision.name(),
            self.layout.name()
        )
    }
}

impl FromStr for Type {
    type Err = TypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (target, precision, layout) = split_triple(s)?;
        Ok(Type::new(target.parse()?, precision.parse()?, layout.parse()?))
    }
}

/// Whether a value of type `produced` can be consumed where `declared` is
/// required. Each component must match exactly unless the declared side is
/// `Any`; there is no implicit widening.
pub fn type_compatible_to(produced: &Type, declared: &Type) -> bool {
    (declared.target == TargetType::Any || produced.target == declared.target)
        && (declared.precision == PrecisionType::Any || produced.precision == declared.precision)
        && (declared.layout == DataLayoutType::Any || produced.layout == declared.layout)
}

// ── Place ───────────────────────────────────────────────────────────────────

/// Kernel selection key: where (and in what representation) a kernel runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Place {
    pub target: TargetType,
    pub precision: PrecisionType,
    pub layout: DataLayoutType,
}

impl Place {
    pub const fn new(target: TargetType, precision: PrecisionType, layout: DataLayoutType) -> Self {
        Place {
            target,
            precision,
            layout,
        }
    }

    /// A kernel registered at `kernel_place` may serve `self` when every
    /// component agrees or either side is `Any`.
    pub fn matches(&self, kernel_place: &Place) -> bool {
        fn agree<T: PartialEq>(a: T, b: T, any: T) -> bool {
            a == b || a == any || b == any
        }
        agree(self.target, kernel_place.target, TargetType::Any)
            && agree(self.precision, kernel_place.precision, PrecisionType::Any)
            && agree(self.layout, kernel_place.layout, DataLayoutType::Any)
    }
}

impl fmt::Display for Place {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.target.name(),
            self.precision.name(),
            self.layout.name()
        )
    }
}

impl FromStr for Place {
    type Err = TypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (target, precision, layout) = split_triple(s)?;
        Ok(Place::new(target.parse()?, precision.parse()?, layout.parse()?))
    }
}

/// Parse a comma-separated place list, e.g. `cuda/float32/nchw,host/float32/nchw`.
pub fn parse_place_list(s: &str) -> Result<Vec<Place>, TypeParseError> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::parse)
        .collect()
}

fn split_triple(s: &str) -> Result<(&str, &str, &str), TypeParseError> {
    let mut parts = s.trim().split('/');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(t), Some(p), Some(l), None) => Ok((t, p, l)),
        _ => Err(TypeParseError::Malformed(s.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOST_F32: Type = Type::new(TargetType::Host, PrecisionType::Float32, DataLayoutType::Nchw);
    const CUDA_F32: Type = Type::new(TargetType::Cuda, PrecisionType::Float32, DataLayoutType::Nchw);

    #[test]
    fn identical_types_are_compatible() {
        assert!(type_compatible_to(&HOST_F32, &HOST_F32));
    }

    #[test]
    fn target_mismatch_is_incompatible() {
        assert!(!type_compatible_to(&HOST_F32, &CUDA_F32));
        assert!(!type_compatible_to(&CUDA_F32, &HOST_F32));
    }

    #[test]
    fn no_implicit_precision_widening() {
        let int8 = Type::new(TargetType::Host, PrecisionType::Int8, DataLayoutType::Nchw);
        let int32 = Type::new(TargetType::Host, PrecisionType::Int32, DataLayoutType::Nchw);
        assert!(!type_compatible_to(&int8, &int32));
    }

    #[test]
    fn layout_mismatch_is_incompatible() {
        let nhwc = Type::new(TargetType::Host, PrecisionType::Float32, DataLayoutType::Nhwc);
        assert!(!type_compatible_to(&nhwc, &HOST_F32));
    }

    #[test]
    fn declared_any_accepts_every_component() {
        let host_any: Type = "host/any/any".parse().unwrap();
        assert!(type_compatible_to(&HOST_F32, &host_any));
        assert!(!type_compatible_to(&CUDA_F32, &host_any));
        // `Any` on the produced side does not satisfy a concrete declaration.
        assert!(!type_compatible_to(&host_any, &HOST_F32));
    }

    #[test]
    fn refine_fills_any_components() {
        let declared: Type = "cuda/any/any".parse().unwrap();
        assert_eq!(declared.refine(&HOST_F32), CUDA_F32);
        assert_eq!(CUDA_F32.refine(&HOST_F32), CUDA_F32);
    }

    #[test]
    fn place_matching_treats_any_symmetrically() {
        let cuda_any: Place = "cuda/any/any".parse().unwrap();
        let cuda_f32: Place = "cuda/float32/nchw".parse().unwrap();
        let host_f32: Place = "host/float32/nchw".parse().unwrap();
        assert!(cuda_f32.matches(&cuda_any));
        assert!(cuda_any.matches(&cuda_f32));
        assert!(!host_f32.matches(&cuda_any));
    }

    #[test]
    fn display_roundtrips_through_from_str() {
        let t: Type = "opencl/int8/row_major".parse().unwrap();
        assert_eq!(t.to_string(), "opencl/int8/row_major");
    }

    #[test]
    fn float_is_an_alias_for_float32() {
        let t: Type = "host/float/nchw".parse().unwrap();
        assert_eq!(t, HOST_F32);
    }

    #[test]
    fn malformed_triples_are_rejected() {
        assert_eq!(
            "host/float32".parse::<Type>(),
            Err(TypeParseError::Malformed("host/float32".to_string()))
        );
        assert!(matches!(
            "tpu/float32/nchw".parse::<Place>(),
            Err(TypeParseError::UnknownTarget(t)) if t == "tpu"
        ));
    }

    #[test]
    fn place_list_parsing() {
        let places = parse_place_list("cuda/float32/nchw, host/float32/nchw").unwrap();
        assert_eq!(places.len(), 2);
        assert_eq!(places[0].target, TargetType::Cuda);
        assert_eq!(places[1].target, TargetType::Host);
        assert!(parse_place_list("").unwrap().is_empty());
    }
}
