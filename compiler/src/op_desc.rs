// op_desc.rs — Operator descriptors
//
// An `OpDesc` records which argument names an operator reads and writes,
// grouped by formal parameter (`Input`, `W`, `Out`, ...). Formal order is
// insertion order so renderings stay deterministic.

use serde::Serialize;

/// Binding of one formal parameter to the argument names it refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Binding {
    pub formal: String,
    pub arguments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DescError {
    #[error("operator descriptor has no type")]
    MissingType,
    #[error("formal parameter '{formal}' of '{op_type}' has no arguments")]
    EmptyBinding { op_type: String, formal: String },
    #[error("argument '{argument}' is written by more than one output of '{op_type}'")]
    DuplicateOutput { op_type: String, argument: String },
}

/// Operator descriptor: type plus input/output bindings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OpDesc {
    op_type: String,
    inputs: Vec<Binding>,
    outputs: Vec<Binding>,
    #[serde(skip)]
    flushed: bool,
}

impl OpDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn op_type(&self) -> &str {
        &self.op_type
    }

    pub fn set_type(&mut self, op_type: impl Into<String>) {
        self.op_type = op_type.into();
        self.flushed = false;
    }

    /// Bind `formal` to `arguments`, replacing any previous binding.
    pub fn set_input(&mut self, formal: impl Into<String>, arguments: Vec<String>) {
        set_binding(&mut self.inputs, formal.into(), arguments);
        self.flushed = false;
    }

    pub fn set_output(&mut self, formal: impl Into<String>, arguments: Vec<String>) {
        set_binding(&mut self.outputs, formal.into(), arguments);
        self.flushed = false;
    }

    /// Finalize the descriptor. A flushed descriptor has a type, no empty
    /// bindings and no argument written twice.
    pub fn flush(&mut self) -> Result<(), DescError> {
        if self.op_type.is_empty() {
            return Err(DescError::MissingType);
        }
        for b in self.inputs.iter().chain(&self.outputs) {
            if b.arguments.is_empty() {
                return Err(DescError::EmptyBinding {
                    op_type: self.op_type.clone(),
                    formal: b.formal.clone(),
                });
            }
        }
        let mut written: Vec<&str> = Vec::new();
        for arg in self.outputs.iter().flat_map(|b| &b.arguments) {
            if written.contains(&arg.as_str()) {
                return Err(DescError::DuplicateOutput {
                    op_type: self.op_type.clone(),
                    argument: arg.clone(),
                });
            }
            written.push(arg);
        }
        self.flushed = true;
        Ok(())
    }

    pub fn is_flushed(&self) -> bool {
        self.flushed
    }

    pub fn inputs(&self) -> &[Binding] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Binding] {
        &self.outputs
    }

    /// Argument names bound to input `formal`.
    pub fn input(&self, formal: &str) -> &[String] {
        find_binding(&self.inputs, formal)
    }

    /// Argument names bound to output `formal`.
    pub fn output(&self, formal: &str) -> &[String] {
        find_binding(&self.outputs, formal)
    }

    /// The formal input parameter through which `argument` is read.
    pub fn input_argname(&self, argument: &str) -> Option<&str> {
        formal_of(&self.inputs, argument)
    }

    /// Every formal input parameter through which `argument` is read.
    pub fn input_argnames<'a>(&'a self, argument: &'a str) -> impl Iterator<Item = &'a str> {
        self.inputs
            .iter()
            .filter(move |b| b.arguments.iter().any(|a| a == argument))
            .map(|b| b.formal.as_str())
    }

    /// All argument names read, in binding order.
    pub fn input_arguments(&self) -> impl Iterator<Item = &str> {
        self.inputs
            .iter()
            .flat_map(|b| b.arguments.iter().map(String::as_str))
    }

    /// All argument names written, in binding order.
    pub fn output_arguments(&self) -> impl Iterator<Item = &str> {
        self.outputs
            .iter()
            .flat_map(|b| b.arguments.iter().map(String::as_str))
    }

    /// Replace every input reference to `old` with `new`. Outputs are left
    /// alone. Returns the number of references rewritten.
    pub fn rename_input_argument(&mut self, old: &str, new: &str) -> usize {
        let mut count = 0;
        for arg in self.inputs.iter_mut().flat_map(|b| b.arguments.iter_mut()) {
            if arg == old {
                *arg = new.to_string();
                count += 1;
            }
        }
        count
    }
}

fn set_binding(bindings: &mut Vec<Binding>, formal: String, arguments: Vec<String>) {
    match bindings.iter_mut().find(|b| b.formal == formal) {
        Some(b) => b.arguments = arguments,
        None => bindings.push(Binding { formal, arguments }),
    }
}

fn find_binding<'a>(bindings: &'a [Binding], formal: &str) -> &'a [String] {
    bindings
        .iter()
        .find(|b| b.formal == formal)
        .map(|b| b.arguments.as_slice())
        .unwrap_or(&[])
}

fn formal_of<'a>(bindings: &'a [Binding], argument: &str) -> Option<&'a str> {
    bindings
        .iter()
        .find(|b| b.arguments.iter().any(|a| a == argument))
        .map(|b| b.formal.as_str())
}
