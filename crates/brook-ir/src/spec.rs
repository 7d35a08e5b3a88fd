use std::{fmt, fs, io, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Frozen IR specification version enforced by the module snapshot codecs.
pub const SPEC_VERSION: &str = "bir.v0.1";

fn default_spec_version() -> String {
    SPEC_VERSION.to_string()
}

/// Scalar element types supported by the IR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    I1,
    Si32,
    Si64,
    Ui32,
    Ui64,
    Bf16,
    F16,
    F32,
    F64,
}

impl DType {
    /// Returns `true` when the dtype is a floating-point representation.
    pub fn is_float(self) -> bool {
        matches!(self, DType::Bf16 | DType::F16 | DType::F32 | DType::F64)
    }

    /// Returns `true` when the dtype is any signed or unsigned integer.
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            DType::Si32 | DType::Si64 | DType::Ui32 | DType::Ui64
        )
    }
}

/// Logical tensor shape as an ordered list of static extents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    pub fn new(dims: impl Into<Vec<usize>>) -> Self {
        Self { dims: dims.into() }
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Returns element count, or `None` on overflow.
    pub fn element_count(&self) -> Option<usize> {
        let mut count = 1usize;
        for dim in &self.dims {
            count = count.checked_mul(*dim)?;
        }
        Some(count)
    }
}

/// Tensor metadata coupling dtype and shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorSpec {
    pub dtype: DType,
    pub shape: Shape,
}

impl TensorSpec {
    pub fn new(dtype: DType, shape: Shape) -> Self {
        Self { dtype, shape }
    }
}

/// Typing information for instruction results.
///
/// `Pending` is the structured value produced by an `async-start`: the
/// eventual tensor is described, but it is not available until the matching
/// `async-done` retires the operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueType {
    Tensor(TensorSpec),
    Pending(TensorSpec),
}

impl ValueType {
    /// Returns the underlying tensor spec regardless of readiness.
    pub fn tensor_spec(&self) -> &TensorSpec {
        match self {
            ValueType::Tensor(spec) | ValueType::Pending(spec) => spec,
        }
    }

    /// Returns the pending form of this type.
    pub fn as_pending(&self) -> ValueType {
        ValueType::Pending(self.tensor_spec().clone())
    }
}

/// Elementwise unary ops defined by the IR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Exp,
    Log,
    Tanh,
}

/// Elementwise binary ops defined by the IR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Maximum,
    Minimum,
}

/// Flat opcode discriminant used for structural queries and test assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    Parameter,
    Neg,
    Exp,
    Log,
    Tanh,
    Add,
    Sub,
    Mul,
    Div,
    Maximum,
    Minimum,
    AsyncStart,
    AsyncDone,
}

impl Opcode {
    pub fn name(self) -> &'static str {
        match self {
            Opcode::Parameter => "parameter",
            Opcode::Neg => "neg",
            Opcode::Exp => "exp",
            Opcode::Log => "log",
            Opcode::Tanh => "tanh",
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mul => "mul",
            Opcode::Div => "div",
            Opcode::Maximum => "maximum",
            Opcode::Minimum => "minimum",
            Opcode::AsyncStart => "async-start",
            Opcode::AsyncDone => "async-done",
        }
    }

    /// Returns `true` for the two halves of an async pair.
    pub fn is_async(self) -> bool {
        matches!(self, Opcode::AsyncStart | Opcode::AsyncDone)
    }
}

/// Declarative form of IR operations.
///
/// `AsyncStart` carries the wrapped instruction as its sole structural
/// payload; the wrapped instruction is no longer a freestanding member of the
/// computation arena once it has been moved here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    Parameter { index: usize },
    Unary(UnaryOp),
    Binary(BinaryOp),
    AsyncStart(Box<Instruction>),
    AsyncDone,
}

impl Operation {
    pub fn opcode(&self) -> Opcode {
        match self {
            Operation::Parameter { .. } => Opcode::Parameter,
            Operation::Unary(UnaryOp::Neg) => Opcode::Neg,
            Operation::Unary(UnaryOp::Exp) => Opcode::Exp,
            Operation::Unary(UnaryOp::Log) => Opcode::Log,
            Operation::Unary(UnaryOp::Tanh) => Opcode::Tanh,
            Operation::Binary(BinaryOp::Add) => Opcode::Add,
            Operation::Binary(BinaryOp::Sub) => Opcode::Sub,
            Operation::Binary(BinaryOp::Mul) => Opcode::Mul,
            Operation::Binary(BinaryOp::Div) => Opcode::Div,
            Operation::Binary(BinaryOp::Maximum) => Opcode::Maximum,
            Operation::Binary(BinaryOp::Minimum) => Opcode::Minimum,
            Operation::AsyncStart(_) => Opcode::AsyncStart,
            Operation::AsyncDone => Opcode::AsyncDone,
        }
    }
}

/// Execution context an instruction is scheduled on.
///
/// The tag is consumed by later scheduling stages; during a pass run it is
/// plain metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionThread {
    #[default]
    Main,
    Parallel,
}

impl ExecutionThread {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionThread::Main => "main",
            ExecutionThread::Parallel => "parallel",
        }
    }
}

/// Stable identifier for instructions in a computation arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstrId(pub u32);

/// Single instruction in a computation.
///
/// Operands are arena identifiers referring to earlier instructions, so a
/// verified computation is acyclic by construction. `backend_config` is the
/// opaque scheduling blob decoded through [`crate::config::SchedulingConfig`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub id: InstrId,
    pub name: String,
    pub op: Operation,
    pub operands: Vec<InstrId>,
    pub output: ValueType,
    #[serde(default)]
    pub backend_config: Option<String>,
    #[serde(default)]
    pub execution_thread: ExecutionThread,
}

impl Instruction {
    pub fn opcode(&self) -> Opcode {
        self.op.opcode()
    }

    /// For an `async-start`, the opcode of the wrapped instruction.
    pub fn async_wrapped_opcode(&self) -> Option<Opcode> {
        match &self.op {
            Operation::AsyncStart(wrapped) => Some(wrapped.opcode()),
            _ => None,
        }
    }

    /// For an `async-start`, the wrapped instruction itself.
    pub fn async_wrapped(&self) -> Option<&Instruction> {
        match &self.op {
            Operation::AsyncStart(wrapped) => Some(wrapped),
            _ => None,
        }
    }
}

/// Computation graph: an arena of instructions in declaration order with a
/// designated root whose value is the computation's output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Computation {
    pub name: String,
    pub body: Vec<Instruction>,
    pub root_id: InstrId,
}

impl Computation {
    pub fn instruction(&self, id: InstrId) -> Option<&Instruction> {
        self.body.iter().find(|inst| inst.id == id)
    }

    pub fn root(&self) -> Option<&Instruction> {
        self.instruction(self.root_id)
    }
}

/// Complete IR module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    #[serde(default = "default_spec_version")]
    pub spec_version: String,
    pub name: String,
    pub entry: String,
    pub computations: Vec<Computation>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            spec_version: SPEC_VERSION.to_string(),
            entry: name.clone(),
            name,
            computations: Vec::new(),
        }
    }

    pub fn with_computations(mut self, computations: Vec<Computation>) -> Self {
        self.computations = computations;
        self
    }

    pub fn entry_computation(&self) -> Option<&Computation> {
        self.computations.iter().find(|comp| comp.name == self.entry)
    }

    pub fn to_json_string(&self) -> Result<String, ModuleSerdeError> {
        serde_json::to_string_pretty(self).map_err(ModuleSerdeError::from)
    }

    pub fn from_json_str(src: &str) -> Result<Self, ModuleSerdeError> {
        let mut module: Module = serde_json::from_str(src).map_err(ModuleSerdeError::from)?;
        module.spec_version = normalize_spec_version(module.spec_version)?;
        Ok(module)
    }

    pub fn to_bincode_bytes(&self) -> Result<Vec<u8>, ModuleSerdeError> {
        bincode::serialize(self).map_err(ModuleSerdeError::from)
    }

    pub fn from_bincode_slice(bytes: &[u8]) -> Result<Self, ModuleSerdeError> {
        let mut module: Module = bincode::deserialize(bytes).map_err(ModuleSerdeError::from)?;
        module.spec_version = normalize_spec_version(module.spec_version)?;
        Ok(module)
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<(), ModuleIoError> {
        let contents = self.to_json_string()?;
        fs::write(path, contents).map_err(ModuleIoError::from)
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self, ModuleIoError> {
        let contents = fs::read_to_string(path).map_err(ModuleIoError::from)?;
        Module::from_json_str(&contents).map_err(ModuleIoError::from)
    }

    pub fn to_text(&self) -> String {
        format!("{self}")
    }
}

#[derive(Debug, Error)]
pub enum ModuleSerdeError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("module spec version '{found}' does not match expected '{expected}'")]
    SpecVersionMismatch {
        found: String,
        expected: &'static str,
    },
}

#[derive(Debug, Error)]
pub enum ModuleIoError {
    #[error(transparent)]
    Serialization(#[from] ModuleSerdeError),
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

fn normalize_spec_version(version: String) -> Result<String, ModuleSerdeError> {
    if version.is_empty() {
        return Ok(SPEC_VERSION.to_string());
    }
    if version == SPEC_VERSION {
        Ok(version)
    } else {
        Err(ModuleSerdeError::SpecVersionMismatch {
            found: version,
            expected: SPEC_VERSION,
        })
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_line(
            f,
            0,
            &format!(
                "module @{} (spec_version = {}) {{",
                self.name, self.spec_version
            ),
        )?;
        for computation in &self.computations {
            fmt_computation(computation, 1, f)?;
        }
        write_line(f, 0, "}")
    }
}

fn fmt_computation(
    computation: &Computation,
    indent: usize,
    f: &mut fmt::Formatter<'_>,
) -> fmt::Result {
    write_line(f, indent, &format!("comp @{} {{", computation.name))?;
    for instruction in &computation.body {
        fmt_instruction(instruction, indent + 1, f)?;
    }
    if let Some(root) = computation.root() {
        write_line(f, indent + 1, &format!("root %{}", root.name))?;
    }
    write_line(f, indent, "}")
}

fn fmt_instruction(
    instruction: &Instruction,
    indent: usize,
    f: &mut fmt::Formatter<'_>,
) -> fmt::Result {
    let mut line = format!("%{} = {}", instruction.name, instruction.opcode().name());
    if let Some(wrapped) = instruction.async_wrapped() {
        line.push_str(&format!("<{}>", wrapped.opcode().name()));
    }
    if let Operation::Parameter { index } = instruction.op {
        line.push_str(&format!("({index})"));
    } else if !instruction.operands.is_empty() {
        let operands = instruction
            .operands
            .iter()
            .map(|id| format!("%{}", id.0))
            .collect::<Vec<_>>()
            .join(", ");
        line.push_str(&format!("({operands})"));
    }
    if instruction.execution_thread != ExecutionThread::Main {
        line.push_str(&format!(
            " thread[{}]",
            instruction.execution_thread.as_str()
        ));
    }
    if let Some(config) = &instruction.backend_config {
        line.push_str(&format!(" config[{config}]"));
    }
    line.push_str(&format!(" -> {}", format_value_type(&instruction.output)));
    write_line(f, indent, &line)
}

fn format_value_type(value_type: &ValueType) -> String {
    match value_type {
        ValueType::Tensor(spec) => {
            format!("tensor<{:?}, {}>", spec.dtype, format_shape(&spec.shape))
        }
        ValueType::Pending(spec) => {
            format!("pending<{:?}, {}>", spec.dtype, format_shape(&spec.shape))
        }
    }
}

fn format_shape(shape: &Shape) -> String {
    let dims = shape
        .dims()
        .iter()
        .map(|dim| dim.to_string())
        .collect::<Vec<_>>();
    if dims.is_empty() {
        "[]".to_string()
    } else {
        dims.join("x")
    }
}

fn write_line(f: &mut fmt::Formatter<'_>, indent: usize, line: &str) -> fmt::Result {
    for _ in 0..indent {
        f.write_str("  ")?;
    }
    writeln!(f, "{line}")
}
