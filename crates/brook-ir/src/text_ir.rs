use std::collections::HashMap;

use thiserror::Error;

use crate::config::SchedulingConfig;
use crate::spec::{
    BinaryOp, Computation, DType, ExecutionThread, InstrId, Instruction, Module, Operation, Shape,
    TensorSpec, UnaryOp, ValueType,
};

/// Errors raised while parsing the lightweight text format used in tests.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TextIrError {
    #[error("{0}")]
    Message(String),
}

impl TextIrError {
    fn new(msg: impl Into<String>) -> Self {
        TextIrError::Message(msg.into())
    }
}

/// Parses a single-computation module described in a compact MLIR-inspired
/// syntax.
///
/// # Example
/// ```
/// use brook_ir::text_ir::parse_module;
///
/// let module = parse_module(r#"
/// func @entry(%x: tensor<f32, 2x2>) -> tensor<f32, 2x2> {
///   %y = exp(%x) -> tensor<f32, 2x2>
///   return %y
/// }
/// "#).expect("valid module");
/// assert_eq!(module.entry, "entry");
/// assert_eq!(module.computations[0].body.len(), 2);
/// ```
pub fn parse_module(src: &str) -> Result<Module, TextIrError> {
    Parser::new(src).parse().map(|parsed| parsed.module)
}

/// Parses a module and returns a [`ParsedModule`] that tracks name mappings.
pub fn parse_module_with_symbols(src: &str) -> Result<ParsedModule, TextIrError> {
    Parser::new(src).parse()
}

/// Module paired with the mapping from textual names to instruction ids.
#[derive(Debug, Clone)]
pub struct ParsedModule {
    pub module: Module,
    pub instruction_names: HashMap<String, InstrId>,
}

struct Parser<'a> {
    source: &'a str,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self { source }
    }

    fn parse(&self) -> Result<ParsedModule, TextIrError> {
        let trimmed = self.source.trim();
        if trimmed.is_empty() {
            return Err(TextIrError::new("input is empty"));
        }
        let header_end = trimmed
            .find('{')
            .ok_or_else(|| TextIrError::new("missing `{` to start computation body"))?;
        let header = trimmed[..header_end].trim();
        let body_start = header_end + 1;
        let body_end = trimmed
            .rfind('}')
            .ok_or_else(|| TextIrError::new("missing `}` to end computation body"))?;
        let body = trimmed[body_start..body_end].trim();

        let (name, params) = self.parse_header(header)?;
        let mut instructions: Vec<Instruction> = Vec::new();
        let mut name_map: HashMap<String, InstrId> = HashMap::new();

        for (index, Parameter { name, ty }) in params.into_iter().enumerate() {
            let output = parse_type(&ty)?;
            let id = InstrId(instructions.len() as u32);
            instructions.push(Instruction {
                id,
                name: name.clone(),
                op: Operation::Parameter { index },
                operands: Vec::new(),
                output,
                backend_config: None,
                execution_thread: ExecutionThread::Main,
            });
            name_map.insert(name, id);
        }

        let root_name = self.parse_body(body, &mut instructions, &mut name_map)?;
        let root_id = name_map
            .get(&root_name)
            .copied()
            .ok_or_else(|| TextIrError::new(format!("unknown return value `{root_name}`")))?;

        let computation = Computation {
            name: name.clone(),
            body: instructions,
            root_id,
        };
        Ok(ParsedModule {
            module: Module::new(name).with_computations(vec![computation]),
            instruction_names: name_map,
        })
    }

    fn parse_header(&self, header: &str) -> Result<(String, Vec<Parameter>), TextIrError> {
        let header = header.trim();
        let header = header
            .strip_prefix("func")
            .ok_or_else(|| TextIrError::new("computation header must start with `func`"))?
            .trim_start();
        let open_paren = header
            .find('(')
            .ok_or_else(|| TextIrError::new("missing `(` in computation header"))?;
        let close_paren = find_matching(header, open_paren, '(', ')')
            .ok_or_else(|| TextIrError::new("missing `)` to close parameter list"))?;

        let name_section = header[..open_paren].trim();
        let name = name_section
            .strip_prefix('@')
            .unwrap_or(name_section)
            .trim();
        if name.is_empty() {
            return Err(TextIrError::new("computation name cannot be empty"));
        }
        let params = self.parse_parameters(&header[open_paren + 1..close_paren])?;

        // The declared result type after `->` is accepted but not enforced;
        // the returned instruction's recorded type wins.
        Ok((name.to_string(), params))
    }

    fn parse_parameters(&self, params: &str) -> Result<Vec<Parameter>, TextIrError> {
        let params = params.trim();
        if params.is_empty() {
            return Ok(Vec::new());
        }
        split_top_level(params, ',')
            .into_iter()
            .map(|raw| {
                let decl = raw.trim();
                let (name, ty) = decl
                    .split_once(':')
                    .ok_or_else(|| TextIrError::new("parameter must be `name: type`"))?;
                let name = normalize_name(name.trim());
                if name.is_empty() {
                    return Err(TextIrError::new("parameter name cannot be empty"));
                }
                let ty = ty.trim();
                if ty.is_empty() {
                    return Err(TextIrError::new("parameter type cannot be empty"));
                }
                Ok(Parameter {
                    name,
                    ty: ty.to_string(),
                })
            })
            .collect()
    }

    fn parse_body(
        &self,
        body: &str,
        instructions: &mut Vec<Instruction>,
        name_map: &mut HashMap<String, InstrId>,
    ) -> Result<String, TextIrError> {
        if body.is_empty() {
            return Err(TextIrError::new("computation body cannot be empty"));
        }
        let mut root_name: Option<String> = None;

        for line in body.lines() {
            let statement = line.trim().trim_end_matches(';');
            if statement.is_empty() {
                continue;
            }
            if let Some(value) = statement.strip_prefix("return") {
                if root_name.is_some() {
                    return Err(TextIrError::new(
                        "multiple `return` statements are not allowed",
                    ));
                }
                let value = value.trim();
                if value.is_empty() {
                    return Err(TextIrError::new("`return` must reference a value"));
                }
                root_name = Some(normalize_name(value));
                continue;
            }
            self.parse_statement(statement, instructions, name_map)?;
        }

        root_name
            .ok_or_else(|| TextIrError::new("computation body must end with a `return` statement"))
    }

    fn parse_statement(
        &self,
        statement: &str,
        instructions: &mut Vec<Instruction>,
        name_map: &mut HashMap<String, InstrId>,
    ) -> Result<(), TextIrError> {
        let (result_name_raw, rest) = statement
            .split_once('=')
            .ok_or_else(|| TextIrError::new("statements must be of the form `%result = ...`"))?;
        let result_name = normalize_name(result_name_raw.trim());
        if result_name.is_empty() {
            return Err(TextIrError::new("result identifier cannot be empty"));
        }
        let rest = rest.trim();

        let (op_name, remainder) = parse_op_name(rest)?;
        let (operand_names, attrs, type_section) = split_operands_attrs_and_type(remainder)?;
        let output = parse_type(type_section)?;
        let operands = operand_names
            .into_iter()
            .map(|name| {
                name_map
                    .get(&name)
                    .copied()
                    .ok_or_else(|| TextIrError::new(format!("unknown operand `%{name}`")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let op = build_operation(&op_name, &operands)?;
        let (backend_config, execution_thread) = build_attributes(&attrs)?;

        let id = InstrId(instructions.len() as u32);
        instructions.push(Instruction {
            id,
            name: result_name.clone(),
            op,
            operands,
            output,
            backend_config,
            execution_thread,
        });
        name_map.insert(result_name, id);
        Ok(())
    }
}

struct Parameter {
    name: String,
    ty: String,
}

#[derive(Debug, Clone)]
struct AttributeExpr {
    name: String,
    value: String,
}

fn normalize_name(name: &str) -> String {
    name.trim_start_matches('%').to_string()
}

fn parse_type(src: &str) -> Result<ValueType, TextIrError> {
    let trimmed = src.trim();
    if let Some(body) = trimmed
        .strip_prefix("pending<")
        .and_then(|s| s.strip_suffix('>'))
    {
        return Ok(ValueType::Pending(parse_tensor_spec(body)?));
    }
    if let Some(body) = trimmed
        .strip_prefix("tensor<")
        .and_then(|s| s.strip_suffix('>'))
    {
        return Ok(ValueType::Tensor(parse_tensor_spec(body)?));
    }
    Err(TextIrError::new(format!(
        "unsupported type `{trimmed}`; expected `tensor<...>` or `pending<...>`"
    )))
}

fn parse_tensor_spec(body: &str) -> Result<TensorSpec, TextIrError> {
    let mut parts = body.split(',');
    let dtype_str = parts
        .next()
        .ok_or_else(|| TextIrError::new("tensor type must specify a dtype"))?
        .trim();
    let dtype = parse_dtype(dtype_str)?;
    let dims_str = parts.next().unwrap_or("").trim();
    let dims = if dims_str.is_empty() {
        Vec::new()
    } else {
        parse_dimensions(dims_str)?
    };
    if parts.next().is_some() {
        return Err(TextIrError::new(
            "tensor type accepts only `tensor<dtype, dims>` form",
        ));
    }
    Ok(TensorSpec::new(dtype, Shape::new(dims)))
}

fn parse_dtype(src: &str) -> Result<DType, TextIrError> {
    match src.trim().to_ascii_uppercase().as_str() {
        "I1" => Ok(DType::I1),
        "SI32" => Ok(DType::Si32),
        "UI32" => Ok(DType::Ui32),
        "SI64" => Ok(DType::Si64),
        "UI64" => Ok(DType::Ui64),
        "BF16" => Ok(DType::Bf16),
        "F16" => Ok(DType::F16),
        "F32" => Ok(DType::F32),
        "F64" => Ok(DType::F64),
        other => Err(TextIrError::new(format!("unsupported dtype `{other}`"))),
    }
}

fn parse_dimensions(src: &str) -> Result<Vec<usize>, TextIrError> {
    src.split('x')
        .map(|dim| {
            let dim = dim.trim();
            if dim.is_empty() {
                return Err(TextIrError::new("dimension sizes cannot be empty"));
            }
            dim.parse::<usize>()
                .map_err(|_| TextIrError::new(format!("invalid dimension `{dim}`")))
        })
        .collect()
}

fn split_top_level(input: &str, delimiter: char) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (idx, ch) in input.char_indices() {
        match ch {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            c if c == delimiter && depth == 0 => {
                if start != idx {
                    pieces.push(input[start..idx].trim());
                }
                start = idx + c.len_utf8();
            }
            _ => {}
        }
    }
    if start < input.len() {
        pieces.push(input[start..].trim());
    }
    pieces
}

fn parse_op_name(src: &str) -> Result<(String, &str), TextIrError> {
    let trimmed = src.trim_start();
    if trimmed.is_empty() {
        return Err(TextIrError::new("operation name is missing"));
    }
    let mut end = trimmed.len();
    for (idx, ch) in trimmed.char_indices() {
        if ch.is_whitespace() || ch == '(' || ch == '%' {
            end = idx;
            break;
        }
    }
    let name = trimmed[..end].trim();
    if name.is_empty() {
        return Err(TextIrError::new("operation name cannot be empty"));
    }
    let remainder = trimmed[end..].trim_start();
    Ok((name.to_string(), remainder))
}

fn split_operands_attrs_and_type(
    remainder: &str,
) -> Result<(Vec<String>, Vec<AttributeExpr>, &str), TextIrError> {
    let (operands_section, ty_section) = remainder
        .split_once("->")
        .ok_or_else(|| TextIrError::new("operations must specify result type with `->`"))?;
    let (operands, attrs) = parse_operands_and_attributes(operands_section)?;
    Ok((operands, attrs, ty_section.trim()))
}

fn parse_operands_and_attributes(
    section: &str,
) -> Result<(Vec<String>, Vec<AttributeExpr>), TextIrError> {
    let mut operands = Vec::new();
    let mut attrs = Vec::new();
    let chars = section.trim();
    let bytes = chars.as_bytes();
    let len = bytes.len();
    let mut idx = 0usize;

    while idx < len {
        while idx < len && bytes[idx].is_ascii_whitespace() {
            idx += 1;
        }
        if idx >= len {
            break;
        }
        match bytes[idx] {
            b'(' => {
                let end = find_matching(chars, idx, '(', ')')
                    .ok_or_else(|| TextIrError::new("unmatched `(` in operand list"))?;
                for token in split_top_level(&chars[idx + 1..end], ',') {
                    let trimmed = token.trim();
                    if !trimmed.is_empty() {
                        operands.push(normalize_name(trimmed));
                    }
                }
                idx = end + 1;
            }
            b',' => {
                idx += 1;
            }
            _ => {
                let attr_start = idx;
                while idx < len && (bytes[idx].is_ascii_alphabetic() || bytes[idx] == b'_') {
                    idx += 1;
                }
                if idx >= len || bytes[idx] != b'[' {
                    return Err(TextIrError::new(format!(
                        "unexpected token starting at `{}`",
                        &chars[attr_start..]
                    )));
                }
                let name = chars[attr_start..idx].trim().to_string();
                let end = find_matching(chars, idx, '[', ']')
                    .ok_or_else(|| TextIrError::new("unmatched `[` in attribute"))?;
                let value = chars[idx + 1..end].trim().to_string();
                attrs.push(AttributeExpr { name, value });
                idx = end + 1;
            }
        }
    }

    Ok((operands, attrs))
}

fn find_matching(src: &str, start: usize, open: char, close: char) -> Option<usize> {
    let mut depth = 0isize;
    let mut idx = start;
    let bytes = src.as_bytes();
    while idx < bytes.len() {
        if bytes[idx] == open as u8 {
            depth += 1;
        } else if bytes[idx] == close as u8 {
            depth -= 1;
            if depth == 0 {
                return Some(idx);
            }
        }
        idx += 1;
    }
    None
}

fn build_operation(name: &str, operands: &[InstrId]) -> Result<Operation, TextIrError> {
    let unary = |op: UnaryOp| -> Result<Operation, TextIrError> {
        if operands.len() != 1 {
            return Err(TextIrError::new(format!(
                "`{name}` expects exactly one operand"
            )));
        }
        Ok(Operation::Unary(op))
    };
    let binary = |op: BinaryOp| -> Result<Operation, TextIrError> {
        if operands.len() != 2 {
            return Err(TextIrError::new(format!(
                "`{name}` expects exactly two operands"
            )));
        }
        Ok(Operation::Binary(op))
    };
    match name {
        "neg" => unary(UnaryOp::Neg),
        "exp" => unary(UnaryOp::Exp),
        "log" => unary(UnaryOp::Log),
        "tanh" => unary(UnaryOp::Tanh),
        "add" => binary(BinaryOp::Add),
        "sub" => binary(BinaryOp::Sub),
        "mul" => binary(BinaryOp::Mul),
        "div" => binary(BinaryOp::Div),
        "maximum" => binary(BinaryOp::Maximum),
        "minimum" => binary(BinaryOp::Minimum),
        other => Err(TextIrError::new(format!(
            "unsupported operation `{other}` in text parser"
        ))),
    }
}

fn build_attributes(
    attrs: &[AttributeExpr],
) -> Result<(Option<String>, ExecutionThread), TextIrError> {
    let mut raw_config: Option<String> = None;
    let mut queue: Option<u64> = None;
    let mut wait_on: Option<Vec<u64>> = None;
    let mut thread = ExecutionThread::Main;

    for attr in attrs {
        match attr.name.as_str() {
            "config" => raw_config = Some(attr.value.clone()),
            "queue" => {
                queue = Some(attr.value.trim().parse::<u64>().map_err(|_| {
                    TextIrError::new(format!("invalid queue id `{}`", attr.value))
                })?);
            }
            "wait_on" => wait_on = Some(parse_u64_list(&attr.value)?),
            "thread" => {
                thread = match attr.value.trim() {
                    "main" => ExecutionThread::Main,
                    "parallel" => ExecutionThread::Parallel,
                    other => {
                        return Err(TextIrError::new(format!(
                            "unsupported execution thread `{other}`"
                        )))
                    }
                };
            }
            other => {
                return Err(TextIrError::new(format!("unsupported attribute `{other}`")));
            }
        }
    }

    if raw_config.is_some() && (queue.is_some() || wait_on.is_some()) {
        return Err(TextIrError::new(
            "`config[...]` cannot be combined with `queue`/`wait_on` attributes",
        ));
    }

    let backend_config = if raw_config.is_some() {
        raw_config
    } else if queue.is_some() || wait_on.is_some() {
        let config = SchedulingConfig {
            operation_queue_id: queue.unwrap_or_default(),
            wait_on_operation_queues: wait_on.unwrap_or_default(),
        };
        Some(
            config
                .encode()
                .map_err(|err| TextIrError::new(format!("cannot encode config: {err}")))?,
        )
    } else {
        None
    };

    Ok((backend_config, thread))
}

fn parse_u64_list(value: &str) -> Result<Vec<u64>, TextIrError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    trimmed
        .split(',')
        .map(|token| {
            let tok = token.trim();
            if tok.is_empty() {
                return Err(TextIrError::new("empty entry in integer list"));
            }
            tok.parse::<u64>()
                .map_err(|_| TextIrError::new(format!("invalid integer `{tok}`")))
        })
        .collect()
}

/// Builds a [`Module`] from the lightweight text syntax.
#[macro_export]
macro_rules! ir_module {
    ($src:expr) => {{
        $crate::text_ir::parse_module($src).expect("failed to parse text IR module")
    }};
}
