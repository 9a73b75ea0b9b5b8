//! Tree-walking evaluator for resolved programs.
//!
//! Execution happens in two phases: every top-level statement runs in the
//! global environment, then `main` is invoked if the program declares one.
//! Functions always execute in a child of the global environment, so they
//! can reach globals and their own parameters but never the locals of the
//! scope that happened to call them.

pub mod builtins;
mod environment;
mod value;

pub use environment::{EnvRef, Environment};
pub use value::Value;

use crate::clock::{Clock, ClockError, SystemClock};
use crate::parser::{
    AssignOperator, AssignTarget, BinaryOperator, Expression, FunctionDecl, Identifier, Literal,
    Spanned, Statement, TemplatePart, UnaryOperator,
};
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::error::Error;
use std::fmt;
use std::io::{self, BufRead, BufReader, Write};
use std::rc::Rc;

const MAX_CALL_DEPTH: u32 = 50;

#[derive(Debug)]
pub enum RuntimeError {
    UndefinedVariable {
        name: String,
    },
    NotCallable {
        type_name: &'static str,
    },
    Arity {
        name: String,
        expected: usize,
        given: usize,
    },
    Type {
        message: String,
    },
    DivisionByZero,
    Overflow,
    IndexOutOfBounds,
    CallDepthExceeded,
    Clock(ClockError),
    Io(io::Error),
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::UndefinedVariable { name } => write!(f, "Undefined variable: {name}"),
            Self::NotCallable { type_name } => {
                write!(f, "Cannot call a value of type {type_name}")
            }
            Self::Arity {
                name,
                expected,
                given,
            } => {
                let plural = if *expected == 1 { "argument" } else { "arguments" };
                write!(f, "Function '{name}' expects {expected} {plural}, got {given}")
            }
            Self::Type { message } => write!(f, "{message}"),
            Self::DivisionByZero => write!(f, "Division by zero"),
            Self::Overflow => write!(f, "Integer overflow"),
            Self::IndexOutOfBounds => write!(f, "Array index out of bounds"),
            Self::CallDepthExceeded => write!(f, "Maximum call depth exceeded"),
            Self::Clock(error) => write!(f, "{error}"),
            Self::Io(error) => write!(f, "{error}"),
        }
    }
}

impl Error for RuntimeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Clock(error) => Some(error),
            Self::Io(error) => Some(error),
            _ => None,
        }
    }
}

impl From<ClockError> for RuntimeError {
    fn from(error: ClockError) -> Self {
        Self::Clock(error)
    }
}

impl From<io::Error> for RuntimeError {
    fn from(error: io::Error) -> Self {
        Self::Io(error)
    }
}

/// How a statement finished: fell through, or hit a `return`.
enum Control<'code> {
    Normal,
    Return(Value<'code>),
}

pub struct Interpreter<'code> {
    globals: EnvRef<'code>,
    clock: Box<dyn Clock>,
    input: Box<dyn BufRead>,
    output: Box<dyn Write>,
    call_depth: u32,
}

impl Default for Interpreter<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'code> Interpreter<'code> {
    pub fn new() -> Self {
        Self::with_host(SystemClock, BufReader::new(io::stdin()), io::stdout())
    }

    pub fn with_clock(clock: impl Clock + 'static) -> Self {
        Self::with_host(clock, BufReader::new(io::stdin()), io::stdout())
    }

    /// Builds an interpreter with every host seam swapped out, which is how
    /// tests script the clock and capture printed output.
    pub fn with_host(
        clock: impl Clock + 'static,
        input: impl BufRead + 'static,
        output: impl Write + 'static,
    ) -> Self {
        Self {
            globals: Environment::root(),
            clock: Box::new(clock),
            input: Box::new(input),
            output: Box::new(output),
            call_depth: 0,
        }
    }

    /// Runs a resolved program: executes the top-level statements in order,
    /// then invokes `main` with `args` if the program declares one. Each
    /// `args` entry arrives in the language as a string.
    pub fn interpret(
        &mut self,
        program: &[Spanned<Statement<'code>>],
        args: &[String],
    ) -> Result<Value<'code>, RuntimeError> {
        log::debug!(
            "interpreting {} top-level statements with {} args",
            program.len(),
            args.len()
        );
        let arguments: Vec<Value> = args.iter().map(|arg| Value::text(arg.as_str())).collect();
        self.globals
            .borrow_mut()
            .define("args", Value::array(arguments));

        let globals = Rc::clone(&self.globals);
        for statement in program {
            self.execute(statement, &globals)?;
        }
        self.run_main(args)
    }

    fn run_main(&mut self, args: &[String]) -> Result<Value<'code>, RuntimeError> {
        let Some(Value::Function(main)) = self.globals.borrow().get("main") else {
            return Ok(Value::Unit);
        };
        // Positional string arguments; missing ones default to ""
        let arguments: SmallVec<[Value; 4]> = main
            .parameters
            .iter()
            .enumerate()
            .map(|(index, _)| match args.get(index) {
                Some(arg) => Value::text(arg.as_str()),
                None => Value::text(""),
            })
            .collect();
        self.call_function(&main, arguments)
    }

    fn call_function(
        &mut self,
        function: &Rc<FunctionDecl<'code>>,
        arguments: SmallVec<[Value<'code>; 4]>,
    ) -> Result<Value<'code>, RuntimeError> {
        if self.call_depth >= MAX_CALL_DEPTH {
            return Err(RuntimeError::CallDepthExceeded);
        }
        if arguments.len() != function.parameters.len() {
            return Err(RuntimeError::Arity {
                name: function.name.node.to_owned(),
                expected: function.parameters.len(),
                given: arguments.len(),
            });
        }

        // The body runs in a child of the globals, never of the call site
        let environment = Environment::child(&self.globals);
        for argument in arguments {
            environment.borrow_mut().define_slot(argument);
        }

        self.call_depth += 1;
        let outcome = self.execute_all(&function.body, &environment);
        self.call_depth -= 1;
        match outcome? {
            Control::Return(value) => Ok(value),
            Control::Normal => Ok(Value::Unit),
        }
    }

    fn execute_all(
        &mut self,
        statements: &[Spanned<Statement<'code>>],
        environment: &EnvRef<'code>,
    ) -> Result<Control<'code>, RuntimeError> {
        for statement in statements {
            if let Control::Return(value) = self.execute(statement, environment)? {
                return Ok(Control::Return(value));
            }
        }
        Ok(Control::Normal)
    }

    fn execute(
        &mut self,
        statement: &Spanned<Statement<'code>>,
        environment: &EnvRef<'code>,
    ) -> Result<Control<'code>, RuntimeError> {
        let Spanned {
            node: statement, ..
        } = statement;
        match statement {
            Statement::VariableDecl(decl) => {
                let value = match &decl.initializer {
                    Some(initializer) => self.evaluate(initializer, environment)?,
                    None => Value::Unit,
                };
                if environment.borrow().is_global() {
                    environment.borrow_mut().define(decl.name.node, value);
                } else {
                    environment.borrow_mut().define_slot(value);
                }
                Ok(Control::Normal)
            }
            Statement::FunctionDecl(function) => {
                let value = Value::Function(Rc::clone(function));
                if environment.borrow().is_global() {
                    environment.borrow_mut().define(function.name.node, value);
                } else {
                    environment.borrow_mut().define_slot(value);
                }
                Ok(Control::Normal)
            }
            Statement::Assign {
                target,
                operator,
                value,
            } => {
                let value = self.evaluate(value, environment)?;
                match target {
                    AssignTarget::Name(identifier) => {
                        self.assign_name(identifier, *operator, value, environment)?;
                    }
                    AssignTarget::Index { array, index } => {
                        self.assign_index(array, index, *operator, value, environment)?;
                    }
                }
                Ok(Control::Normal)
            }
            Statement::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate_condition(condition, environment)? {
                    let scope = Environment::child(environment);
                    self.execute_all(then_branch, &scope)
                } else if let Some(else_branch) = else_branch {
                    let scope = Environment::child(environment);
                    self.execute_all(else_branch, &scope)
                } else {
                    Ok(Control::Normal)
                }
            }
            Statement::While { condition, body } => {
                while self.evaluate_condition(condition, environment)? {
                    // Fresh scope per iteration; declarations never pile up
                    let scope = Environment::child(environment);
                    if let Control::Return(value) = self.execute_all(body, &scope)? {
                        return Ok(Control::Return(value));
                    }
                }
                Ok(Control::Normal)
            }
            Statement::Return { value } => {
                let value = match value {
                    Some(value) => self.evaluate(value, environment)?,
                    None => Value::Unit,
                };
                Ok(Control::Return(value))
            }
            Statement::Run { body } => {
                let scope = Environment::child(environment);
                self.execute_all(body, &scope)
            }
            Statement::Expression(expression) => {
                self.evaluate(expression, environment)?;
                Ok(Control::Normal)
            }
        }
    }

    fn assign_name(
        &mut self,
        identifier: &Spanned<Identifier<'code>>,
        operator: AssignOperator,
        value: Value<'code>,
        environment: &EnvRef<'code>,
    ) -> Result<(), RuntimeError> {
        let name = identifier.node.name;
        let value = match operator {
            AssignOperator::Set => value,
            compound => {
                let current = self.read_identifier(&identifier.node, environment)?;
                apply_compound(compound, current, value)?
            }
        };
        match identifier.node.slot {
            Some(slot) => {
                Environment::assign_at(environment, slot.distance, slot.index, value);
                Ok(())
            }
            None => {
                if self.globals.borrow_mut().assign(name, value) {
                    Ok(())
                } else {
                    Err(RuntimeError::UndefinedVariable {
                        name: name.to_owned(),
                    })
                }
            }
        }
    }

    fn assign_index(
        &mut self,
        array: &Spanned<Identifier<'code>>,
        index: &Spanned<Expression<'code>>,
        operator: AssignOperator,
        value: Value<'code>,
        environment: &EnvRef<'code>,
    ) -> Result<(), RuntimeError> {
        let target = self.read_identifier(&array.node, environment)?;
        let Value::Array(elements) = target else {
            return Err(RuntimeError::Type {
                message: format!("Cannot index a value of type {}", target.type_name()),
            });
        };
        let index = self.evaluate(index, environment)?;
        let position = array_position(&index, elements.borrow().len())?;
        let value = match operator {
            AssignOperator::Set => value,
            compound => {
                let current = elements.borrow()[position].clone();
                apply_compound(compound, current, value)?
            }
        };
        elements.borrow_mut()[position] = value;
        Ok(())
    }

    fn evaluate(
        &mut self,
        expression: &Spanned<Expression<'code>>,
        environment: &EnvRef<'code>,
    ) -> Result<Value<'code>, RuntimeError> {
        let Spanned {
            node: expression, ..
        } = expression;
        match expression {
            Expression::Literal(literal) => Ok(literal_value(literal)),
            Expression::Template { parts } => self.evaluate_template(parts, environment),
            Expression::Identifier(identifier) => self.read_identifier(identifier, environment),
            Expression::Unary { operator, operand } => {
                let operand = self.evaluate(operand, environment)?;
                apply_unary(*operator, operand)
            }
            Expression::Binary {
                operator,
                left,
                right,
            } => self.evaluate_binary(*operator, left, right, environment),
            Expression::Call {
                function,
                arguments,
            } => self.evaluate_call(function, arguments, environment),
            Expression::Index { array, index } => {
                let target = self.evaluate(array, environment)?;
                let index = self.evaluate(index, environment)?;
                read_index(target, index)
            }
        }
    }

    fn evaluate_condition(
        &mut self,
        condition: &Spanned<Expression<'code>>,
        environment: &EnvRef<'code>,
    ) -> Result<bool, RuntimeError> {
        match self.evaluate(condition, environment)? {
            Value::Bool(condition) => Ok(condition),
            other => Err(RuntimeError::Type {
                message: format!("Condition must be a Boolean, got {}", other.type_name()),
            }),
        }
    }

    fn evaluate_template(
        &mut self,
        parts: &[TemplatePart<'code>],
        environment: &EnvRef<'code>,
    ) -> Result<Value<'code>, RuntimeError> {
        let mut rendered = String::new();
        for part in parts {
            match part {
                TemplatePart::Text(text) => rendered.push_str(text),
                TemplatePart::Expression(expression) => {
                    let value = self.evaluate(expression, environment)?;
                    rendered.push_str(&value.to_string());
                }
            }
        }
        Ok(Value::text(rendered))
    }

    fn evaluate_binary(
        &mut self,
        operator: BinaryOperator,
        left: &Spanned<Expression<'code>>,
        right: &Spanned<Expression<'code>>,
        environment: &EnvRef<'code>,
    ) -> Result<Value<'code>, RuntimeError> {
        if matches!(operator, BinaryOperator::And | BinaryOperator::Or) {
            let left = self.evaluate_logic_operand(operator, left, environment)?;
            let short_circuits = match operator {
                BinaryOperator::And => !left,
                _ => left,
            };
            if short_circuits {
                return Ok(Value::Bool(left));
            }
            let right = self.evaluate_logic_operand(operator, right, environment)?;
            return Ok(Value::Bool(right));
        }

        let left = self.evaluate(left, environment)?;
        let right = self.evaluate(right, environment)?;
        apply_binary(operator, left, right)
    }

    fn evaluate_logic_operand(
        &mut self,
        operator: BinaryOperator,
        operand: &Spanned<Expression<'code>>,
        environment: &EnvRef<'code>,
    ) -> Result<bool, RuntimeError> {
        match self.evaluate(operand, environment)? {
            Value::Bool(operand) => Ok(operand),
            _ => Err(RuntimeError::Type {
                message: format!("Operands of '{operator}' must be Booleans"),
            }),
        }
    }

    fn evaluate_call(
        &mut self,
        function: &Identifier<'code>,
        arguments: &[Spanned<Expression<'code>>],
        environment: &EnvRef<'code>,
    ) -> Result<Value<'code>, RuntimeError> {
        let mut argument_values: SmallVec<[Value<'code>; 4]> = SmallVec::new();
        for argument in arguments {
            argument_values.push(self.evaluate(argument, environment)?);
        }

        let callee = match function.slot {
            Some(slot) => Some(Environment::get_at(environment, slot.distance, slot.index)),
            None => self.globals.borrow().get(function.name),
        };
        match callee {
            Some(Value::Function(declared)) => self.call_function(&declared, argument_values),
            Some(other) => Err(RuntimeError::NotCallable {
                type_name: other.type_name(),
            }),
            None if builtins::BUILTIN_NAMES.contains(&function.name) => {
                builtins::call(self, function.name, argument_values)
            }
            None => Err(RuntimeError::UndefinedVariable {
                name: function.name.to_owned(),
            }),
        }
    }

    fn read_identifier(
        &self,
        identifier: &Identifier<'code>,
        environment: &EnvRef<'code>,
    ) -> Result<Value<'code>, RuntimeError> {
        match identifier.slot {
            Some(slot) => Ok(Environment::get_at(environment, slot.distance, slot.index)),
            None => self.globals.borrow().get(identifier.name).ok_or_else(|| {
                RuntimeError::UndefinedVariable {
                    name: identifier.name.to_owned(),
                }
            }),
        }
    }
}

fn literal_value<'code>(literal: &Literal<'code>) -> Value<'code> {
    match literal {
        Literal::Int(int) => Value::Int(*int),
        Literal::Float(float) => Value::Float(*float),
        Literal::Bool(boolean) => Value::Bool(*boolean),
        Literal::Text(text) => Value::text(text.as_ref()),
    }
}

fn apply_compound<'code>(
    operator: AssignOperator,
    current: Value<'code>,
    value: Value<'code>,
) -> Result<Value<'code>, RuntimeError> {
    let binary = match operator {
        AssignOperator::Add => BinaryOperator::Add,
        AssignOperator::Subtract => BinaryOperator::Subtract,
        AssignOperator::Multiply => BinaryOperator::Multiply,
        AssignOperator::Divide => BinaryOperator::Divide,
        AssignOperator::Set => unreachable!("plain assignment is handled by the caller"),
    };
    apply_binary(binary, current, value)
}

fn apply_binary<'code>(
    operator: BinaryOperator,
    left: Value<'code>,
    right: Value<'code>,
) -> Result<Value<'code>, RuntimeError> {
    match operator {
        BinaryOperator::Add => add(left, right),
        BinaryOperator::Subtract | BinaryOperator::Multiply | BinaryOperator::Divide => {
            arithmetic(operator, left, right)
        }
        BinaryOperator::Modulo => modulo(left, right),
        BinaryOperator::Equal => Ok(Value::Bool(left == right)),
        BinaryOperator::NotEqual => Ok(Value::Bool(left != right)),
        BinaryOperator::Less
        | BinaryOperator::LessOrEqual
        | BinaryOperator::Greater
        | BinaryOperator::GreaterOrEqual => compare(operator, left, right),
        BinaryOperator::And | BinaryOperator::Or => {
            unreachable!("logical operators short-circuit before reaching here")
        }
    }
}

fn add<'code>(left: Value<'code>, right: Value<'code>) -> Result<Value<'code>, RuntimeError> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => {
            a.checked_add(b).map(Value::Int).ok_or(RuntimeError::Overflow)
        }
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a + b)),
        (Value::Int(a), Value::Float(b)) => Ok(Value::Float(a as f64 + b)),
        (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a + b as f64)),
        (Value::Text(a), Value::Text(b)) => {
            let mut joined = String::with_capacity(a.len() + b.len());
            joined.push_str(&a);
            joined.push_str(&b);
            Ok(Value::text(joined))
        }
        _ => Err(RuntimeError::Type {
            message: "Operands of '+' must be two numbers or two strings".to_owned(),
        }),
    }
}

fn arithmetic<'code>(
    operator: BinaryOperator,
    left: Value<'code>,
    right: Value<'code>,
) -> Result<Value<'code>, RuntimeError> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => int_arithmetic(operator, a, b),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(float_arithmetic(operator, a, b))),
        (Value::Int(a), Value::Float(b)) => {
            Ok(Value::Float(float_arithmetic(operator, a as f64, b)))
        }
        (Value::Float(a), Value::Int(b)) => {
            Ok(Value::Float(float_arithmetic(operator, a, b as f64)))
        }
        _ => Err(RuntimeError::Type {
            message: format!("Operands of '{operator}' must be numbers"),
        }),
    }
}

fn int_arithmetic<'code>(
    operator: BinaryOperator,
    a: i64,
    b: i64,
) -> Result<Value<'code>, RuntimeError> {
    let result = match operator {
        BinaryOperator::Subtract => a.checked_sub(b),
        BinaryOperator::Multiply => a.checked_mul(b),
        BinaryOperator::Divide => {
            if b == 0 {
                return Err(RuntimeError::DivisionByZero);
            }
            a.checked_div(b)
        }
        _ => unreachable!("not an arithmetic operator: {operator}"),
    };
    result.map(Value::Int).ok_or(RuntimeError::Overflow)
}

fn float_arithmetic(operator: BinaryOperator, a: f64, b: f64) -> f64 {
    match operator {
        BinaryOperator::Subtract => a - b,
        BinaryOperator::Multiply => a * b,
        BinaryOperator::Divide => a / b,
        _ => unreachable!("not an arithmetic operator: {operator}"),
    }
}

fn modulo<'code>(left: Value<'code>, right: Value<'code>) -> Result<Value<'code>, RuntimeError> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => {
            if b == 0 {
                return Err(RuntimeError::DivisionByZero);
            }
            a.checked_rem(b).map(Value::Int).ok_or(RuntimeError::Overflow)
        }
        _ => Err(RuntimeError::Type {
            message: "Operands of '%' must be integers".to_owned(),
        }),
    }
}

fn compare<'code>(
    operator: BinaryOperator,
    left: Value<'code>,
    right: Value<'code>,
) -> Result<Value<'code>, RuntimeError> {
    if let (Value::Int(a), Value::Int(b)) = (&left, &right) {
        return Ok(Value::Bool(ordering_holds(operator, a.cmp(b))));
    }
    match (left.as_number(), right.as_number()) {
        (Some(a), Some(b)) => {
            let holds = match a.partial_cmp(&b) {
                Some(ordering) => ordering_holds(operator, ordering),
                // NaN never compares
                None => false,
            };
            Ok(Value::Bool(holds))
        }
        _ => Err(RuntimeError::Type {
            message: format!("Operands of '{operator}' must be numbers"),
        }),
    }
}

fn ordering_holds(operator: BinaryOperator, ordering: Ordering) -> bool {
    match operator {
        BinaryOperator::Less => ordering == Ordering::Less,
        BinaryOperator::LessOrEqual => ordering != Ordering::Greater,
        BinaryOperator::Greater => ordering == Ordering::Greater,
        BinaryOperator::GreaterOrEqual => ordering != Ordering::Less,
        _ => unreachable!("not a comparison operator: {operator}"),
    }
}

fn apply_unary<'code>(
    operator: UnaryOperator,
    operand: Value<'code>,
) -> Result<Value<'code>, RuntimeError> {
    match (operator, operand) {
        (UnaryOperator::Negate, Value::Int(int)) => {
            int.checked_neg().map(Value::Int).ok_or(RuntimeError::Overflow)
        }
        (UnaryOperator::Negate, Value::Float(float)) => Ok(Value::Float(-float)),
        (UnaryOperator::Not, Value::Bool(boolean)) => Ok(Value::Bool(!boolean)),
        (UnaryOperator::Negate, _) => Err(RuntimeError::Type {
            message: "Operand of '-' must be a number".to_owned(),
        }),
        (UnaryOperator::Not, _) => Err(RuntimeError::Type {
            message: "Operand of '!' must be a Boolean".to_owned(),
        }),
    }
}

fn read_index<'code>(
    target: Value<'code>,
    index: Value<'code>,
) -> Result<Value<'code>, RuntimeError> {
    match target {
        Value::Array(elements) => {
            let position = array_position(&index, elements.borrow().len())?;
            let element = elements.borrow()[position].clone();
            Ok(element)
        }
        other => Err(RuntimeError::Type {
            message: format!("Cannot index a value of type {}", other.type_name()),
        }),
    }
}

fn array_position(index: &Value, length: usize) -> Result<usize, RuntimeError> {
    let Value::Int(index) = index else {
        return Err(RuntimeError::Type {
            message: "Array index must be an integer".to_owned(),
        });
    };
    usize::try_from(*index)
        .ok()
        .filter(|position| *position < length)
        .ok_or(RuntimeError::IndexOutOfBounds)
}
