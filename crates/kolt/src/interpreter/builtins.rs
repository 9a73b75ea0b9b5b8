use super::{Interpreter, RuntimeError, Value};
use smallvec::SmallVec;
use std::io::{BufRead as _, Write as _};

/// Every function the host provides. The resolver accepts these names in
/// call position even though no declaration introduces them; a user-defined
/// function with the same name shadows the builtin.
pub const BUILTIN_NAMES: [&str; 19] = [
    "println",
    "print",
    "readln",
    "clock",
    "length",
    "substring",
    "toUpperCase",
    "toLowerCase",
    "toString",
    "toInt",
    "sqrt",
    "abs",
    "pow",
    "arrayOf",
    "indexOf",
    "isString",
    "isInt",
    "isBoolean",
    "isArray",
];

pub(super) fn call<'code>(
    interpreter: &mut Interpreter<'code>,
    name: &str,
    arguments: SmallVec<[Value<'code>; 4]>,
) -> Result<Value<'code>, RuntimeError> {
    match name {
        "println" => println(interpreter, &arguments),
        "print" => print(interpreter, &arguments),
        "readln" => readln(interpreter, &arguments),
        "clock" => clock(interpreter, &arguments),
        "length" => length(&arguments),
        "substring" => substring(&arguments),
        "toUpperCase" => text_transform("toUpperCase", &arguments, str::to_uppercase),
        "toLowerCase" => text_transform("toLowerCase", &arguments, str::to_lowercase),
        "toString" => to_string(&arguments),
        "toInt" => to_int(&arguments),
        "sqrt" => sqrt(&arguments),
        "abs" => abs(&arguments),
        "pow" => pow(&arguments),
        "arrayOf" => Ok(Value::array(arguments.into_vec())),
        "indexOf" => index_of(&arguments),
        "isString" => type_predicate("isString", &arguments, |value| {
            matches!(value, Value::Text(_))
        }),
        "isInt" => type_predicate("isInt", &arguments, |value| matches!(value, Value::Int(_))),
        "isBoolean" => type_predicate("isBoolean", &arguments, |value| {
            matches!(value, Value::Bool(_))
        }),
        "isArray" => type_predicate("isArray", &arguments, |value| {
            matches!(value, Value::Array(_))
        }),
        _ => unreachable!("'{name}' is not a builtin"),
    }
}

fn println<'code>(
    interpreter: &mut Interpreter<'code>,
    arguments: &[Value<'code>],
) -> Result<Value<'code>, RuntimeError> {
    write_joined(interpreter, arguments)?;
    writeln!(interpreter.output)?;
    Ok(Value::Unit)
}

fn print<'code>(
    interpreter: &mut Interpreter<'code>,
    arguments: &[Value<'code>],
) -> Result<Value<'code>, RuntimeError> {
    write_joined(interpreter, arguments)?;
    Ok(Value::Unit)
}

fn write_joined<'code>(
    interpreter: &mut Interpreter<'code>,
    arguments: &[Value<'code>],
) -> Result<(), RuntimeError> {
    for (index, argument) in arguments.iter().enumerate() {
        if index > 0 {
            write!(interpreter.output, " ")?;
        }
        write!(interpreter.output, "{argument}")?;
    }
    Ok(())
}

fn readln<'code>(
    interpreter: &mut Interpreter<'code>,
    arguments: &[Value<'code>],
) -> Result<Value<'code>, RuntimeError> {
    expect_arity("readln", arguments, 0)?;
    let mut line = String::new();
    interpreter.input.read_line(&mut line)?;
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Ok(Value::text(line))
}

fn clock<'code>(
    interpreter: &mut Interpreter<'code>,
    arguments: &[Value<'code>],
) -> Result<Value<'code>, RuntimeError> {
    expect_arity("clock", arguments, 0)?;
    let now = interpreter.clock.now_ms()?;
    Ok(Value::Int(now as i64))
}

fn length<'code>(arguments: &[Value<'code>]) -> Result<Value<'code>, RuntimeError> {
    expect_arity("length", arguments, 1)?;
    match &arguments[0] {
        Value::Text(text) => Ok(Value::Int(text.chars().count() as i64)),
        Value::Array(elements) => Ok(Value::Int(elements.borrow().len() as i64)),
        _ => Err(type_error("length() expects a string or an array")),
    }
}

fn substring<'code>(arguments: &[Value<'code>]) -> Result<Value<'code>, RuntimeError> {
    expect_arity("substring", arguments, 3)?;
    let (Value::Text(text), Value::Int(start), Value::Int(end)) =
        (&arguments[0], &arguments[1], &arguments[2])
    else {
        return Err(type_error("substring() expects a string and two integers"));
    };
    // Indexes count characters, not bytes; the end is exclusive
    let length = text.chars().count();
    if *start < 0 || *end < *start || *end as usize > length {
        return Err(type_error("Invalid substring indices"));
    }
    let extracted: String = text
        .chars()
        .skip(*start as usize)
        .take((*end - *start) as usize)
        .collect();
    Ok(Value::text(extracted))
}

fn text_transform<'code>(
    name: &str,
    arguments: &[Value<'code>],
    transform: impl Fn(&str) -> String,
) -> Result<Value<'code>, RuntimeError> {
    expect_arity(name, arguments, 1)?;
    match &arguments[0] {
        Value::Text(text) => Ok(Value::text(transform(text))),
        _ => Err(type_error(format!("{name}() expects a string"))),
    }
}

fn to_string<'code>(arguments: &[Value<'code>]) -> Result<Value<'code>, RuntimeError> {
    expect_arity("toString", arguments, 1)?;
    Ok(Value::text(arguments[0].to_string()))
}

fn to_int<'code>(arguments: &[Value<'code>]) -> Result<Value<'code>, RuntimeError> {
    expect_arity("toInt", arguments, 1)?;
    match &arguments[0] {
        Value::Int(int) => Ok(Value::Int(*int)),
        Value::Float(float) => Ok(Value::Int(*float as i64)),
        Value::Text(text) => text
            .trim()
            .parse()
            .map(Value::Int)
            .map_err(|_| type_error(format!("Cannot convert string to int: '{text}'"))),
        _ => Err(type_error("toInt() expects a number or a string")),
    }
}

fn sqrt<'code>(arguments: &[Value<'code>]) -> Result<Value<'code>, RuntimeError> {
    expect_arity("sqrt", arguments, 1)?;
    match &arguments[0] {
        Value::Int(int) if *int < 0 => Err(type_error("sqrt() cannot take negative numbers")),
        Value::Float(float) if *float < 0.0 => {
            Err(type_error("sqrt() cannot take negative numbers"))
        }
        Value::Int(int) => Ok(Value::Int((*int as f64).sqrt() as i64)),
        Value::Float(float) => Ok(Value::Float(float.sqrt())),
        _ => Err(type_error("sqrt() expects a number")),
    }
}

fn abs<'code>(arguments: &[Value<'code>]) -> Result<Value<'code>, RuntimeError> {
    expect_arity("abs", arguments, 1)?;
    match &arguments[0] {
        Value::Int(int) => int.checked_abs().map(Value::Int).ok_or(RuntimeError::Overflow),
        Value::Float(float) => Ok(Value::Float(float.abs())),
        _ => Err(type_error("abs() expects a number")),
    }
}

fn pow<'code>(arguments: &[Value<'code>]) -> Result<Value<'code>, RuntimeError> {
    expect_arity("pow", arguments, 2)?;
    match (&arguments[0], &arguments[1]) {
        (Value::Int(base), Value::Int(exponent)) if *exponent >= 0 => {
            let exponent = u32::try_from(*exponent).map_err(|_| RuntimeError::Overflow)?;
            base.checked_pow(exponent)
                .map(Value::Int)
                .ok_or(RuntimeError::Overflow)
        }
        (Value::Int(base), Value::Int(exponent)) => {
            Ok(Value::Float((*base as f64).powi(*exponent as i32)))
        }
        (left, right) => match (left.as_number(), right.as_number()) {
            (Some(base), Some(exponent)) => Ok(Value::Float(base.powf(exponent))),
            _ => Err(type_error("pow() expects numbers")),
        },
    }
}

fn index_of<'code>(arguments: &[Value<'code>]) -> Result<Value<'code>, RuntimeError> {
    expect_arity("indexOf", arguments, 2)?;
    match &arguments[0] {
        Value::Array(elements) => {
            let position = elements
                .borrow()
                .iter()
                .position(|element| element == &arguments[1]);
            Ok(Value::Int(position.map_or(-1, |index| index as i64)))
        }
        Value::Text(haystack) => match &arguments[1] {
            Value::Text(needle) => {
                let position = haystack
                    .find(needle.as_ref())
                    .map(|byte_index| haystack[..byte_index].chars().count() as i64);
                Ok(Value::Int(position.unwrap_or(-1)))
            }
            _ => Err(type_error("indexOf() on a string expects a string")),
        },
        _ => Err(type_error("indexOf() expects an array or a string")),
    }
}

fn type_predicate<'code>(
    name: &str,
    arguments: &[Value<'code>],
    predicate: impl Fn(&Value<'code>) -> bool,
) -> Result<Value<'code>, RuntimeError> {
    expect_arity(name, arguments, 1)?;
    Ok(Value::Bool(predicate(&arguments[0])))
}

fn expect_arity(name: &str, arguments: &[Value], expected: usize) -> Result<(), RuntimeError> {
    if arguments.len() == expected {
        return Ok(());
    }
    let message = match expected {
        0 => format!("{name}() expects no arguments"),
        1 => format!("{name}() expects exactly 1 argument"),
        _ => format!("{name}() expects exactly {expected} arguments"),
    };
    Err(type_error(message))
}

fn type_error(message: impl Into<String>) -> RuntimeError {
    RuntimeError::Type {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqrt_of_an_int_stays_an_int() {
        assert_eq!(sqrt(&[Value::Int(9)]).unwrap(), Value::Int(3));
        assert_eq!(sqrt(&[Value::Int(2)]).unwrap(), Value::Int(1));
        assert_eq!(sqrt(&[Value::Float(2.25)]).unwrap(), Value::Float(1.5));
    }

    #[test]
    fn test_sqrt_rejects_negative_numbers() {
        let error = sqrt(&[Value::Int(-1)]).unwrap_err();
        assert_eq!(error.to_string(), "sqrt() cannot take negative numbers");
    }

    #[test]
    fn test_arity_errors_name_the_function() {
        let error = sqrt(&[Value::Int(1), Value::Int(2)]).unwrap_err();
        assert_eq!(error.to_string(), "sqrt() expects exactly 1 argument");

        let error = expect_arity("clock", &[Value::Int(1)], 0).unwrap_err();
        assert_eq!(error.to_string(), "clock() expects no arguments");
    }

    #[test]
    fn test_substring_counts_characters() {
        let extracted = substring(&[Value::text("héllo"), Value::Int(1), Value::Int(3)]).unwrap();
        assert_eq!(extracted, Value::text("él"));
    }

    #[test]
    fn test_substring_rejects_bad_indices() {
        let error = substring(&[Value::text("abc"), Value::Int(2), Value::Int(1)]).unwrap_err();
        assert_eq!(error.to_string(), "Invalid substring indices");

        let error = substring(&[Value::text("abc"), Value::Int(0), Value::Int(4)]).unwrap_err();
        assert_eq!(error.to_string(), "Invalid substring indices");
    }

    #[test]
    fn test_length_counts_characters_and_elements() {
        assert_eq!(length(&[Value::text("héllo")]).unwrap(), Value::Int(5));
        let array = Value::array(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(length(&[array]).unwrap(), Value::Int(2));
    }

    #[test]
    fn test_to_int_parses_strings() {
        assert_eq!(to_int(&[Value::text("42")]).unwrap(), Value::Int(42));
        let error = to_int(&[Value::text("forty-two")]).unwrap_err();
        assert_eq!(error.to_string(), "Cannot convert string to int: 'forty-two'");
    }

    #[test]
    fn test_pow_reports_integer_overflow() {
        let error = pow(&[Value::Int(2), Value::Int(64)]).unwrap_err();
        assert_eq!(error.to_string(), "Integer overflow");
        assert_eq!(
            pow(&[Value::Int(2), Value::Int(10)]).unwrap(),
            Value::Int(1024)
        );
    }

    #[test]
    fn test_index_of_missing_element_is_minus_one() {
        let array = Value::array(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(
            index_of(&[array.clone(), Value::Int(2)]).unwrap(),
            Value::Int(1)
        );
        assert_eq!(index_of(&[array, Value::Int(9)]).unwrap(), Value::Int(-1));
    }

    #[test]
    fn test_type_predicates() {
        let is_text = type_predicate("isString", &[Value::text("x")], |value| {
            matches!(value, Value::Text(_))
        });
        assert_eq!(is_text.unwrap(), Value::Bool(true));
    }
}
