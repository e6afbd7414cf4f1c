use pest::Parser;
use pest_derive::Parser;

#[derive(Parser)]
#[grammar = "grammar/lc2k_asm.pest"]
pub struct Lc2kAsmParser;

/// Longest accepted source line, newline included.
pub const MAX_LINE_LENGTH: usize = 1000;

/// One source line split into its fields. `opcode` is empty when the
/// line held only a label (or nothing); unused args are empty strings.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Statement {
  pub label: Option<String>,
  pub opcode: String,
  pub args: [String; 3],
}

pub fn parse_program(source: &str) -> Result<Vec<Statement>, String> {
  source.lines().map(parse_statement).collect()
}

pub fn parse_statement(line: &str) -> Result<Statement, String> {
  if line.len() >= MAX_LINE_LENGTH - 1 {
    return Err("error: line too long".to_string());
  }

  let mut pairs = Lc2kAsmParser::parse(Rule::line, line)
    .map_err(|e| format!("Parse error: {e}"))?;
  let shape = pairs
    .next()
    .and_then(|p| p.into_inner().next())
    .ok_or_else(|| "Parse error: empty parse".to_string())?;

  let mut statement = Statement::default();
  let labeled = shape.as_rule() == Rule::labeled;
  let mut fields = shape
    .into_inner()
    .filter(|p| p.as_rule() == Rule::field)
    .map(|p| p.as_str().to_string());

  if labeled {
    statement.label = fields.next();
  }
  if let Some(opcode) = fields.next() {
    statement.opcode = opcode;
  }
  for slot in statement.args.iter_mut() {
    match fields.next() {
      Some(field) => *slot = field,
      None => break,
    }
  }
  // remaining fields are commentary
  Ok(statement)
}
