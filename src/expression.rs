use std::{collections::HashMap, fmt, str::FromStr};
use thiserror::Error;

use crate::dump_snapshot::DumpSnapshot;
use crate::error::FrameError;

#[derive(Debug, Error, PartialEq)]
pub enum ExpressionError {
    #[error("column {0}: unexpected character '{1}'")]
    UnexpectedChar(usize, char),
    #[error("column {0}: unexpected '{1}'")]
    UnexpectedToken(usize, String),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("column {0}: invalid number '{1}'")]
    InvalidNumber(usize, String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn apply(&self, a: f64, b: f64) -> bool {
        match self {
            Self::Eq => a == b,
            Self::Ne => a != b,
            Self::Lt => a < b,
            Self::Le => a <= b,
            Self::Gt => a > b,
            Self::Ge => a >= b,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Property(String),
    Number(f64),
}

/// Per-atom boolean expression, e.g. `StructureType == 0 && z > 10`.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Compare(Operand, CmpOp, Operand),
    /// Bare operand, true when non-zero.
    Truthy(Operand),
    Not(Box<Expression>),
    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Cmp(CmpOp),
    And,
    Or,
    Not,
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(s) => write!(f, "{s}"),
            Token::Number(n) => write!(f, "{n}"),
            Token::Cmp(op) => write!(f, "{op:?}"),
            Token::And => write!(f, "&&"),
            Token::Or => write!(f, "||"),
            Token::Not => write!(f, "!"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
        }
    }
}

fn tokenize(s: &str) -> Result<Vec<(usize, Token)>, ExpressionError> {
    let chars = s.char_indices().collect::<Vec<_>>();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let (col, c) = chars[i];
        let next = chars.get(i + 1).map(|(_, c)| *c);
        let (token, len) = match (c, next) {
            (c, _) if c.is_whitespace() => {
                i += 1;
                continue;
            }
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            ('&', Some('&')) => (Token::And, 2),
            ('|', Some('|')) => (Token::Or, 2),
            ('=', Some('=')) => (Token::Cmp(CmpOp::Eq), 2),
            ('!', Some('=')) => (Token::Cmp(CmpOp::Ne), 2),
            ('<', Some('=')) => (Token::Cmp(CmpOp::Le), 2),
            ('>', Some('=')) => (Token::Cmp(CmpOp::Ge), 2),
            ('<', _) => (Token::Cmp(CmpOp::Lt), 1),
            ('>', _) => (Token::Cmp(CmpOp::Gt), 1),
            ('!', _) => (Token::Not, 1),
            (c, _) if c.is_ascii_digit() || c == '.' || c == '-' => {
                let len = chars[i..]
                    .iter()
                    .enumerate()
                    .take_while(|(k, (_, c))| {
                        c.is_ascii_alphanumeric()
                            || *c == '.'
                            || (*k == 0 && *c == '-')
                            || ((*c == '-' || *c == '+') && matches!(chars[i + k - 1].1, 'e' | 'E'))
                    })
                    .count();
                let text = chars[i..i + len].iter().map(|(_, c)| c).collect::<String>();
                let number = text
                    .parse::<f64>()
                    .map_err(|_| ExpressionError::InvalidNumber(col, text.clone()))?;
                (Token::Number(number), len)
            }
            (c, _) if c.is_alphabetic() || c == '_' => {
                let len = chars[i..]
                    .iter()
                    .take_while(|(_, c)| c.is_alphanumeric() || *c == '_' || *c == '.')
                    .count();
                let text = chars[i..i + len].iter().map(|(_, c)| c).collect::<String>();
                (Token::Ident(text), len)
            }
            (c, _) => return Err(ExpressionError::UnexpectedChar(col, c)),
        };
        tokens.push((col, token));
        i += len;
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn next(&mut self) -> Result<(usize, Token), ExpressionError> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(ExpressionError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(token)
    }

    fn or(&mut self) -> Result<Expression, ExpressionError> {
        let mut lhs = self.and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            lhs = Expression::Or(Box::new(lhs), Box::new(self.and()?));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expression, ExpressionError> {
        let mut lhs = self.unary()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            lhs = Expression::And(Box::new(lhs), Box::new(self.unary()?));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expression, ExpressionError> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            return Ok(Expression::Not(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expression, ExpressionError> {
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let inner = self.or()?;
            return match self.next()? {
                (_, Token::RParen) => Ok(inner),
                (col, token) => Err(ExpressionError::UnexpectedToken(col, token.to_string())),
            };
        }
        let lhs = self.operand()?;
        match self.peek() {
            Some(Token::Cmp(op)) => {
                let op = *op;
                self.pos += 1;
                Ok(Expression::Compare(lhs, op, self.operand()?))
            }
            _ => Ok(Expression::Truthy(lhs)),
        }
    }

    fn operand(&mut self) -> Result<Operand, ExpressionError> {
        match self.next()? {
            (_, Token::Ident(name)) => Ok(Operand::Property(name)),
            (_, Token::Number(n)) => Ok(Operand::Number(n)),
            (col, token) => Err(ExpressionError::UnexpectedToken(col, token.to_string())),
        }
    }
}

impl FromStr for Expression {
    type Err = ExpressionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parser = Parser {
            tokens: tokenize(s)?,
            pos: 0,
        };
        let expression = parser.or()?;
        match parser.tokens.get(parser.pos) {
            None => Ok(expression),
            Some((col, token)) => Err(ExpressionError::UnexpectedToken(*col, token.to_string())),
        }
    }
}

impl Expression {
    /// Names of all properties the expression reads.
    pub fn properties(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_properties(&mut names);
        names.sort_unstable();
        names.dedup();
        names
    }

    fn collect_properties<'a>(&'a self, names: &mut Vec<&'a str>) {
        fn push<'a>(operand: &'a Operand, names: &mut Vec<&'a str>) {
            if let Operand::Property(name) = operand {
                names.push(name.as_str());
            }
        }
        match self {
            Self::Compare(a, _, b) => {
                push(a, names);
                push(b, names);
            }
            Self::Truthy(a) => push(a, names),
            Self::Not(e) => e.collect_properties(names),
            Self::And(a, b) | Self::Or(a, b) => {
                a.collect_properties(names);
                b.collect_properties(names);
            }
        }
    }

    fn value(operand: &Operand, columns: &HashMap<&str, &[f64]>, i: usize) -> f64 {
        match operand {
            Operand::Number(n) => *n,
            Operand::Property(name) => columns[name.as_str()][i],
        }
    }

    fn test(&self, columns: &HashMap<&str, &[f64]>, i: usize) -> bool {
        match self {
            Self::Compare(a, op, b) => op.apply(Self::value(a, columns, i), Self::value(b, columns, i)),
            Self::Truthy(a) => Self::value(a, columns, i) != 0.0,
            Self::Not(e) => !e.test(columns, i),
            Self::And(a, b) => a.test(columns, i) && b.test(columns, i),
            Self::Or(a, b) => a.test(columns, i) || b.test(columns, i),
        }
    }

    /// Evaluates the expression for every atom of `snapshot`.
    pub fn select(&self, snapshot: &DumpSnapshot) -> Result<Vec<bool>, FrameError> {
        let columns = self
            .properties()
            .into_iter()
            .map(|name| {
                snapshot
                    .try_get_property(name)
                    .map(|values| (name, values))
                    .ok_or_else(|| FrameError::MissingProperty(name.to_string()))
            })
            .collect::<Result<HashMap<_, _>, _>>()?;
        Ok((0..snapshot.atoms_count)
            .map(|i| self.test(&columns, i))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dump_snapshot::SymBox;

    fn snapshot() -> DumpSnapshot {
        let keys = ["StructureType", "z"]
            .iter()
            .enumerate()
            .map(|(j, k)| (k.to_string(), j))
            .collect();
        let mut snapshot = DumpSnapshot::new(keys, 0, 4, SymBox::default());
        snapshot.set_property("StructureType", &[0.0, 3.0, 0.0, 3.0]);
        snapshot.set_property("z", &[1.0, 1.0, 20.0, 20.0]);
        snapshot
    }

    #[test]
    fn test_parse_default_expression() {
        let expression = "StructureType == 0".parse::<Expression>().unwrap();
        assert_eq!(
            expression,
            Expression::Compare(
                Operand::Property("StructureType".to_string()),
                CmpOp::Eq,
                Operand::Number(0.0)
            )
        );
        assert_eq!(
            expression.select(&snapshot()).unwrap(),
            vec![true, false, true, false]
        );
    }

    #[test]
    fn test_precedence_and_parentheses() {
        let s = snapshot();
        let e = "StructureType == 3 || z > 10 && StructureType == 0"
            .parse::<Expression>()
            .unwrap();
        assert_eq!(e.select(&s).unwrap(), vec![false, true, true, true]);
        let e = "(StructureType == 3 || z > 10) && !(z >= 2e1)"
            .parse::<Expression>()
            .unwrap();
        assert_eq!(e.select(&s).unwrap(), vec![false, true, false, false]);
        let e = "StructureType".parse::<Expression>().unwrap();
        assert_eq!(e.select(&s).unwrap(), vec![false, true, false, true]);
        let e = "z<=-1.5".parse::<Expression>().unwrap();
        assert_eq!(e.select(&s).unwrap(), vec![false; 4]);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            "StructureType == ".parse::<Expression>(),
            Err(ExpressionError::UnexpectedEnd)
        );
        assert_eq!(
            "a == 1 )".parse::<Expression>(),
            Err(ExpressionError::UnexpectedToken(7, ")".to_string()))
        );
        assert_eq!(
            "a = 1".parse::<Expression>(),
            Err(ExpressionError::UnexpectedChar(2, '='))
        );
    }

    #[test]
    fn test_missing_property() {
        let e = "Cluster > 0".parse::<Expression>().unwrap();
        assert!(matches!(
            e.select(&snapshot()),
            Err(FrameError::MissingProperty(name)) if name == "Cluster"
        ));
    }
}
