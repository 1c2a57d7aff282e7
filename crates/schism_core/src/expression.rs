use crate::error::{Result, SchismError};
use crate::field::{suffix, Derivative, Field};
use crate::grid::AXIS_NAMES;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

/// Symbolic expression tree for boundary-condition left- and right-hand sides.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    /// A named scalar that is not a grid field (a free coefficient).
    Symbol(String),
    Field(Field),
    /// Expression differentiated with the given order along each axis.
    Derivative(Box<Expr>, Vec<usize>),
    Binary(Box<Expr>, char, Box<Expr>), // char is operator +, -, *, /, ^
    Unary(char, Box<Expr>),             // only '-'
    Call(String, Box<Expr>),            // sin, cos, exp
}

/// One `coefficient * d^orders(field)` term of a linear differential expression.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearTerm {
    pub field: Field,
    pub orders: Vec<usize>,
    pub coefficient: f64,
}

impl Expr {
    pub fn number(value: f64) -> Self {
        Expr::Number(value)
    }

    pub fn symbol(name: impl Into<String>) -> Self {
        Expr::Symbol(name.into())
    }

    pub fn field(field: &Field) -> Self {
        Expr::Field(field.clone())
    }

    /// Derivative node of an arbitrary expression. Nothing is validated here;
    /// callers that need a bare field check `derivatives()`.
    pub fn derivative(expr: Expr, orders: &[usize]) -> Self {
        Expr::Derivative(Box::new(expr), orders.to_vec())
    }

    /// Every field referenced anywhere in the expression, deduplicated.
    pub fn fields(&self) -> BTreeSet<Field> {
        let mut out = BTreeSet::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields(&self, out: &mut BTreeSet<Field>) {
        match self {
            Expr::Number(_) | Expr::Symbol(_) => {}
            Expr::Field(field) => {
                out.insert(field.clone());
            }
            Expr::Derivative(inner, _) | Expr::Unary(_, inner) | Expr::Call(_, inner) => {
                inner.collect_fields(out)
            }
            Expr::Binary(left, _, right) => {
                left.collect_fields(out);
                right.collect_fields(out);
            }
        }
    }

    /// Every derivative node, outermost first, as `(differentiated expression, orders)`.
    pub fn derivatives(&self) -> Vec<(&Expr, &[usize])> {
        let mut out = Vec::new();
        self.collect_derivatives(&mut out);
        out
    }

    fn collect_derivatives<'a>(&'a self, out: &mut Vec<(&'a Expr, &'a [usize])>) {
        match self {
            Expr::Number(_) | Expr::Symbol(_) | Expr::Field(_) => {}
            Expr::Derivative(inner, orders) => {
                out.push((inner.as_ref(), orders.as_slice()));
                inner.collect_derivatives(out);
            }
            Expr::Unary(_, inner) | Expr::Call(_, inner) => inner.collect_derivatives(out),
            Expr::Binary(left, _, right) => {
                left.collect_derivatives(out);
                right.collect_derivatives(out);
            }
        }
    }

    /// Folds the expression to a number if it contains no fields or symbols.
    pub fn constant_value(&self) -> Option<f64> {
        match self {
            Expr::Number(value) => Some(*value),
            Expr::Symbol(_) | Expr::Field(_) | Expr::Derivative(_, _) => None,
            Expr::Binary(left, op, right) => {
                let a = left.constant_value()?;
                let b = right.constant_value()?;
                match op {
                    '+' => Some(a + b),
                    '-' => Some(a - b),
                    '*' => Some(a * b),
                    '/' => Some(a / b),
                    '^' => Some(a.powf(b)),
                    _ => None,
                }
            }
            Expr::Unary(_, inner) => inner.constant_value().map(|v| -v),
            Expr::Call(func, arg) => {
                let a = arg.constant_value()?;
                match func.as_str() {
                    "sin" => Some(a.sin()),
                    "cos" => Some(a.cos()),
                    "exp" => Some(a.exp()),
                    _ => None,
                }
            }
        }
    }

    pub fn is_zero(&self) -> bool {
        self.constant_value() == Some(0.0)
    }

    /// Splits a linear, homogeneous differential expression into its terms.
    ///
    /// Terms with equal field and derivative orders are merged; terms whose
    /// coefficients cancel are dropped. The result is sorted by field, then
    /// by orders.
    pub fn linear_terms(&self) -> Result<Vec<LinearTerm>> {
        let mut acc = BTreeMap::new();
        self.collect_linear(1.0, &mut acc)?;
        Ok(acc
            .into_iter()
            .filter(|(_, coefficient)| *coefficient != 0.0)
            .map(|((field, orders), coefficient)| LinearTerm {
                field,
                orders,
                coefficient,
            })
            .collect())
    }

    fn collect_linear(
        &self,
        scale: f64,
        acc: &mut BTreeMap<(Field, Vec<usize>), f64>,
    ) -> Result<()> {
        if let Some(value) = self.constant_value() {
            if value != 0.0 {
                return Err(SchismError::equation(format!(
                    "constant term `{self}` in a homogeneous condition"
                )));
            }
            return Ok(());
        }
        match self {
            Expr::Field(field) => {
                *acc.entry((field.clone(), vec![0; field.ndim()])).or_insert(0.0) += scale;
                Ok(())
            }
            Expr::Derivative(inner, orders) => match inner.as_ref() {
                Expr::Field(field) => {
                    *acc.entry((field.clone(), orders.clone())).or_insert(0.0) += scale;
                    Ok(())
                }
                other => Err(SchismError::derivative(format!(
                    "derivative of non-field expression `{other}`"
                ))),
            },
            Expr::Binary(left, '+', right) => {
                left.collect_linear(scale, acc)?;
                right.collect_linear(scale, acc)
            }
            Expr::Binary(left, '-', right) => {
                left.collect_linear(scale, acc)?;
                right.collect_linear(-scale, acc)
            }
            Expr::Binary(left, '*', right) => {
                if let Some(c) = left.constant_value() {
                    right.collect_linear(scale * c, acc)
                } else if let Some(c) = right.constant_value() {
                    left.collect_linear(scale * c, acc)
                } else {
                    Err(SchismError::equation(format!(
                        "`{self}` is not linear in the boundary fields"
                    )))
                }
            }
            Expr::Binary(left, '/', right) => match right.constant_value() {
                Some(c) if c != 0.0 => left.collect_linear(scale / c, acc),
                _ => Err(SchismError::equation(format!(
                    "`{self}` divides by a non-constant or zero expression"
                ))),
            },
            Expr::Unary('-', inner) => inner.collect_linear(-scale, acc),
            Expr::Symbol(name) => Err(SchismError::equation(format!(
                "symbolic coefficient `{name}` has no numeric value"
            ))),
            _ => Err(SchismError::equation(format!(
                "`{self}` is not linear in the boundary fields"
            ))),
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Binary(_, '+' | '-', _) => 1,
            Expr::Binary(_, '*' | '/', _) => 2,
            Expr::Binary(_, _, _) => 3,
            Expr::Unary(_, _) => 4,
            _ => 5,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(value) => write!(f, "{value}"),
            Expr::Symbol(name) => f.write_str(name),
            Expr::Field(field) => f.write_str(field.name()),
            Expr::Derivative(inner, orders) => match inner.as_ref() {
                Expr::Field(_) | Expr::Derivative(_, _) => write!(f, "{inner}.{}", suffix(orders)),
                _ => write!(f, "({inner}).{}", suffix(orders)),
            },
            Expr::Binary(left, op, right) => {
                let prec = self.precedence();
                if left.precedence() < prec {
                    write!(f, "({left})")?;
                } else {
                    write!(f, "{left}")?;
                }
                write!(f, " {op} ")?;
                let right_prec = right.precedence();
                if right_prec < prec || (right_prec == prec && matches!(op, '-' | '/' | '^')) {
                    write!(f, "({right})")
                } else {
                    write!(f, "{right}")
                }
            }
            Expr::Unary(op, inner) => {
                if inner.precedence() < 4 {
                    write!(f, "{op}({inner})")
                } else {
                    write!(f, "{op}{inner}")
                }
            }
            Expr::Call(func, arg) => write!(f, "{func}({arg})"),
        }
    }
}

impl From<&Field> for Expr {
    fn from(field: &Field) -> Self {
        Expr::field(field)
    }
}

impl From<Derivative> for Expr {
    fn from(derivative: Derivative) -> Self {
        Expr::derivative(Expr::Field(derivative.field().clone()), derivative.orders())
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::Number(value)
    }
}

impl Add for Expr {
    type Output = Expr;
    fn add(self, rhs: Expr) -> Expr {
        Expr::Binary(Box::new(self), '+', Box::new(rhs))
    }
}

impl Sub for Expr {
    type Output = Expr;
    fn sub(self, rhs: Expr) -> Expr {
        Expr::Binary(Box::new(self), '-', Box::new(rhs))
    }
}

impl Mul for Expr {
    type Output = Expr;
    fn mul(self, rhs: Expr) -> Expr {
        Expr::Binary(Box::new(self), '*', Box::new(rhs))
    }
}

impl Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::Unary('-', Box::new(self))
    }
}

// --- Parser ---

/// Parses an expression such as `f.dx2 + 2*f.dx2dy2 - c*g`.
///
/// Identifiers matching a name in `fields` become field references; any other
/// identifier is a free symbol. A `.d<axis><order>...` suffix differentiates the
/// preceding primary expression.
pub fn parse(input: &str, fields: &[Field]) -> Result<Expr> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        fields,
    };
    let expr = parser.parse_expression()?;
    if let Some(token) = parser.peek() {
        return Err(SchismError::Parse(format!(
            "unexpected trailing token {token:?} in `{input}`"
        )));
    }
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Number(f64),
    Identifier(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
    Dot,
    Equals,
}

pub(crate) fn tokenize(input: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next_is_digit = chars.get(i + 1).is_some_and(|d| d.is_ascii_digit());
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() || (c == '.' && next_is_digit) {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            let value = text
                .parse()
                .map_err(|_| SchismError::Parse(format!("invalid number `{text}`")))?;
            tokens.push(Token::Number(value));
        } else if c.is_alphabetic() {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Identifier(chars[start..i].iter().collect()));
        } else {
            let token = match c {
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' => Token::Star,
                '/' => Token::Slash,
                '^' => Token::Caret,
                '(' => Token::LParen,
                ')' => Token::RParen,
                '.' => Token::Dot,
                '=' => Token::Equals,
                other => {
                    return Err(SchismError::Parse(format!(
                        "unexpected character `{other}`"
                    )))
                }
            };
            tokens.push(token);
            i += 1;
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    fields: &'a [Field],
}

impl Parser<'_> {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).cloned()
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn parse_expression(&mut self) -> Result<Expr> {
        let mut left = self.parse_product()?;

        while let Some(token) = self.peek() {
            let op = match token {
                Token::Plus => '+',
                Token::Minus => '-',
                _ => break,
            };
            self.consume();
            let right = self.parse_product()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_product(&mut self) -> Result<Expr> {
        let mut left = self.parse_power()?;

        while let Some(token) = self.peek() {
            let op = match token {
                Token::Star => '*',
                Token::Slash => '/',
                _ => break,
            };
            self.consume();
            let right = self.parse_power()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_power(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;

        while let Some(Token::Caret) = self.peek() {
            self.consume();
            let right = self.parse_unary()?;
            left = Expr::Binary(Box::new(left), '^', Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if let Some(Token::Minus) = self.peek() {
            self.consume();
            let expr = self.parse_unary()?;
            return Ok(Expr::Unary('-', Box::new(expr)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;

        while let Some(Token::Dot) = self.peek() {
            self.consume();
            let name = match self.consume() {
                Some(Token::Identifier(name)) => name,
                other => {
                    return Err(SchismError::Parse(format!(
                        "expected derivative suffix after `.`, found {other:?}"
                    )))
                }
            };
            let ndim = self.ndim_of(&expr)?;
            let orders = parse_suffix(&name, ndim)?;
            expr = Expr::Derivative(Box::new(expr), orders);
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.consume() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Identifier(name)) => {
                if let Some(Token::LParen) = self.peek() {
                    self.consume(); // eat '('
                    let arg = self.parse_expression()?;
                    return match self.consume() {
                        Some(Token::RParen) => Ok(Expr::Call(name, Box::new(arg))),
                        _ => Err(SchismError::Parse("expected `)`".to_string())),
                    };
                }
                match self.fields.iter().find(|f| f.name() == name) {
                    Some(field) => Ok(Expr::Field(field.clone())),
                    None => Ok(Expr::Symbol(name)),
                }
            }
            Some(Token::LParen) => {
                let expr = self.parse_expression()?;
                match self.consume() {
                    Some(Token::RParen) => Ok(expr),
                    _ => Err(SchismError::Parse("expected `)`".to_string())),
                }
            }
            other => Err(SchismError::Parse(format!("unexpected token {other:?}"))),
        }
    }

    fn ndim_of(&self, expr: &Expr) -> Result<usize> {
        if let Some(field) = expr.fields().iter().next() {
            return Ok(field.ndim());
        }
        self.fields.first().map(Field::ndim).ok_or_else(|| {
            SchismError::Parse(format!("cannot infer the dimensionality of `{expr}`"))
        })
    }
}

/// Parses `dx2dy` into per-axis orders.
fn parse_suffix(text: &str, ndim: usize) -> Result<Vec<usize>> {
    let chars: Vec<char> = text.chars().collect();
    let mut orders = vec![0; ndim];
    let mut i = 0;
    if chars.is_empty() {
        return Err(SchismError::Parse("empty derivative suffix".to_string()));
    }
    while i < chars.len() {
        if chars[i] != 'd' {
            return Err(SchismError::Parse(format!("invalid derivative suffix `{text}`")));
        }
        let axis = chars
            .get(i + 1)
            .and_then(|c| AXIS_NAMES.iter().position(|a| a == c))
            .filter(|&axis| axis < ndim)
            .ok_or_else(|| SchismError::Parse(format!("invalid derivative axis in `{text}`")))?;
        i += 2;
        let start = i;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
        let order = if start == i {
            1
        } else {
            let digits: String = chars[start..i].iter().collect();
            digits
                .parse::<usize>()
                .map_err(|_| SchismError::Parse(format!("invalid derivative order in `{text}`")))?
        };
        orders[axis] += order;
    }
    Ok(orders)
}

#[cfg(test)]
mod tests {
    use super::{parse, Expr};
    use crate::error::SchismError;
    use crate::field::Field;

    fn fields() -> Vec<Field> {
        vec![
            Field::time_dependent("f", 2, 4),
            Field::time_dependent("g", 2, 4),
            Field::coefficient("rho", 2, 4),
        ]
    }

    #[test]
    fn parses_devito_style_derivatives() {
        let expr = parse("f.dx4 + 2*f.dx2dy2 + f.dy4", &fields()).expect("should parse");
        let derivs: Vec<Vec<usize>> = expr
            .derivatives()
            .iter()
            .map(|(_, orders)| orders.to_vec())
            .collect();
        assert_eq!(derivs, vec![vec![4, 0], vec![2, 2], vec![0, 4]]);
        assert_eq!(expr.to_string(), "f.dx4 + 2 * f.dx2dy2 + f.dy4");
    }

    #[test]
    fn chained_suffixes_nest() {
        let expr = parse("f.dx.dy", &fields()).expect("should parse");
        match &expr {
            Expr::Derivative(inner, orders) => {
                assert_eq!(orders, &vec![0, 1]);
                assert!(matches!(inner.as_ref(), Expr::Derivative(_, _)));
            }
            other => panic!("expected derivative, got {other:?}"),
        }
        assert_eq!(expr.derivatives().len(), 2);
    }

    #[test]
    fn unknown_identifiers_become_symbols() {
        let expr = parse("c*f + rho", &fields()).expect("should parse");
        let names: Vec<String> = expr.fields().iter().map(|f| f.name().to_string()).collect();
        assert_eq!(names, vec!["f", "rho"]);
        assert_eq!(expr.to_string(), "c * f + rho");
        match &expr {
            Expr::Binary(left, '+', _) => match left.as_ref() {
                Expr::Binary(c, '*', _) => assert_eq!(c.as_ref(), &Expr::symbol("c")),
                other => panic!("expected product, got {other:?}"),
            },
            other => panic!("expected sum, got {other:?}"),
        }
    }

    #[test]
    fn rejects_bad_suffix_and_characters() {
        assert!(matches!(parse("f.dw", &fields()), Err(SchismError::Parse(_))));
        assert!(matches!(parse("f.dz", &fields()), Err(SchismError::Parse(_))));
        assert!(matches!(parse("f # g", &fields()), Err(SchismError::Parse(_))));
        assert!(matches!(parse("f g", &fields()), Err(SchismError::Parse(_))));
    }

    #[test]
    fn constant_folding_handles_calls_and_powers() {
        let expr = parse("2^3 - cos(0) / 2", &[]).expect("should parse");
        assert_eq!(expr.constant_value(), Some(7.5));
        assert!(parse("0*3", &[]).expect("should parse").is_zero());
    }

    #[test]
    fn linear_terms_merge_and_scale() {
        let expr = parse("f.dx2 + f.dy2 - (f.dx2 - 3*g)/2", &fields()).expect("should parse");
        let terms = expr.linear_terms().expect("expression is linear");
        let summary: Vec<(String, Vec<usize>, f64)> = terms
            .iter()
            .map(|t| (t.field.name().to_string(), t.orders.clone(), t.coefficient))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("f".to_string(), vec![0, 2], 1.0),
                ("f".to_string(), vec![2, 0], 0.5),
                ("g".to_string(), vec![0, 0], 1.5),
            ]
        );
    }

    #[test]
    fn linear_terms_reject_non_linear_forms() {
        for text in ["f*g", "c*f", "f + 1", "f^2", "(f + g).dx"] {
            let expr = parse(text, &fields()).expect("should parse");
            assert!(expr.linear_terms().is_err(), "`{text}` should not be linear");
        }
    }

    #[test]
    fn operators_build_trees() {
        let f = Field::time_dependent("f", 2, 2);
        let dx2 = f.derivative(&[2, 0]).expect("derivative should build");
        let expr = Expr::from(dx2) - Expr::number(2.0) * Expr::from(&f);
        assert_eq!(expr.to_string(), "f.dx2 - 2 * f");
    }
}
