//! Statements and expressions.
//!
//! [`Expr`] and [`Statement`] are produced by the parser and consumed by
//! the evaluator and the executors. Expression formatting is reversible:
//! reparsing a formatted expression yields an equal expression, and for
//! plain operands formatting is the identity modulo whitespace.

use std::fmt;

use vellum_core::{Path, Value, ValueType};

/// Binary operators, in SQL surface syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `=`
    Eq,
    /// `!=`
    NotEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Mod,
    /// `&`
    BitAnd,
    /// `|`
    BitOr,
    /// `^`
    BitXor,
    /// `AND`
    And,
    /// `OR`
    Or,
}

impl BinaryOp {
    /// Binding power; higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Eq
            | BinaryOp::NotEq
            | BinaryOp::Gt
            | BinaryOp::GtEq
            | BinaryOp::Lt
            | BinaryOp::LtEq => 3,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::BitOr | BinaryOp::BitXor => 4,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod | BinaryOp::BitAnd => 5,
        }
    }

    /// True for the six comparison operators.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Gt
                | BinaryOp::GtEq
                | BinaryOp::Lt
                | BinaryOp::LtEq
        )
    }

    /// The surface symbol.
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "!=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
        }
    }

    /// Swaps the operand sides: `a < b` is `b > a`.
    pub fn flip(self) -> BinaryOp {
        match self {
            BinaryOp::Gt => BinaryOp::Lt,
            BinaryOp::GtEq => BinaryOp::LtEq,
            BinaryOp::Lt => BinaryOp::Gt,
            BinaryOp::LtEq => BinaryOp::GtEq,
            other => other,
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `NOT`
    Not,
    /// `-`
    Neg,
}

/// An expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A literal value.
    Literal(Value),
    /// A document path reference.
    Path(Path),
    /// A positional `?` parameter (0-based).
    Param(usize),
    /// The `pk()` function: the primary key of the current document.
    Pk,
    /// `CAST(expr AS type)`.
    Cast {
        /// The converted expression.
        expr: Box<Expr>,
        /// The target type.
        target: ValueType,
    },
    /// A unary operation.
    Unary {
        /// The operator.
        op: UnaryOp,
        /// The operand.
        expr: Box<Expr>,
    },
    /// A binary operation.
    Binary {
        /// The operator.
        op: BinaryOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
    /// `expr IS [NOT] NULL`.
    IsNull {
        /// The tested expression.
        expr: Box<Expr>,
        /// True for `IS NOT NULL`.
        negated: bool,
    },
    /// `expr BETWEEN low AND high`.
    Between {
        /// The tested expression.
        expr: Box<Expr>,
        /// Lower bound, inclusive.
        low: Box<Expr>,
        /// Upper bound, inclusive.
        high: Box<Expr>,
    },
    /// `expr [NOT] IN (items…)`.
    InList {
        /// The tested expression.
        expr: Box<Expr>,
        /// Candidate expressions.
        list: Vec<Expr>,
        /// True for `NOT IN`.
        negated: bool,
    },
    /// An array literal.
    Array(Vec<Expr>),
    /// An object literal.
    Object(Vec<(String, Expr)>),
}

impl Expr {
    /// Convenience constructor for a literal.
    pub fn literal(value: Value) -> Expr {
        Expr::Literal(value)
    }

    /// Convenience constructor for a path reference.
    pub fn path(path: Path) -> Expr {
        Expr::Path(path)
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Binary { op, .. } => op.precedence(),
            // NOT, IS NULL, BETWEEN and IN sit at comparison level.
            Expr::Unary {
                op: UnaryOp::Not, ..
            } => 3,
            Expr::IsNull { .. } | Expr::Between { .. } | Expr::InList { .. } => 3,
            _ => u8::MAX,
        }
    }
}

/// Writes an operand of an infix operator, parenthesizing when its
/// precedence requires it.
fn fmt_operand(
    f: &mut fmt::Formatter<'_>,
    expr: &Expr,
    parent: u8,
    is_right: bool,
) -> fmt::Result {
    let child = expr.precedence();
    let needs_parens = child < parent || (child == parent && is_right);
    if needs_parens {
        write!(f, "({})", expr)
    } else {
        write!(f, "{}", expr)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(v) => write!(f, "{}", v),
            Expr::Path(p) => write!(f, "{}", p),
            Expr::Param(_) => write!(f, "?"),
            Expr::Pk => write!(f, "pk()"),
            Expr::Cast { expr, target } => write!(f, "CAST({} AS {})", expr, target.sql_name()),
            Expr::Unary { op, expr } => match op {
                UnaryOp::Not => {
                    write!(f, "NOT ")?;
                    fmt_operand(f, expr, 3, false)
                }
                UnaryOp::Neg => {
                    write!(f, "-")?;
                    fmt_operand(f, expr, u8::MAX, false)
                }
            },
            Expr::Binary { op, left, right } => {
                fmt_operand(f, left, op.precedence(), false)?;
                write!(f, " {} ", op.symbol())?;
                fmt_operand(f, right, op.precedence(), true)
            }
            Expr::IsNull { expr, negated } => {
                fmt_operand(f, expr, 3, false)?;
                write!(f, " IS {}NULL", if *negated { "NOT " } else { "" })
            }
            Expr::Between { expr, low, high } => {
                fmt_operand(f, expr, 3, false)?;
                write!(f, " BETWEEN ")?;
                fmt_operand(f, low, 4, false)?;
                write!(f, " AND ")?;
                fmt_operand(f, high, 4, false)
            }
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                fmt_operand(f, expr, 3, false)?;
                write!(f, " {}IN (", if *negated { "NOT " } else { "" })?;
                for (i, item) in list.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
            Expr::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Expr::Object(pairs) => {
                write!(f, "{{")?;
                for (i, (name, value)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:?}: {}", name, value)?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// One column definition of a CREATE TABLE statement.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    /// The constrained path.
    pub path: Path,
    /// Declared type, if any.
    pub ty: Option<ValueType>,
    /// PRIMARY KEY.
    pub primary_key: bool,
    /// UNIQUE.
    pub unique: bool,
    /// NOT NULL.
    pub not_null: bool,
    /// DEFAULT expression; must evaluate without a document.
    pub default: Option<Expr>,
}

/// Rows of an INSERT statement.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertRows {
    /// `VALUES {…}, {…}`: each expression evaluates to a document.
    Documents(Vec<Expr>),
    /// `(cols…) VALUES (…), (…)`.
    Values {
        /// Field names, one per expression of each row.
        columns: Vec<String>,
        /// Rows of expressions.
        rows: Vec<Vec<Expr>>,
    },
}

/// One entry of a SELECT projection list.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// `*`
    Wildcard,
    /// An expression with an optional alias.
    Expr {
        /// The projected expression.
        expr: Expr,
        /// `AS alias`.
        alias: Option<String>,
    },
}

/// A SELECT statement.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStmt {
    /// Source table; absent for table-less SELECT.
    pub table: Option<String>,
    /// Projection list.
    pub projections: Vec<Projection>,
    /// WHERE clause.
    pub filter: Option<Expr>,
    /// ORDER BY path and direction (true = descending).
    pub order_by: Option<(Path, bool)>,
    /// LIMIT expression.
    pub limit: Option<Expr>,
    /// OFFSET expression.
    pub offset: Option<Expr>,
}

/// An UPDATE statement.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStmt {
    /// The updated table.
    pub table: String,
    /// SET assignments, in order.
    pub set: Vec<(Path, Expr)>,
    /// UNSET paths, in order.
    pub unset: Vec<Path>,
    /// WHERE clause.
    pub filter: Option<Expr>,
}

/// A parsed SQL statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `BEGIN [READ ONLY]`.
    Begin {
        /// False for `READ ONLY` transactions.
        writable: bool,
    },
    /// `COMMIT`.
    Commit,
    /// `ROLLBACK`.
    Rollback,
    /// `CREATE TABLE`.
    CreateTable {
        /// Table name.
        name: String,
        /// `IF NOT EXISTS`.
        if_not_exists: bool,
        /// Column definitions; may be empty.
        columns: Vec<ColumnDef>,
    },
    /// `DROP TABLE`.
    DropTable {
        /// Table name.
        name: String,
        /// `IF EXISTS`.
        if_exists: bool,
    },
    /// `CREATE [UNIQUE] INDEX`.
    CreateIndex {
        /// Index name.
        name: String,
        /// Indexed table.
        table: String,
        /// Indexed path.
        path: Path,
        /// `UNIQUE`.
        unique: bool,
        /// `IF NOT EXISTS`.
        if_not_exists: bool,
    },
    /// `DROP INDEX`.
    DropIndex {
        /// Index name.
        name: String,
        /// `IF EXISTS`.
        if_exists: bool,
    },
    /// `REINDEX [name]`: a specific index, a table's indexes, or
    /// everything.
    Reindex {
        /// Index or table name; absent rebuilds every index.
        target: Option<String>,
    },
    /// `INSERT INTO`.
    Insert {
        /// Target table.
        table: String,
        /// The inserted rows.
        rows: InsertRows,
    },
    /// `SELECT`.
    Select(SelectStmt),
    /// `UPDATE`.
    Update(UpdateStmt),
    /// `DELETE FROM`.
    Delete {
        /// Target table.
        table: String,
        /// WHERE clause.
        filter: Option<Expr>,
    },
}

impl Statement {
    /// Returns true if executing this statement requires a writable
    /// transaction.
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            Statement::Select(_) | Statement::Begin { .. } | Statement::Commit | Statement::Rollback
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_parenthesizes_by_precedence() {
        // (1 + 2) * 3
        let e = Expr::Binary {
            op: BinaryOp::Mul,
            left: Box::new(Expr::Binary {
                op: BinaryOp::Add,
                left: Box::new(Expr::Literal(Value::Integer(1))),
                right: Box::new(Expr::Literal(Value::Integer(2))),
            }),
            right: Box::new(Expr::Literal(Value::Integer(3))),
        };
        assert_eq!(e.to_string(), "(1 + 2) * 3");

        // 1 + 2 * 3 needs no parens
        let e = Expr::Binary {
            op: BinaryOp::Add,
            left: Box::new(Expr::Literal(Value::Integer(1))),
            right: Box::new(Expr::Binary {
                op: BinaryOp::Mul,
                left: Box::new(Expr::Literal(Value::Integer(2))),
                right: Box::new(Expr::Literal(Value::Integer(3))),
            }),
        };
        assert_eq!(e.to_string(), "1 + 2 * 3");
    }

    #[test]
    fn test_display_simple_operands() {
        assert_eq!(Expr::Literal(Value::Double(10.4)).to_string(), "10.4");
        assert_eq!(Expr::Pk.to_string(), "pk()");
        assert_eq!(
            Expr::Cast {
                expr: Box::new(Expr::Literal(Value::Integer(10))),
                target: ValueType::Integer,
            }
            .to_string(),
            "CAST(10 AS int64)"
        );
    }
}
