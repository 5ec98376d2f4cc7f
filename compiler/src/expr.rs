// expr.rs — Symbolic index expressions
//
// A small tagged expression type over dimension references and integer
// constants. Only the operations the partitioning heuristic needs are
// provided: structural equality, constant folding of constant-constant
// operands, and folding `a - b` to an integer when the symbolic parts cancel.
//
// Preconditions: none.
// Postconditions: constructors never panic; arithmetic overflow yields a
//                 non-folded `Binary` node (or `None` from folding queries).
// Failure modes: none.
// Side effects: none.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

// ── Types ───────────────────────────────────────────────────────────────────

/// Binary operators of the expression language. Subtraction is expressed as
/// `a + b * -1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BinOp {
    Add,
    Mul,
    Mod,
    FloorDiv,
    CeilDiv,
}

/// A symbolic index expression.
///
/// `Dim(k)` refers to the k-th dimension of whatever the expression is
/// evaluated against: a loop induction variable for access indices, or an
/// array dimension for layout maps.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Expr {
    Const(i64),
    Dim(u32),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn constant(value: i64) -> Self {
        Expr::Const(value)
    }

    pub fn dim(position: u32) -> Self {
        Expr::Dim(position)
    }

    /// Build a binary expression, folding it when both operands are constant.
    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        if let (Expr::Const(a), Expr::Const(b)) = (&lhs, &rhs) {
            if let Some(v) = apply(op, *a, *b) {
                return Expr::Const(v);
            }
        }
        Expr::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    pub fn modulo(self, rhs: i64) -> Self {
        Expr::binary(BinOp::Mod, self, Expr::Const(rhs))
    }

    pub fn floor_div(self, rhs: i64) -> Self {
        Expr::binary(BinOp::FloorDiv, self, Expr::Const(rhs))
    }

    pub fn as_const(&self) -> Option<i64> {
        match self {
            Expr::Const(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to reduce the expression to a compile-time integer.
    ///
    /// Succeeds when the linear combination of its symbolic parts cancels,
    /// e.g. `(d0 + 2) - d0` folds to `2`.
    pub fn try_fold_constant(&self) -> Option<i64> {
        let linear = Linear::of(self)?;
        if linear.terms.is_empty() {
            Some(linear.constant)
        } else {
            None
        }
    }

    /// Largest dimension position referenced, if any.
    pub fn max_dim(&self) -> Option<u32> {
        match self {
            Expr::Const(_) => None,
            Expr::Dim(d) => Some(*d),
            Expr::Binary(_, l, r) => match (l.max_dim(), r.max_dim()) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (a, b) => a.or(b),
            },
        }
    }

    /// Evaluate with floor semantics for `mod`, `floordiv` and `ceildiv`.
    /// Returns `None` on division by zero, overflow, or an unbound dimension.
    pub fn eval(&self, dims: &[i64]) -> Option<i64> {
        match self {
            Expr::Const(v) => Some(*v),
            Expr::Dim(d) => dims.get(*d as usize).copied(),
            Expr::Binary(op, l, r) => apply(*op, l.eval(dims)?, r.eval(dims)?),
        }
    }
}

/// Fold `a - b` to an integer constant when possible.
pub fn fold_difference(a: &Expr, b: &Expr) -> Option<i64> {
    (a.clone() - b.clone()).try_fold_constant()
}

// ── Arithmetic ──────────────────────────────────────────────────────────────

fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        q.checked_sub(1)
    } else {
        Some(q)
    }
}

fn apply(op: BinOp, a: i64, b: i64) -> Option<i64> {
    match op {
        BinOp::Add => a.checked_add(b),
        BinOp::Mul => a.checked_mul(b),
        BinOp::FloorDiv => floor_div(a, b),
        BinOp::CeilDiv => floor_div(a.checked_neg()?, b)?.checked_neg(),
        BinOp::Mod => {
            let q = floor_div(a, b)?;
            a.checked_sub(b.checked_mul(q)?)
        }
    }
}

impl From<i64> for Expr {
    fn from(value: i64) -> Self {
        Expr::Const(value)
    }
}

macro_rules! impl_arith {
    ($trait:ident, $method:ident, $op:expr) => {
        impl $trait<Expr> for Expr {
            type Output = Expr;

            fn $method(self, rhs: Expr) -> Expr {
                Expr::binary($op, self, rhs)
            }
        }

        impl $trait<i64> for Expr {
            type Output = Expr;

            fn $method(self, rhs: i64) -> Expr {
                Expr::binary($op, self, Expr::Const(rhs))
            }
        }
    };
}

impl_arith!(Add, add, BinOp::Add);
impl_arith!(Mul, mul, BinOp::Mul);

impl Sub<Expr> for Expr {
    type Output = Expr;

    fn sub(self, rhs: Expr) -> Expr {
        self + (-rhs)
    }
}

impl Sub<i64> for Expr {
    type Output = Expr;

    fn sub(self, rhs: i64) -> Expr {
        self - Expr::Const(rhs)
    }
}

impl Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        self * -1
    }
}

// ── Linear form ─────────────────────────────────────────────────────────────

/// `Σ coeff·atom + constant`, where atoms are dimension references or
/// non-linear subexpressions compared structurally.
#[derive(Debug, Default)]
struct Linear {
    terms: BTreeMap<Expr, i64>,
    constant: i64,
}

impl Linear {
    fn of(expr: &Expr) -> Option<Linear> {
        match expr {
            Expr::Const(v) => Some(Linear {
                terms: BTreeMap::new(),
                constant: *v,
            }),
            Expr::Dim(_) => Some(Linear::atom(expr)),
            Expr::Binary(BinOp::Add, l, r) => Linear::of(l)?.plus(Linear::of(r)?),
            Expr::Binary(op, l, r) => {
                let (l, r) = (Linear::of(l)?, Linear::of(r)?);
                match (op, l.as_const(), r.as_const()) {
                    (_, Some(a), Some(b)) => Some(Linear {
                        terms: BTreeMap::new(),
                        constant: apply(*op, a, b)?,
                    }),
                    (BinOp::Mul, Some(k), None) => r.scale(k),
                    (BinOp::Mul, None, Some(k)) => l.scale(k),
                    _ => Some(Linear::atom(expr)),
                }
            }
        }
    }

    fn atom(expr: &Expr) -> Linear {
        let mut terms = BTreeMap::new();
        terms.insert(expr.clone(), 1);
        Linear { terms, constant: 0 }
    }

    fn as_const(&self) -> Option<i64> {
        self.terms.is_empty().then_some(self.constant)
    }

    fn plus(mut self, other: Linear) -> Option<Linear> {
        self.constant = self.constant.checked_add(other.constant)?;
        for (atom, coeff) in other.terms {
            let entry = self.terms.entry(atom).or_insert(0);
            *entry = entry.checked_add(coeff)?;
        }
        self.terms.retain(|_, c| *c != 0);
        Some(self)
    }

    fn scale(mut self, k: i64) -> Option<Linear> {
        self.constant = self.constant.checked_mul(k)?;
        for coeff in self.terms.values_mut() {
            *coeff = coeff.checked_mul(k)?;
        }
        self.terms.retain(|_, c| *c != 0);
        Some(self)
    }
}

// ── Display ─────────────────────────────────────────────────────────────────

const PREC_ADD: u8 = 1;
const PREC_MUL: u8 = 2;

/// Displays an expression with dimension references replaced by names.
pub struct Named<'a> {
    expr: &'a Expr,
    names: &'a [String],
}

impl Expr {
    /// Display `Dim(k)` as `names[k]` (falling back to `dk` when unnamed).
    pub fn named<'a>(&'a self, names: &'a [String]) -> Named<'a> {
        Named { expr: self, names }
    }

    fn fmt_prec(&self, f: &mut fmt::Formatter<'_>, parent: u8, names: &[String]) -> fmt::Result {
        match self {
            Expr::Const(v) => write!(f, "{}", v),
            Expr::Dim(d) => match names.get(*d as usize) {
                Some(name) => write!(f, "{}", name),
                None => write!(f, "d{}", d),
            },
            Expr::Binary(BinOp::Add, l, r) => {
                if parent > PREC_ADD {
                    write!(f, "(")?;
                }
                l.fmt_prec(f, PREC_ADD, names)?;
                match r.as_ref() {
                    Expr::Const(c) if *c < 0 => write!(f, " - {}", c.unsigned_abs())?,
                    Expr::Binary(BinOp::Mul, x, k) if k.as_const() == Some(-1) => {
                        write!(f, " - ")?;
                        x.fmt_prec(f, PREC_MUL, names)?;
                    }
                    _ => {
                        write!(f, " + ")?;
                        r.fmt_prec(f, PREC_MUL, names)?;
                    }
                }
                if parent > PREC_ADD {
                    write!(f, ")")?;
                }
                Ok(())
            }
            Expr::Binary(op, l, r) => {
                if parent > PREC_MUL {
                    write!(f, "(")?;
                }
                l.fmt_prec(f, PREC_MUL, names)?;
                let sym = match op {
                    BinOp::Mul => "*",
                    BinOp::Mod => "mod",
                    BinOp::FloorDiv => "floordiv",
                    BinOp::CeilDiv => "ceildiv",
                    BinOp::Add => unreachable!("handled above"),
                };
                write!(f, " {} ", sym)?;
                r.fmt_prec(f, PREC_MUL + 1, names)?;
                if parent > PREC_MUL {
                    write!(f, ")")?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_prec(f, 0, &[])
    }
}

impl fmt::Display for Named<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.expr.fmt_prec(f, 0, self.names)
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
