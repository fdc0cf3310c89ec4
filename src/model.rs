//! Backend-agnostic constraint model.
//!
//! The builder, assembler and objective composer only ever talk to [`Model`].
//! A [`crate::solver::SolverBackend`] turns it into whatever its solver speaks and
//! hands back an [`Assignment`], which can be checked against the model again.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(usize);

impl VarId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A 0/1 decision variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoolVar(VarId);

/// A bounded integer variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntVar(VarId);

impl From<BoolVar> for VarId {
    fn from(var: BoolVar) -> Self {
        var.0
    }
}

impl From<IntVar> for VarId {
    fn from(var: IntVar) -> Self {
        var.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    Bool,
    Int { min: i64, max: i64 },
}

impl Domain {
    fn contains(self, value: i64) -> bool {
        match self {
            Domain::Bool => value == 0 || value == 1,
            Domain::Int { min, max } => (min..=max).contains(&value),
        }
    }
}

/// `Σ coeff·var + constant` with integer coefficients.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinearExpr {
    terms: Vec<(i64, VarId)>,
    constant: i64,
}

impl LinearExpr {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unit-coefficient sum of the given variables.
    pub fn sum<V, I>(vars: I) -> Self
    where
        V: Into<VarId>,
        I: IntoIterator<Item = V>,
    {
        Self {
            terms: vars.into_iter().map(|v| (1, v.into())).collect(),
            constant: 0,
        }
    }

    pub fn with_term(mut self, coeff: i64, var: impl Into<VarId>) -> Self {
        self.terms.push((coeff, var.into()));
        self
    }

    pub fn terms(&self) -> &[(i64, VarId)] {
        &self.terms
    }

    pub fn constant(&self) -> i64 {
        self.constant
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn eval(&self, assignment: &Assignment) -> i64 {
        self.terms
            .iter()
            .map(|(coeff, var)| coeff * assignment.value(*var))
            .sum::<i64>()
            + self.constant
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Le,
    Eq,
    Ge,
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Comparison::Le => write!(f, "<="),
            Comparison::Eq => write!(f, "=="),
            Comparison::Ge => write!(f, ">="),
        }
    }
}

/// `expr cmp rhs`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinearConstraint {
    pub expr: LinearExpr,
    pub cmp: Comparison,
    pub rhs: i64,
}

impl LinearConstraint {
    pub fn holds(&self, assignment: &Assignment) -> bool {
        let lhs = self.expr.eval(assignment);
        match self.cmp {
            Comparison::Le => lhs <= self.rhs,
            Comparison::Eq => lhs == self.rhs,
            Comparison::Ge => lhs >= self.rhs,
        }
    }
}

/// `premise ⇒ (any_of[0] ∨ any_of[1] ∨ …)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Implication {
    pub premise: BoolVar,
    pub any_of: Vec<BoolVar>,
}

impl Implication {
    pub fn holds(&self, assignment: &Assignment) -> bool {
        !assignment.bool_value(self.premise)
            || self.any_of.iter().any(|v| assignment.bool_value(*v))
    }
}

/// The first constraint an assignment breaks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    Shape { expected: usize, actual: usize },
    Domain(VarId),
    Linear(usize),
    Implication(usize),
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::Shape { expected, actual } => {
                write!(f, "assignment has {actual} values, model has {expected} variables")
            }
            Violation::Domain(var) => write!(f, "variable {} is out of its domain", var.index()),
            Violation::Linear(i) => write!(f, "linear constraint #{i} is violated"),
            Violation::Implication(i) => write!(f, "implication #{i} is violated"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Model {
    domains: Vec<Domain>,
    linear: Vec<LinearConstraint>,
    implications: Vec<Implication>,
    objective: LinearExpr,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_bool(&mut self) -> BoolVar {
        self.domains.push(Domain::Bool);
        BoolVar(VarId(self.domains.len() - 1))
    }

    pub fn new_int(&mut self, min: i64, max: i64) -> IntVar {
        debug_assert!(min <= max);
        self.domains.push(Domain::Int { min, max });
        IntVar(VarId(self.domains.len() - 1))
    }

    pub fn add_linear(&mut self, expr: LinearExpr, cmp: Comparison, rhs: i64) {
        self.linear.push(LinearConstraint { expr, cmp, rhs });
    }

    pub fn add_le(&mut self, expr: LinearExpr, rhs: i64) {
        self.add_linear(expr, Comparison::Le, rhs);
    }

    pub fn add_eq(&mut self, expr: LinearExpr, rhs: i64) {
        self.add_linear(expr, Comparison::Eq, rhs);
    }

    pub fn add_ge(&mut self, expr: LinearExpr, rhs: i64) {
        self.add_linear(expr, Comparison::Ge, rhs);
    }

    pub fn add_implication(&mut self, premise: BoolVar, any_of: Vec<BoolVar>) {
        self.implications.push(Implication { premise, any_of });
    }

    /// Replaces any previous objective.
    pub fn minimize(&mut self, objective: LinearExpr) {
        self.objective = objective;
    }

    pub fn domains(&self) -> &[Domain] {
        &self.domains
    }

    pub fn linear_constraints(&self) -> &[LinearConstraint] {
        &self.linear
    }

    pub fn implications(&self) -> &[Implication] {
        &self.implications
    }

    pub fn objective(&self) -> &LinearExpr {
        &self.objective
    }

    pub fn num_variables(&self) -> usize {
        self.domains.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.linear.len() + self.implications.len()
    }

    /// Checks every domain, linear constraint and implication against `assignment`.
    pub fn check(&self, assignment: &Assignment) -> Result<(), Violation> {
        if assignment.values.len() != self.domains.len() {
            return Err(Violation::Shape {
                expected: self.domains.len(),
                actual: assignment.values.len(),
            });
        }
        for (i, domain) in self.domains.iter().enumerate() {
            if !domain.contains(assignment.values[i]) {
                return Err(Violation::Domain(VarId(i)));
            }
        }
        if let Some(i) = self.linear.iter().position(|c| !c.holds(assignment)) {
            return Err(Violation::Linear(i));
        }
        if let Some(i) = self.implications.iter().position(|c| !c.holds(assignment)) {
            return Err(Violation::Implication(i));
        }
        Ok(())
    }
}

/// Integral values for every variable of a model, indexed by [`VarId`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    values: Vec<i64>,
}

impl Assignment {
    pub fn new(values: Vec<i64>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[i64] {
        &self.values
    }

    pub fn value(&self, var: impl Into<VarId>) -> i64 {
        self.values[var.into().index()]
    }

    pub fn bool_value(&self, var: BoolVar) -> bool {
        self.value(var) == 1
    }

    pub fn int_value(&self, var: IntVar) -> i64 {
        self.value(var)
    }

    pub fn objective_value(&self, model: &Model) -> i64 {
        model.objective().eval(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_accepts_a_satisfying_assignment() {
        let mut model = Model::new();
        let a = model.new_bool();
        let b = model.new_bool();
        let n = model.new_int(0, 2);
        model.add_eq(LinearExpr::sum([a, b]).with_term(-1, n), 0);
        model.add_implication(a, vec![b]);
        model.minimize(LinearExpr::sum([n]));

        let assignment = Assignment::new(vec![1, 1, 2]);
        assert_eq!(model.check(&assignment), Ok(()));
        assert_eq!(assignment.objective_value(&model), 2);
        assert_eq!(model.num_variables(), 3);
        assert_eq!(model.num_constraints(), 2);
    }

    #[test]
    fn check_reports_the_broken_constraint() {
        let mut model = Model::new();
        let a = model.new_bool();
        let b = model.new_bool();
        model.add_le(LinearExpr::sum([a, b]), 1);
        model.add_implication(a, vec![b]);

        assert_eq!(
            model.check(&Assignment::new(vec![1, 1])),
            Err(Violation::Linear(0))
        );
        assert_eq!(
            model.check(&Assignment::new(vec![1, 0])),
            Err(Violation::Implication(0))
        );
        assert_eq!(model.check(&Assignment::new(vec![0, 0])), Ok(()));
    }

    #[test]
    fn check_rejects_out_of_domain_and_short_assignments() {
        let mut model = Model::new();
        let a = model.new_bool();
        let _n = model.new_int(0, 3);

        assert_eq!(
            model.check(&Assignment::new(vec![2, 0])),
            Err(Violation::Domain(VarId::from(a)))
        );
        assert_eq!(
            model.check(&Assignment::new(vec![0])),
            Err(Violation::Shape {
                expected: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn empty_implication_forbids_its_premise() {
        let mut model = Model::new();
        let a = model.new_bool();
        model.add_implication(a, Vec::new());
        assert!(model.check(&Assignment::new(vec![1])).is_err());
        assert!(model.check(&Assignment::new(vec![0])).is_ok());
    }
}
