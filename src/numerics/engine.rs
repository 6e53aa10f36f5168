use std::sync::Arc;

use kryst::parallel::{NoComm, UniverseComm};
use kryst::preconditioner::PcSide;
use kryst::solver::LinearSolver;
use nalgebra::DVector;

use crate::discretization::mesh::Mesh;
use crate::discretization::space::{Function, FunctionSpace};
use crate::error::PdeError;
use crate::numerics::bridge::{IndexBase, SparseBridge};
use crate::numerics::matrix::AssembledSystem;
use crate::numerics::timing::{record_assembly, record_linear_solve};
use crate::numerics::{Norm, Preconditioner, SolverParams};
use crate::physics::AssemblyProvider;
use crate::physics::bc::{AxisFace, DirichletManager, Precedence};
use crate::physics::coefficients::{CoefficientRegistry, SpatialField};

/// Assembly-and-solve engine.
///
/// Owns the current iterate and runs one Newton cycle at a time:
/// assemble the linearized system, eliminate constrained dofs, convert to
/// the solver's compressed-row format, solve, and add the correction to the
/// solution. The assembled system is transient; it is rebuilt every cycle
/// and consumed by the solve.
pub struct PdeSystem<A: AssemblyProvider> {
    space: FunctionSpace,
    provider: A,
    coefficients: CoefficientRegistry,
    dirichlet: DirichletManager,
    solution: Function,
    params: SolverParams,
    bridge: SparseBridge,
    assembled: Option<AssembledSystem>,
}

impl<A: AssemblyProvider> PdeSystem<A> {
    pub fn new(mesh: Arc<Mesh>, provider: A, params: SolverParams) -> Self {
        let space = FunctionSpace::new(mesh, provider.components());
        let solution = Function::zeros(&space);
        let dirichlet = DirichletManager::new(provider.components());
        Self {
            space,
            provider,
            coefficients: CoefficientRegistry::new(),
            dirichlet,
            solution,
            params,
            bridge: SparseBridge::new(),
            assembled: None,
        }
    }

    pub fn space(&self) -> &FunctionSpace {
        &self.space
    }

    pub fn mesh(&self) -> &Mesh {
        self.space.mesh()
    }

    pub fn solution(&self) -> &Function {
        &self.solution
    }

    pub fn solution_dimension(&self) -> usize {
        self.space.dof_count()
    }

    pub fn assembled(&self) -> Option<&AssembledSystem> {
        self.assembled.as_ref()
    }

    /// Swap in a new discretization. The solution resets to zero, boundary
    /// predicates are re-derived from the new geometry, and the cached
    /// sparsity scratch is dropped.
    pub fn update_mesh(&mut self, mesh: Arc<Mesh>) {
        self.space = FunctionSpace::new(mesh, self.provider.components());
        self.solution = Function::zeros(&self.space);
        self.dirichlet.rebuild(self.space.mesh());
        self.bridge.reset();
        self.assembled = None;
    }

    // ------------------------------------------------------------------
    // Coefficients
    // ------------------------------------------------------------------

    pub fn set_coefficient(&mut self, name: impl Into<String>, field: SpatialField) {
        self.coefficients.set_coefficient(name, field);
    }

    pub fn set_coefficient_values(&mut self, name: impl Into<String>, values: &[f64]) {
        self.coefficients.set_coefficient_values(name, values);
    }

    pub fn set_source(&mut self, name: impl Into<String>, field: SpatialField) {
        self.coefficients.set_source(name, field);
    }

    pub fn set_source_values(&mut self, name: impl Into<String>, values: &[f64]) {
        self.coefficients.set_source_values(name, values);
    }

    pub fn coefficient_names(&self) -> Vec<&str> {
        self.coefficients.names()
    }

    /// Diagnostic listing of the registered coefficient names.
    pub fn print_coefficients(&self) {
        println!("coefficients:");
        for name in self.coefficient_names() {
            println!("\t{name}");
        }
    }

    // ------------------------------------------------------------------
    // Boundary conditions
    // ------------------------------------------------------------------

    /// Prescribe `[low, high]` face values for the listed solution
    /// components. Replaces any previously active constraint set.
    pub fn set_dirichlet_bc(
        &mut self,
        components: &[usize],
        pairs: &[[f64; 2]],
    ) -> Result<(), PdeError> {
        self.dirichlet
            .set_boundary_conditions(self.space.mesh(), components, pairs)
    }

    pub fn set_dirichlet_precedence(&mut self, precedence: Precedence) {
        self.dirichlet.set_precedence(precedence);
    }

    pub fn dirichlet_subdomains(&self) -> Vec<&AxisFace> {
        self.dirichlet.subdomains()
    }

    // ------------------------------------------------------------------
    // Solution
    // ------------------------------------------------------------------

    /// Set every dof of the iterate to one value.
    pub fn set_solution_constant(&mut self, value: f64) {
        self.solution.fill(value);
        self.assembled = None;
    }

    /// Set each component of the iterate to its own constant.
    pub fn set_solution_components(&mut self, values: &[f64]) {
        self.solution.fill_components(values);
        self.assembled = None;
    }

    /// Interpolate a spatial expression into the iterate.
    pub fn set_solution_profile(&mut self, profile: &SpatialField) {
        self.solution.interpolate_with(|p| profile.evaluate(p));
        self.assembled = None;
    }

    /// Copy an existing field into the iterate.
    pub fn set_solution_function(&mut self, other: &Function) {
        self.solution.assign(other);
        self.assembled = None;
    }

    /// Overwrite the raw dof vector of the iterate.
    pub fn set_solution_vector(&mut self, values: &DVector<f64>) {
        assert_eq!(values.len(), self.space.dof_count());
        self.solution.values_mut().copy_from(values);
        self.assembled = None;
    }

    // ------------------------------------------------------------------
    // Newton cycle
    // ------------------------------------------------------------------

    /// Evaluate the Jacobian and Newton right-hand side at the current
    /// iterate. Fails if a required coefficient has not been registered or
    /// if the provider produces a system of the wrong dimension.
    pub fn assemble(&mut self) -> Result<(), PdeError> {
        for name in self.provider.required_coefficients() {
            if !self.coefficients.contains(name) {
                return Err(PdeError::Assembly(format!("missing coefficient `{name}`")));
            }
        }
        for name in self.provider.required_sources() {
            if !self.coefficients.contains(name) {
                return Err(PdeError::Assembly(format!("missing source `{name}`")));
            }
        }

        let system = record_assembly(|| {
            self.provider
                .assemble_system(&self.space, &self.coefficients, &self.solution)
        })?;

        let n = self.space.dof_count();
        if system.matrix.dim() != n || system.rhs.len() != n {
            return Err(PdeError::MatrixConversion {
                expected: n,
                found: system.matrix.dim().min(system.rhs.len()),
            });
        }

        self.assembled = Some(system);
        Ok(())
    }

    /// Eliminate every active Dirichlet constraint from the assembled
    /// system by row replacement.
    pub fn apply_constraints(&mut self) -> Result<(), PdeError> {
        let system = self
            .assembled
            .as_mut()
            .ok_or_else(|| PdeError::Assembly("apply_constraints called before assemble".into()))?;
        self.dirichlet.apply(
            &self.space,
            &mut system.matrix,
            &mut system.rhs,
            self.solution.values(),
        );
        Ok(())
    }

    /// Convert the assembled system, run the external solver and return the
    /// Newton correction. Consumes the assembled system.
    pub fn compute_newton_correction(&mut self) -> Result<DVector<f64>, PdeError> {
        let system = self
            .assembled
            .take()
            .ok_or_else(|| PdeError::Assembly("linear_solve called before assemble".into()))?;

        let n = self.space.dof_count();
        let rows = self
            .bridge
            .to_sparse_rows(&system.matrix, n, IndexBase::Zero)?;
        let mut csr =
            kryst::matrix::sparse::CsrMatrix::from_csr(n, n, rows.row_ptr, rows.col_idx, rows.values);
        let mut b = system.rhs;

        if self.params.preconditioner == Preconditioner::Jacobi {
            let d_inv: Vec<f64> = (0..n)
                .map(|row_idx| {
                    let row_start = csr.row_ptr()[row_idx];
                    let row_end = csr.row_ptr()[row_idx + 1];
                    let diag = (row_start..row_end)
                        .find(|&idx| csr.col_idx()[idx] == row_idx)
                        .map(|idx| csr.values()[idx])
                        .unwrap_or(1.0);
                    if diag.abs() < 1e-12 { 1.0 } else { 1.0 / diag }
                })
                .collect();

            for row_idx in 0..n {
                let scale = d_inv[row_idx];
                for val in csr.row_values_mut(row_idx) {
                    *val *= scale;
                }
                b[row_idx] *= scale;
            }
        }

        if !b.iter().all(|x| x.is_finite()) {
            return Err(PdeError::LinearSolve(
                "right-hand side contains NaN or Inf".into(),
            ));
        }

        let op = kryst::matrix::op::CsrOp::new(Arc::new(csr));
        // inexact-Newton forcing: solve the inner system no tighter than the
        // outer residual warrants, with `params.tolerance` as the floor
        let linear_tol = (b.norm() * 0.1).max(self.params.tolerance).min(1e-2);
        let mut solver =
            kryst::solver::bicgstab::BiCgStabSolver::new(linear_tol, self.params.max_iterations);
        let mut workspace = kryst::context::ksp_context::Workspace::new(n);
        solver.setup_workspace(&mut workspace);

        let mut x = DVector::from_element(n, 0.0);
        let result = record_linear_solve(|| {
            solver.solve(
                &op,
                None,
                b.as_slice(),
                x.as_mut_slice(),
                PcSide::Left,
                &UniverseComm::NoComm(NoComm {}),
                None,
                Some(&mut workspace),
            )
        });

        match result {
            Ok(_stats) => {
                if !x.iter().all(|v| v.is_finite()) {
                    return Err(PdeError::LinearSolve("solver produced NaN or Inf".into()));
                }
            }
            Err(e) => return Err(PdeError::LinearSolve(format!("{e:?}"))),
        }

        self.bridge.from_dense(x.as_slice(), n)
    }

    /// Additive Newton update. Constrained dofs are excluded from the
    /// correction and pinned to their prescribed values, so the boundary
    /// holds exactly whatever step length is taken.
    pub fn add_to_solution(&mut self, delta: &DVector<f64>, alpha: f64) {
        self.solution.values_mut().axpy(alpha, delta, 1.0);
        for (dof, value) in self.dirichlet.constrained_dofs(&self.space) {
            self.solution.values_mut()[dof] = value;
        }
    }

    /// One assemble-free solve step: convert, solve, add the full
    /// correction. The assembled system must be in place.
    pub fn linear_solve(&mut self) -> Result<DVector<f64>, PdeError> {
        let delta = self.compute_newton_correction()?;
        self.add_to_solution(&delta, 1.0);
        Ok(delta)
    }

    /// Reassemble the linear form at the current iterate and return its norm.
    /// Constrained rows measure the distance to their prescribed values.
    /// Has no side effects; two calls in a row give identical results.
    pub fn compute_residual(&self, norm: Norm) -> Result<f64, PdeError> {
        let mut rhs = self
            .provider
            .assemble_residual(&self.space, &self.coefficients, &self.solution)?;
        let n = self.space.dof_count();
        if rhs.len() != n {
            return Err(PdeError::MatrixConversion {
                expected: n,
                found: rhs.len(),
            });
        }
        for (dof, value) in self.dirichlet.constrained_dofs(&self.space) {
            rhs[dof] = value - self.solution.values()[dof];
        }
        Ok(match norm {
            Norm::L2 => rhs.norm(),
            Norm::Max => rhs.amax(),
        })
    }

    /// Net charge over the domain at the current iterate:
    /// `∫ (fixed_charge + Σ zᵢ cᵢ) dx` by element-midpoint quadrature.
    pub fn total_charge(&self) -> Result<f64, PdeError> {
        let fixed = self.coefficients.get("fixed_charge")?;
        let valency = self.coefficients.get("valency")?;
        let c = self.space.components();

        let mut total = 0.0;
        for cell in &self.space.mesh().cells {
            let [left, right] = cell.node_ids;
            let pa = self.space.mesh().nodes[left].position;
            let pb = self.space.mesh().nodes[right].position;
            let mid = [
                0.5 * (pa[0] + pb[0]),
                0.5 * (pa[1] + pb[1]),
                0.5 * (pa[2] + pb[2]),
            ];

            let z = valency.evaluate(mid);
            let mut rho = fixed.evaluate(mid)[0];
            for i in 1..c {
                let ca = self.solution.values()[self.space.dof(left, i)];
                let cb = self.solution.values()[self.space.dof(right, i)];
                rho += z[i] * 0.5 * (ca + cb);
            }
            total += rho * cell.length;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discretization::generator::create_interval_mesh;
    use crate::physics::galerkin::PnpGalerkin;

    fn system() -> PdeSystem<PnpGalerkin> {
        let mesh = Arc::new(create_interval_mesh(-1.0, 1.0, 8));
        let mut sys = PdeSystem::new(mesh, PnpGalerkin::new(2), SolverParams::default());
        sys.set_coefficient_values("permittivity", &[1.0]);
        sys.set_coefficient_values("diffusivity", &[0.0, 2.0]);
        sys.set_coefficient_values("valency", &[0.0, 1.0]);
        sys.set_source_values("fixed_charge", &[0.0]);
        sys.set_source_values("reaction", &[0.0, 0.0]);
        sys
    }

    #[test]
    fn assemble_requires_complete_coefficients() {
        let mesh = Arc::new(create_interval_mesh(-1.0, 1.0, 4));
        let mut sys = PdeSystem::new(mesh, PnpGalerkin::new(2), SolverParams::default());
        sys.set_coefficient_values("permittivity", &[1.0]);
        match sys.assemble() {
            Err(PdeError::Assembly(msg)) => assert!(msg.contains("diffusivity")),
            Err(other) => panic!("expected Assembly error, got {other}"),
            Ok(()) => panic!("assemble succeeded with a missing coefficient"),
        }
    }

    #[test]
    fn constraints_require_an_assembled_system() {
        let mut sys = system();
        assert!(sys.apply_constraints().is_err());
        assert!(sys.compute_newton_correction().is_err());
    }

    #[test]
    fn constrained_rows_become_identity_with_prescribed_rhs() {
        let mut sys = system();
        sys.set_dirichlet_bc(&[0, 1], &[[0.5, -1.5], [2.0, 3.0]]).unwrap();
        sys.assemble().unwrap();
        sys.apply_constraints().unwrap();

        let system = sys.assembled().unwrap();
        for (dof, value) in [(0, 0.5), (1, 2.0), (16, -1.5), (17, 3.0)] {
            let row: Vec<_> = system.matrix.row(dof).collect();
            assert_eq!(row, vec![(dof, 1.0)]);
            assert_eq!(system.rhs[dof], value);
        }
    }

    #[test]
    fn residual_evaluation_is_idempotent() {
        let mut sys = system();
        sys.set_dirichlet_bc(&[0], &[[0.0, 1.0]]).unwrap();
        sys.set_solution_components(&[0.2, 1.0]);
        let first = sys.compute_residual(Norm::L2).unwrap();
        let second = sys.compute_residual(Norm::L2).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn total_charge_of_uniform_ion_density() {
        let mut sys = system();
        sys.set_solution_components(&[0.0, 3.0]);
        // one species with valency 1 and density 3 over a domain of length 2
        let q = sys.total_charge().unwrap();
        assert!((q - 6.0).abs() < 1e-12);
    }

    #[test]
    fn update_mesh_resets_solution_and_keeps_bcs() {
        let mut sys = system();
        sys.set_dirichlet_bc(&[0], &[[1.0, 2.0]]).unwrap();
        sys.set_solution_constant(5.0);

        sys.update_mesh(Arc::new(create_interval_mesh(-1.0, 1.0, 16)));
        assert_eq!(sys.solution_dimension(), 34);
        assert!(sys.solution().values().iter().all(|&v| v == 0.0));

        // constraints survive against the new mesh
        let dofs = sys.dirichlet.constrained_dofs(sys.space());
        assert_eq!(dofs, vec![(0, 1.0), (32, 2.0)]);
    }
}
