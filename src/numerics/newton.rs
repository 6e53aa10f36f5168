use std::time::{Duration, Instant};

use nalgebra::DVector;

use crate::error::PdeError;
use crate::numerics::engine::PdeSystem;
use crate::numerics::Norm;
use crate::physics::AssemblyProvider;

/// Stopping criteria of the nonlinear iteration.
#[derive(Clone, Debug)]
pub struct NewtonParams {
    pub max_iterations: usize,
    /// Converged when `residual / initial_residual` drops below this.
    pub relative_tol: f64,
    /// Converged when the max-norm residual drops below this.
    pub max_residual_tol: f64,
    /// Optional wall-clock budget, checked between iterations.
    pub wall_clock_budget: Option<Duration>,
}

impl Default for NewtonParams {
    fn default() -> Self {
        Self {
            max_iterations: 15,
            relative_tol: 1e-8,
            max_residual_tol: 1e-10,
            wall_clock_budget: None,
        }
    }
}

/// Terminal and non-terminal states of the iteration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NewtonState {
    Iterating,
    Converged,
    MaxIterationsReached,
    Diverging,
    TimedOut,
}

/// One entry of the residual history.
#[derive(Clone, Copy, Debug)]
pub struct ResidualSample {
    pub iteration: usize,
    pub l2: f64,
    pub max: f64,
}

/// Bookkeeping for the Newton iteration: residual measurements, iteration
/// count and the convergence verdict.
pub struct NewtonStatus {
    params: NewtonParams,
    pub iteration: usize,
    pub initial_residual: f64,
    pub residual: f64,
    pub max_residual: f64,
    pub relative_residual: f64,
    state: NewtonState,
    increase_streak: usize,
}

impl NewtonStatus {
    pub fn new(params: NewtonParams, initial_residual: f64) -> Self {
        let relative_residual = if initial_residual > 0.0 { 1.0 } else { 0.0 };
        let mut status = Self {
            params,
            iteration: 0,
            initial_residual,
            residual: initial_residual,
            max_residual: f64::INFINITY,
            relative_residual,
            state: NewtonState::Iterating,
            increase_streak: 0,
        };
        status.refresh_state();
        status
    }

    fn refresh_state(&mut self) {
        if self.state != NewtonState::Iterating {
            return;
        }
        if self.relative_residual < self.params.relative_tol
            || self.max_residual < self.params.max_residual_tol
        {
            self.state = NewtonState::Converged;
        } else if self.increase_streak >= 2 {
            self.state = NewtonState::Diverging;
        } else if self.iteration >= self.params.max_iterations {
            self.state = NewtonState::MaxIterationsReached;
        }
    }

    /// Record the max-norm residual of the initial iterate.
    pub fn update_max_residual(&mut self, max: f64) {
        self.max_residual = max;
        self.refresh_state();
    }

    /// Record the residuals measured after a Newton step.
    pub fn update_residuals(&mut self, l2: f64, max: f64) {
        if l2 > self.residual {
            self.increase_streak += 1;
        } else {
            self.increase_streak = 0;
        }
        self.residual = l2;
        self.max_residual = max;
        self.relative_residual = if self.initial_residual > 0.0 {
            l2 / self.initial_residual
        } else {
            0.0
        };
        self.refresh_state();
    }

    pub fn update_iteration(&mut self) {
        self.iteration += 1;
        self.refresh_state();
    }

    /// Loop guard: true while no terminal state has been reached.
    pub fn needs_to_iterate(&self) -> bool {
        self.state == NewtonState::Iterating
    }

    pub fn converged(&self) -> bool {
        self.state == NewtonState::Converged
    }

    pub fn state(&self) -> NewtonState {
        self.state
    }

    pub fn mark_timed_out(&mut self) {
        if self.state == NewtonState::Iterating {
            self.state = NewtonState::TimedOut;
        }
    }

    pub fn mark_diverging(&mut self) {
        if self.state == NewtonState::Iterating {
            self.state = NewtonState::Diverging;
        }
    }

    pub fn print_status(&self) {
        println!("Newton iteration stopped: {:?}", self.state);
        println!("\titerations:        {}", self.iteration);
        println!("\tinitial residual:  {:10.5e}", self.initial_residual);
        println!("\tcurrent residual:  {:10.5e}", self.residual);
        println!("\trelative residual: {:10.5e}", self.relative_residual);
        println!("\tmaximum residual:  {:10.5e}", self.max_residual);
    }
}

/// Step-acceptance strategy for the Newton update.
///
/// `Full` is the plain additive update. It carries the classical risk of
/// divergence for stiff reaction/diffusion ratios; `Backtracking` halves the
/// step until the residual satisfies an Armijo-style decrease.
#[derive(Clone, Copy, Debug)]
pub enum StepStrategy {
    Full,
    Backtracking { armijo: f64, min_step: f64 },
}

impl Default for StepStrategy {
    fn default() -> Self {
        StepStrategy::Full
    }
}

impl StepStrategy {
    pub fn backtracking() -> Self {
        StepStrategy::Backtracking {
            armijo: 1e-4,
            min_step: 1e-3,
        }
    }
}

/// Outcome of a nonlinear solve.
pub struct NewtonReport {
    pub state: NewtonState,
    pub iterations: usize,
    pub residual: f64,
    pub max_residual: f64,
    pub relative_residual: f64,
    pub history: Vec<ResidualSample>,
}

impl NewtonReport {
    pub fn converged(&self) -> bool {
        self.state == NewtonState::Converged
    }
}

/// Drives the engine through repeated assemble → constrain → solve cycles
/// until the status reaches a terminal state.
///
/// Assembly and linear-solve failures abort the run and propagate; there is
/// no retry with relaxed tolerances at this layer.
pub struct NewtonDriver {
    pub params: NewtonParams,
    pub strategy: StepStrategy,
    pub logging: bool,
}

impl Default for NewtonDriver {
    fn default() -> Self {
        Self {
            params: NewtonParams::default(),
            strategy: StepStrategy::default(),
            logging: false,
        }
    }
}

impl NewtonDriver {
    pub fn new(params: NewtonParams) -> Self {
        Self {
            params,
            strategy: StepStrategy::default(),
            logging: false,
        }
    }

    pub fn with_strategy(mut self, strategy: StepStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_logging(mut self, logging: bool) -> Self {
        self.logging = logging;
        self
    }

    pub fn solve<A: AssemblyProvider>(
        &self,
        system: &mut PdeSystem<A>,
    ) -> Result<NewtonReport, PdeError> {
        let start = Instant::now();

        let initial = system.compute_residual(Norm::L2)?;
        let initial_max = system.compute_residual(Norm::Max)?;
        let mut status = NewtonStatus::new(self.params.clone(), initial);
        status.update_max_residual(initial_max);

        let mut history = vec![ResidualSample {
            iteration: 0,
            l2: initial,
            max: initial_max,
        }];

        if self.logging {
            println!("{} unknowns\n", system.solution_dimension());
            println!("    Iter | Residual  | Relative  | Max");
            println!(
                "{:>8} | {:>9.3e} | {:>9.3e} | {:>9.3e}",
                0, initial, status.relative_residual, initial_max
            );
        }

        while status.needs_to_iterate() {
            if let Some(budget) = self.params.wall_clock_budget {
                if start.elapsed() > budget {
                    status.mark_timed_out();
                    break;
                }
            }

            system.assemble()?;
            system.apply_constraints()?;
            let delta = system.compute_newton_correction()?;

            match self.strategy {
                StepStrategy::Full => system.add_to_solution(&delta, 1.0),
                StepStrategy::Backtracking { armijo, min_step } => {
                    if !backtrack(system, &delta, status.residual, armijo, min_step)? {
                        status.mark_diverging();
                        break;
                    }
                }
            }

            let l2 = system.compute_residual(Norm::L2)?;
            let max = system.compute_residual(Norm::Max)?;
            status.update_residuals(l2, max);
            status.update_iteration();
            history.push(ResidualSample {
                iteration: status.iteration,
                l2,
                max,
            });

            if self.logging {
                println!(
                    "{:>8} | {:>9.3e} | {:>9.3e} | {:>9.3e}",
                    status.iteration, l2, status.relative_residual, max
                );
            }
        }

        if self.logging && !status.converged() {
            status.print_status();
        }

        Ok(NewtonReport {
            state: status.state(),
            iterations: status.iteration,
            residual: status.residual,
            max_residual: status.max_residual,
            relative_residual: status.relative_residual,
            history,
        })
    }
}

/// Halve the step until the candidate residual satisfies
/// `‖F(u + αδ)‖ < (1 − α·armijo)·‖F(u)‖`. Restores the iterate and reports
/// failure when the step shrinks below `min_step`.
fn backtrack<A: AssemblyProvider>(
    system: &mut PdeSystem<A>,
    delta: &DVector<f64>,
    current_l2: f64,
    armijo: f64,
    min_step: f64,
) -> Result<bool, PdeError> {
    let saved = system.solution().values().clone();
    let mut alpha = 1.0;

    while alpha > min_step {
        system.set_solution_vector(&saved);
        system.add_to_solution(delta, alpha);
        let candidate = system.compute_residual(Norm::L2)?;
        if candidate < (1.0 - alpha * armijo) * current_l2 {
            return Ok(true);
        }
        alpha *= 0.5;
    }

    system.set_solution_vector(&saved);
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(max_iterations: usize) -> NewtonParams {
        NewtonParams {
            max_iterations,
            relative_tol: 1e-8,
            max_residual_tol: 1e-10,
            wall_clock_budget: None,
        }
    }

    #[test]
    fn zero_initial_residual_is_already_converged() {
        let status = NewtonStatus::new(params(10), 0.0);
        assert!(status.converged());
        assert!(!status.needs_to_iterate());
        assert_eq!(status.iteration, 0);
    }

    #[test]
    fn converges_by_relative_tolerance() {
        let mut status = NewtonStatus::new(params(10), 1.0);
        status.update_max_residual(1.0);
        assert!(status.needs_to_iterate());

        status.update_residuals(1e-9, 1e-3);
        status.update_iteration();
        assert_eq!(status.state(), NewtonState::Converged);
    }

    #[test]
    fn converges_by_absolute_max_tolerance() {
        let mut status = NewtonStatus::new(params(10), 1.0);
        status.update_max_residual(1.0);

        status.update_residuals(0.5, 1e-11);
        assert_eq!(status.state(), NewtonState::Converged);
    }

    #[test]
    fn iteration_cap_is_terminal() {
        let mut status = NewtonStatus::new(params(2), 1.0);
        status.update_max_residual(1.0);

        status.update_residuals(0.9, 0.9);
        status.update_iteration();
        assert!(status.needs_to_iterate());

        status.update_residuals(0.8, 0.8);
        status.update_iteration();
        assert_eq!(status.state(), NewtonState::MaxIterationsReached);
    }

    #[test]
    fn two_consecutive_increases_flag_divergence() {
        let mut status = NewtonStatus::new(params(10), 1.0);
        status.update_max_residual(1.0);

        status.update_residuals(2.0, 2.0);
        status.update_iteration();
        assert!(status.needs_to_iterate());

        status.update_residuals(3.0, 3.0);
        status.update_iteration();
        assert_eq!(status.state(), NewtonState::Diverging);
    }

    #[test]
    fn a_decrease_resets_the_divergence_streak() {
        let mut status = NewtonStatus::new(params(10), 1.0);
        status.update_max_residual(1.0);

        status.update_residuals(2.0, 2.0);
        status.update_iteration();
        status.update_residuals(1.5, 1.5);
        status.update_iteration();
        status.update_residuals(1.6, 1.6);
        status.update_iteration();
        assert!(status.needs_to_iterate());
    }
}
