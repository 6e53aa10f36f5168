use std::fs;
use std::sync::Arc;

use pnp_rs::discretization::generator::create_interval_mesh;
use pnp_rs::models::pnp::fields::{self, linear_profile};
use pnp_rs::models::pnp::pnp::linear_pnp_params;
use pnp_rs::numerics::SolverParams;
use pnp_rs::numerics::engine::PdeSystem;
use pnp_rs::numerics::newton::{NewtonDriver, NewtonParams, NewtonReport};
use pnp_rs::physics::galerkin::PnpGalerkin;
use pnp_rs::processing::csv_writer;
use pnp_rs::processing::summary::RunSummary;

fn main() {
    fs::create_dir_all("output/main").expect("Failed to create output directory");

    println!("Setting up the linearized PNP problem\n");

    let params = linear_pnp_params();
    let mesh = Arc::new(create_interval_mesh(-1.0, 1.0, 200));
    let extent = mesh.extent(0);

    let mut system = PdeSystem::new(
        Arc::clone(&mesh),
        PnpGalerkin::new(params.components()),
        SolverParams::default(),
    );
    fields::register(&mut system, &params).expect("coefficient registration failed");
    system.print_coefficients();
    println!();

    let components: Vec<usize> = (0..params.components()).collect();
    system
        .set_dirichlet_bc(&components, &params.contact_values)
        .expect("boundary conditions rejected");

    // seed the iteration with the boundary-condition interpolant
    system.set_solution_profile(&linear_profile(&params.contact_values, extent));

    let mut summary = RunSummary::from_problem(system.mesh(), params.components());

    let driver = NewtonDriver::new(NewtonParams::default()).with_logging(true);
    match driver.solve(&mut system) {
        Ok(report) => {
            if report.converged() {
                println!("\nSolver succeeded!");
            }
            summary.add_newton_report(&report);
            if let Ok(q) = system.total_charge() {
                summary.add_total_charge(q);
            }
            save_solution(&system, params.components());
            save_history(&report);
        }
        Err(e) => {
            eprintln!("Solver failed: {e}");
        }
    }

    summary
        .write_to_file("output/main/run_summary.txt")
        .expect("Failed to write summary");
    summary.print_to_console();

    println!("Summary saved to output/main/run_summary.txt");
}

fn save_solution(system: &PdeSystem<PnpGalerkin>, components: usize) {
    let x_positions: Vec<f64> = system
        .mesh()
        .nodes
        .iter()
        .map(|n| n.position[0])
        .collect();

    let mut headers = vec!["x".to_string(), "phi".to_string()];
    for i in 1..components {
        headers.push(format!("c{i}"));
    }
    let header_refs: Vec<&str> = headers.iter().map(String::as_str).collect();

    let mut columns = vec![x_positions];
    for comp in 0..components {
        columns.push(system.solution().component(comp));
    }

    csv_writer::write_csv("output/main/solution.csv", &header_refs, &columns)
        .expect("Failed to write solution");
    println!("Solution saved to output/main/solution.csv");
}

fn save_history(report: &NewtonReport) {
    let iters: Vec<f64> = report.history.iter().map(|s| s.iteration as f64).collect();
    let l2: Vec<f64> = report.history.iter().map(|s| s.l2).collect();
    let max: Vec<f64> = report.history.iter().map(|s| s.max).collect();

    csv_writer::write_csv(
        "output/main/solver_history.csv",
        &["iter", "residual", "max_residual"],
        &[iters, l2, max],
    )
    .expect("Failed to write solver history");
    println!("Residual history saved to output/main/solver_history.csv");
}
