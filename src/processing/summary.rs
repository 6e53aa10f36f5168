use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::discretization::mesh::Mesh;
use crate::numerics::newton::{NewtonReport, NewtonState};

/// Collected facts about one nonlinear solve, written out as a text report.
pub struct RunSummary {
    pub num_cells: usize,
    pub num_nodes: usize,
    pub components: usize,
    pub dofs: usize,
    pub domain_extent: (f64, f64),
    pub min_edge: f64,
    pub max_edge: f64,
    pub bc_tolerance: f64,

    pub newton_state: Option<NewtonState>,
    pub iterations: Option<usize>,
    pub initial_residual: Option<f64>,
    pub final_residual: Option<f64>,
    pub final_max_residual: Option<f64>,
    pub total_charge: Option<f64>,
}

impl RunSummary {
    pub fn from_problem(mesh: &Mesh, components: usize) -> Self {
        let (min_edge, max_edge) = mesh.cells.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY),
            |(lo, hi), cell| (lo.min(cell.length), hi.max(cell.length)),
        );

        Self {
            num_cells: mesh.cells.len(),
            num_nodes: mesh.nodes.len(),
            components,
            dofs: mesh.nodes.len() * components,
            domain_extent: mesh.extent(0),
            min_edge,
            max_edge,
            bc_tolerance: min_edge / 2.0,
            newton_state: None,
            iterations: None,
            initial_residual: None,
            final_residual: None,
            final_max_residual: None,
            total_charge: None,
        }
    }

    pub fn add_newton_report(&mut self, report: &NewtonReport) {
        self.newton_state = Some(report.state);
        self.iterations = Some(report.iterations);
        self.initial_residual = report.history.first().map(|s| s.l2);
        self.final_residual = Some(report.residual);
        self.final_max_residual = Some(report.max_residual);
    }

    pub fn add_total_charge(&mut self, charge: f64) {
        self.total_charge = Some(charge);
    }

    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut file = File::create(path)?;

        writeln!(file, "{}", "=".repeat(60))?;
        writeln!(file, "ELECTRODIFFUSION SOLVE SUMMARY")?;
        writeln!(file, "{}", "=".repeat(60))?;
        writeln!(file)?;

        writeln!(file, "MESH STATISTICS")?;
        writeln!(file, "{}", "-".repeat(60))?;
        writeln!(file, "Number of cells:     {}", self.num_cells)?;
        writeln!(file, "Number of nodes:     {}", self.num_nodes)?;
        writeln!(file, "Solution components: {}", self.components)?;
        writeln!(file, "Degrees of freedom:  {}", self.dofs)?;
        writeln!(
            file,
            "Domain extent:       {:.6e} to {:.6e}",
            self.domain_extent.0, self.domain_extent.1
        )?;
        writeln!(file, "Min cell length:     {:.6e}", self.min_edge)?;
        writeln!(file, "Max cell length:     {:.6e}", self.max_edge)?;
        writeln!(file, "Facet tolerance:     {:.6e}", self.bc_tolerance)?;
        writeln!(file)?;

        if let Some(state) = self.newton_state {
            writeln!(file, "NONLINEAR SOLVE")?;
            writeln!(file, "{}", "-".repeat(60))?;
            writeln!(file, "Outcome:             {:?}", state)?;
            if let Some(iter) = self.iterations {
                writeln!(file, "Iterations:          {}", iter)?;
            }
            if let Some(r0) = self.initial_residual {
                writeln!(file, "Initial residual:    {:.6e}", r0)?;
            }
            if let Some(r) = self.final_residual {
                writeln!(file, "Final residual:      {:.6e}", r)?;
            }
            if let Some(m) = self.final_max_residual {
                writeln!(file, "Final max residual:  {:.6e}", m)?;
            }
            writeln!(file)?;
        }

        if let Some(q) = self.total_charge {
            writeln!(file, "DIAGNOSTICS")?;
            writeln!(file, "{}", "-".repeat(60))?;
            writeln!(file, "Total charge:        {:.6e}", q)?;
            writeln!(file)?;
        }

        writeln!(file, "{}", "=".repeat(60))?;
        Ok(())
    }

    pub fn print_to_console(&self) {
        println!("\n{}", "=".repeat(60));
        println!("SOLVE SUMMARY");
        println!("{}", "=".repeat(60));
        println!(
            "Mesh:          {} cells, {} nodes, {} dofs",
            self.num_cells, self.num_nodes, self.dofs
        );
        if let (Some(state), Some(iter)) = (self.newton_state, self.iterations) {
            println!("Newton:        {:?} after {} iterations", state, iter);
        }
        if let Some(r) = self.final_residual {
            println!("Residual:      {:.3e}", r);
        }
        if let Some(q) = self.total_charge {
            println!("Total charge:  {:.3e}", q);
        }
        println!("{}\n", "=".repeat(60));
    }
}
