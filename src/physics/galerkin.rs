use nalgebra::{DVector, Dyn, U1};
use num_dual::{Derivative, DualDVec64, DualNum};

use crate::discretization::space::{Function, FunctionSpace};
use crate::error::PdeError;
use crate::numerics::matrix::{AssembledMatrix, AssembledSystem};
use crate::physics::coefficients::{CoefficientRegistry, SpatialField};
use crate::physics::AssemblyProvider;

const COEFFICIENT_NAMES: [&str; 3] = ["permittivity", "diffusivity", "valency"];
const SOURCE_NAMES: [&str; 2] = ["fixed_charge", "reaction"];

/// P1 Galerkin assembler for the coupled electrodiffusion system in
/// primitive variables.
///
/// Component 0 is the electrostatic potential, components `1..C` are ion
/// concentrations:
///
/// ```text
/// potential:  ∫ ε ∇φ·∇v − (f + Σ zᵢ cᵢ) v
/// species i:  ∫ Dᵢ (∇cᵢ + zᵢ cᵢ ∇φ)·∇v − rᵢ v
/// ```
///
/// Coefficients and sources are evaluated at element midpoints. Element
/// Jacobians come from dual-number seeding of the local residual kernel, so
/// the linearization always matches the residual exactly.
pub struct PnpGalerkin {
    components: usize,
}

/// Midpoint coefficient values of one element.
struct ElemCoeffs {
    eps: f64,
    diffusivity: Vec<f64>,
    valency: Vec<f64>,
    fixed_charge: f64,
    reaction: Vec<f64>,
}

struct Fields<'r> {
    permittivity: &'r SpatialField,
    diffusivity: &'r SpatialField,
    valency: &'r SpatialField,
    fixed_charge: &'r SpatialField,
    reaction: &'r SpatialField,
}

impl PnpGalerkin {
    pub fn new(components: usize) -> Self {
        assert!(
            components >= 2,
            "electrodiffusion needs a potential and at least one species"
        );
        Self { components }
    }

    fn fields<'r>(&self, registry: &'r CoefficientRegistry) -> Result<Fields<'r>, PdeError> {
        let fields = Fields {
            permittivity: registry.get("permittivity")?,
            diffusivity: registry.get("diffusivity")?,
            valency: registry.get("valency")?,
            fixed_charge: registry.get("fixed_charge")?,
            reaction: registry.get("reaction")?,
        };

        let c = self.components;
        for (name, field, expected) in [
            ("permittivity", fields.permittivity, 1),
            ("diffusivity", fields.diffusivity, c),
            ("valency", fields.valency, c),
            ("fixed_charge", fields.fixed_charge, 1),
            ("reaction", fields.reaction, c),
        ] {
            if field.components() != expected {
                return Err(PdeError::Assembly(format!(
                    "coefficient `{name}` has {} components, expected {expected}",
                    field.components()
                )));
            }
        }
        Ok(fields)
    }

    fn elem_coeffs(&self, fields: &Fields<'_>, mid: [f64; 3]) -> ElemCoeffs {
        ElemCoeffs {
            eps: fields.permittivity.evaluate(mid)[0],
            diffusivity: fields.diffusivity.evaluate(mid),
            valency: fields.valency.evaluate(mid),
            fixed_charge: fields.fixed_charge.evaluate(mid)[0],
            reaction: fields.reaction.evaluate(mid),
        }
    }

    /// Residual contributions of one element to its `2C` local test
    /// functions. `u` holds the local dofs, left node first.
    fn element_residual<T>(&self, u: &[T], h: f64, co: &ElemCoeffs, out: &mut [T])
    where
        T: DualNum<f64> + num_traits::Zero + Clone,
    {
        let c = self.components;
        let inv_h = 1.0 / h;
        let half_h = 0.5 * h;

        let dphi = (u[c].clone() - u[0].clone()) * inv_h;

        // midpoint concentrations; slot 0 stays unused
        let mut c_mid = vec![T::zero(); c];
        for (i, slot) in c_mid.iter_mut().enumerate().skip(1) {
            *slot = (u[i].clone() + u[c + i].clone()) * 0.5;
        }

        let mut charge = T::from(co.fixed_charge);
        for i in 1..c {
            charge += c_mid[i].clone() * co.valency[i];
        }

        for a in 0..2 {
            let sgn = if a == 0 { -1.0 } else { 1.0 };

            out[a * c] = dphi.clone() * (co.eps * sgn) - charge.clone() * half_h;

            for i in 1..c {
                let dc = (u[c + i].clone() - u[i].clone()) * inv_h;
                let flux = (dc + c_mid[i].clone() * co.valency[i] * dphi.clone())
                    * co.diffusivity[i];
                out[a * c + i] = flux * sgn - T::from(co.reaction[i] * half_h);
            }
        }
    }

    fn gather_local(&self, space: &FunctionSpace, u: &Function, nodes: [usize; 2]) -> Vec<f64> {
        let c = self.components;
        let mut local = Vec::with_capacity(2 * c);
        for node in nodes {
            for comp in 0..c {
                local.push(u.values()[space.dof(node, comp)]);
            }
        }
        local
    }

    fn check_space(&self, space: &FunctionSpace) -> Result<(), PdeError> {
        if space.components() != self.components {
            return Err(PdeError::Assembly(format!(
                "function space has {} components, assembler expects {}",
                space.components(),
                self.components
            )));
        }
        Ok(())
    }
}

fn midpoint(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        0.5 * (a[0] + b[0]),
        0.5 * (a[1] + b[1]),
        0.5 * (a[2] + b[2]),
    ]
}

impl AssemblyProvider for PnpGalerkin {
    fn components(&self) -> usize {
        self.components
    }

    fn required_coefficients(&self) -> &[&'static str] {
        &COEFFICIENT_NAMES
    }

    fn required_sources(&self) -> &[&'static str] {
        &SOURCE_NAMES
    }

    fn assemble_system(
        &self,
        space: &FunctionSpace,
        coefficients: &CoefficientRegistry,
        u: &Function,
    ) -> Result<AssembledSystem, PdeError> {
        self.check_space(space)?;
        let fields = self.fields(coefficients)?;

        let c = self.components;
        let n = space.dof_count();
        let mut matrix = AssembledMatrix::new(n);
        let mut residual = DVector::zeros(n);
        let mut out = vec![DualDVec64::from_re(0.0); 2 * c];

        for cell in &space.mesh().cells {
            let [left, right] = cell.node_ids;
            let mid = midpoint(
                space.mesh().nodes[left].position,
                space.mesh().nodes[right].position,
            );
            let co = self.elem_coeffs(&fields, mid);
            let local = self.gather_local(space, u, cell.node_ids);

            let u_dual: Vec<DualDVec64> = local
                .iter()
                .enumerate()
                .map(|(j, &v)| {
                    DualDVec64::new(v, Derivative::derivative_generic(Dyn(2 * c), U1, j))
                })
                .collect();

            self.element_residual(&u_dual, cell.length, &co, &mut out);

            for a in 0..2 {
                for comp in 0..c {
                    let row = space.dof(cell.node_ids[a], comp);
                    let entry = &out[a * c + comp];
                    residual[row] += entry.re;

                    let deriv = entry.eps.clone().unwrap_generic(Dyn(2 * c), U1);
                    for b in 0..2 {
                        for j in 0..c {
                            let col = space.dof(cell.node_ids[b], j);
                            let value = deriv[(b * c + j, 0)];
                            if value != 0.0 {
                                matrix.add(row, col, value);
                            }
                        }
                    }
                }
            }
        }

        Ok(AssembledSystem {
            matrix,
            rhs: -residual,
        })
    }

    fn assemble_residual(
        &self,
        space: &FunctionSpace,
        coefficients: &CoefficientRegistry,
        u: &Function,
    ) -> Result<DVector<f64>, PdeError> {
        self.check_space(space)?;
        let fields = self.fields(coefficients)?;

        let c = self.components;
        let mut residual = DVector::zeros(space.dof_count());
        let mut out = vec![0.0f64; 2 * c];

        for cell in &space.mesh().cells {
            let [left, right] = cell.node_ids;
            let mid = midpoint(
                space.mesh().nodes[left].position,
                space.mesh().nodes[right].position,
            );
            let co = self.elem_coeffs(&fields, mid);
            let local = self.gather_local(space, u, cell.node_ids);

            self.element_residual(&local, cell.length, &co, &mut out);

            for a in 0..2 {
                for comp in 0..c {
                    residual[space.dof(cell.node_ids[a], comp)] += out[a * c + comp];
                }
            }
        }

        Ok(-residual)
    }
}
