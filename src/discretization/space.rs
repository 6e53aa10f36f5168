use std::sync::Arc;

use nalgebra::DVector;

use super::mesh::Mesh;

/// P1 nodal function space over a mesh with `components` unknowns per node.
///
/// Degrees of freedom are interleaved: `dof = node * components + component`.
#[derive(Clone)]
pub struct FunctionSpace {
    mesh: Arc<Mesh>,
    components: usize,
}

impl FunctionSpace {
    pub fn new(mesh: Arc<Mesh>, components: usize) -> Self {
        assert!(components > 0, "function space needs at least one component");
        Self { mesh, components }
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn mesh_arc(&self) -> Arc<Mesh> {
        Arc::clone(&self.mesh)
    }

    pub fn components(&self) -> usize {
        self.components
    }

    pub fn dof_count(&self) -> usize {
        self.mesh.nodes.len() * self.components
    }

    #[inline]
    pub fn dof(&self, node: usize, component: usize) -> usize {
        node * self.components + component
    }
}

/// A field over a [`FunctionSpace`]: one value per degree of freedom.
#[derive(Clone)]
pub struct Function {
    space: FunctionSpace,
    values: DVector<f64>,
}

impl Function {
    pub fn zeros(space: &FunctionSpace) -> Self {
        Self {
            space: space.clone(),
            values: DVector::zeros(space.dof_count()),
        }
    }

    pub fn space(&self) -> &FunctionSpace {
        &self.space
    }

    pub fn values(&self) -> &DVector<f64> {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut DVector<f64> {
        &mut self.values
    }

    /// Set every degree of freedom to the same value.
    pub fn fill(&mut self, value: f64) {
        self.values.fill(value);
    }

    /// Set each component to its own constant value.
    pub fn fill_components(&mut self, values: &[f64]) {
        assert_eq!(
            values.len(),
            self.space.components(),
            "one value per component required"
        );
        for node in 0..self.space.mesh().nodes.len() {
            for (comp, v) in values.iter().enumerate() {
                self.values[self.space.dof(node, comp)] = *v;
            }
        }
    }

    /// Interpolate a pointwise expression: `f(position)` must return one
    /// value per component.
    pub fn interpolate_with(&mut self, f: impl Fn([f64; 3]) -> Vec<f64>) {
        for (node_id, node) in self.space.mesh().nodes.iter().enumerate() {
            let vals = f(node.position);
            assert_eq!(
                vals.len(),
                self.space.components(),
                "expression arity must match component count"
            );
            for (comp, v) in vals.iter().enumerate() {
                self.values[self.space.dof(node_id, comp)] = *v;
            }
        }
    }

    /// Copy the values of another field over the same space.
    pub fn assign(&mut self, other: &Function) {
        assert_eq!(self.values.len(), other.values.len());
        self.values.copy_from(&other.values);
    }

    /// Extract one component as a plain vector, node-ordered.
    pub fn component(&self, comp: usize) -> Vec<f64> {
        let c = self.space.components();
        self.values.iter().skip(comp).step_by(c).cloned().collect()
    }

    /// Evaluate one component at a point by linear interpolation between the
    /// enclosing nodes. Clamps to the domain ends.
    pub fn eval_component(&self, comp: usize, x: f64) -> f64 {
        let mesh = self.space.mesh();
        let n = mesh.nodes.len();
        if x <= mesh.nodes[0].position[0] {
            return self.values[self.space.dof(0, comp)];
        }
        if x >= mesh.nodes[n - 1].position[0] {
            return self.values[self.space.dof(n - 1, comp)];
        }
        for cell in &mesh.cells {
            let [a, b] = cell.node_ids;
            let xa = mesh.nodes[a].position[0];
            let xb = mesh.nodes[b].position[0];
            if x >= xa && x <= xb {
                let t = (x - xa) / (xb - xa);
                let ua = self.values[self.space.dof(a, comp)];
                let ub = self.values[self.space.dof(b, comp)];
                return (1.0 - t) * ua + t * ub;
            }
        }
        unreachable!("point inside bounding box but outside every cell");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discretization::generator::create_interval_mesh;

    fn space() -> FunctionSpace {
        FunctionSpace::new(Arc::new(create_interval_mesh(-1.0, 1.0, 4)), 2)
    }

    #[test]
    fn dof_layout_is_interleaved() {
        let space = space();
        assert_eq!(space.dof_count(), 10);
        assert_eq!(space.dof(0, 1), 1);
        assert_eq!(space.dof(3, 0), 6);
    }

    #[test]
    fn fill_components_sets_each_slot() {
        let space = space();
        let mut f = Function::zeros(&space);
        f.fill_components(&[1.0, -2.0]);
        assert_eq!(f.component(0), vec![1.0; 5]);
        assert_eq!(f.component(1), vec![-2.0; 5]);
    }

    #[test]
    fn eval_component_interpolates_linearly() {
        let space = space();
        let mut f = Function::zeros(&space);
        f.interpolate_with(|p| vec![p[0], 2.0 * p[0]]);
        assert!((f.eval_component(0, 0.25) - 0.25).abs() < 1e-14);
        assert!((f.eval_component(1, -0.75) + 1.5).abs() < 1e-14);
    }
}
