use nalgebra::DVector;

use crate::discretization::mesh::Mesh;
use crate::discretization::space::FunctionSpace;
use crate::error::PdeError;
use crate::numerics::matrix::AssembledMatrix;

/// Geometric predicate selecting one axis-aligned boundary face of the
/// domain bounding box.
#[derive(Clone, Copy, Debug)]
pub struct AxisFace {
    pub axis: usize,
    pub position: f64,
    pub tolerance: f64,
}

impl AxisFace {
    pub fn contains(&self, p: [f64; 3]) -> bool {
        (p[self.axis] - self.position).abs() <= self.tolerance
    }
}

/// Resolution order when one degree of freedom is matched by more than one
/// active constraint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Precedence {
    FirstWins,
    LastWins,
}

/// One fixed-value constraint: a solution component, the face it acts on,
/// and the prescribed value.
#[derive(Clone)]
pub struct DirichletConstraint {
    pub component: usize,
    pub face: AxisFace,
    pub value: f64,
}

/// Maps boundary faces and per-component values to constrained degrees of
/// freedom, and eliminates them from assembled systems by row replacement.
pub struct DirichletManager {
    components: usize,
    precedence: Precedence,
    constraints: Vec<DirichletConstraint>,
    /// Raw `(component, [low, high])` requests, kept so constraints can be
    /// rebuilt against a new mesh.
    requested: Vec<(usize, [f64; 2])>,
}

impl DirichletManager {
    pub fn new(components: usize) -> Self {
        Self {
            components,
            precedence: Precedence::FirstWins,
            constraints: Vec::new(),
            requested: Vec::new(),
        }
    }

    pub fn with_precedence(mut self, precedence: Precedence) -> Self {
        self.precedence = precedence;
        self
    }

    pub fn set_precedence(&mut self, precedence: Precedence) {
        self.precedence = precedence;
    }

    pub fn precedence(&self) -> Precedence {
        self.precedence
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Replace the active constraint set.
    ///
    /// `pairs[i]` holds the `[low_value, high_value]` prescribed for solution
    /// component `components[i]` on the low and high x-faces of the domain.
    /// The facet tolerance is half the shortest mesh edge.
    pub fn set_boundary_conditions(
        &mut self,
        mesh: &Mesh,
        components: &[usize],
        pairs: &[[f64; 2]],
    ) -> Result<(), PdeError> {
        assert_eq!(
            components.len(),
            pairs.len(),
            "one boundary pair per component entry"
        );

        for &comp in components {
            if comp >= self.components {
                return Err(PdeError::ConstraintIndex {
                    component: comp,
                    count: self.components,
                });
            }
        }

        self.requested = components
            .iter()
            .zip(pairs)
            .map(|(&c, &p)| (c, p))
            .collect();
        self.rebuild(mesh);
        Ok(())
    }

    /// Re-derive face predicates from the mesh geometry. Called on mesh
    /// replacement; the requested component/value table is unchanged.
    pub fn rebuild(&mut self, mesh: &Mesh) {
        let (lo, hi) = mesh.extent(0);
        let tolerance = mesh.min_edge_length() / 2.0;

        self.constraints.clear();
        for &(component, [low_value, high_value]) in &self.requested {
            self.constraints.push(DirichletConstraint {
                component,
                face: AxisFace {
                    axis: 0,
                    position: lo,
                    tolerance,
                },
                value: low_value,
            });
            self.constraints.push(DirichletConstraint {
                component,
                face: AxisFace {
                    axis: 0,
                    position: hi,
                    tolerance,
                },
                value: high_value,
            });
        }
    }

    /// The active face predicates, for external consumers.
    pub fn subdomains(&self) -> Vec<&AxisFace> {
        self.constraints.iter().map(|c| &c.face).collect()
    }

    /// Resolve the active constraints against a function space: each matched
    /// dof with its prescribed value, sorted by dof index. Double matches
    /// resolve according to [`Precedence`].
    pub fn constrained_dofs(&self, space: &FunctionSpace) -> Vec<(usize, f64)> {
        let mut resolved: Vec<Option<f64>> = vec![None; space.dof_count()];
        for constraint in &self.constraints {
            for (node_id, node) in space.mesh().nodes.iter().enumerate() {
                if !constraint.face.contains(node.position) {
                    continue;
                }
                let dof = space.dof(node_id, constraint.component);
                match self.precedence {
                    Precedence::FirstWins => {
                        if resolved[dof].is_none() {
                            resolved[dof] = Some(constraint.value);
                        }
                    }
                    Precedence::LastWins => resolved[dof] = Some(constraint.value),
                }
            }
        }
        resolved
            .into_iter()
            .enumerate()
            .filter_map(|(dof, v)| v.map(|value| (dof, value)))
            .collect()
    }

    /// Standard row-elimination enforcement for a correction-form system:
    /// zero the matrix row, set the diagonal to one, overwrite the rhs entry
    /// with the correction that lands the dof on its prescribed value. Once
    /// the iterate satisfies the constraint the entry is zero and the
    /// boundary columns stop feeding the interior rows.
    pub fn apply(
        &self,
        space: &FunctionSpace,
        matrix: &mut AssembledMatrix,
        rhs: &mut DVector<f64>,
        iterate: &DVector<f64>,
    ) {
        for (dof, value) in self.constrained_dofs(space) {
            matrix.set_identity_row(dof);
            rhs[dof] = value - iterate[dof];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discretization::generator::create_interval_mesh;
    use std::sync::Arc;

    fn setup() -> (Arc<Mesh>, FunctionSpace) {
        let mesh = Arc::new(create_interval_mesh(-1.0, 1.0, 4));
        let space = FunctionSpace::new(Arc::clone(&mesh), 2);
        (mesh, space)
    }

    #[test]
    fn face_predicate_uses_tolerance() {
        let face = AxisFace {
            axis: 0,
            position: -1.0,
            tolerance: 0.25,
        };
        assert!(face.contains([-1.0, 0.0, 0.0]));
        assert!(face.contains([-0.8, 0.0, 0.0]));
        assert!(!face.contains([-0.5, 0.0, 0.0]));
    }

    #[test]
    fn out_of_range_component_is_rejected() {
        let (mesh, _space) = setup();
        let mut manager = DirichletManager::new(2);
        let err = manager
            .set_boundary_conditions(&mesh, &[2], &[[0.0, 1.0]])
            .unwrap_err();
        match err {
            PdeError::ConstraintIndex { component, count } => {
                assert_eq!(component, 2);
                assert_eq!(count, 2);
            }
            other => panic!("expected ConstraintIndex, got {other:?}"),
        }
    }

    #[test]
    fn end_nodes_are_constrained() {
        let (mesh, space) = setup();
        let mut manager = DirichletManager::new(2);
        manager
            .set_boundary_conditions(&mesh, &[0], &[[3.0, 7.0]])
            .unwrap();
        let dofs = manager.constrained_dofs(&space);
        // node 0 component 0 and node 4 component 0
        assert_eq!(dofs, vec![(0, 3.0), (8, 7.0)]);
        assert_eq!(manager.subdomains().len(), 2);
    }

    #[test]
    fn first_wins_keeps_the_earlier_value() {
        let (mesh, space) = setup();
        let mut manager = DirichletManager::new(2);
        manager
            .set_boundary_conditions(&mesh, &[0, 0], &[[3.0, 7.0], [-5.0, -9.0]])
            .unwrap();
        let dofs = manager.constrained_dofs(&space);
        assert_eq!(dofs, vec![(0, 3.0), (8, 7.0)]);
    }

    #[test]
    fn last_wins_keeps_the_later_value() {
        let (mesh, space) = setup();
        let mut manager = DirichletManager::new(2).with_precedence(Precedence::LastWins);
        manager
            .set_boundary_conditions(&mesh, &[0, 0], &[[3.0, 7.0], [-5.0, -9.0]])
            .unwrap();
        let dofs = manager.constrained_dofs(&space);
        assert_eq!(dofs, vec![(0, -5.0), (8, -9.0)]);
    }
}
