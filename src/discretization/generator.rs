use super::mesh::{Cell, Mesh, Node};
use glam::DVec3;

/// Build a uniform interval mesh on `[x_min, x_max]` with `n_cells` cells.
pub fn create_interval_mesh(x_min: f64, x_max: f64, n_cells: usize) -> Mesh {
    assert!(n_cells > 0, "mesh needs at least one cell");
    assert!(x_max > x_min, "empty domain");

    let h = (x_max - x_min) / n_cells as f64;
    let points: Vec<DVec3> = (0..=n_cells)
        .map(|i| DVec3::new(x_min + i as f64 * h, 0.0, 0.0))
        .collect();
    create_mesh_from_points(&points)
}

/// Convert a list of generator points into the library's [`Mesh`]
/// representation. Points are sorted along x; consecutive points become
/// cell endpoints.
pub fn create_mesh_from_points(points: &[DVec3]) -> Mesh {
    let mut sorted: Vec<DVec3> = points.to_vec();
    sorted.sort_by(|a, b| a.x.total_cmp(&b.x));

    let nodes: Vec<Node> = sorted
        .iter()
        .map(|p| Node {
            position: p.to_array(),
        })
        .collect();

    let cells: Vec<Cell> = sorted
        .windows(2)
        .enumerate()
        .map(|(id, w)| Cell {
            id,
            node_ids: [id, id + 1],
            length: w[1].x - w[0].x,
        })
        .collect();

    Mesh { nodes, cells }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cells_connect_consecutive_nodes() {
        let mesh = create_interval_mesh(0.0, 1.0, 5);
        assert_eq!(mesh.nodes.len(), 6);
        assert_eq!(mesh.cells.len(), 5);
        for cell in &mesh.cells {
            assert_eq!(cell.node_ids[1], cell.node_ids[0] + 1);
            assert!(cell.length > 0.0);
        }
    }

    #[test]
    fn unsorted_points_are_ordered() {
        let points = vec![
            DVec3::new(0.5, 0.0, 0.0),
            DVec3::new(-1.0, 0.0, 0.0),
            DVec3::new(0.0, 0.0, 0.0),
        ];
        let mesh = create_mesh_from_points(&points);
        assert_eq!(mesh.nodes[0].position[0], -1.0);
        assert_eq!(mesh.nodes[2].position[0], 0.5);
    }
}
