use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use pnp_rs::discretization::generator::create_interval_mesh;
use pnp_rs::models::pnp::fields;
use pnp_rs::models::pnp::pnp::linear_pnp_params;
use pnp_rs::numerics::SolverParams;
use pnp_rs::numerics::bridge::{IndexBase, SparseBridge};
use pnp_rs::numerics::engine::PdeSystem;
use pnp_rs::physics::AssemblyProvider;
use pnp_rs::physics::galerkin::PnpGalerkin;

fn problem_sizes() -> Vec<usize> {
    vec![100, 1000]
}

fn build_system(n_cells: usize) -> PdeSystem<PnpGalerkin> {
    let params = linear_pnp_params();
    let mesh = Arc::new(create_interval_mesh(-1.0, 1.0, n_cells));
    let mut system = PdeSystem::new(
        mesh,
        PnpGalerkin::new(params.components()),
        SolverParams::default(),
    );
    fields::register(&mut system, &params).unwrap();
    let components: Vec<usize> = (0..params.components()).collect();
    system
        .set_dirichlet_bc(&components, &params.contact_values)
        .unwrap();
    system
}

fn bench_assembly(c: &mut Criterion) {
    let mut group = c.benchmark_group("assembly");
    for &size in &problem_sizes() {
        let mut system = build_system(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &_| {
            b.iter(|| {
                system.assemble().unwrap();
                std::hint::black_box(system.assembled().is_some());
            });
        });
    }
    group.finish();
}

fn bench_bridge_conversion(c: &mut Criterion) {
    let mut group = c.benchmark_group("bridge_conversion");
    for &size in &problem_sizes() {
        let system = build_system(size);
        let params = linear_pnp_params();
        let provider = PnpGalerkin::new(params.components());
        let mut registry = pnp_rs::physics::coefficients::CoefficientRegistry::new();
        for name in ["permittivity", "diffusivity", "valency"] {
            registry.set_coefficient(name, fields::field_for(name, &params).unwrap());
        }
        for name in ["fixed_charge", "reaction"] {
            registry.set_source(name, fields::field_for(name, &params).unwrap());
        }
        let u = pnp_rs::discretization::space::Function::zeros(system.space());
        let assembled = provider
            .assemble_system(system.space(), &registry, &u)
            .unwrap();

        let n = system.solution_dimension();
        let mut bridge = SparseBridge::new();
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &_| {
            b.iter(|| {
                let rows = bridge
                    .to_sparse_rows(&assembled.matrix, n, IndexBase::Zero)
                    .unwrap();
                std::hint::black_box(rows.nnz());
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_assembly, bench_bridge_conversion);
criterion_main!(benches);
