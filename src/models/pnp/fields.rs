use crate::error::PdeError;
use crate::numerics::engine::PdeSystem;
use crate::physics::AssemblyProvider;
use crate::physics::coefficients::SpatialField;

use super::pnp::{DiodeParams, PnpParams};

/// Build the field for a named physical quantity of a constant-coefficient
/// problem. The factory is keyed by the same names the assembler requires.
pub fn field_for(name: &str, params: &PnpParams) -> Result<SpatialField, PdeError> {
    match name {
        "permittivity" => Ok(SpatialField::constant(vec![params.permittivity])),
        "diffusivity" => Ok(SpatialField::constant(params.diffusivity.clone())),
        "valency" => Ok(SpatialField::constant(params.valency.clone())),
        "fixed_charge" => Ok(SpatialField::constant(vec![params.fixed_charge])),
        "reaction" => Ok(SpatialField::constant(params.reaction.clone())),
        other => Err(PdeError::UnknownCoefficient(other.to_string())),
    }
}

/// Build the field for a named quantity of the diode problem. Diffusivity
/// and fixed charge vary across the junction; the rest are constants.
pub fn diode_field_for(name: &str, params: &DiodeParams) -> Result<SpatialField, PdeError> {
    match name {
        "permittivity" => Ok(SpatialField::constant(vec![
            1.0 / params.permittivity_factor(),
        ])),
        "diffusivity" => {
            let p = params.clone();
            Ok(SpatialField::from_fn(3, move |x| p.diffusivity(x[0])))
        }
        "valency" => Ok(SpatialField::constant(vec![0.0, 1.0, -1.0])),
        "fixed_charge" => {
            let p = params.clone();
            Ok(SpatialField::from_fn(1, move |x| {
                vec![p.fixed_charge(x[0])]
            }))
        }
        "reaction" => Ok(SpatialField::constant(vec![0.0, 0.0, 0.0])),
        other => Err(PdeError::UnknownCoefficient(other.to_string())),
    }
}

/// Register every coefficient and source of a constant-coefficient problem
/// with the engine.
pub fn register<A: AssemblyProvider>(
    system: &mut PdeSystem<A>,
    params: &PnpParams,
) -> Result<(), PdeError> {
    for name in ["permittivity", "diffusivity", "valency"] {
        system.set_coefficient(name, field_for(name, params)?);
    }
    for name in ["fixed_charge", "reaction"] {
        system.set_source(name, field_for(name, params)?);
    }
    Ok(())
}

/// Register the diode coefficient set with the engine.
pub fn register_diode<A: AssemblyProvider>(
    system: &mut PdeSystem<A>,
    params: &DiodeParams,
) -> Result<(), PdeError> {
    for name in ["permittivity", "diffusivity", "valency"] {
        system.set_coefficient(name, diode_field_for(name, params)?);
    }
    for name in ["fixed_charge", "reaction"] {
        system.set_source(name, diode_field_for(name, params)?);
    }
    Ok(())
}

/// Linear interpolant between the `[low, high]` contact values of each
/// component, for seeding the Newton iteration with the boundary-condition
/// interpolant.
pub fn linear_profile(contacts: &[[f64; 2]], extent: (f64, f64)) -> SpatialField {
    let (lo, hi) = extent;
    let width = if hi > lo { hi - lo } else { 1.0 };
    let contacts = contacts.to_vec();
    SpatialField::from_fn(contacts.len(), move |p| {
        let t = ((p[0] - lo) / width).clamp(0.0, 1.0);
        contacts
            .iter()
            .map(|[l, r]| (1.0 - t) * l + t * r)
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::pnp::pnp::linear_pnp_params;

    #[test]
    fn factory_covers_the_required_schema() {
        let params = linear_pnp_params();
        for name in [
            "permittivity",
            "diffusivity",
            "valency",
            "fixed_charge",
            "reaction",
        ] {
            assert!(field_for(name, &params).is_ok(), "missing `{name}`");
        }
        assert!(field_for("mobility", &params).is_err());
    }

    #[test]
    fn linear_profile_hits_the_contacts() {
        let profile = linear_profile(&[[0.0, 1.0], [2.0, 4.0]], (-1.0, 1.0));
        assert_eq!(profile.evaluate([-1.0, 0.0, 0.0]), vec![0.0, 2.0]);
        assert_eq!(profile.evaluate([1.0, 0.0, 0.0]), vec![1.0, 4.0]);
        let mid = profile.evaluate([0.0, 0.0, 0.0]);
        assert!((mid[0] - 0.5).abs() < 1e-14);
        assert!((mid[1] - 3.0).abs() < 1e-14);
    }

    #[test]
    fn diode_fields_have_device_arity() {
        let params = DiodeParams::default();
        assert_eq!(diode_field_for("diffusivity", &params).unwrap().components(), 3);
        assert_eq!(diode_field_for("fixed_charge", &params).unwrap().components(), 1);
        let d = diode_field_for("diffusivity", &params)
            .unwrap()
            .evaluate([-0.5, 0.0, 0.0]);
        assert_eq!(d[0], 0.0);
        assert!(d[1] > 0.0 && d[2] > 0.0);
    }
}
