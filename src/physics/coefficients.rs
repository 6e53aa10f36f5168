use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::PdeError;

/// Shared pointwise evaluation closure: position -> one value per component.
pub type EvalFn = Arc<dyn Fn([f64; 3]) -> Vec<f64> + Send + Sync>;

/// A named physical quantity evaluable anywhere in the domain.
///
/// Either a constant wrapped per component or a genuinely spatial profile;
/// both sides of the registry store this one shape.
#[derive(Clone)]
pub struct SpatialField {
    components: usize,
    eval: EvalFn,
}

impl SpatialField {
    pub fn new(components: usize, eval: EvalFn) -> Self {
        Self { components, eval }
    }

    /// Constant-field wrapper around a raw numeric vector.
    pub fn constant(values: Vec<f64>) -> Self {
        let components = values.len();
        Self {
            components,
            eval: Arc::new(move |_| values.clone()),
        }
    }

    pub fn from_fn(
        components: usize,
        f: impl Fn([f64; 3]) -> Vec<f64> + Send + Sync + 'static,
    ) -> Self {
        Self {
            components,
            eval: Arc::new(f),
        }
    }

    pub fn components(&self) -> usize {
        self.components
    }

    pub fn evaluate(&self, p: [f64; 3]) -> Vec<f64> {
        (self.eval)(p)
    }
}

/// Named coefficient storage for an assembly pass.
///
/// Coefficients enter the bilinear (Jacobian) form; sources enter only the
/// linear (residual) form. The two are kept apart because they participate
/// in different weak-form terms.
#[derive(Default)]
pub struct CoefficientRegistry {
    coefficients: BTreeMap<String, SpatialField>,
    sources: BTreeMap<String, SpatialField>,
}

impl CoefficientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_coefficient(&mut self, name: impl Into<String>, field: SpatialField) {
        self.coefficients.insert(name.into(), field);
    }

    /// Store a coefficient given as a raw per-component vector.
    pub fn set_coefficient_values(&mut self, name: impl Into<String>, values: &[f64]) {
        self.set_coefficient(name, SpatialField::constant(values.to_vec()));
    }

    pub fn set_source(&mut self, name: impl Into<String>, field: SpatialField) {
        self.sources.insert(name.into(), field);
    }

    pub fn set_source_values(&mut self, name: impl Into<String>, values: &[f64]) {
        self.set_source(name, SpatialField::constant(values.to_vec()));
    }

    /// Look a name up on either side of the registry.
    pub fn get(&self, name: &str) -> Result<&SpatialField, PdeError> {
        self.coefficients
            .get(name)
            .or_else(|| self.sources.get(name))
            .ok_or_else(|| PdeError::UnknownCoefficient(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.coefficients.contains_key(name) || self.sources.contains_key(name)
    }

    /// All registered names, coefficients first, for diagnostic listing.
    pub fn names(&self) -> Vec<&str> {
        self.coefficients
            .keys()
            .chain(self.sources.keys())
            .map(String::as_str)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_vector_becomes_constant_field() {
        let mut reg = CoefficientRegistry::new();
        reg.set_coefficient_values("diffusivity", &[0.0, 2.0, 2.0]);
        let field = reg.get("diffusivity").unwrap();
        assert_eq!(field.components(), 3);
        assert_eq!(field.evaluate([0.3, 0.0, 0.0]), vec![0.0, 2.0, 2.0]);
        assert_eq!(field.evaluate([-0.9, 0.0, 0.0]), vec![0.0, 2.0, 2.0]);
    }

    #[test]
    fn missing_name_is_an_error() {
        let reg = CoefficientRegistry::new();
        match reg.get("permittivity") {
            Err(PdeError::UnknownCoefficient(name)) => assert_eq!(name, "permittivity"),
            Err(other) => panic!("expected UnknownCoefficient, got {other}"),
            Ok(_) => panic!("lookup succeeded on an empty registry"),
        }
    }

    #[test]
    fn sources_and_coefficients_are_both_visible() {
        let mut reg = CoefficientRegistry::new();
        reg.set_coefficient_values("permittivity", &[1.0]);
        reg.set_source_values("fixed_charge", &[0.5]);
        assert!(reg.contains("permittivity"));
        assert!(reg.contains("fixed_charge"));
        assert_eq!(reg.names(), vec!["permittivity", "fixed_charge"]);
    }
}
